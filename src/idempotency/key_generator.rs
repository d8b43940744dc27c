use crate::error::{AppError, BoxError, Result};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Identifies one series of attempts for a single idempotent operation.
///
/// The same token sent to a different method or path is a different key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    path: String,
    token: String,
}

impl CacheKey {
    /// Builds a key from the request coordinates.
    ///
    /// A missing or empty token is a caller error.
    pub fn derive(method: &Method, path: &str, token: Option<&str>) -> Result<Self> {
        let token = match token.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AppError::MissingIdempotencyKey),
        };

        Ok(Self {
            method: method.clone(),
            path: path.to_string(),
            token: token.to_string(),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.method, self.path, self.token)
    }
}

/// Hex-encoded digest of a request's canonical argument payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest backend used for request fingerprints.
pub trait RequestDigest: Send + Sync {
    /// Name of the algorithm, used in logs.
    fn algorithm(&self) -> &'static str;

    fn digest(&self, input: &[u8]) -> std::result::Result<Vec<u8>, BoxError>;
}

/// SHA-256 digest backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl RequestDigest for Sha256Digest {
    fn algorithm(&self) -> &'static str {
        "SHA-256"
    }

    fn digest(&self, input: &[u8]) -> std::result::Result<Vec<u8>, BoxError> {
        let mut hasher = Sha256::new();
        hasher.update(input);
        Ok(hasher.finalize().to_vec())
    }
}

/// Computes request fingerprints over canonically serialized payloads.
#[derive(Clone)]
pub struct FingerprintGenerator {
    digest: Arc<dyn RequestDigest>,
}

impl fmt::Debug for FingerprintGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintGenerator")
            .field("algorithm", &self.digest.algorithm())
            .finish()
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new(Arc::new(Sha256Digest))
    }
}

impl FingerprintGenerator {
    pub fn new(digest: Arc<dyn RequestDigest>) -> Self {
        Self { digest }
    }

    /// Computes the fingerprint of `payload`.
    ///
    /// Serialization and digest failures are internal errors, never a reason
    /// to treat the request as non-idempotent.
    pub fn compute<T: Serialize + ?Sized>(&self, payload: &T) -> Result<RequestFingerprint> {
        let canonical = canonical_json(payload)?;
        let bytes = self
            .digest
            .digest(canonical.as_bytes())
            .map_err(AppError::fingerprint)?;

        Ok(RequestFingerprint(hex::encode(bytes)))
    }
}

/// Serializes `payload` to compact JSON with object keys in sorted order.
pub fn canonical_json<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    let value = serde_json::to_value(payload).map_err(AppError::fingerprint)?;
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            // Sorted explicitly: map iteration order depends on serde_json features.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
