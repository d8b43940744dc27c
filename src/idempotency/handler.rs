use crate::error::{AppError, Result};
use crate::idempotency::classifier::{is_idempotency_eligible, IDEMPOTENCY_HEADER};
use crate::idempotency::key_generator::{CacheKey, FingerprintGenerator, RequestFingerprint};
use crate::idempotency::storage::{CachedResponse, IdempotencyStore, PutOutcome};
use crate::observability::{get_metrics, mask_sensitive};
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for idempotency decisions.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_requests: AtomicU64,
    pub bypassed_requests: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub new_requests: AtomicU64,
    pub duplicate_requests: AtomicU64,
    pub conflicting_requests: AtomicU64,
    pub completed_requests: AtomicU64,
    pub uncached_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub fingerprint_failures: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypassed(&self) {
        self.bypassed_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_decision("bypassed");
    }

    pub fn record_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_decision("missing_key");
    }

    pub fn record_new(&self) {
        self.new_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_decision("executed");
    }

    pub fn record_duplicate(&self) {
        self.duplicate_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_decision("replayed");
    }

    pub fn record_conflict(&self) {
        self.conflicting_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_decision("conflict");
    }

    pub fn record_completed(&self) {
        self.completed_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_decision("recorded");
    }

    pub fn record_uncached(&self) {
        self.uncached_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_decision("uncached");
    }

    pub fn record_failed(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_decision("failed");
    }

    pub fn record_fingerprint_failure(&self) {
        self.fingerprint_failures.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_decision("fingerprint_error");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            bypassed_requests: self.bypassed_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
            duplicate_requests: self.duplicate_requests.load(Ordering::Relaxed),
            conflicting_requests: self.conflicting_requests.load(Ordering::Relaxed),
            completed_requests: self.completed_requests.load(Ordering::Relaxed),
            uncached_requests: self.uncached_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            fingerprint_failures: self.fingerprint_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub bypassed_requests: u64,
    pub rejected_requests: u64,
    pub new_requests: u64,
    pub duplicate_requests: u64,
    pub conflicting_requests: u64,
    pub completed_requests: u64,
    pub uncached_requests: u64,
    pub failed_requests: u64,
    pub fingerprint_failures: u64,
}

impl MetricsSnapshot {
    pub fn duplicate_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.duplicate_requests as f64 / self.total_requests as f64
        }
    }
}

/// Result of looking up a key that is held under its lock.
#[derive(Debug)]
pub enum IdempotencyCheckResult {
    /// No recorded response, proceed with the operation
    New,
    /// Same request seen before, replay the recorded response
    Duplicate(Arc<CachedResponse>),
}

/// What a protected operation produced.
#[derive(Debug)]
pub enum Outcome {
    /// Fully buffered response that can be recorded and replayed.
    Recordable {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    /// Response handed back live and never recorded.
    PassThrough(Response),
}

impl Outcome {
    /// Serializes `value` as a JSON body with the given status.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize response: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Outcome::Recordable {
            status,
            headers,
            body: Bytes::from(body),
        })
    }

    pub fn ok<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Self::json(StatusCode::OK, value)
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Recordable {
                status,
                headers,
                body,
            } => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Outcome::PassThrough(response) => response,
        }
    }
}

/// Request coordinates the idempotency layer needs from the transport.
#[derive(Debug)]
pub struct RequestContext<'a, P: ?Sized> {
    pub method: &'a Method,
    pub path: &'a str,
    pub token: Option<&'a str>,
    /// All arguments of the protected operation.
    pub payload: &'a P,
}

impl<'a, P: ?Sized> RequestContext<'a, P> {
    pub fn new(method: &'a Method, path: &'a str, token: Option<&'a str>, payload: &'a P) -> Self {
        Self {
            method,
            path,
            token,
            payload,
        }
    }
}

/// Configuration for the idempotency handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyHandlerConfig {
    pub header_name: String,
}

impl Default for IdempotencyHandlerConfig {
    fn default() -> Self {
        Self {
            header_name: IDEMPOTENCY_HEADER.to_string(),
        }
    }
}

/// Wraps protected operations with record-and-replay semantics.
#[derive(Debug)]
pub struct IdempotencyHandler {
    store: Arc<IdempotencyStore>,
    fingerprints: FingerprintGenerator,
    metrics: Arc<IdempotencyMetrics>,
    config: IdempotencyHandlerConfig,
}

impl IdempotencyHandler {
    pub fn new(store: Arc<IdempotencyStore>, config: IdempotencyHandlerConfig) -> Self {
        Self {
            store,
            fingerprints: FingerprintGenerator::default(),
            metrics: Arc::new(IdempotencyMetrics::new()),
            config,
        }
    }

    /// Replaces the fingerprint generator (and so the digest backend).
    pub fn with_fingerprint_generator(mut self, fingerprints: FingerprintGenerator) -> Self {
        self.fingerprints = fingerprints;
        self
    }

    pub fn store(&self) -> Arc<IdempotencyStore> {
        Arc::clone(&self.store)
    }

    /// Gets the metrics for this handler.
    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &IdempotencyHandlerConfig {
        &self.config
    }

    /// Looks up `key` and compares the recorded fingerprint.
    ///
    /// Callers must hold the key's lock so the answer stays valid until the
    /// outcome is recorded.
    pub fn check(
        &self,
        key: &CacheKey,
        fingerprint: &RequestFingerprint,
    ) -> Result<IdempotencyCheckResult> {
        match self.store.get(key) {
            None => {
                self.metrics.record_new();
                Ok(IdempotencyCheckResult::New)
            }
            Some(existing) if existing.matches(fingerprint) => {
                self.metrics.record_duplicate();
                Ok(IdempotencyCheckResult::Duplicate(existing))
            }
            Some(_) => {
                self.metrics.record_conflict();
                Err(AppError::IdempotencyConflict)
            }
        }
    }

    /// Runs `operation` under idempotency protection.
    ///
    /// Ineligible verbs are forwarded without touching the store. For POST and
    /// PATCH the operation runs at most once per cache key and fingerprint; a
    /// matching retry gets the recorded response and a mismatched one gets
    /// [`AppError::IdempotencyConflict`]. Errors from the operation propagate
    /// unchanged and are not recorded.
    pub async fn handle<P, F, Fut>(&self, ctx: RequestContext<'_, P>, operation: F) -> Result<Response>
    where
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Outcome>>,
    {
        self.metrics.record_request();

        if !is_idempotency_eligible(ctx.method) {
            self.metrics.record_bypassed();
            return operation().await.map(<Outcome as IntoResponse>::into_response);
        }

        let key = CacheKey::derive(ctx.method, ctx.path, ctx.token).map_err(|e| {
            self.metrics.record_rejected();
            tracing::debug!(method = %ctx.method, path = ctx.path, "Rejected request without idempotency key");
            e
        })?;

        let fingerprint = self.fingerprints.compute(ctx.payload).map_err(|e| {
            self.metrics.record_fingerprint_failure();
            e
        })?;

        let masked = mask_sensitive(key.token(), 4);

        // Recorded entries are final, so replays and conflicts skip the key lock.
        let _lock = match self.store.get(&key) {
            Some(_) => None,
            None => Some(self.store.lock(&key).await),
        };

        match self.check(&key, &fingerprint) {
            Ok(IdempotencyCheckResult::Duplicate(cached)) => {
                tracing::info!(method = %key.method(), path = key.path(), key = %masked, "Replaying recorded response");
                return Ok(cached.to_response());
            }
            Ok(IdempotencyCheckResult::New) => {}
            Err(e) => {
                tracing::warn!(method = %key.method(), path = key.path(), key = %masked, "Idempotency key reused with different request data");
                return Err(e);
            }
        }

        let outcome = match operation().await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.record_failed();
                tracing::debug!(key = %masked, error = %e, "Protected operation failed, nothing recorded");
                return Err(e);
            }
        };

        match outcome {
            Outcome::Recordable {
                status,
                headers,
                body,
            } => {
                let cached = CachedResponse::new(fingerprint, status, &headers, body);
                let response = cached.to_response();

                match self.store.put_if_absent(key, cached) {
                    PutOutcome::Stored(_) => {
                        self.metrics.record_completed();
                        tracing::debug!(key = %masked, status = status.as_u16(), "Recorded response");
                    }
                    PutOutcome::Existing(_) => {
                        tracing::warn!(key = %masked, "Response already recorded for key, keeping the original");
                    }
                }

                Ok(response)
            }
            Outcome::PassThrough(response) => {
                self.metrics.record_uncached();
                tracing::debug!(key = %masked, "Outcome is not recordable, returning it uncached");
                Ok(response)
            }
        }
    }
}
