use http::{HeaderMap, Method};

/// Default request header carrying the client idempotency token.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Returns true when calls with this verb go through the idempotency layer.
///
/// Only create-style POST and partial-update-style PATCH are eligible. GET, PUT
/// and DELETE are idempotent by nature and are forwarded unconditionally.
pub fn is_idempotency_eligible(method: &Method) -> bool {
    method == Method::POST || method == Method::PATCH
}

/// Reads the idempotency token from `headers`.
///
/// Header names are matched case-insensitively. Absent, blank or non-ASCII
/// values are all reported as `None`.
pub fn extract_token(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
