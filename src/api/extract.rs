use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Method;
use std::convert::Infallible;

use super::routes::AppState;
use crate::idempotency::{extract_token, RequestContext};

/// Method, path and idempotency token of the current request.
#[derive(Debug, Clone)]
pub struct IdempotencyContext {
    pub method: Method,
    pub path: String,
    pub token: Option<String>,
}

impl IdempotencyContext {
    /// Pairs the request coordinates with the operation's arguments.
    pub fn with_payload<'a, P: ?Sized>(&'a self, payload: &'a P) -> RequestContext<'a, P> {
        RequestContext::new(&self.method, &self.path, self.token.as_deref(), payload)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for IdempotencyContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_name = &state.idempotency.config().header_name;

        Ok(Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            token: extract_token(&parts.headers, header_name),
        })
    }
}
