use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::extract::IdempotencyContext;
use crate::api::responses::HealthResponse;
use crate::error::ApiError;
use crate::idempotency::Outcome;
use crate::models::PaymentDto;
use crate::observability::get_metrics;

use super::routes::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let recorded_responses = state.idempotency.store().len();
    get_metrics().set_recorded_responses(recorded_responses);
    let snapshot = state.idempotency.metrics().snapshot();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        recorded_responses,
        duplicate_rate: snapshot.duplicate_rate(),
        idempotency: snapshot,
    })
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ============================================================================
// Payment Handlers
// ============================================================================

/// Create a new payment.
pub async fn create_payment(
    State(state): State<AppState>,
    ctx: IdempotencyContext,
    Json(dto): Json<PaymentDto>,
) -> Result<Response, ApiError> {
    let payload = [&dto];

    state
        .idempotency
        .handle(ctx.with_payload(&payload), || async {
            let created = state.payments.create_payment(&dto).await?;
            Outcome::ok(&created)
        })
        .await
        .map_err(|e| e.at(&ctx.path))
}

/// Partially update a payment.
pub async fn partial_update_payment(
    State(state): State<AppState>,
    ctx: IdempotencyContext,
    Path(id): Path<String>,
    Json(dto): Json<PaymentDto>,
) -> Result<Response, ApiError> {
    let payload = (&id, &dto);

    state
        .idempotency
        .handle(ctx.with_payload(&payload), || async {
            let updated = state.payments.partial_update_payment(&id, &dto).await?;
            Outcome::ok(&updated)
        })
        .await
        .map_err(|e| e.at(&ctx.path))
}

/// Get a payment by ID.
pub async fn get_payment(
    State(state): State<AppState>,
    ctx: IdempotencyContext,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let payload = [&id];

    state
        .idempotency
        .handle(ctx.with_payload(&payload), || async {
            let payment = state.payments.get_payment(&id).await?;
            Outcome::ok(&payment)
        })
        .await
        .map_err(|e| e.at(&ctx.path))
}

/// List all payments.
pub async fn list_payments(
    State(state): State<AppState>,
    ctx: IdempotencyContext,
) -> Result<Response, ApiError> {
    state
        .idempotency
        .handle(ctx.with_payload(&()), || async {
            let payments = state.payments.list_payments().await?;
            Outcome::ok(&payments)
        })
        .await
        .map_err(|e| e.at(&ctx.path))
}
