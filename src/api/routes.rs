use axum::{
    routing::{get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::idempotency::{IdempotencyHandler, IdempotencyHandlerConfig, IdempotencyStore};
use crate::repositories::InMemoryPaymentRepository;
use crate::services::PaymentService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentService,
    pub idempotency: Arc<IdempotencyHandler>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(payments: PaymentService, idempotency: Arc<IdempotencyHandler>) -> Self {
        Self {
            payments,
            idempotency,
            metrics_handle: None,
        }
    }

    /// State backed by a fresh in-memory repository and idempotency store.
    pub fn in_memory(config: IdempotencyHandlerConfig) -> Self {
        let store = Arc::new(IdempotencyStore::new());
        let repository = Arc::new(InMemoryPaymentRepository::new());

        Self::new(
            PaymentService::new(repository),
            Arc::new(IdempotencyHandler::new(store, config)),
        )
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Payment endpoints
        .route(
            "/api/payments",
            post(handlers::create_payment).get(handlers::list_payments),
        )
        .route(
            "/api/payments/:id",
            patch(handlers::partial_update_payment).get(handlers::get_payment),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
