#![allow(dead_code)]

use idempotency_service::api::{create_router, AppState};
use idempotency_service::idempotency::{IdempotencyHandler, IdempotencyHandlerConfig, IdempotencyStore};
use idempotency_service::models::Payment;
use idempotency_service::repositories::{InMemoryPaymentRepository, PaymentRepository};
use idempotency_service::services::PaymentService;
use rust_decimal::Decimal;
use std::sync::Arc;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub repository: Arc<InMemoryPaymentRepository>,
    pub store: Arc<IdempotencyStore>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn seed_payment(&self, amount: Decimal, currency: &str) -> Payment {
        self.repository
            .save(Payment::new(amount, currency))
            .await
            .expect("Failed to seed payment")
    }

    /// Stored payments with exactly this amount and currency.
    pub async fn count_payments(&self, amount: Decimal, currency: &str) -> usize {
        self.repository
            .find_all()
            .await
            .expect("Failed to list payments")
            .into_iter()
            .filter(|p| p.amount == amount && p.currency == currency)
            .count()
    }
}

impl TestApp {
    pub async fn repository_is_empty(&self) -> bool {
        self.repository
            .find_all()
            .await
            .expect("Failed to list payments")
            .is_empty()
    }
}

/// Starts the router on an ephemeral port with fresh in-memory state.
pub async fn spawn_app() -> TestApp {
    let repository = Arc::new(InMemoryPaymentRepository::new());
    let store = Arc::new(IdempotencyStore::new());
    let handler = IdempotencyHandler::new(Arc::clone(&store), IdempotencyHandlerConfig::default());
    let state = AppState::new(PaymentService::new(repository.clone()), Arc::new(handler));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let address = listener.local_addr().expect("Failed to read local address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });

    TestApp {
        base_url: format!("http://{}", address),
        client: reqwest::Client::new(),
        repository,
        store,
    }
}
