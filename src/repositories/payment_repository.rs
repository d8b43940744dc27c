use crate::error::Result;
use crate::models::Payment;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Storage for payments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts or replaces a payment and returns the stored copy.
    async fn save(&self, payment: Payment) -> Result<Payment>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;

    async fn find_all(&self) -> Result<Vec<Payment>>;
}

/// Process-local payment repository.
#[derive(Debug, Default)]
pub struct InMemoryPaymentRepository {
    payments: DashMap<Uuid, Payment>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn save(&self, payment: Payment) -> Result<Payment> {
        self.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        Ok(self.payments.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}
