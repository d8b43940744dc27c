pub mod payment_repository;

pub use payment_repository::{InMemoryPaymentRepository, PaymentRepository};

#[cfg(test)]
pub use payment_repository::MockPaymentRepository;
