use crate::error::{AppError, Result};
use crate::models::{Payment, PaymentDto};
use crate::observability::{get_metrics, mask_amount, mask_uuid, LatencyTimer};
use crate::repositories::PaymentRepository;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Service for payment create and partial-update operations.
#[derive(Clone)]
pub struct PaymentService {
    repository: Arc<dyn PaymentRepository>,
}

impl PaymentService {
    pub fn new(repository: Arc<dyn PaymentRepository>) -> Self {
        Self { repository }
    }

    /// Creates a payment. Amount and currency are both required.
    pub async fn create_payment(&self, dto: &PaymentDto) -> Result<PaymentDto> {
        let timer = LatencyTimer::new();

        let (amount, currency) = match (dto.amount, dto.currency.as_deref()) {
            (Some(amount), Some(currency)) => (amount, currency),
            _ => {
                return Err(AppError::Validation(
                    "Amount and Currency are required fields".to_string(),
                ))
            }
        };
        validate_amount(amount)?;
        validate_currency(currency)?;

        let saved = self.repository.save(Payment::new(amount, currency)).await?;

        get_metrics().record_payment_created(&saved.currency);
        get_metrics().record_payment_operation_latency("create", timer.elapsed_ms());
        tracing::info!(
            payment_id = %mask_uuid(&saved.id),
            amount = %mask_amount(&saved.amount),
            currency = %saved.currency,
            "Payment created"
        );

        Ok(PaymentDto::summary(&saved))
    }

    /// Applies the fields present in `dto` to an existing payment.
    pub async fn partial_update_payment(&self, id: &str, dto: &PaymentDto) -> Result<PaymentDto> {
        let timer = LatencyTimer::new();
        let id = parse_id(id)?;

        if let Some(amount) = dto.amount {
            validate_amount(amount)?;
        }
        if let Some(currency) = dto.currency.as_deref() {
            validate_currency(currency)?;
        }

        let mut payment = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        payment.apply(dto);
        let updated = self.repository.save(payment).await?;

        get_metrics().record_payment_updated(&updated.currency);
        get_metrics().record_payment_operation_latency("partial_update", timer.elapsed_ms());
        tracing::info!(payment_id = %mask_uuid(&updated.id), "Payment updated");

        Ok(PaymentDto::from_payment(&updated))
    }

    pub async fn get_payment(&self, id: &str) -> Result<PaymentDto> {
        let id = parse_id(id)?;
        self.repository
            .find_by_id(id)
            .await?
            .map(|payment| PaymentDto::from_payment(&payment))
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
    }

    pub async fn list_payments(&self) -> Result<Vec<PaymentDto>> {
        let payments = self.repository.find_all().await?;
        Ok(payments.iter().map(PaymentDto::from_payment).collect())
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::Validation(format!("Invalid payment id '{}'", id)))
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }
    Ok(())
}

fn validate_currency(currency: &str) -> Result<()> {
    if currency.chars().count() != 3 {
        return Err(AppError::Validation(
            "Currency must be a 3-letter code".to_string(),
        ));
    }
    Ok(())
}
