use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Creates a new Payment with a fresh id.
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            currency: currency.into(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Applies the fields present in `changes` and stamps `updated_at`.
    pub fn apply(&mut self, changes: &PaymentDto) {
        if let Some(amount) = changes.amount {
            self.amount = amount;
        }
        if let Some(currency) = &changes.currency {
            self.currency = currency.clone();
        }
        self.updated_at = Some(Utc::now());
    }
}

/// Payment payload exchanged over HTTP, used for both requests and responses.
///
/// Every field is optional so the same shape serves create, partial update
/// and responses. Amounts travel as JSON numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl PaymentDto {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            id: None,
            amount: Some(amount),
            currency: Some(currency.into()),
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Full view including the id.
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            id: Some(payment.id),
            amount: Some(payment.amount),
            currency: Some(payment.currency.clone()),
        }
    }

    /// View without the id, as returned when a payment is created.
    pub fn summary(payment: &Payment) -> Self {
        Self {
            id: None,
            ..Self::from_payment(payment)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_partial_changes() {
        let mut payment = Payment::new(dec!(100.00), "GBP");
        payment.apply(&PaymentDto::default().with_amount(dec!(105.00)));

        assert_eq!(payment.amount, dec!(105.00));
        assert_eq!(payment.currency, "GBP");
        assert!(payment.updated_at.is_some());
    }

    #[test]
    fn test_dto_amount_is_json_number() {
        let json = serde_json::to_value(PaymentDto::new(dec!(40.00), "SMS")).unwrap();
        assert_eq!(json, serde_json::json!({"amount": 40.0, "currency": "SMS"}));
    }

    #[test]
    fn test_dto_accepts_missing_fields() {
        let dto: PaymentDto = serde_json::from_str(r#"{"amount": 80.0}"#).unwrap();
        assert_eq!(dto.amount, Some(dec!(80)));
        assert_eq!(dto.currency, None);
        assert_eq!(dto.id, None);
    }

    #[test]
    fn test_summary_omits_id() {
        let payment = Payment::new(dec!(40.00), "SMS");
        assert_eq!(PaymentDto::summary(&payment).id, None);
        assert_eq!(PaymentDto::from_payment(&payment).id, Some(payment.id));
    }
}
