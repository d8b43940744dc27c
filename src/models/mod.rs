pub mod payment;

pub use payment::{Payment, PaymentDto};
