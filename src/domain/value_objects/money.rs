use crate::domain::errors::ValidationError;
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing cash amounts and share counts
pub const EPSILON: f64 = 1e-9;

/// A positive cash amount used for deposits and withdrawals
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Amount(f64);

impl Amount {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::InvalidAmount(format!(
                "Amount must be a positive number, got {}",
                value
            )));
        }
        Ok(Amount(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Amount {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for f64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Snap values within tolerance of zero to exactly zero
pub fn snap_to_zero(value: f64) -> f64 {
    if value.abs() <= EPSILON {
        0.0
    } else {
        value
    }
}
