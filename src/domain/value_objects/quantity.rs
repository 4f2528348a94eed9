use crate::domain::errors::ValidationError;
use serde::{Deserialize, Serialize};

/// Number of shares in an order, strictly positive and finite.
/// Fractional shares are allowed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Quantity(f64);

impl Quantity {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::InvalidQuantity(
                "Quantity must be finite".to_string(),
            ));
        }
        if value <= 0.0 {
            return Err(ValidationError::InvalidQuantity(
                "Quantity must be positive".to_string(),
            ));
        }
        Ok(Quantity(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Quantity {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for f64 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}
