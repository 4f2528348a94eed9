use crate::domain::errors::ValidationError;
use serde::{Deserialize, Serialize};

/// Execution or quote price, strictly positive and finite
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::InvalidPrice(
                "Price must be finite".to_string(),
            ));
        }
        if value <= 0.0 {
            return Err(ValidationError::InvalidPrice(
                "Price must be positive".to_string(),
            ));
        }
        Ok(Price(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Percent change of this price relative to `reference`
    pub fn percent_change_from(&self, reference: Price) -> f64 {
        (self.0 - reference.0) / reference.0 * 100.0
    }
}

impl TryFrom<f64> for Price {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Price::new(value)
    }
}

impl From<Price> for f64 {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_new_valid() {
        let price = Price::new(187.25).unwrap();
        assert_eq!(price.value(), 187.25);
    }

    #[test]
    fn test_price_rejects_zero_and_negative() {
        assert!(Price::new(0.0).is_err());
        assert_eq!(
            Price::new(-1.0).unwrap_err(),
            ValidationError::InvalidPrice("Price must be positive".to_string())
        );
    }

    #[test]
    fn test_price_rejects_nan() {
        assert!(Price::new(f64::NAN).is_err());
        assert!(Price::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_percent_change() {
        let now = Price::new(110.0).unwrap();
        let before = Price::new(100.0).unwrap();
        assert!((now.percent_change_from(before) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_deserialize_validates() {
        let ok: Price = serde_json::from_str("12.5").unwrap();
        assert_eq!(ok.value(), 12.5);
        assert!(serde_json::from_str::<Price>("-3").is_err());
    }
}
