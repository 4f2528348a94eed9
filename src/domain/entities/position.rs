use serde::{Deserialize, Serialize};

/// Quantity held and weighted-average cost of an open position.
/// A flat position has quantity 0 and average cost 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionState {
    pub quantity: f64,
    pub average_cost: f64,
}

impl PositionState {
    pub fn new(quantity: f64, average_cost: f64) -> Self {
        PositionState {
            quantity,
            average_cost,
        }
    }

    pub fn flat() -> Self {
        PositionState::default()
    }

    pub fn is_flat(&self) -> bool {
        self.quantity <= crate::domain::value_objects::money::EPSILON
    }

    /// quantity × average cost
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.average_cost
    }
}

/// A persisted holding of one user in one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub user_id: i64,
    pub symbol: String,
    pub quantity: f64,
    pub average_cost: f64,
}

impl Holding {
    pub fn position(&self) -> PositionState {
        PositionState::new(self.quantity, self.average_cost)
    }
}
