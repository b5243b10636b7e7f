use serde::{Deserialize, Serialize};

/// Minimum base-asset balance the trader keeps while selling
///
/// Acts as a ratcheting stop-loss: each balance update may raise the floor
/// to `ratio` of the current holding, or to a floor persisted by a previous
/// run, but never lowers it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceFloor {
    ratio: f64,
    value: f64,
}

impl Default for BalanceFloor {
    fn default() -> Self {
        Self::new(0.75)
    }
}

impl BalanceFloor {
    pub fn new(ratio: f64) -> Self {
        Self { ratio, value: 0.0 }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Raise the floor if the persisted value or the current holding allow it
    pub fn ratchet(&mut self, base_balance: f64, persisted: Option<f64>) -> f64 {
        if let Some(persisted) = persisted.filter(|v| v.is_finite()) {
            if self.value < persisted {
                self.value = persisted;
            }
        }

        let candidate = self.ratio * base_balance;
        if candidate.is_finite() && self.value < candidate {
            self.value = candidate;
        }

        self.value
    }

    /// Selling is allowed only while the holding sits above the floor
    pub fn allows_selling(&self, base_balance: f64) -> bool {
        self.value < base_balance
    }
}
