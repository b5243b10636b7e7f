use serde::{Deserialize, Serialize};

use super::position_queue::Position;

/// Why an evaluation did not trade
///
/// These are ordinary outcomes of a tick, not failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    /// First sample for the symbol; it became the base price
    BasePriceInitialized,
    /// Price is still moving the wrong way; last price updated
    TrackingReversal,
    /// Reversal seen but the move from the reference is too small
    BelowThreshold { diff: f64 },
    /// Current price is under the cheapest open position's purchase price
    BelowEntryPrice { entry: f64 },
}

impl SkipReason {
    pub fn describe(&self) -> String {
        match self {
            SkipReason::BasePriceInitialized => "base price initialized".to_string(),
            SkipReason::TrackingReversal => "tracking price reversal".to_string(),
            SkipReason::BelowThreshold { diff } => {
                format!("diff {:.4}% below limit", diff * 100.0)
            }
            SkipReason::BelowEntryPrice { entry } => {
                format!("price below entry ${:.2}", entry)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuyDecision {
    Skip(SkipReason),
    /// Buy executed; the new position is already queued
    Buy(Position),
}

/// Fee-currency buys are never queued for resale
#[derive(Debug, Clone, PartialEq)]
pub enum FeeBuyDecision {
    Skip(SkipReason),
    Buy { symbol: String, price: f64, quantity: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellIntent {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub diff: f64,
    /// The open position this sale closes, if it was matched against one
    pub matched: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SellDecision {
    Skip(SkipReason),
    Sell(SellIntent),
}

impl BuyDecision {
    pub fn is_triggered(&self) -> bool {
        matches!(self, BuyDecision::Buy(_))
    }
}

impl FeeBuyDecision {
    pub fn is_triggered(&self) -> bool {
        matches!(self, FeeBuyDecision::Buy { .. })
    }
}

impl SellDecision {
    pub fn is_triggered(&self) -> bool {
        matches!(self, SellDecision::Sell(_))
    }
}
