use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::decision::{SellDecision, SellIntent, SkipReason};
use super::error::TraderResult;
use super::position_queue::OpenPositionQueue;
use super::tracker::PriceTracker;
use super::{validate_price, TradingParams};

/// How the sell-side gain is measured against the reference price
///
/// `Offset` subtracts a whole unit after the ratio, so with a small
/// `diff_limit` a sale needs the price to roughly double. The buy side has no
/// such offset. `Offset` stays the default so existing deployments keep their
/// behaviour; `Ratio` is the symmetric formula.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellDiffFormula {
    #[default]
    Offset,
    Ratio,
}

impl SellDiffFormula {
    pub fn diff(&self, price: f64, reference: f64) -> f64 {
        let ratio = (price - reference) / reference;
        match self {
            SellDiffFormula::Offset => ratio - 1.0,
            SellDiffFormula::Ratio => ratio,
        }
    }
}

/// Sell side of the trader
///
/// Sells against the cheapest open position first. With nothing queued it
/// falls back to its own base/last tracking, mirrored from the buyer.
#[derive(Debug, Default)]
pub struct Seller {
    trackers: HashMap<String, PriceTracker>,
}

impl Seller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate_and_sell(
        &mut self,
        params: &TradingParams,
        symbol: &str,
        price: f64,
        orders: &mut OpenPositionQueue,
    ) -> TraderResult<SellDecision> {
        validate_price(symbol, price)?;

        if !orders.is_empty() {
            return Self::sell_against_queue(params, price, orders);
        }

        let tracker = self.trackers.entry(symbol.to_string()).or_default();
        let base = match tracker.observe_for_sell(price) {
            Ok(base) => base,
            Err(skip) => return Ok(SellDecision::Skip(skip)),
        };

        let diff = params.sell_diff_formula.diff(price, base);
        if diff < params.diff_limit {
            return Ok(SellDecision::Skip(SkipReason::BelowThreshold { diff }));
        }

        let quantity = params.spend_amount / base;
        tracing::debug!(
            symbol,
            base_price = base,
            last_price = ?tracker.last,
            price,
            diff,
            quantity,
            "sell conditions met (price tracking)"
        );
        tracker.rebase();

        Ok(SellDecision::Sell(SellIntent {
            symbol: symbol.to_string(),
            price,
            quantity,
            diff,
            matched: None,
        }))
    }

    fn sell_against_queue(
        params: &TradingParams,
        price: f64,
        orders: &mut OpenPositionQueue,
    ) -> TraderResult<SellDecision> {
        let position = orders.pop_min()?;
        tracing::debug!(
            position = %position.id,
            entry_price = position.price,
            price,
            "matching sell against open position"
        );

        if price < position.price {
            let entry = position.price;
            orders.reinsert(position)?;
            return Ok(SellDecision::Skip(SkipReason::BelowEntryPrice { entry }));
        }

        let diff = params.sell_diff_formula.diff(price, position.price);
        if diff < params.diff_limit {
            orders.reinsert(position)?;
            return Ok(SellDecision::Skip(SkipReason::BelowThreshold { diff }));
        }

        tracing::debug!(
            position = %position.id,
            entry_price = position.price,
            price,
            diff,
            quantity = position.quantity,
            "sell conditions met (open position)"
        );

        Ok(SellDecision::Sell(SellIntent {
            symbol: position.symbol.clone(),
            price,
            quantity: position.quantity,
            diff,
            matched: Some(position),
        }))
    }

    pub fn tracker(&self, symbol: &str) -> Option<PriceTracker> {
        self.trackers.get(symbol).copied()
    }
}
