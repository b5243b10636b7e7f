use std::collections::HashMap;

use super::decision::{BuyDecision, FeeBuyDecision, SkipReason};
use super::error::{TraderError, TraderResult};
use super::position_queue::OpenPositionQueue;
use super::tracker::PriceTracker;
use super::{validate_price, TradingParams};

/// Buy side of the trader
///
/// Buys after a drop of at least `diff_limit` from the base price, but only
/// once the price has started rising again. Every base-pair buy is recorded
/// in the open position queue so the seller can match against it.
#[derive(Debug, Default)]
pub struct Buyer {
    trackers: HashMap<String, PriceTracker>,
    orders: OpenPositionQueue,
}

impl Buyer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate_and_buy(
        &mut self,
        params: &TradingParams,
        symbol: &str,
        price: f64,
    ) -> TraderResult<BuyDecision> {
        validate_price(symbol, price)?;

        let tracker = self.trackers.entry(symbol.to_string()).or_default();
        let base = match tracker.observe_for_buy(price) {
            Ok(base) => base,
            Err(skip) => return Ok(BuyDecision::Skip(skip)),
        };

        let diff = (base - price) / base;
        if diff < params.diff_limit {
            return Ok(BuyDecision::Skip(SkipReason::BelowThreshold { diff }));
        }

        // The gate only passes once a last price exists
        let last = tracker.last.unwrap_or(price);
        let quantity = params.spend_amount / price;

        tracing::debug!(
            symbol,
            base_price = base,
            last_price = last,
            price,
            diff,
            quantity,
            "buy conditions met"
        );

        tracker.rebase();
        let id = self.orders.push(symbol, last, quantity);
        let position = self
            .orders
            .get(id)
            .cloned()
            .ok_or(TraderError::UnknownPosition(id.0))?;

        Ok(BuyDecision::Buy(position))
    }

    /// Fee-currency buy, priced in the base asset
    ///
    /// `base_quote_price` converts the quote-denominated spend into the base
    /// asset first (e.g. USDT → BTC → BNB).
    pub fn evaluate_fee_buy(
        &mut self,
        params: &TradingParams,
        symbol: &str,
        price: f64,
        base_quote_price: f64,
    ) -> TraderResult<FeeBuyDecision> {
        validate_price(symbol, price)?;
        validate_price(symbol, base_quote_price)?;

        let tracker = self.trackers.entry(symbol.to_string()).or_default();
        let base = match tracker.observe_for_buy(price) {
            Ok(base) => base,
            Err(skip) => return Ok(FeeBuyDecision::Skip(skip)),
        };

        let diff = (base - price) / base;
        if diff < params.diff_limit {
            return Ok(FeeBuyDecision::Skip(SkipReason::BelowThreshold { diff }));
        }

        let quantity = params.spend_amount / base_quote_price / price;
        tracing::debug!(
            symbol,
            base_price = base,
            last_price = ?tracker.last,
            price,
            diff,
            quantity,
            "fee asset buy conditions met"
        );

        tracker.rebase();
        Ok(FeeBuyDecision::Buy {
            symbol: symbol.to_string(),
            price,
            quantity,
        })
    }

    pub fn tracker(&self, symbol: &str) -> Option<PriceTracker> {
        self.trackers.get(symbol).copied()
    }

    pub fn orders(&self) -> &OpenPositionQueue {
        &self.orders
    }

    pub fn orders_mut(&mut self) -> &mut OpenPositionQueue {
        &mut self.orders
    }
}
