// Decision engine: balances, buyer/seller state and open positions
pub mod buyer;
pub mod decision;
pub mod error;
pub mod position_queue;
pub mod seller;
pub mod tracker;

pub use buyer::Buyer;
pub use decision::{BuyDecision, FeeBuyDecision, SellDecision, SellIntent, SkipReason};
pub use error::{TraderError, TraderResult};
pub use position_queue::{OpenPositionQueue, Position, PositionId};
pub use seller::{SellDiffFormula, Seller};
pub use tracker::PriceTracker;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::models::{AccountSnapshot, ExchangeLimits, PriceSample};
use crate::risk::BalanceFloor;

/// Assets the trader keeps balances for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedAssets {
    pub base: String,  // traded asset (BTC)
    pub fee: String,   // fee currency (BNB)
    pub quote: String, // spending currency (USDT)
}

impl Default for TrackedAssets {
    fn default() -> Self {
        Self {
            base: "BTC".to_string(),
            fee: "BNB".to_string(),
            quote: "USDT".to_string(),
        }
    }
}

/// Tuning knobs shared by the buyer and seller
#[derive(Debug, Clone, PartialEq)]
pub struct TradingParams {
    pub diff_limit: f64,   // minimum fractional move to trade
    pub spend_amount: f64, // quote currency per buy
    pub floor_ratio: f64,
    pub limits_refresh: Duration,
    pub sell_diff_formula: SellDiffFormula,
    pub assets: TrackedAssets,
}

impl Default for TradingParams {
    fn default() -> Self {
        Self {
            diff_limit: 0.01,
            spend_amount: 5.0,
            floor_ratio: 0.75,
            limits_refresh: Duration::hours(24),
            sell_diff_formula: SellDiffFormula::default(),
            assets: TrackedAssets::default(),
        }
    }
}

fn parse_balance(asset: &str, value: &str) -> TraderResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TraderError::InvalidBalance {
            asset: asset.to_string(),
            value: value.to_string(),
        })
}

pub(crate) fn validate_price(symbol: &str, price: f64) -> TraderResult<()> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(TraderError::InvalidPrice {
            symbol: symbol.to_string(),
            price,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeCounters {
    pub base_buys: u64,
    pub fee_buys: u64,
    pub base_sells: u64,
}

/// Read-only view of the trader for logs and summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderStatus {
    pub base_balance: f64,
    pub fee_balance: f64,
    pub quote_balance: f64,
    pub min_balance: f64,
    pub can_buy: bool,
    pub open_positions: usize,
    pub open_quantity: f64,
    pub counters: TradeCounters,
    pub limits_last_update: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Ledger {
    base_balance: f64,
    fee_balance: f64,
    quote_balance: f64,
    can_buy: bool,
    floor: BalanceFloor,
    limits: ExchangeLimits,
    limits_last_update: Option<DateTime<Utc>>,
    counters: TradeCounters,
}

/// Shared trading aggregate
///
/// Every operation takes the ledger lock first. Buy paths then take the
/// buyer lock; sell paths take the seller lock and then the buyer lock,
/// because the buyer owns the open position queue. No lock is held across
/// I/O: callers fetch prices and snapshots before calling in.
#[derive(Debug)]
pub struct Trader {
    params: TradingParams,
    ledger: Mutex<Ledger>,
    buyer: Mutex<Buyer>,
    seller: Mutex<Seller>,
}

impl Trader {
    pub fn new(params: TradingParams) -> Self {
        let floor = BalanceFloor::new(params.floor_ratio);
        tracing::debug!(?params, "trader created");

        Self {
            params,
            ledger: Mutex::new(Ledger {
                base_balance: 0.0,
                fee_balance: 0.0,
                quote_balance: 0.0,
                can_buy: false,
                floor,
                limits: ExchangeLimits::default(),
                limits_last_update: None,
                counters: TradeCounters::default(),
            }),
            buyer: Mutex::new(Buyer::new()),
            seller: Mutex::new(Seller::new()),
        }
    }

    pub fn params(&self) -> &TradingParams {
        &self.params
    }

    /// Evaluate the buy side for one price sample
    pub fn evaluate_and_buy(&self, sample: &PriceSample) -> TraderResult<BuyDecision> {
        let mut ledger = self.ledger.lock()?;
        let mut buyer = self.buyer.lock()?;

        let decision = buyer.evaluate_and_buy(&self.params, &sample.symbol, sample.price)?;
        if let BuyDecision::Buy(position) = &decision {
            ledger.counters.base_buys += 1;
            tracing::info!(
                symbol = %position.symbol,
                position = %position.id,
                price = position.price,
                quantity = position.quantity,
                buys = ledger.counters.base_buys,
                "buy triggered"
            );
        }
        Ok(decision)
    }

    /// Evaluate a fee-currency buy; `base_sample` prices the base asset in
    /// the quote currency
    pub fn evaluate_fee_buy(
        &self,
        fee_sample: &PriceSample,
        base_sample: &PriceSample,
    ) -> TraderResult<FeeBuyDecision> {
        let mut ledger = self.ledger.lock()?;
        let mut buyer = self.buyer.lock()?;

        let decision = buyer.evaluate_fee_buy(
            &self.params,
            &fee_sample.symbol,
            fee_sample.price,
            base_sample.price,
        )?;
        if let FeeBuyDecision::Buy { symbol, quantity, price } = &decision {
            ledger.counters.fee_buys += 1;
            tracing::info!(
                %symbol,
                price,
                quantity,
                buys = ledger.counters.fee_buys,
                "fee asset buy triggered"
            );
        }
        Ok(decision)
    }

    /// Evaluate the sell side for one price sample
    pub fn evaluate_and_sell(&self, sample: &PriceSample) -> TraderResult<SellDecision> {
        let mut ledger = self.ledger.lock()?;
        let mut seller = self.seller.lock()?;
        let mut buyer = self.buyer.lock()?;

        let decision = seller.evaluate_and_sell(
            &self.params,
            &sample.symbol,
            sample.price,
            buyer.orders_mut(),
        )?;
        if let SellDecision::Sell(intent) = &decision {
            ledger.counters.base_sells += 1;
            tracing::info!(
                symbol = %intent.symbol,
                price = intent.price,
                quantity = intent.quantity,
                matched = ?intent.matched.as_ref().map(|p| p.id),
                sells = ledger.counters.base_sells,
                "sell triggered"
            );
        }
        Ok(decision)
    }

    /// Refresh balances from an account snapshot and ratchet the floor
    ///
    /// Assets missing from the snapshot keep their previous balance. Nothing
    /// changes unless every tracked balance in the snapshot parses.
    pub fn update_balances(
        &self,
        account: &AccountSnapshot,
        persisted_floor: Option<f64>,
    ) -> TraderResult<()> {
        let mut ledger = self.ledger.lock()?;
        let assets = &self.params.assets;

        let mut base = ledger.base_balance;
        let mut fee = ledger.fee_balance;
        let mut quote = ledger.quote_balance;

        for balance in &account.balances {
            let slot = if balance.asset == assets.base {
                &mut base
            } else if balance.asset == assets.fee {
                &mut fee
            } else if balance.asset == assets.quote {
                &mut quote
            } else {
                continue;
            };
            *slot = parse_balance(&balance.asset, &balance.free)?;
        }

        ledger.base_balance = base;
        ledger.fee_balance = fee;
        ledger.quote_balance = quote;
        ledger.can_buy = quote > self.params.spend_amount;
        let floor = ledger.floor.ratchet(base, persisted_floor);

        tracing::debug!(
            base,
            fee,
            quote,
            min_balance = floor,
            can_buy = ledger.can_buy,
            "balances updated"
        );
        Ok(())
    }

    /// Replace cached rate limits if the refresh window has passed
    pub fn update_limits(&self, info: &ExchangeLimits) -> TraderResult<bool> {
        self.update_limits_at(info, Utc::now())
    }

    pub fn update_limits_at(&self, info: &ExchangeLimits, now: DateTime<Utc>) -> TraderResult<bool> {
        let mut ledger = self.ledger.lock()?;

        if !self.refresh_due(ledger.limits_last_update, now) {
            return Ok(false);
        }

        ledger.limits = info.clone();
        ledger.limits_last_update = Some(now);
        tracing::debug!(rules = info.rate_limits.len(), "exchange limits updated");
        Ok(true)
    }

    /// Whether the limits cache is stale, so callers can skip the
    /// exchange-info request entirely
    pub fn limits_due(&self, now: DateTime<Utc>) -> TraderResult<bool> {
        let ledger = self.ledger.lock()?;
        Ok(self.refresh_due(ledger.limits_last_update, now))
    }

    // A window too large to represent never expires
    fn refresh_due(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last {
            Some(last) => last
                .checked_add_signed(self.params.limits_refresh)
                .is_some_and(|expires| now > expires),
            None => true,
        }
    }

    pub fn base_balance(&self) -> TraderResult<f64> {
        Ok(self.ledger.lock()?.base_balance)
    }

    pub fn fee_balance(&self) -> TraderResult<f64> {
        Ok(self.ledger.lock()?.fee_balance)
    }

    pub fn quote_balance(&self) -> TraderResult<f64> {
        Ok(self.ledger.lock()?.quote_balance)
    }

    pub fn min_balance(&self) -> TraderResult<f64> {
        Ok(self.ledger.lock()?.floor.value())
    }

    pub fn can_buy(&self) -> TraderResult<bool> {
        Ok(self.ledger.lock()?.can_buy)
    }

    /// Base holding is above the floor
    pub fn can_sell(&self) -> TraderResult<bool> {
        let ledger = self.ledger.lock()?;
        Ok(ledger.floor.allows_selling(ledger.base_balance))
    }

    pub fn limits(&self) -> TraderResult<ExchangeLimits> {
        Ok(self.ledger.lock()?.limits.clone())
    }

    pub fn limits_last_update(&self) -> TraderResult<Option<DateTime<Utc>>> {
        Ok(self.ledger.lock()?.limits_last_update)
    }

    pub fn counters(&self) -> TraderResult<TradeCounters> {
        Ok(self.ledger.lock()?.counters)
    }

    /// Open positions, cheapest first
    pub fn open_positions(&self) -> TraderResult<Vec<Position>> {
        let _ledger = self.ledger.lock()?;
        let buyer = self.buyer.lock()?;
        Ok(buyer.orders().sorted())
    }

    pub fn buyer_tracker(&self, symbol: &str) -> TraderResult<Option<PriceTracker>> {
        let _ledger = self.ledger.lock()?;
        Ok(self.buyer.lock()?.tracker(symbol))
    }

    pub fn seller_tracker(&self, symbol: &str) -> TraderResult<Option<PriceTracker>> {
        let _ledger = self.ledger.lock()?;
        Ok(self.seller.lock()?.tracker(symbol))
    }

    pub fn status(&self) -> TraderResult<TraderStatus> {
        let ledger = self.ledger.lock()?;
        let buyer = self.buyer.lock()?;

        Ok(TraderStatus {
            base_balance: ledger.base_balance,
            fee_balance: ledger.fee_balance,
            quote_balance: ledger.quote_balance,
            min_balance: ledger.floor.value(),
            can_buy: ledger.can_buy,
            open_positions: buyer.orders().len(),
            open_quantity: buyer.orders().total_quantity(),
            counters: ledger.counters,
            limits_last_update: ledger.limits_last_update,
        })
    }
}

impl Default for Trader {
    fn default() -> Self {
        Self::new(TradingParams::default())
    }
}
