// Polling loop that feeds the trader
pub mod orders;
pub mod summary;

pub use summary::SummaryReporter;

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{Duration, MissedTickBehavior};

use crate::api::{ApiError, Exchange};
use crate::config::TraderConfig;
use crate::metrics::MetricsError;
use crate::models::{AccountSnapshot, OrderRequest, PriceSample};
use crate::notify::NotifyError;
use crate::persistence::{FloorStore, PersistenceError};
use crate::trader::{BuyDecision, FeeBuyDecision, SellDecision, Trader, TraderError};

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Trader(#[from] TraderError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// What happened during one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub price: PriceSample,
    pub limits_refreshed: bool,
    /// `None` when the quote balance could not cover a buy
    pub buy: Option<BuyDecision>,
    /// `None` unless selling was allowed and the fee balance was under target
    pub fee_buy: Option<FeeBuyDecision>,
    /// `None` when the base balance was at or under the floor
    pub sell: Option<SellDecision>,
    pub orders: Vec<OrderRequest>,
    pub orders_submitted: usize,
}

impl TickReport {
    pub fn traded(&self) -> bool {
        !self.orders.is_empty()
    }

    /// Why each evaluated side held off, for logs
    pub fn skipped(&self) -> Vec<String> {
        let buy = match &self.buy {
            Some(BuyDecision::Skip(reason)) => Some(format!("buy: {}", reason.describe())),
            _ => None,
        };
        let fee_buy = match &self.fee_buy {
            Some(FeeBuyDecision::Skip(reason)) => Some(format!("fee buy: {}", reason.describe())),
            _ => None,
        };
        let sell = match &self.sell {
            Some(SellDecision::Skip(reason)) => Some(format!("sell: {}", reason.describe())),
            _ => None,
        };
        [buy, fee_buy, sell].into_iter().flatten().collect()
    }
}

/// Drives a shared [`Trader`] from exchange data
pub struct Bot {
    trader: Arc<Trader>,
    exchange: Arc<dyn Exchange>,
    config: TraderConfig,
    floor_store: FloorStore,
}

impl Bot {
    pub fn new(trader: Arc<Trader>, exchange: Arc<dyn Exchange>, config: TraderConfig) -> Self {
        let floor_store = FloorStore::new(config.floor_state_path());
        Self {
            trader,
            exchange,
            config,
            floor_store,
        }
    }

    pub fn trader(&self) -> &Arc<Trader> {
        &self.trader
    }

    pub fn floor_store(&self) -> &FloorStore {
        &self.floor_store
    }

    /// Load balances and the persisted floor before the first tick
    pub async fn initialize(&self) -> Result<AccountSnapshot, BotError> {
        let persisted_floor = self.floor_store.load()?;
        let account = self.exchange.get_account_snapshot().await?;

        if !account.can_trade {
            tracing::warn!("⚠️  Account cannot trade; decisions will still be evaluated");
        }

        self.trader.update_balances(&account, persisted_floor)?;

        let status = self.trader.status()?;
        tracing::info!(
            "Balances: {} {:.8} | {} {:.8} | {} {:.2} | min {:.8}",
            self.config.base_asset,
            status.base_balance,
            self.config.fee_asset,
            status.fee_balance,
            self.config.quote_asset,
            status.quote_balance,
            status.min_balance
        );
        Ok(account)
    }

    /// Run one tick
    ///
    /// Any collaborator failure aborts the rest of the tick; state already
    /// mutated stays as is and the next tick starts from fresh data.
    pub async fn tick(&self) -> Result<TickReport, BotError> {
        let price = self.exchange.get_price(&self.config.trading_pair).await?;

        let limits_refreshed = if self.trader.limits_due(Utc::now())? {
            let info = self.exchange.get_exchange_limits().await?;
            self.trader.update_limits(&info)?
        } else {
            false
        };

        let mut pending = Vec::new();

        let buy = if self.trader.can_buy()? {
            let decision = self.trader.evaluate_and_buy(&price)?;
            pending.extend(orders::buy_order(&decision));
            Some(decision)
        } else {
            None
        };

        let (fee_buy, sell) = if self.trader.can_sell()? {
            let fee_buy = if self.trader.fee_balance()? < self.config.fee_balance_target {
                let fee_price = self.exchange.get_price(&self.config.fee_pair).await?;
                let decision = self.trader.evaluate_fee_buy(&fee_price, &price)?;
                pending.extend(orders::fee_buy_order(&decision));
                Some(decision)
            } else {
                None
            };

            let decision = self.trader.evaluate_and_sell(&price)?;
            pending.extend(orders::sell_order(&decision));
            (fee_buy, Some(decision))
        } else {
            (None, None)
        };

        let orders_submitted = self.submit(&pending).await;

        let account = self.exchange.get_account_snapshot().await?;
        if account.can_trade {
            self.trader.update_balances(&account, None)?;
        } else {
            tracing::warn!("⚠️  Account cannot trade; balances not updated");
        }

        Ok(TickReport {
            price,
            limits_refreshed,
            buy,
            fee_buy,
            sell,
            orders: pending,
            orders_submitted,
        })
    }

    async fn submit(&self, orders: &[OrderRequest]) -> usize {
        if !self.config.submit_orders {
            for order in orders {
                tracing::debug!(?order, "order submission disabled");
            }
            return 0;
        }

        let mut submitted = 0;
        for order in orders {
            match self.exchange.submit_order(order).await {
                Ok(ack) => {
                    submitted += 1;
                    tracing::info!(
                        "  ✓ {} {} {:.8} @ {:.8} ({:?})",
                        order.side.as_str(),
                        order.symbol,
                        order.quantity,
                        order.price,
                        ack.status
                    );
                }
                Err(e) => {
                    tracing::warn!("  ✗ Failed to submit {} {}: {}", order.side.as_str(), order.symbol, e);
                }
            }
        }
        submitted
    }

    pub fn persist_floor(&self) -> Result<(), BotError> {
        let min_balance = self.trader.min_balance()?;
        self.floor_store.save(min_balance)?;
        Ok(())
    }

    /// Tick on a fixed interval until `shutdown` resolves, then save the floor
    pub async fn run<F>(&self, shutdown: F) -> Result<(), BotError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "💹 Trading loop starting ({} every {}s)",
            self.config.trading_pair,
            self.config.loop_interval_secs
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.loop_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Trading loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if report.traded() => {
                            tracing::info!(
                                "[TRADING] {} @ {:.2}: {} order(s), {} submitted",
                                report.price.symbol,
                                report.price.price,
                                report.orders.len(),
                                report.orders_submitted
                            );
                        }
                        Ok(report) => {
                            tracing::debug!(
                                "[TRADING] {} @ {:.2}: {}",
                                report.price.symbol,
                                report.price.price,
                                report.skipped().join(", ")
                            );
                        }
                        Err(e) => tracing::warn!("Tick aborted: {}", e),
                    }
                }
            }
        }

        self.persist_floor()
    }
}
