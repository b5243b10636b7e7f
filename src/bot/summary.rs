use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use super::BotError;
use crate::api::Exchange;
use crate::metrics::{fetch_portfolio, InitialBalanceStore, PortfolioPerformance};
use crate::notify::{Summary, SummarySink};
use crate::trader::Trader;

/// Builds lifetime summaries and fans them out to sinks
pub struct SummaryReporter {
    trader: Arc<Trader>,
    exchange: Arc<dyn Exchange>,
    store: InitialBalanceStore,
    sinks: Vec<Arc<dyn SummarySink>>,
    quote_asset: String,
}

impl SummaryReporter {
    pub fn new(
        trader: Arc<Trader>,
        exchange: Arc<dyn Exchange>,
        store: InitialBalanceStore,
        quote_asset: impl Into<String>,
    ) -> Self {
        Self {
            trader,
            exchange,
            store,
            sinks: Vec::new(),
            quote_asset: quote_asset.into(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SummarySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub async fn build_summary(&self) -> Result<Summary, BotError> {
        let current = fetch_portfolio(self.exchange.as_ref(), &self.quote_asset).await?;
        let initial = self.store.load_or_init(&current)?;

        Ok(Summary {
            generated_at: Utc::now(),
            portfolio_value: current.value,
            initial_value: initial.value,
            trader: self.trader.status()?,
            performance: PortfolioPerformance::compare(&initial, &current),
        })
    }

    /// Build a summary and hand it to every sink
    ///
    /// A failing sink is logged and does not stop the others.
    pub async fn send(&self) -> Result<Summary, BotError> {
        let summary = self.build_summary().await?;

        for sink in &self.sinks {
            if let Err(e) = sink.send_summary(&summary).await {
                tracing::warn!("Couldn't send summary via {}: {}", sink.name(), e);
            }
        }
        Ok(summary)
    }

    /// Send once now, then every `every`, until `shutdown` resolves
    pub async fn run<F>(&self, every: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.send().await {
            tracing::warn!("Couldn't build start-up summary: {}", e);
        }

        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.send().await {
                        tracing::warn!("Couldn't build summary: {}", e);
                    }
                }
            }
        }
    }
}
