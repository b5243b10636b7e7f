// Periodic performance summaries
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use thiserror::Error;

use crate::metrics::PortfolioPerformance;
use crate::trader::TraderStatus;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("summary delivery failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("summary endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Lifetime performance report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub portfolio_value: f64,
    pub initial_value: f64,
    pub trader: TraderStatus,
    pub performance: PortfolioPerformance,
}

impl Summary {
    pub fn subject(&self) -> String {
        format!("Lifetime performance {}", self.generated_at.format("%Y-%m-%d"))
    }

    /// Plain-text body, one line per asset
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Portfolio value: ${:.2} (initial ${:.2})",
            self.portfolio_value, self.initial_value
        );
        let _ = writeln!(
            out,
            "Buys: {} | Fee buys: {} | Sells: {} | Open positions: {}",
            self.trader.counters.base_buys,
            self.trader.counters.fee_buys,
            self.trader.counters.base_sells,
            self.trader.open_positions
        );
        let _ = writeln!(out, "Min balance: {:.8}", self.trader.min_balance);

        for asset in &self.performance.assets {
            let _ = writeln!(
                out,
                "{}: qty {:+.8} ({:+.2}%), value {:+.2} ({:+.2}%)",
                asset.symbol,
                asset.qty_increase_abs,
                asset.qty_increase_percent,
                asset.value_increase_abs,
                asset.value_increase_percent
            );
        }
        out
    }
}

/// Destination for performance summaries
#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn send_summary(&self, summary: &Summary) -> NotifyResult<()>;

    fn name(&self) -> &str;
}

/// Writes summaries to the log
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl SummarySink for LogSink {
    async fn send_summary(&self, summary: &Summary) -> NotifyResult<()> {
        tracing::info!("📈 {}\n{}", summary.subject(), summary.render());
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Posts summaries as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> NotifyResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SummarySink for WebhookSink {
    async fn send_summary(&self, summary: &Summary) -> NotifyResult<()> {
        let payload = serde_json::json!({
            "subject": summary.subject(),
            "text": summary.render(),
            "summary": summary,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!("Summary delivered to webhook");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Webhook rejected summary: {} - {}", status, body);
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
