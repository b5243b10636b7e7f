use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::trader::{SellDiffFormula, TrackedAssets, TradingParams};

const ENV_PREFIX: &str = "TRADERBOT";
const MAX_LIMITS_REFRESH_HOURS: i64 = 24 * 365;

/// Runtime configuration
///
/// Resolved from built-in defaults, then an optional TOML file, then
/// `TRADERBOT__*` environment variables (e.g. `TRADERBOT__DIFF_LIMIT=0.02`).
#[derive(Clone, Serialize, Deserialize)]
pub struct TraderConfig {
    pub base_asset: String,
    pub fee_asset: String,
    pub quote_asset: String,
    pub trading_pair: String, // BTCUSDT
    pub fee_pair: String,     // BNBBTC

    pub diff_limit: f64,
    pub spend_amount: f64,
    pub floor_ratio: f64,
    pub limits_refresh_hours: i64,
    pub sell_diff_formula: SellDiffFormula,
    pub fee_balance_target: f64,

    pub loop_interval_secs: u64,
    pub summary_interval_hours: u64,
    pub submit_orders: bool,

    pub exchange_base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub recv_window_ms: u64,
    pub request_timeout_secs: u64,

    pub state_dir: PathBuf,
    pub metrics_dir: PathBuf,
    pub webhook_url: Option<String>,
}

impl fmt::Debug for TraderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraderConfig")
            .field("trading_pair", &self.trading_pair)
            .field("fee_pair", &self.fee_pair)
            .field("diff_limit", &self.diff_limit)
            .field("spend_amount", &self.spend_amount)
            .field("floor_ratio", &self.floor_ratio)
            .field("sell_diff_formula", &self.sell_diff_formula)
            .field("loop_interval_secs", &self.loop_interval_secs)
            .field("submit_orders", &self.submit_orders)
            .field("exchange_base_url", &self.exchange_base_url)
            .field("api_key", &"***REDACTED***")
            .field("api_secret", &"***REDACTED***")
            .field("state_dir", &self.state_dir)
            .field("metrics_dir", &self.metrics_dir)
            .finish()
    }
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            base_asset: "BTC".to_string(),
            fee_asset: "BNB".to_string(),
            quote_asset: "USDT".to_string(),
            trading_pair: "BTCUSDT".to_string(),
            fee_pair: "BNBBTC".to_string(),
            diff_limit: 0.01,
            spend_amount: 5.0,
            floor_ratio: 0.75,
            limits_refresh_hours: 24,
            sell_diff_formula: SellDiffFormula::Offset,
            fee_balance_target: 10.0,
            loop_interval_secs: 2,
            summary_interval_hours: 24,
            submit_orders: false,
            exchange_base_url: "https://api.binance.com/api/".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            recv_window_ms: 5000,
            request_timeout_secs: 2,
            state_dir: PathBuf::from("state"),
            metrics_dir: PathBuf::from("tradermetrics"),
            webhook_url: None,
        }
    }
}

impl TraderConfig {
    /// Load defaults, an optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&TraderConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: TraderConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: &str| Err(config::ConfigError::Message(msg.to_string()));

        if !(self.diff_limit.is_finite() && self.diff_limit >= 0.0) {
            return invalid("diff_limit must be a non-negative number");
        }
        if !(self.spend_amount.is_finite() && self.spend_amount > 0.0) {
            return invalid("spend_amount must be positive");
        }
        if !(0.0..=1.0).contains(&self.floor_ratio) {
            return invalid("floor_ratio must be between 0 and 1");
        }
        if !(1..=MAX_LIMITS_REFRESH_HOURS).contains(&self.limits_refresh_hours) {
            return invalid("limits_refresh_hours must be between 1 and 8760");
        }
        if self.loop_interval_secs == 0 {
            return invalid("loop_interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn trading_params(&self) -> TradingParams {
        TradingParams {
            diff_limit: self.diff_limit,
            spend_amount: self.spend_amount,
            floor_ratio: self.floor_ratio,
            limits_refresh: Duration::hours(self.limits_refresh_hours),
            sell_diff_formula: self.sell_diff_formula,
            assets: TrackedAssets {
                base: self.base_asset.clone(),
                fee: self.fee_asset.clone(),
                quote: self.quote_asset.clone(),
            },
        }
    }

    pub fn floor_state_path(&self) -> PathBuf {
        self.state_dir.join("min_balance.json")
    }
}
