use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price quote for a single trading pair, sampled once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
        }
    }
}

/// Free and locked amounts of one asset, as reported by the exchange
///
/// Amounts stay in their wire (decimal string) form; the trader parses the
/// ones it tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

impl AssetBalance {
    pub fn new(asset: &str, free: &str, locked: &str) -> Self {
        Self {
            asset: asset.to_string(),
            free: free.to_string(),
            locked: locked.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub can_trade: bool,
    #[serde(default)]
    pub balances: Vec<AssetBalance>,
}

/// One request-quota rule published by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub rate_limit_type: String,
    pub interval: String,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeLimits {
    #[serde(default)]
    pub rate_limits: Vec<RateLimit>,
}

impl ExchangeLimits {
    /// Request-weight budget per minute, if the exchange publishes one
    pub fn request_weight_per_minute(&self) -> Option<u32> {
        self.rate_limits
            .iter()
            .find(|l| l.rate_limit_type == "REQUEST_WEIGHT" && l.interval == "MINUTE")
            .map(|l| l.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// Order the bot intends to place on the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_snapshot_from_exchange_json() {
        let json = r#"{
            "makerCommission": 15,
            "canTrade": true,
            "canWithdraw": true,
            "balances": [
                {"asset": "BTC", "free": "0.50000000", "locked": "0.00000000"},
                {"asset": "USDT", "free": "120.10", "locked": "0.00"}
            ]
        }"#;

        let snapshot: AccountSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.can_trade);
        assert_eq!(snapshot.balances.len(), 2);
        assert_eq!(snapshot.balances[0].asset, "BTC");
        assert_eq!(snapshot.balances[1].free, "120.10");
    }

    #[test]
    fn test_request_weight_lookup() {
        let limits = ExchangeLimits {
            rate_limits: vec![
                RateLimit {
                    rate_limit_type: "ORDERS".to_string(),
                    interval: "SECOND".to_string(),
                    limit: 10,
                },
                RateLimit {
                    rate_limit_type: "REQUEST_WEIGHT".to_string(),
                    interval: "MINUTE".to_string(),
                    limit: 1200,
                },
            ],
        };

        assert_eq!(limits.request_weight_per_minute(), Some(1200));
        assert_eq!(ExchangeLimits::default().request_weight_per_minute(), None);
    }
}
