pub mod binance;
pub mod coinmarketcap;

pub use binance::{BinanceClient, BinanceCredentials, OrderAck, OrderRecord, Stats24h};
pub use coinmarketcap::{CoinMarketCapClient, CoinTicker};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AccountSnapshot, ExchangeLimits, OrderRequest, PriceSample};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Parse(String),

    #[error("exchange error {code}: {message}")]
    Exchange { code: i64, message: String },

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("missing API credentials")]
    MissingCredentials,
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Parse(e.to_string())
    }
}

impl From<std::num::ParseFloatError> for ApiError {
    fn from(e: std::num::ParseFloatError) -> Self {
        ApiError::Parse(e.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Exchange capability consumed by the trading loop
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn get_price(&self, symbol: &str) -> ApiResult<PriceSample>;

    async fn get_account_snapshot(&self) -> ApiResult<AccountSnapshot>;

    async fn get_exchange_limits(&self) -> ApiResult<ExchangeLimits>;

    async fn submit_order(&self, order: &OrderRequest) -> ApiResult<OrderAck>;
}
