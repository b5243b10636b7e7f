// Portfolio valuation and lifetime performance
pub mod portfolio;
pub mod store;

pub use portfolio::{
    build_portfolio, fetch_portfolio, AssetHolding, AssetPerformance, Portfolio,
    PortfolioPerformance,
};
pub use store::InitialBalanceStore;

use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("cannot parse {asset} amount {value:?}")]
    InvalidAmount { asset: String, value: String },

    #[error("metrics file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("metrics file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected metrics file header {0:?}")]
    BadHeader(String),
}

pub type MetricsResult<T> = std::result::Result<T, MetricsError>;
