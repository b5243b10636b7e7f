// Core modules
pub mod api;
pub mod bot;
pub mod config;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod risk;
pub mod trader;

// Re-export commonly used types
pub use api::{ApiError, Exchange};
pub use models::*;
pub use trader::{Trader, TraderError, TradingParams};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
