use thiserror::Error;

/// Failures of the decision engine
///
/// Expected no-op outcomes (base price just initialised, still tracking a
/// reversal, move below threshold) are not errors; they come back as
/// [`SkipReason`](super::SkipReason) values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TraderError {
    #[error("open position queue is empty")]
    EmptyQueue,

    #[error("position {0} is not in the queue")]
    UnknownPosition(u64),

    #[error("position {0} is already queued")]
    DuplicatePosition(u64),

    #[error("invalid price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("cannot parse {asset} balance {value:?}")]
    InvalidBalance { asset: String, value: String },

    #[error("trader state lock poisoned: {0}")]
    Poisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for TraderError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        TraderError::Poisoned(e.to_string())
    }
}

pub type TraderResult<T> = std::result::Result<T, TraderError>;
