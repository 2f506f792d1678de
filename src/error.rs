use thiserror::Error;

/// Failures surfaced by rate queries and conversions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateError {
    #[error("{0}")]
    Validation(String),

    /// Neither the cache nor the store holds any rates.
    #[error("rates are not available yet")]
    Unavailable,

    #[error("unsupported base currency: {0}")]
    UnsupportedBase(String),

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

pub type RateResult<T> = Result<T, RateError>;
