use chrono::{DateTime, Utc};

/// One row of the `rates` table, relative to the configured reference base.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ExchangeRate {
    pub currency: String,
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
}
