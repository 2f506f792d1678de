//! Durable rate persistence, one row per currency.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::exchange_rate::ExchangeRate;

pub use memory::MemoryRateStore;
pub use postgres::PostgresRateStore;

/// Full contents of a rate store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredRates {
    pub rates: HashMap<String, f64>,
    /// Most recent `updated_at` across all rows, `None` when the store is empty.
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredRates {
    pub fn from_rows(rows: impl IntoIterator<Item = ExchangeRate>) -> Self {
        let mut stored = Self::default();
        for row in rows {
            if stored.updated_at.is_none_or(|latest| row.updated_at > latest) {
                stored.updated_at = Some(row.updated_at);
            }
            stored.rates.insert(row.currency, row.rate);
        }
        stored
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[async_trait]
pub trait RateStore: Send + Sync {
    /// Inserts or replaces one row per currency, all stamped with `updated_at`.
    async fn upsert_rates(&self, rates: &HashMap<String, f64>, updated_at: DateTime<Utc>)
    -> Result<()>;

    async fn get_all_rates(&self) -> Result<StoredRates>;
}
