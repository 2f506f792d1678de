use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{RateStore, StoredRates};
use crate::exchange_rate::ExchangeRate;

/// Process-local store with the same upsert semantics as the Postgres table.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    rows: Mutex<HashMap<String, ExchangeRate>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, currency: &str) -> Option<ExchangeRate> {
        self.rows.lock().get(currency).cloned()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn upsert_rates(
        &self,
        rates: &HashMap<String, f64>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock();
        for (currency, rate) in rates {
            rows.insert(
                currency.clone(),
                ExchangeRate {
                    currency: currency.clone(),
                    rate: *rate,
                    updated_at,
                },
            );
        }
        Ok(())
    }

    async fn get_all_rates(&self) -> Result<StoredRates> {
        let rows = self.rows.lock();
        Ok(StoredRates::from_rows(rows.values().cloned()))
    }
}
