use std::sync::Arc;

use log::warn;

use crate::cache::RateCache;
use crate::conversion::{self, Conversion};
use crate::error::{RateError, RateResult};
use crate::snapshot::{RateSnapshot, normalize_currency};
use crate::store::RateStore;

/// Answers rate queries from the cache, falling back to the store when the
/// cache has never been populated.
pub struct RateService {
    cache: Arc<RateCache>,
    store: Arc<dyn RateStore>,
    reference_base: String,
}

impl RateService {
    pub fn new(cache: Arc<RateCache>, store: Arc<dyn RateStore>, reference_base: &str) -> Self {
        Self {
            cache,
            store,
            reference_base: normalize_currency(reference_base),
        }
    }

    pub async fn get_rates(&self, base: &str) -> RateResult<RateSnapshot> {
        let snapshot = self.snapshot().await?;
        conversion::rebase(&snapshot, base)
    }

    pub async fn convert(&self, from: &str, to: &str, amount: f64) -> RateResult<Conversion> {
        conversion::validate_request(&normalize_currency(from), &normalize_currency(to), amount)?;
        let snapshot = self.snapshot().await?;
        conversion::convert(&snapshot, from, to, amount)
    }

    async fn snapshot(&self) -> RateResult<Arc<RateSnapshot>> {
        if let Some(snapshot) = self.cache.get() {
            return Ok(snapshot);
        }

        // Store rows are assumed to be quoted against the configured
        // reference base; nothing records the base they were written under.
        let stored = match self.store.get_all_rates().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Rate store fallback failed: {e:#}");
                return Err(RateError::Unavailable);
            }
        };
        match stored.updated_at {
            Some(updated_at) if !stored.is_empty() => Ok(Arc::new(RateSnapshot::new(
                &self.reference_base,
                stored.rates,
                updated_at,
            ))),
            _ => Err(RateError::Unavailable),
        }
    }
}
