//! Background refresh of the rate cache and store from the external provider.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

use crate::cache::RateCache;
use crate::provider::RateProvider;
use crate::snapshot::{RateSnapshot, normalize_currency};
use crate::store::RateStore;

pub const DEFAULT_BASE_CURRENCY: &str = "USD";

/// Source of refresh triggers.
#[async_trait]
pub trait Tick: Send {
    /// Waits for the next trigger. `false` means no more triggers will come.
    async fn tick(&mut self) -> bool;
}

#[async_trait]
impl Tick for Interval {
    async fn tick(&mut self) -> bool {
        Interval::tick(self).await;
        true
    }
}

#[async_trait]
impl Tick for mpsc::Receiver<()> {
    async fn tick(&mut self) -> bool {
        self.recv().await.is_some()
    }
}

/// Interval whose first tick fires immediately, so the initial refresh
/// happens as soon as the loop starts.
pub fn interval_ticks(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

pub struct RateRefresher {
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
    cache: Arc<RateCache>,
    base: String,
}

impl RateRefresher {
    pub fn new(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
        cache: Arc<RateCache>,
        base: &str,
    ) -> Self {
        let mut base = normalize_currency(base);
        if base.is_empty() {
            base = DEFAULT_BASE_CURRENCY.to_string();
        }

        Self {
            provider,
            store,
            cache,
            base,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Runs one fetch, persist and install cycle.
    ///
    /// On any failure the cache and store keep their previous contents.
    pub async fn refresh(&self) -> Result<Arc<RateSnapshot>> {
        let latest = self
            .provider
            .fetch_latest(&self.base)
            .await
            .context("Can't fetch latest rates")?;
        if !latest.rates.keys().any(|code| *code != latest.base) {
            bail!("Provider returned no rates besides the base {}", latest.base);
        }
        if latest.base != self.base {
            warn!(
                "Provider returned base {} instead of {}; stored rates follow the provider",
                latest.base, self.base
            );
        }

        let updated_at = Utc::now();
        let snapshot = Arc::new(RateSnapshot::new(&latest.base, latest.rates, updated_at));

        self.store
            .upsert_rates(&snapshot.rates, updated_at)
            .await
            .context("Can't persist rates")?;
        self.cache.install(Arc::clone(&snapshot));

        info!(
            "Rates refreshed: base={} count={}",
            snapshot.base,
            snapshot.len()
        );
        Ok(snapshot)
    }

    /// Refreshes on every tick until the tick source ends or `shutdown`
    /// turns `true` (or its sender is dropped).
    ///
    /// Shutdown is only observed between cycles; a refresh in progress
    /// always runs to completion.
    pub async fn run<T: Tick>(&self, mut ticks: T, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Rate refresh loop stopping");
                        break;
                    }
                }
                more = ticks.tick() => {
                    if !more {
                        info!("Rate refresh triggers exhausted");
                        break;
                    }
                    if let Err(e) = self.refresh().await {
                        error!("Rate refresh failed: {e:#}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LatestRates;
    use crate::service::RateService;
    use crate::store::{MemoryRateStore, StoredRates};
    use chrono::DateTime;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays queued responses; an exhausted queue is a fetch failure.
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<LatestRates>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<Result<LatestRates>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RateProvider for ScriptedProvider {
        async fn fetch_latest(&self, _base: &str) -> Result<LatestRates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("connection refused")))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl RateStore for FailingStore {
        async fn upsert_rates(&self, _: &HashMap<String, f64>, _: DateTime<Utc>) -> Result<()> {
            anyhow::bail!("database is down")
        }

        async fn get_all_rates(&self) -> Result<StoredRates> {
            anyhow::bail!("database is down")
        }
    }

    fn latest(base: &str, rates: &[(&str, f64)]) -> Result<LatestRates> {
        Ok(LatestRates {
            base: base.to_string(),
            rates: rates.iter().map(|(c, r)| (c.to_string(), *r)).collect(),
        })
    }

    fn refresher(
        provider: Arc<ScriptedProvider>,
        store: Arc<dyn RateStore>,
    ) -> (RateRefresher, Arc<RateCache>) {
        let cache = Arc::new(RateCache::new());
        let refresher = RateRefresher::new(provider, store, Arc::clone(&cache), " usd ");
        (refresher, cache)
    }

    #[tokio::test]
    async fn test_refresh_persists_and_installs() {
        let provider = Arc::new(ScriptedProvider::new(vec![latest(
            "USD",
            &[("THB", 35.0), ("EUR", 0.9)],
        )]));
        let store = Arc::new(MemoryRateStore::new());
        let (refresher, cache) = refresher(provider, store.clone());
        assert_eq!(refresher.base(), "USD");

        let snapshot = refresher.refresh().await.unwrap();

        // Self-rate is added even though the provider omitted it.
        assert_eq!(snapshot.rate("USD"), Some(1.0));
        assert_eq!(*cache.get().unwrap(), *snapshot);

        let stored = store.get_all_rates().await.unwrap();
        assert_eq!(stored.rates, snapshot.rates);
        assert_eq!(stored.updated_at, Some(snapshot.updated_at));
        for code in ["USD", "THB", "EUR"] {
            assert_eq!(store.row(code).unwrap().updated_at, snapshot.updated_at);
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_snapshot() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            latest("USD", &[("EUR", 0.9)]),
            Err(anyhow::anyhow!("503 Service Unavailable")),
        ]));
        let store = Arc::new(MemoryRateStore::new());
        let (refresher, cache) = refresher(provider, store.clone());

        let first = refresher.refresh().await.unwrap();
        assert!(refresher.refresh().await.is_err());

        assert_eq!(*cache.get().unwrap(), *first);
        assert_eq!(store.get_all_rates().await.unwrap().rates, first.rates);
    }

    #[tokio::test]
    async fn test_empty_reply_keeps_previous_snapshot() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            latest("USD", &[("THB", 35.0), ("EUR", 0.9)]),
            latest("USD", &[]),
            latest("USD", &[("USD", 1.0)]),
        ]));
        let store = Arc::new(MemoryRateStore::new());
        let (refresher, cache) = refresher(provider, store.clone());
        let first = refresher.refresh().await.unwrap();

        for _ in 0..2 {
            let err = refresher.refresh().await.unwrap_err();
            assert!(err.to_string().contains("no rates"), "unexpected error: {err}");
        }

        let service = RateService::new(Arc::clone(&cache), store.clone(), "USD");
        let rates = service.get_rates("").await.unwrap();
        assert_eq!(rates, *first);
        assert_eq!(rates.len(), 3);
        assert_eq!(store.get_all_rates().await.unwrap().rates, first.rates);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_cache_untouched() {
        let provider = Arc::new(ScriptedProvider::new(vec![latest("USD", &[("EUR", 0.9)])]));
        let (refresher, cache) = refresher(provider, Arc::new(FailingStore));

        let err = refresher.refresh().await.unwrap_err();

        assert!(format!("{err:#}").contains("database is down"));
        assert!(cache.get().is_none());
    }

    #[tokio::test]
    async fn test_run_refreshes_on_each_tick_and_survives_failures() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            latest("USD", &[("EUR", 0.9)]),
            Err(anyhow::anyhow!("timeout")),
            latest("USD", &[("EUR", 0.8)]),
        ]));
        let (refresher, cache) = refresher(provider.clone(), Arc::new(MemoryRateStore::new()));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tick_tx, tick_rx) = mpsc::channel(4);

        for _ in 0..3 {
            tick_tx.send(()).await.unwrap();
        }
        drop(tick_tx);

        refresher.run(tick_rx, shutdown_rx).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.get().unwrap().rate("EUR"), Some(0.8));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let provider = Arc::new(ScriptedProvider::new(vec![latest("USD", &[("EUR", 0.9)])]));
        let (refresher, cache) = refresher(provider.clone(), Arc::new(MemoryRateStore::new()));
        let refresher = Arc::new(refresher);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tick_tx, tick_rx) = mpsc::channel(1);

        let handle = tokio::spawn({
            let refresher = Arc::clone(&refresher);
            async move { refresher.run(tick_rx, shutdown_rx).await }
        });

        tick_tx.send(()).await.unwrap();
        while cache.get().is_none() {
            tokio::task::yield_now().await;
        }
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // The sender is still alive, so the loop ended because of shutdown.
        assert!(tick_tx.send(()).await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_already_shut_down() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (refresher, _cache) = refresher(provider.clone(), Arc::new(MemoryRateStore::new()));
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);

        refresher
            .run(interval_ticks(Duration::from_secs(3600)), shutdown_rx)
            .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_refreshes_immediately_then_periodically() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            latest("USD", &[("EUR", 0.9)]),
            latest("USD", &[("EUR", 0.85)]),
        ]));
        let (refresher, cache) = refresher(provider.clone(), Arc::new(MemoryRateStore::new()));
        let refresher = Arc::new(refresher);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let period = Duration::from_secs(6 * 60 * 60);

        let handle = tokio::spawn({
            let refresher = Arc::clone(&refresher);
            async move { refresher.run(interval_ticks(period), shutdown_rx).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get().unwrap().rate("EUR"), Some(0.9));

        tokio::time::sleep(period).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get().unwrap().rate("EUR"), Some(0.85));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
