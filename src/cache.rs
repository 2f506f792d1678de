use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::snapshot::RateSnapshot;

/// Holds the latest rate snapshot.
///
/// Snapshots are immutable and swapped whole, so the lock is only held
/// for the duration of an `Arc` clone or pointer replace.
#[derive(Debug, Default)]
pub struct RateCache {
    current: RwLock<Option<Arc<RateSnapshot>>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<RateSnapshot>> {
        let snapshot = self.current.read().clone();
        if snapshot.is_none() {
            debug!("Rate cache MISS");
        }
        snapshot
    }

    pub fn install(&self, snapshot: Arc<RateSnapshot>) {
        debug!(
            "Rate cache install: base={} count={}",
            snapshot.base,
            snapshot.len()
        );
        let previous = self.current.write().replace(snapshot);
        // Old snapshot is released outside the write lock.
        drop(previous);
    }
}
