//! Currency exchange rates and conversion backed by a periodically
//! refreshed snapshot cache, with Postgres as the durable fallback.

pub mod api;
pub mod cache;
pub mod config;
pub mod conversion;
pub mod error;
pub mod exchange_rate;
pub mod provider;
pub mod refresh;
pub mod service;
pub mod snapshot;
pub mod store;

pub use cache::RateCache;
pub use conversion::Conversion;
pub use error::RateError;
pub use refresh::RateRefresher;
pub use service::RateService;
pub use snapshot::RateSnapshot;
