use std::sync::Arc;

use actix_web::middleware::{Logger, from_fn};
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use fxrates::api::{self, Authenticator, StaticTokenAuthenticator};
use fxrates::config::AppConfig;
use fxrates::provider::HttpRateProvider;
use fxrates::refresh::{RateRefresher, interval_ticks};
use fxrates::store::{PostgresRateStore, RateStore};
use fxrates::{RateCache, RateService};
use log::{info, warn};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    info!(
        "Starting with base {} refreshed every {:?}",
        config.rate_base_currency, config.rate_refresh_interval
    );

    let store = PostgresRateStore::connect(
        config.database.connect_options()?,
        config.db_max_connections,
    )
    .await?;
    store
        .initialize()
        .await
        .context("Can't initialize the rates table")?;
    let store: Arc<dyn RateStore> = Arc::new(store);

    let cache = Arc::new(RateCache::new());
    let provider = HttpRateProvider::new(&config.rate_provider_url, config.http_client_timeout)?;
    let refresher = RateRefresher::new(
        Arc::new(provider),
        Arc::clone(&store),
        Arc::clone(&cache),
        &config.rate_base_currency,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticks = interval_ticks(config.rate_refresh_interval);
    let refresh_task = tokio::spawn(async move { refresher.run(ticks, shutdown_rx).await });

    let authenticator = StaticTokenAuthenticator::new(config.api_tokens.clone());
    if authenticator.is_empty() {
        warn!("API_TOKENS is empty; every rate request will be rejected");
    }
    let authenticator: Arc<dyn Authenticator> = Arc::new(authenticator);
    let authenticator = web::Data::from(authenticator);
    let service = web::Data::new(RateService::new(cache, store, &config.rate_base_currency));

    info!("Listening on 0.0.0.0:{}", config.port);
    let served = HttpServer::new(move || {
        App::new()
            .wrap(from_fn(api::request_id))
            .wrap(api::security_headers())
            .wrap(Logger::default())
            .app_data(service.clone())
            .app_data(authenticator.clone())
            .configure(api::configure)
    })
    .bind(("0.0.0.0", config.port))
    .with_context(|| format!("Can't bind port {}", config.port))?
    .run()
    .await;

    let _ = shutdown_tx.send(true);
    refresh_task.await.context("Rate refresh task panicked")?;
    info!("Shut down");

    served.context("HTTP server failed")
}
