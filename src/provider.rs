use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::snapshot::normalize_currency;

/// Body returned by the rate provider's "latest" endpoint.
#[derive(Debug, Deserialize, PartialEq)]
pub struct LatestRates {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub rates: HashMap<String, f64>,
}

/// Wire shape of the "latest" reply. Some providers answer 200 with
/// `success: false` and an `error` object instead of rates.
#[derive(Debug, Deserialize)]
struct LatestResponse {
    success: Option<bool>,
    error: Option<serde_json::Value>,
    #[serde(flatten)]
    latest: LatestRates,
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_latest(&self, base: &str) -> Result<LatestRates>;
}

pub struct HttpRateProvider {
    client: Client,
    url: String,
}

impl HttpRateProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("fxrates/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Can't build the rate provider HTTP client")?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn fetch_latest(&self, base: &str) -> Result<LatestRates> {
        let url = Url::parse_with_params(&self.url, &[("base", base)])
            .with_context(|| format!("Invalid rate provider URL: {}", self.url))?;
        debug!("Requesting latest rates from {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.url))?;
        if !resp.status().is_success() {
            anyhow::bail!("Rates API error: {}", resp.status());
        }

        let body = resp
            .json::<LatestResponse>()
            .await
            .context("Can't decode the rates response")?;
        if body.success == Some(false) {
            let detail = body.error.map(|e| e.to_string()).unwrap_or_default();
            anyhow::bail!("Rates API reported failure: {detail}");
        }
        if body.latest.rates.is_empty() {
            anyhow::bail!("Rates API returned no rates");
        }

        Ok(normalize_latest(body.latest, base))
    }
}

fn normalize_latest(latest: LatestRates, requested_base: &str) -> LatestRates {
    let mut base = normalize_currency(&latest.base);
    if base.is_empty() {
        base = normalize_currency(requested_base);
    }

    let rates = latest
        .rates
        .into_iter()
        .map(|(code, rate)| (normalize_currency(&code), rate))
        .collect();

    LatestRates { base, rates }
}
