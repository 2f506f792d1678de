use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::warn;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::refresh::DEFAULT_BASE_CURRENCY;
use crate::snapshot::normalize_currency;

pub const DEFAULT_PROVIDER_URL: &str = "https://api.exchangerate.host/latest";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub database: DatabaseConfig,
    pub db_max_connections: u32,
    pub rate_base_currency: String,
    pub rate_refresh_interval: Duration,
    pub http_client_timeout: Duration,
    pub rate_provider_url: String,
    pub api_tokens: Vec<String>,
}

impl AppConfig {
    /// Reads the process environment. Callers load `.env` beforehand.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let database = match env.get("DATABASE_URL") {
            Some(url) => DatabaseConfig::Url(url),
            None => {
                let Some(password) = env.get("DB_PASSWORD") else {
                    bail!("Missing required env: DB_PASSWORD (or DATABASE_URL)");
                };
                DatabaseConfig::Parts {
                    host: env.string("DB_HOST", "localhost"),
                    port: env.parsed("DB_PORT", 5432),
                    user: env.string("DB_USER", "postgres"),
                    password,
                    name: env.string("DB_NAME", "currencydb"),
                    sslmode: env.string("DB_SSLMODE", "disable"),
                }
            }
        };
        database.connect_options()?;

        let mut rate_base_currency = normalize_currency(&env.string("RATE_BASE_CURRENCY", ""));
        if rate_base_currency.is_empty() {
            rate_base_currency = DEFAULT_BASE_CURRENCY.to_string();
        }

        let rate_refresh_interval =
            env.duration("RATE_REFRESH_INTERVAL", Duration::from_secs(6 * 60 * 60));
        if rate_refresh_interval.is_zero() {
            bail!("RATE_REFRESH_INTERVAL must be greater than zero");
        }

        let api_tokens = env
            .string("API_TOKENS", "")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            port: env.parsed("PORT", 8080),
            database,
            db_max_connections: env.parsed("DB_MAX_CONNECTIONS", 5),
            rate_base_currency,
            rate_refresh_interval,
            http_client_timeout: env.duration("HTTP_CLIENT_TIMEOUT", Duration::from_secs(10)),
            rate_provider_url: env.string("RATE_PROVIDER_URL", DEFAULT_PROVIDER_URL),
            api_tokens,
        })
    }
}

/// Where the rate store lives: a full `DATABASE_URL`, or the separate
/// `DB_*` parts. Parts are handed to the driver as-is, so passwords need
/// no URL escaping.
#[derive(Clone, PartialEq)]
pub enum DatabaseConfig {
    Url(String),
    Parts {
        host: String,
        port: u16,
        user: String,
        password: String,
        name: String,
        sslmode: String,
    },
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        match self {
            Self::Url(url) => url
                .parse::<PgConnectOptions>()
                .context("Invalid DATABASE_URL"),
            Self::Parts {
                host,
                port,
                user,
                password,
                name,
                sslmode,
            } => {
                let ssl_mode = sslmode
                    .parse::<PgSslMode>()
                    .with_context(|| format!("Invalid DB_SSLMODE: {sslmode:?}"))?;
                Ok(PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(user)
                    .password(password)
                    .database(name)
                    .ssl_mode(ssl_mode))
            }
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(_) => f.write_str("Url(..)"),
            Self::Parts {
                host, port, user, name, ..
            } => write!(f, "Parts({user}@{host}:{port}/{name})"),
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid value for {key}: {raw:?}, using default");
                default
            }),
            None => default,
        }
    }

    fn duration(&self, key: &str, default: Duration) -> Duration {
        match self.get(key) {
            Some(raw) => parse_duration(&raw).unwrap_or_else(|| {
                warn!("Invalid duration for {key}: {raw:?}, using default");
                default
            }),
            None => default,
        }
    }
}

/// Parses durations such as `6h`, `90s`, `1h30m` or `250ms`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let mut rest = raw.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "h" => Duration::from_secs(value.checked_mul(3600)?),
            "m" => Duration::from_secs(value.checked_mul(60)?),
            "s" => Duration::from_secs(value),
            "ms" => Duration::from_millis(value),
            _ => return None,
        };
        total = total.checked_add(part)?;
        rest = &rest[unit_len..];
    }

    Some(total)
}
