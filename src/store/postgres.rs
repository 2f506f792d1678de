use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{RateStore, StoredRates};
use crate::exchange_rate::ExchangeRate;

pub struct PostgresRateStore {
    pool: PgPool,
}

impl PostgresRateStore {
    pub async fn connect(options: PgConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("Can't connect to the database")?;

        Ok(Self::new(pool))
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rates (
                currency VARCHAR(3) PRIMARY KEY,
                rate DOUBLE PRECISION NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rates_updated_at ON rates (updated_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl RateStore for PostgresRateStore {
    async fn upsert_rates(
        &self,
        rates: &HashMap<String, f64>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if rates.is_empty() {
            return Ok(());
        }

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO rates (currency, rate, updated_at) ");
        query_builder.push_values(rates, |mut b, (currency, rate)| {
            b.push_bind(currency.as_str())
                .push_bind(*rate)
                .push_bind(updated_at);
        });
        query_builder.push(
            " ON CONFLICT (currency) DO UPDATE SET rate = EXCLUDED.rate, updated_at = EXCLUDED.updated_at",
        );

        let result = query_builder.build().execute(&self.pool).await?;
        debug!("Upserted {} rate rows", result.rows_affected());

        Ok(())
    }

    async fn get_all_rates(&self) -> Result<StoredRates> {
        let rows = sqlx::query_as::<_, ExchangeRate>(
            "SELECT currency, rate, updated_at FROM rates",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(StoredRates::from_rows(rows))
    }
}
