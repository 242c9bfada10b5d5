use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;

use crate::model::Metric;

use super::{check_cancelled, validate_metric, RepoError, Repository};

const NOTFOUND_RETRIES: u32 = 3;
const NOTFOUND_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Repository backed by a `metrics` table in Postgres (spec §4.4). Upserts
/// use `ON CONFLICT ... DO UPDATE`; batches run inside a transaction.
pub struct SqlRepository {
    pool: PgPool,
}

impl SqlRepository {
    pub async fn connect(dsn: &str) -> Result<Self, RepoError> {
        let pool = PgPoolOptions::new()
            .max_connections(25)
            .min_connections(0)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(5 * 60))
            .connect(dsn)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metrics (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                delta BIGINT,
                value DOUBLE PRECISION
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    async fn upsert_counter(&self, id: &str, delta: i64) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO metrics (id, type, delta) VALUES ($1, 'counter', $2)
             ON CONFLICT (id) DO UPDATE SET delta = metrics.delta + EXCLUDED.delta",
        )
        .bind(id)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_gauge(&self, id: &str, value: f64) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO metrics (id, type, value) VALUES ($1, 'gauge', $2)
             ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for SqlRepository {
    async fn get_counter(&self, id: &str, cancel: &CancellationToken) -> Result<i64, RepoError> {
        check_cancelled(cancel)?;
        for attempt in 0..=NOTFOUND_RETRIES {
            check_cancelled(cancel)?;
            let row = sqlx::query("SELECT delta FROM metrics WHERE id = $1 AND type = 'counter'")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(row) => return Ok(row.try_get::<i64, _>("delta")?),
                None if attempt < NOTFOUND_RETRIES => {
                    tokio::time::sleep(NOTFOUND_RETRY_DELAY).await;
                }
                None => return Err(RepoError::NotFound),
            }
        }
        unreachable!()
    }

    async fn get_gauge(&self, id: &str, cancel: &CancellationToken) -> Result<f64, RepoError> {
        check_cancelled(cancel)?;
        for attempt in 0..=NOTFOUND_RETRIES {
            check_cancelled(cancel)?;
            let row = sqlx::query("SELECT value FROM metrics WHERE id = $1 AND type = 'gauge'")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(row) => return Ok(row.try_get::<f64, _>("value")?),
                None if attempt < NOTFOUND_RETRIES => {
                    tokio::time::sleep(NOTFOUND_RETRY_DELAY).await;
                }
                None => return Err(RepoError::NotFound),
            }
        }
        unreachable!()
    }

    async fn set_counter(
        &self,
        id: &str,
        delta: i64,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        check_cancelled(cancel)?;
        self.upsert_counter(id, delta).await
    }

    async fn set_gauge(
        &self,
        id: &str,
        value: f64,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        check_cancelled(cancel)?;
        self.upsert_gauge(id, value).await
    }

    async fn set_metric(
        &self,
        metric: &Metric,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        check_cancelled(cancel)?;
        validate_metric(metric)?;
        match metric.kind {
            crate::model::MetricKind::Counter => {
                self.upsert_counter(&metric.id, metric.delta.unwrap()).await
            }
            crate::model::MetricKind::Gauge => {
                self.upsert_gauge(&metric.id, metric.value.unwrap()).await
            }
        }
    }

    async fn set_metrics(
        &self,
        metrics: &[Metric],
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        check_cancelled(cancel)?;
        for metric in metrics {
            validate_metric(metric)?;
        }

        let mut tx = self.pool.begin().await?;
        for metric in metrics {
            let result = match metric.kind {
                crate::model::MetricKind::Counter => {
                    sqlx::query(
                        "INSERT INTO metrics (id, type, delta) VALUES ($1, 'counter', $2)
                         ON CONFLICT (id) DO UPDATE SET delta = metrics.delta + EXCLUDED.delta",
                    )
                    .bind(&metric.id)
                    .bind(metric.delta.unwrap())
                    .execute(&mut *tx)
                    .await
                }
                crate::model::MetricKind::Gauge => {
                    sqlx::query(
                        "INSERT INTO metrics (id, type, value) VALUES ($1, 'gauge', $2)
                         ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value",
                    )
                    .bind(&metric.id)
                    .bind(metric.value.unwrap())
                    .execute(&mut *tx)
                    .await
                }
            };
            if let Err(e) = result {
                tx.rollback().await?;
                return Err(e.into());
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<(), RepoError> {
        check_cancelled(cancel)?;
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
