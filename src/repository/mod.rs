mod file;
mod memory;
mod sql;

pub use file::FileRepository;
pub use memory::MemoryRepository;
pub use sql::SqlRepository;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::model::Metric;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("metric not found")]
    NotFound,
    #[error("metric exists with a different kind")]
    TypeMismatch,
    #[error("operation cancelled")]
    Cancelled,
    #[error("metric id is empty")]
    EmptyId,
    #[error("unknown metric kind")]
    UnknownKind,
    #[error("persistence error: {0}")]
    Persist(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("operation timed out")]
    Timeout,
}

/// Uniform contract over get/set/batch/ping for every storage backend.
///
/// Every operation accepts a `CancellationToken`; cancellation observed
/// before the critical section yields `RepoError::Cancelled` with no
/// mutation.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_counter(&self, id: &str, cancel: &CancellationToken) -> Result<i64, RepoError>;
    async fn get_gauge(&self, id: &str, cancel: &CancellationToken) -> Result<f64, RepoError>;
    async fn set_counter(
        &self,
        id: &str,
        delta: i64,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError>;
    async fn set_gauge(
        &self,
        id: &str,
        value: f64,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError>;
    async fn set_metric(&self, metric: &Metric, cancel: &CancellationToken)
        -> Result<(), RepoError>;
    async fn set_metrics(
        &self,
        metrics: &[Metric],
        cancel: &CancellationToken,
    ) -> Result<(), RepoError>;
    async fn ping(&self, cancel: &CancellationToken) -> Result<(), RepoError>;
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), RepoError> {
    if cancel.is_cancelled() {
        Err(RepoError::Cancelled)
    } else {
        Ok(())
    }
}

pub(crate) fn validate_metric(metric: &Metric) -> Result<(), RepoError> {
    if metric.id.is_empty() {
        return Err(RepoError::EmptyId);
    }
    if !metric.is_well_formed() {
        return Err(RepoError::UnknownKind);
    }
    Ok(())
}
