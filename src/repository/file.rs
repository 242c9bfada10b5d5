use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::model::Metric;

use super::{MemoryRepository, RepoError, Repository};

/// A memory repository plus a periodic or synchronous persistence policy
/// (spec §4.3). The store lock and the snapshot-file lock are distinct so a
/// slow write never blocks an unrelated in-memory read.
pub struct FileRepository {
    inner: MemoryRepository,
    path: PathBuf,
    interval_secs: u64,
    snapshot_lock: AsyncMutex<()>,
}

impl FileRepository {
    /// `interval_secs == 0` persists synchronously on every mutating call;
    /// `> 0` persists only on a periodic background timer. `restore` loads
    /// the snapshot once, into an empty store, before returning.
    pub async fn new(path: impl Into<PathBuf>, interval_secs: u64, restore: bool) -> Self {
        let repo = Self {
            inner: MemoryRepository::new(),
            path: path.into(),
            interval_secs,
            snapshot_lock: AsyncMutex::new(()),
        };
        if restore {
            if let Err(e) = repo.restore().await {
                tracing::error!(error = %e, "failed to restore metrics snapshot");
            }
        }
        repo
    }

    /// Spawn the periodic snapshot task. Separate from `new` so the caller
    /// controls the task's lifetime (and can hold the join handle for
    /// graceful shutdown) rather than it being fire-and-forget from
    /// construction.
    pub fn spawn_periodic_save(self: &std::sync::Arc<Self>, cancel: CancellationToken) {
        if self.interval_secs == 0 {
            return;
        }
        let repo = std::sync::Arc::clone(self);
        let interval = std::time::Duration::from_secs(self.interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = repo.persist().await {
                            tracing::error!(error = %e, "periodic snapshot failed");
                            // Transient-failure tolerance: keep ticking.
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    async fn persist(&self) -> Result<(), RepoError> {
        let records = self.inner.snapshot().await;

        let _guard = self.snapshot_lock.lock().await;
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| RepoError::Persist(e.to_string()))?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| RepoError::Persist(e.to_string()))?;
            }
        }
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| RepoError::Persist(e.to_string()))?;
        Ok(())
    }

    async fn restore(&self) -> Result<(), RepoError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(RepoError::Persist(e.to_string())),
        };
        let records: HashMap<String, Metric> =
            serde_json::from_slice(&data).map_err(|e| RepoError::Persist(e.to_string()))?;
        self.inner.restore_from(records).await;
        Ok(())
    }

    async fn persist_if_sync(&self) -> Result<(), RepoError> {
        if self.interval_secs == 0 {
            self.persist().await
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn get_counter(&self, id: &str, cancel: &CancellationToken) -> Result<i64, RepoError> {
        self.inner.get_counter(id, cancel).await
    }

    async fn get_gauge(&self, id: &str, cancel: &CancellationToken) -> Result<f64, RepoError> {
        self.inner.get_gauge(id, cancel).await
    }

    async fn set_counter(
        &self,
        id: &str,
        delta: i64,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        self.inner.set_counter(id, delta, cancel).await?;
        self.persist_if_sync().await
    }

    async fn set_gauge(
        &self,
        id: &str,
        value: f64,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        self.inner.set_gauge(id, value, cancel).await?;
        self.persist_if_sync().await
    }

    async fn set_metric(
        &self,
        metric: &Metric,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        self.inner.set_metric(metric, cancel).await?;
        self.persist_if_sync().await
    }

    async fn set_metrics(
        &self,
        metrics: &[Metric],
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        self.inner.set_metrics(metrics, cancel).await?;
        self.persist_if_sync().await
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<(), RepoError> {
        self.inner.ping(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn synchronous_save_then_restore_round_trips() {
        let dir = tempdir();
        let path = dir.join("metrics.json");
        let t = token();

        {
            let repo = FileRepository::new(&path, 0, false).await;
            repo.set_counter("hits", 7, &t).await.unwrap();
            repo.set_gauge("cpu", 0.5, &t).await.unwrap();
        }

        let restored = FileRepository::new(&path, 0, true).await;
        assert_eq!(restored.get_counter("hits", &t).await.unwrap(), 7);
        assert_eq!(restored.get_gauge("cpu", &t).await.unwrap(), 0.5);

        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn missing_snapshot_file_is_a_noop() {
        let dir = tempdir();
        let path = dir.join("does-not-exist.json");
        let repo = FileRepository::new(&path, 0, true).await;
        assert!(matches!(
            repo.get_counter("hits", &token()).await.unwrap_err(),
            RepoError::NotFound
        ));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn restore_does_not_double_accumulate_counters() {
        let dir = tempdir();
        let path = dir.join("metrics.json");
        let t = token();

        {
            let repo = FileRepository::new(&path, 0, false).await;
            repo.set_counter("hits", 10, &t).await.unwrap();
        }

        let restored = FileRepository::new(&path, 0, true).await;
        // Restoring into an empty store must yield exactly the snapshot
        // value, not the snapshot value accumulated onto a pre-existing one.
        assert_eq!(restored.get_counter("hits", &t).await.unwrap(), 10);

        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("metrics-pipeline-test-{}", std::process::id()));
        dir.push(uuid_like());
        dir
    }

    // Avoids pulling in the `uuid` crate just for test scratch directories.
    fn uuid_like() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{nanos:x}")
    }
}
