use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::model::{Metric, MetricKind};

use super::{check_cancelled, validate_metric, RepoError, Repository};

/// Map-backed store guarded by a single lock covering both reads and writes.
/// Readers-writer discipline isn't needed at this scale (spec §4.2).
#[derive(Default)]
pub struct MemoryRepository {
    metrics: Mutex<HashMap<String, Metric>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
        }
    }

    /// Apply a single record against an already-locked map. Shared by
    /// `set_metric` and the batch path so both get identical semantics.
    fn apply_locked(map: &mut HashMap<String, Metric>, metric: &Metric) -> Result<(), RepoError> {
        validate_metric(metric)?;

        match metric.kind {
            MetricKind::Counter => {
                if let Some(existing) = map.get(&metric.id) {
                    if existing.kind != MetricKind::Counter {
                        return Err(RepoError::TypeMismatch);
                    }
                }
                let delta = metric.delta.ok_or(RepoError::UnknownKind)?;
                let current = map.get(&metric.id).and_then(|m| m.delta).unwrap_or(0);
                map.insert(metric.id.clone(), Metric::counter(metric.id.clone(), current + delta));
            }
            MetricKind::Gauge => {
                if let Some(existing) = map.get(&metric.id) {
                    if existing.kind != MetricKind::Gauge {
                        return Err(RepoError::TypeMismatch);
                    }
                }
                let value = metric.value.ok_or(RepoError::UnknownKind)?;
                map.insert(metric.id.clone(), Metric::gauge(metric.id.clone(), value));
            }
        }
        Ok(())
    }

    pub(crate) async fn snapshot(&self) -> HashMap<String, Metric> {
        self.metrics.lock().await.clone()
    }

    /// Replace the whole store. Used by the file backend to apply a
    /// snapshot into a store that starts empty, so counter accumulation
    /// during restore reduces to "set to the snapshot value" (spec §9).
    pub(crate) async fn restore_from(&self, records: HashMap<String, Metric>) {
        let mut map = self.metrics.lock().await;
        map.clear();
        for (_, metric) in records {
            // Ignore malformed entries rather than fail the whole restore;
            // a hand-edited snapshot shouldn't be able to wedge startup.
            let _ = Self::apply_locked(&mut map, &metric);
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_counter(&self, id: &str, cancel: &CancellationToken) -> Result<i64, RepoError> {
        check_cancelled(cancel)?;
        let map = self.metrics.lock().await;
        match map.get(id) {
            None => Err(RepoError::NotFound),
            Some(m) if m.kind != MetricKind::Counter => Err(RepoError::TypeMismatch),
            Some(m) => Ok(m.delta.unwrap_or(0)),
        }
    }

    async fn get_gauge(&self, id: &str, cancel: &CancellationToken) -> Result<f64, RepoError> {
        check_cancelled(cancel)?;
        let map = self.metrics.lock().await;
        match map.get(id) {
            None => Err(RepoError::NotFound),
            Some(m) if m.kind != MetricKind::Gauge => Err(RepoError::TypeMismatch),
            Some(m) => Ok(m.value.unwrap_or(0.0)),
        }
    }

    async fn set_counter(
        &self,
        id: &str,
        delta: i64,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        check_cancelled(cancel)?;
        let mut map = self.metrics.lock().await;
        Self::apply_locked(&mut map, &Metric::counter(id, delta))
    }

    async fn set_gauge(
        &self,
        id: &str,
        value: f64,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        check_cancelled(cancel)?;
        let mut map = self.metrics.lock().await;
        Self::apply_locked(&mut map, &Metric::gauge(id, value))
    }

    async fn set_metric(
        &self,
        metric: &Metric,
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        check_cancelled(cancel)?;
        let mut map = self.metrics.lock().await;
        Self::apply_locked(&mut map, metric)
    }

    async fn set_metrics(
        &self,
        metrics: &[Metric],
        cancel: &CancellationToken,
    ) -> Result<(), RepoError> {
        check_cancelled(cancel)?;
        // Hold the lock across the whole batch: either all entries apply or
        // none do, and no other writer can observe a partial batch.
        let mut map = self.metrics.lock().await;
        let backup = map.clone();
        for metric in metrics {
            if let Err(e) = Self::apply_locked(&mut map, metric) {
                *map = backup;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn ping(&self, _cancel: &CancellationToken) -> Result<(), RepoError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn counter_accumulates() {
        let repo = MemoryRepository::new();
        let t = token();
        repo.set_counter("hits", 3, &t).await.unwrap();
        repo.set_counter("hits", 4, &t).await.unwrap();
        assert_eq!(repo.get_counter("hits", &t).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn gauge_overwrites() {
        let repo = MemoryRepository::new();
        let t = token();
        repo.set_gauge("cpu", 0.5, &t).await.unwrap();
        repo.set_gauge("cpu", 0.75, &t).await.unwrap();
        assert_eq!(repo.get_gauge("cpu", &t).await.unwrap(), 0.75);
    }

    #[tokio::test]
    async fn type_mismatch_on_conflicting_kind() {
        let repo = MemoryRepository::new();
        let t = token();
        repo.set_counter("hits", 1, &t).await.unwrap();
        let err = repo.set_gauge("hits", 1.0, &t).await.unwrap_err();
        assert!(matches!(err, RepoError::TypeMismatch));
    }

    #[tokio::test]
    async fn get_on_absent_id_is_not_found() {
        let repo = MemoryRepository::new();
        let t = token();
        assert!(matches!(
            repo.get_counter("missing", &t).await.unwrap_err(),
            RepoError::NotFound
        ));
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let repo = MemoryRepository::new();
        let t = token();
        repo.set_counter("hits", 1, &t).await.unwrap();

        let batch = vec![
            Metric::counter("hits", 1),
            Metric::gauge("hits", 2.0), // conflicts with existing counter kind
        ];
        assert!(repo.set_metrics(&batch, &t).await.is_err());
        // The first entry must not have been applied either.
        assert_eq!(repo.get_counter("hits", &t).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_yields_cancelled_with_no_mutation() {
        let repo = MemoryRepository::new();
        let t = token();
        t.cancel();
        assert!(matches!(
            repo.set_counter("hits", 1, &t).await.unwrap_err(),
            RepoError::Cancelled
        ));
        assert!(matches!(
            repo.get_counter("hits", &CancellationToken::new())
                .await
                .unwrap_err(),
            RepoError::NotFound
        ));
    }

    #[tokio::test]
    async fn concurrent_counter_increments_sum_correctly() {
        use std::sync::Arc;

        let repo = Arc::new(MemoryRepository::new());
        let t = token();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let repo = Arc::clone(&repo);
            let t = t.clone();
            handles.push(tokio::spawn(async move {
                repo.set_counter("hits", 1, &t).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(repo.get_counter("hits", &t).await.unwrap(), 50);
    }

    proptest! {
        #[test]
        fn counter_accumulates_to_the_sum_of_any_delta_sequence(deltas in prop::collection::vec(-1000i64..1000, 0..50)) {
            let expected: i64 = deltas.iter().sum();
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let repo = MemoryRepository::new();
                let t = token();
                for delta in &deltas {
                    repo.set_counter("hits", *delta, &t).await.unwrap();
                }
                let got = repo.get_counter("hits", &t).await.unwrap_or(0);
                prop_assert_eq!(got, expected);
                Ok(())
            })?;
        }

        #[test]
        fn gauge_observes_only_the_last_written_value(values in prop::collection::vec(-1000.0f64..1000.0, 1..50)) {
            let expected = *values.last().unwrap();
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let repo = MemoryRepository::new();
                let t = token();
                for value in &values {
                    repo.set_gauge("cpu", *value, &t).await.unwrap();
                }
                let got = repo.get_gauge("cpu", &t).await.unwrap();
                prop_assert_eq!(got, expected);
                Ok(())
            })?;
        }
    }
}
