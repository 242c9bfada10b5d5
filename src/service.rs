use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::metrics::PipelineMetrics;
use crate::model::{Metric, MetricKind};
use crate::repository::{RepoError, Repository};

const SET_TIMEOUT: Duration = Duration::from_secs(2);
const BATCH_TIMEOUT: Duration = Duration::from_secs(2);
const GET_TIMEOUT: Duration = Duration::from_secs(3);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// Thin policy layer over a `Repository` (spec §4.5). Handlers talk to this,
/// never to a repository directly.
#[derive(Clone)]
pub struct MetricService {
    repo: Arc<dyn Repository>,
    metrics: PipelineMetrics,
}

impl MetricService {
    pub fn new(repo: Arc<dyn Repository>, metrics: PipelineMetrics) -> Self {
        Self { repo, metrics }
    }

    pub async fn set(&self, metric: Metric) -> Result<(), RepoError> {
        if !metric.is_well_formed() {
            return Err(RepoError::UnknownKind);
        }
        let cancel = CancellationToken::new();
        self.timed("set", with_timeout(SET_TIMEOUT, self.repo.set_metric(&metric, &cancel)))
            .await
    }

    pub async fn set_batch(&self, metrics: Vec<Metric>) -> Result<(), RepoError> {
        for metric in &metrics {
            if !metric.is_well_formed() {
                return Err(RepoError::UnknownKind);
            }
        }
        let cancel = CancellationToken::new();
        self.timed(
            "set_batch",
            with_timeout(BATCH_TIMEOUT, self.repo.set_metrics(&metrics, &cancel)),
        )
        .await
    }

    pub async fn get(&self, id: &str, kind: MetricKind) -> Result<Metric, RepoError> {
        let cancel = CancellationToken::new();
        match kind {
            MetricKind::Counter => {
                let delta = self
                    .timed("get", with_timeout(GET_TIMEOUT, self.repo.get_counter(id, &cancel)))
                    .await?;
                Ok(Metric::counter(id, delta))
            }
            MetricKind::Gauge => {
                let value = self
                    .timed("get", with_timeout(GET_TIMEOUT, self.repo.get_gauge(id, &cancel)))
                    .await?;
                Ok(Metric::gauge(id, value))
            }
        }
    }

    pub async fn health(&self) -> Result<(), RepoError> {
        let cancel = CancellationToken::new();
        self.timed("health", with_timeout(HEALTH_TIMEOUT, self.repo.ping(&cancel)))
            .await
    }

    /// Times a repository call and feeds it into the self-observability
    /// histogram, regardless of whether the call succeeded or timed out.
    async fn timed<T>(
        &self,
        op: &str,
        fut: impl std::future::Future<Output = Result<T, RepoError>>,
    ) -> Result<T, RepoError> {
        let start = Instant::now();
        let result = fut.await;
        self.metrics.record_repository_latency(op, start.elapsed());
        result
    }
}

async fn with_timeout<T>(
    duration: Duration,
    fut: impl std::future::Future<Output = Result<T, RepoError>>,
) -> Result<T, RepoError> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(RepoError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use metrics_exporter_prometheus::PrometheusBuilder;

    fn service() -> MetricService {
        let (_, handle) = PrometheusBuilder::new().build().unwrap();
        MetricService::new(Arc::new(MemoryRepository::new()), PipelineMetrics::new(handle))
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let svc = service();
        svc.set(Metric::counter("hits", 3)).await.unwrap();
        let got = svc.get("hits", MetricKind::Counter).await.unwrap();
        assert_eq!(got.delta, Some(3));
    }

    #[tokio::test]
    async fn set_rejects_malformed_record() {
        let svc = service();
        let malformed = Metric {
            id: "hits".into(),
            kind: MetricKind::Counter,
            delta: None,
            value: None,
        };
        assert!(svc.set(malformed).await.is_err());
    }

    #[tokio::test]
    async fn set_batch_then_get_observes_all_entries() {
        let svc = service();
        svc.set_batch(vec![Metric::counter("hits", 2), Metric::gauge("cpu", 0.1)])
            .await
            .unwrap();
        assert_eq!(
            svc.get("hits", MetricKind::Counter).await.unwrap().delta,
            Some(2)
        );
        assert_eq!(
            svc.get("cpu", MetricKind::Gauge).await.unwrap().value,
            Some(0.1)
        );
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.get("missing", MetricKind::Counter).await.unwrap_err(),
            RepoError::NotFound
        ));
    }

    #[tokio::test]
    async fn health_delegates_to_ping() {
        let svc = service();
        svc.health().await.unwrap();
    }
}
