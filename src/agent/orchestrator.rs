use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::provider::ProcessProvider;
use super::reporter::Reporter;

/// Lifecycle states from spec §4.9. Only observed via logging today; no
/// component queries it, so it is plain data rather than a typestate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Waiting,
    Running,
    Draining,
    Stopped,
}

type Sample = Vec<(String, f64)>;

/// Owns the poller + worker pool for one agent process.
pub struct Orchestrator {
    reporter: Arc<Reporter>,
    poll_interval: Duration,
    report_interval: Duration,
    rate_limit: usize,
}

impl Orchestrator {
    pub fn new(
        reporter: Reporter,
        poll_interval: Duration,
        report_interval: Duration,
        rate_limit: usize,
    ) -> Self {
        Self {
            reporter: Arc::new(reporter),
            poll_interval,
            report_interval,
            rate_limit: rate_limit.max(1),
        }
    }

    /// Waits for the server, then runs the poller and reporter workers
    /// until `cancel` fires. Returns once every task has exited.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), anyhow::Error> {
        let mut state = State::Idle;

        state = State::Waiting;
        tracing::debug!(?state, "orchestrator waiting for server");
        self.reporter.wait_server(&cancel).await?;

        let (tx, rx) = mpsc::channel::<Sample>(2 * self.rate_limit);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        state = State::Running;
        tracing::debug!(?state, "orchestrator running");

        let poller = tokio::spawn(poller_loop(
            tx,
            self.poll_interval,
            self.report_interval,
            cancel.clone(),
        ));

        let mut workers = Vec::with_capacity(self.rate_limit);
        for worker_id in 0..self.rate_limit {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                rx.clone(),
                self.reporter.clone(),
                cancel.clone(),
            )));
        }

        cancel.cancelled().await;
        state = State::Draining;
        tracing::debug!(?state, "orchestrator draining");

        let _ = poller.await;
        for worker in workers {
            let _ = worker.await;
        }

        state = State::Stopped;
        tracing::debug!(?state, "orchestrator stopped");
        Ok(())
    }
}

/// Samples every `poll_interval` into a running "latest value per name"
/// accumulator, and flushes that accumulator onto the channel every
/// `report_interval` — the two-timer shape of the Go original's agent
/// (poll frequently, report less often) rather than pushing on every poll.
async fn poller_loop(
    tx: mpsc::Sender<Sample>,
    poll_interval: Duration,
    report_interval: Duration,
    cancel: CancellationToken,
) {
    let mut provider = ProcessProvider::new();
    let mut latest: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    let mut since_last_report = Duration::ZERO;
    let tick = if poll_interval.is_zero() {
        Duration::from_millis(1)
    } else {
        poll_interval
    };

    loop {
        if cancel.is_cancelled() {
            break;
        }

        for (name, value) in provider.sample() {
            latest.insert(name, value);
        }
        since_last_report += tick;

        if since_last_report >= report_interval {
            since_last_report = Duration::ZERO;
            let batch: Sample = latest.iter().map(|(k, v)| (k.clone(), *v)).collect();
            tokio::select! {
                send_result = tx.send(batch) => {
                    if send_result.is_err() {
                        break;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = cancel.cancelled() => break,
        }
    }
    drop(tx);
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Sample>>>,
    reporter: Arc<Reporter>,
    cancel: CancellationToken,
) {
    loop {
        let sample = {
            let mut guard = rx.lock().await;
            tokio::select! {
                received = guard.recv() => received,
                _ = cancel.cancelled() => None,
            }
        };

        let Some(sample) = sample else {
            break;
        };

        if let Err(err) = reporter.report(&sample, &cancel).await {
            tracing::error!(worker_id, %err, "failed to report metrics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn orchestrator_state_enum_has_expected_ordering() {
        assert_ne!(State::Idle, State::Stopped);
    }
}
