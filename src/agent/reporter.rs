use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::middleware::sign_hex;

const MAX_RETRIES: u32 = 15;
const MIN_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(3);

/// Owns the retryable HTTP client the orchestrator's poller/reporter tasks
/// share (spec §4.8). One instance per agent process.
pub struct Reporter {
    client: Client,
    base_url: String,
    secret: String,
}

impl Reporter {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            secret: secret.into(),
        }
    }

    fn backoff(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(MIN_BACKOFF)
            .with_max_interval(MAX_BACKOFF)
            .with_max_elapsed_time(None)
            .build()
    }

    /// `GET /` until success or cancellation.
    pub async fn wait_server(&self, cancel: &CancellationToken) -> Result<(), anyhow::Error> {
        let mut backoff = self.backoff();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(anyhow::anyhow!("cancelled while waiting for server"));
            }

            match self.client.get(&self.base_url).send().await {
                Ok(resp) if resp.status().as_u16() < 300 => return Ok(()),
                _ => {}
            }

            attempt += 1;
            if attempt > MAX_RETRIES {
                return Err(anyhow::anyhow!("server did not become reachable"));
            }
            let delay = backoff.next_backoff().unwrap_or(MAX_BACKOFF);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(anyhow::anyhow!("cancelled while waiting for server"));
                }
            }
        }
    }

    /// Builds the wire payload, gzips it, signs it if a secret is
    /// configured, and POSTs to `/updates/` with retry (spec §4.8).
    pub async fn report(
        &self,
        samples: &[(String, f64)],
        cancel: &CancellationToken,
    ) -> Result<(), anyhow::Error> {
        let body = build_payload(samples)?;
        let compressed = crate::middleware::compress(&body)?;

        let mut backoff = self.backoff();
        let mut attempt = 0u32;
        let url = format!("{}/updates/", self.base_url.trim_end_matches('/'));

        loop {
            if cancel.is_cancelled() {
                return Err(anyhow::anyhow!("cancelled before report"));
            }

            let mut request = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("Content-Encoding", "gzip");

            if !self.secret.is_empty() {
                request = request.header("HashSHA256", sign_hex(&self.secret, &body));
            }

            match request.body(compressed.clone()).send().await {
                Ok(resp) if resp.status().as_u16() < 300 => return Ok(()),
                _ => {}
            }

            attempt += 1;
            if attempt > MAX_RETRIES {
                return Err(anyhow::anyhow!("exhausted retries reporting metrics"));
            }
            let delay = backoff.next_backoff().unwrap_or(MAX_BACKOFF);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(anyhow::anyhow!("cancelled while retrying report"));
                }
            }
        }
    }
}

/// `PollCount` is special-cased as a counter; every other name is a gauge
/// (spec §4.8 step 1).
fn build_payload(samples: &[(String, f64)]) -> Result<Vec<u8>, anyhow::Error> {
    let records: Vec<serde_json::Value> = samples
        .iter()
        .map(|(name, value)| {
            if name == "PollCount" {
                serde_json::json!({ "id": name, "type": "counter", "delta": *value as i64 })
            } else {
                serde_json::json!({ "id": name, "type": "gauge", "value": value })
            }
        })
        .collect();
    Ok(serde_json::to_vec(&records)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_count_is_encoded_as_counter() {
        let samples = vec![("PollCount".to_string(), 3.0), ("Alloc".to_string(), 1.5)];
        let payload = build_payload(&samples).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(parsed[0]["type"], "counter");
        assert_eq!(parsed[0]["delta"], 3);
        assert_eq!(parsed[1]["type"], "gauge");
        assert_eq!(parsed[1]["value"], 1.5);
    }
}
