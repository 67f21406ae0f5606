//! NATS consumer for incoming scoring requests

use crate::types::prediction::{ScoringRequest, ScoringResponse};
use anyhow::Result;
use async_nats::{Client, Subscriber};
use tokio::sync::Semaphore;
use tracing::info;

/// Consumer for receiving scoring requests from NATS
pub struct ScoringRequestConsumer {
    client: Client,
    subject: String,
}

impl ScoringRequestConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the request subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to scoring request subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Parse a request payload. A payload that is not `{data: [...]}` yields the
/// rejection to send back instead.
pub fn decode_request(payload: &[u8]) -> Result<ScoringRequest, ScoringResponse> {
    serde_json::from_slice(payload)
        .map_err(|e| ScoringResponse::rejected(format!("malformed scoring request: {e}")))
}

/// Wait until every worker permit is back, i.e. all spawned request tasks
/// have published their response.
pub async fn drain_workers(semaphore: &Semaphore, workers: usize) -> Result<()> {
    let permits = u32::try_from(workers)?;
    let _all = semaphore.acquire_many(permits).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_tasks() {
        let semaphore = Arc::new(Semaphore::new(2));
        let answered = Arc::new(AtomicBool::new(false));

        let permit = semaphore.clone().acquire_owned().await.unwrap();
        let flag = answered.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
            drop(permit);
        });

        drain_workers(&semaphore, 2).await.unwrap();
        assert!(answered.load(Ordering::SeqCst));
    }

    #[test]
    fn test_decode_request() {
        let request = decode_request(br#"{"data": [{"score_1": 1}, {"score_1": 2}]}"#).unwrap();
        assert_eq!(request.data.len(), 2);
        assert_eq!(request.data[1]["score_1"], 2);
    }

    #[test]
    fn test_malformed_request_is_rejected() {
        let payloads: [&[u8]; 3] = [b"not json", br#"{"records": []}"#, br#"{"data": {}}"#];
        for payload in payloads {
            match decode_request(payload) {
                Err(ScoringResponse::Rejected { error, index }) => {
                    assert!(error.reason.starts_with("malformed scoring request"));
                    assert_eq!(index, None);
                }
                other => panic!("expected rejection, got {other:?}"),
            }
        }
    }
}
