//! The platform data service client: `ping` and `add_event`, per
//! spec.md §6 ("Platform clients (consumed)").

use adapter_api::{Error, Event, Result};
use async_trait::async_trait;

#[async_trait]
pub trait DataClient: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn add_event(&self, event: &Event) -> Result<()>;
}

pub struct HttpDataClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpDataClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DataClient for HttpDataClient {
    async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/v1/ping", self.base_url);

        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::DataClientFail(format!("ping failed: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::DataClientFail(format!("ping returned error status: {}", e)))?;

        Ok(())
    }

    async fn add_event(&self, event: &Event) -> Result<()> {
        let url = format!("{}/api/v1/event", self.base_url);

        self.client
            .post(url)
            .json(event)
            .send()
            .await
            .map_err(|e| Error::DataClientFail(format!("add_event failed: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::DataClientFail(format!("add_event returned error status: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A hand-rolled fake standing in for a real data-service backend,
    /// in place of a mocking crate the teacher's own test suites don't
    /// pull in either.
    pub struct FakeDataClient {
        pub events_received: Arc<AtomicUsize>,
        pub fail_next: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl DataClient for FakeDataClient {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn add_event(&self, _event: &Event) -> Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Error::DataClientFail("simulated failure".into()));
            }
            self.events_received.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn fake_client_counts_events() {
        let received = Arc::new(AtomicUsize::new(0));
        let client = FakeDataClient {
            events_received: received.clone(),
            fail_next: std::sync::atomic::AtomicBool::new(false),
        };

        let event = Event {
            device: "therm1".into(),
            origin_ms: 0,
            readings: vec![],
        };

        client.add_event(&event).await.unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
