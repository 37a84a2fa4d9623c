//! C5 — the event publisher: builds an `Event` from a command's
//! readings and hands it off to the worker pool (C6) for an
//! asynchronous post to the platform data service, per spec.md §4.4.
//!
//! At-most-once delivery, no local spooling: a post failure is logged
//! and otherwise forgotten. Event posts are never awaited by the
//! dispatcher, so they never delay -- and can never fail -- the HTTP
//! response that triggered them.

use crate::clients::DataClient;
use crate::pool::WorkerPool;
use adapter_api::{Event, Reading};
use std::sync::Arc;

pub struct EventPublisher {
    pool: Arc<WorkerPool>,
    data_client: Arc<dyn DataClient>,
}

impl EventPublisher {
    pub fn new(pool: Arc<WorkerPool>, data_client: Arc<dyn DataClient>) -> Self {
        EventPublisher { pool, data_client }
    }

    /// Builds the event and enqueues its post. Returns immediately;
    /// the post itself runs on C6 and its outcome is only logged.
    pub async fn publish(&self, device: impl Into<String>, origin_ms: i64, readings: Vec<Reading>) {
        let event = Event::new(device, origin_ms, readings);
        self.publish_event(event).await;
    }

    pub async fn publish_event(&self, event: Event) {
        let client = self.data_client.clone();
        let device = event.device.clone();

        self.pool
            .submit(async move {
                if let Err(e) = client.add_event(&event).await {
                    tracing::warn!(device = %device, error = %e, "event post failed");
                }
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_api::{Error, Value};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeDataClient {
        events_received: Arc<AtomicUsize>,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl DataClient for FakeDataClient {
        async fn ping(&self) -> adapter_api::Result<()> {
            Ok(())
        }

        async fn add_event(&self, _event: &Event) -> adapter_api::Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Error::DataClientFail("simulated failure".into()));
            }
            self.events_received.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_hands_event_to_pool_and_client() {
        let pool = WorkerPool::new(2);
        let received = Arc::new(AtomicUsize::new(0));
        let client = Arc::new(FakeDataClient {
            events_received: received.clone(),
            fail_next: AtomicBool::new(false),
        });
        let publisher = EventPublisher::new(pool.clone(), client);

        publisher
            .publish(
                "therm1",
                1000,
                vec![Reading::new("temperature", &Value::Float64(50.0), 1000, None)],
            )
            .await;

        pool.shutdown().await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn post_failure_does_not_panic_or_block() {
        let pool = WorkerPool::new(1);
        let received = Arc::new(AtomicUsize::new(0));
        let client = Arc::new(FakeDataClient {
            events_received: received.clone(),
            fail_next: AtomicBool::new(true),
        });
        let publisher = EventPublisher::new(pool.clone(), client);

        publisher.publish("therm1", 1000, vec![]).await;

        pool.shutdown().await;
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }
}
