//! Platform clients (spec.md §6, "Platform clients (consumed)").
//!
//! Each is a trait plus a `reqwest`-backed implementation, the same
//! split the teacher uses between its `driver::API` contract and a
//! concrete driver `Instance` talking to a real upstream service: a
//! test can substitute a hand-rolled fake implementing the same trait
//! without touching the orchestrator or dispatcher code that calls it.

mod config_registry;
mod data;
mod metadata;

pub use config_registry::{ConfigRegistryClient, HttpConfigRegistryClient};
pub use data::{DataClient, HttpDataClient};
pub use metadata::{DeviceServiceRecord, HttpMetadataClient, MetadataClient, Schedule, ScheduleEvent};

/// Shared request timeout/retry helper used by all three clients:
/// attempts the call `attempts` times, sleeping `delay` after every
/// failed attempt, used for the ping-until-ready step in the lifecycle
/// orchestrator (spec.md §4.7, `CONFIG_LOADED → PLATFORM_READY`).
///
/// spec.md §8 scenario 6 pins the exact timing: `connectretries=3`
/// with `timeout=500ms` exhausts in "approximately 1.5s" -- three
/// attempts, a `timeout`-length pause after each, including the last
/// before giving up.
pub async fn retry<F, Fut, T>(attempts: u32, delay: std::time::Duration, mut f: F) -> adapter_api::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = adapter_api::Result<T>>,
{
    let mut last_err = None;

    for attempt in 0..attempts.max(1) {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "retryable call failed");
                last_err = Some(e);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_err.unwrap_or(adapter_api::Error::RemoteServerDown("exhausted retries".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn exhausts_after_connectretries_times_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();

        let start = Instant::now();
        let err = retry(3, Duration::from_millis(500), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(adapter_api::Error::RemoteServerDown("down".into()))
            }
        })
        .await
        .unwrap_err();

        let elapsed = start.elapsed();
        assert!(matches!(err, adapter_api::Error::RemoteServerDown(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // spec.md §8 scenario 6: ~1.5s for connectretries=3, timeout=500ms.
        assert!(elapsed >= Duration::from_millis(1400) && elapsed < Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn succeeds_without_sleeping_once_the_call_works() {
        let err_then_ok = Arc::new(AtomicUsize::new(0));
        let c = err_then_ok.clone();

        let result = retry(3, Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(adapter_api::Error::RemoteServerDown("down".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(err_then_ok.load(Ordering::SeqCst), 2);
    }
}
