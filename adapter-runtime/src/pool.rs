//! C6 — the fixed-size worker pool that backs event publishing (C5),
//! the scheduler (C7), and `selector=all` dispatcher fan-out (C4).
//!
//! Built the same way the teacher builds its own background task
//! plumbing: an unbounded `tokio::sync::mpsc` channel feeding a fixed
//! set of worker tasks, rather than a dedicated thread-pool crate.
//! Submission is non-blocking (the channel is unbounded); there is no
//! priority and no per-task cancellation, matching spec.md §4.5.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

pub const DEFAULT_WORKERS: usize = 8;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A fixed-size FIFO worker pool. Clone and share via `Arc`; `submit`
/// never blocks the caller.
pub struct WorkerPool {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `worker_count` tasks (falls back to [`DEFAULT_WORKERS`]
    /// if `0` is given) pulling from one shared FIFO queue.
    pub fn new(worker_count: usize) -> Arc<Self> {
        let worker_count = if worker_count == 0 { DEFAULT_WORKERS } else { worker_count };
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let rx = rx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match job {
                        Some(job) => job.await,
                        None => {
                            tracing::debug!(worker = id, "worker pool queue closed, exiting");
                            break;
                        }
                    }
                }
            }));
        }

        Arc::new(WorkerPool {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    /// Enqueues `job`. Non-blocking: returns immediately whether or not
    /// a worker is currently idle. Silently dropped (with a log) if the
    /// pool has already been shut down.
    pub async fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tx = self.tx.lock().await;
        match tx.as_ref() {
            Some(tx) if tx.send(Box::pin(job)).is_ok() => {}
            _ => tracing::warn!("worker pool submission dropped: pool already shut down"),
        }
    }

    /// Graceful shutdown: stop accepting new work implicitly (callers
    /// must stop calling `submit`), drain everything already queued,
    /// then join every worker.
    pub async fn shutdown(&self) {
        self.close_and_join().await;
    }

    /// Forced shutdown: per spec.md §4.5/§4.7, abandon whatever is
    /// still queued rather than draining it. Closes the channel so no
    /// further submissions are accepted, then aborts every worker —
    /// a task blocked on `job.await` is cancelled at its next await
    /// point rather than being allowed to pull the rest of the queue,
    /// which is the "no hard interrupt" abandonment spec.md §5 describes.
    pub async fn shutdown_forced(&self) {
        self.tx.lock().await.take();

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
    }

    async fn close_and_join(&self) {
        // Dropping the sender closes the channel; workers exit their
        // loop once `recv` returns `None` after draining.
        self.tx.lock().await.take();

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn submitted_jobs_all_run() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = counter.clone();
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        }

        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn shutdown_drains_pending_work() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = counter.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        }

        pool.shutdown().await;

        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn forced_shutdown_abandons_queued_work() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        // Occupy the single worker with a long-running job, then queue
        // a second job behind it that would increment the counter if it
        // ever ran.
        let counter_busy = counter.clone();
        pool.submit(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            counter_busy.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        let counter_queued = counter.clone();
        pool.submit(async move {
            counter_queued.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.shutdown_forced().await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_worker_count_used_when_zero_requested() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.workers.lock().await.len(), DEFAULT_WORKERS);
    }
}
