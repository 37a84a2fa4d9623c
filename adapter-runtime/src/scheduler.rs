//! C7 — the scheduler: fires `ScheduledTask`s onto the worker pool
//! (C6) at a drift-corrected interval, per spec.md §4.6.

use crate::pool::WorkerPool;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type Action = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// `repeats == 0` means "fire forever", matching spec.md §4.6.
pub struct ScheduledTask {
    pub interval_ns: u64,
    pub start_ns: u64,
    pub repeats: u64,
    pub action: Action,
}

impl ScheduledTask {
    pub fn new<F, Fut>(interval_ns: u64, start_ns: u64, repeats: u64, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        ScheduledTask {
            interval_ns,
            start_ns,
            repeats,
            action: Arc::new(move || Box::pin(action())),
        }
    }
}

/// Owns one sleeper task per registered `ScheduledTask`, each
/// submitting its action onto the shared worker pool when due.
/// `start()` is idempotent; `stop()` cancels every sleeper and lets
/// anything already submitted to the pool finish on its own.
pub struct Scheduler {
    pool: Arc<WorkerPool>,
    tasks: Mutex<Vec<ScheduledTask>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Scheduler {
            pool,
            tasks: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub async fn add_task(&self, task: ScheduledTask) {
        self.tasks.lock().await.push(task);
    }

    /// Idempotent: a second call while already running is a no-op.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let mut handles = self.handles.lock().await;

        for task in tasks {
            let pool = self.pool.clone();
            handles.push(tokio::spawn(run_task(task, pool)));
        }
    }

    /// Cancels every sleeper. Submissions already handed to the pool
    /// before cancellation are left to complete; this only stops
    /// *future* firings.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}

async fn run_task(task: ScheduledTask, pool: Arc<WorkerPool>) {
    let mut next_due = task.start_ns;
    let mut fired: u64 = 0;

    loop {
        if task.repeats != 0 && fired >= task.repeats {
            return;
        }

        let now = now_ns();
        if next_due > now {
            tokio::time::sleep(std::time::Duration::from_nanos(next_due - now)).await;
        }

        let action = task.action.clone();
        pool.submit(async move { action().await }).await;

        fired += 1;
        // Drift correction: the next firing is anchored to the
        // previous due time plus the interval, never to "now" -- a
        // slow tick never triggers a catch-up burst, per spec.md §4.6.
        let now = now_ns();
        next_due = std::cmp::max(now, next_due + task.interval_ns);
    }
}

fn now_ns() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fires_bounded_number_of_times() {
        let pool = WorkerPool::new(2);
        let scheduler = Scheduler::new(pool);
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        scheduler
            .add_task(ScheduledTask::new(20_000_000, now_ns(), 3, move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .await;

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 3);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let pool = WorkerPool::new(1);
        let scheduler = Scheduler::new(pool);
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        scheduler
            .add_task(ScheduledTask::new(1_000_000_000, now_ns(), 1, move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .await;

        scheduler.start().await;
        scheduler.start().await;

        assert_eq!(scheduler.handles.lock().await.len(), 1);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_cancels_future_firings() {
        let pool = WorkerPool::new(1);
        let scheduler = Scheduler::new(pool);
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        scheduler
            .add_task(ScheduledTask::new(5_000_000, now_ns(), 0, move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .await;

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        scheduler.stop().await;

        let seen_after_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen_after_stop);
    }
}
