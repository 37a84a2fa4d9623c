//! A small writer-preference reader-writer lock.
//!
//! `tokio::sync::RwLock` is already fair in FIFO order, but the
//! registry (C2) needs an explicit guarantee that a *burst* of
//! concurrent `selector=all` reads can never starve a pending
//! discovery or callback write: as soon as one writer is waiting, no
//! *new* reader may jump the queue, even if readers keep arriving
//! faster than the writer can be scheduled. That's writer preference,
//! not just FIFO fairness, so it's spelled out here rather than reused
//! from `tokio::sync`.
//!
//! Built from the same primitives (`tokio::sync::Notify`) the rest of
//! this workspace already depends on.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use tokio::sync::Notify;

struct State {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

pub struct FairRwLock<T> {
    state: Mutex<State>,
    readers_notify: Notify,
    writer_notify: Notify,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever handed out through `ReadGuard`
// (shared) or `WriteGuard` (exclusive), both of which are gated by
// `state`, exactly as `std::sync::RwLock` gates its own data.
unsafe impl<T: Send> Send for FairRwLock<T> {}
unsafe impl<T: Send> Sync for FairRwLock<T> {}

impl<T> FairRwLock<T> {
    pub fn new(value: T) -> Self {
        FairRwLock {
            state: Mutex::new(State {
                readers: 0,
                writer: false,
                waiting_writers: 0,
            }),
            readers_notify: Notify::new(),
            writer_notify: Notify::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub async fn read(&self) -> ReadGuard<'_, T> {
        loop {
            let notified = self.readers_notify.notified();

            {
                let mut s = self.state.lock().unwrap();

                if !s.writer && s.waiting_writers == 0 {
                    s.readers += 1;
                    return ReadGuard { lock: self };
                }
            }

            notified.await;
        }
    }

    pub async fn write(&self) -> WriteGuard<'_, T> {
        {
            let mut s = self.state.lock().unwrap();
            s.waiting_writers += 1;
        }

        loop {
            let notified = self.writer_notify.notified();

            {
                let mut s = self.state.lock().unwrap();

                if !s.writer && s.readers == 0 {
                    s.writer = true;
                    s.waiting_writers -= 1;
                    return WriteGuard { lock: self };
                }
            }

            notified.await;
        }
    }

    fn release_read(&self) {
        let mut s = self.state.lock().unwrap();

        s.readers -= 1;
        if s.readers == 0 && s.waiting_writers > 0 {
            drop(s);
            self.writer_notify.notify_one();
        }
    }

    fn release_write(&self) {
        let mut s = self.state.lock().unwrap();

        s.writer = false;

        let wake_writer = s.waiting_writers > 0;

        drop(s);

        if wake_writer {
            self.writer_notify.notify_one();
        } else {
            self.readers_notify.notify_waiters();
        }
    }
}

pub struct ReadGuard<'a, T> {
    lock: &'a FairRwLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

pub struct WriteGuard<'a, T> {
    lock: &'a FairRwLock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn readers_share_access() {
        let lock = Arc::new(FairRwLock::new(0));

        let g1 = lock.read().await;
        let g2 = lock.read().await;

        assert_eq!(*g1, 0);
        assert_eq!(*g2, 0);
    }

    #[tokio::test]
    async fn writer_excludes_readers() {
        let lock = Arc::new(FairRwLock::new(0));
        let mut w = lock.write().await;

        *w = 42;
        drop(w);

        let r = lock.read().await;
        assert_eq!(*r, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiting_writer_blocks_new_readers() {
        let lock = Arc::new(FairRwLock::new(0usize));
        let order = Arc::new(Mutex::new(Vec::new()));

        // Hold a read lock so the writer has to queue.
        let first_reader = lock.read().await;

        let w_lock = lock.clone();
        let w_order = order.clone();
        let writer = tokio::spawn(async move {
            let mut g = w_lock.write().await;
            w_order.lock().unwrap().push("writer");
            *g += 1;
        });

        // Give the writer task a chance to register as waiting.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let late_reader_lock = lock.clone();
        let late_order = order.clone();
        let late_reader = tokio::spawn(async move {
            let _g = late_reader_lock.read().await;
            late_order.lock().unwrap().push("late reader");
        });

        // Release the original reader; the queued writer must run
        // before the late reader, even though the late reader has been
        // waiting on the lock too.
        drop(first_reader);

        writer.await.unwrap();
        late_reader.await.unwrap();

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec!["writer", "late reader"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_readers_then_writer_then_many_readers() {
        let lock = Arc::new(FairRwLock::new(0usize));
        let completed = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let l = lock.clone();
            let c = completed.clone();
            tasks.push(tokio::spawn(async move {
                let _g = l.read().await;
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(completed.load(Ordering::SeqCst), 16);

        {
            let mut w = lock.write().await;
            *w += 1;
        }

        assert_eq!(*lock.read().await, 1);
    }
}
