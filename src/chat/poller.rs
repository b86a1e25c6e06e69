//! Fixed-interval conversation refresh.
//!
//! At most one refresh task exists per `Poller`: `restart` aborts and awaits
//! the previous task before spawning the next one.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Default)]
pub struct Poller {
    slot: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicUsize>,
}

/// Counts a live refresh task; released when the task's future is dropped.
struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Poller {
    /// Stop the current task (if any) and start calling `tick` now and every `period`.
    pub async fn restart<F, Fut>(&self, period: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
            let _ = previous.await;
        }

        let guard = RunningGuard::new(Arc::clone(&self.running));
        *slot = Some(tokio::spawn(async move {
            let _guard = guard;
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        }));
    }

    /// Stop the current task and wait for it to finish.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
            let _ = previous.await;
        }
    }

    /// Number of refresh tasks currently alive.
    pub fn active(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(h) = self.slot.get_mut().take() {
            h.abort();
        }
    }
}
