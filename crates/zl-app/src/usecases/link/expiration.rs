//! Pairing-code countdown
//!
//! One timer per pairing cycle, owned by the orchestrator session. It
//! ticks once per second against a remaining counter and invokes its
//! expiry callback exactly once, then stops itself. `reset` restores
//! the counter mid-flight (used when a fresh code replaces the old one
//! before the old countdown lapsed); `stop` is idempotent and aborts
//! the underlying task so teardown never leaks a timer.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::sleep;

pub struct ExpirationTimer {
    duration_secs: u64,
    remaining: Arc<AtomicU64>,
    fired: Arc<AtomicBool>,
    handle: Option<AbortHandle>,
}

impl ExpirationTimer {
    pub fn new(duration: Duration) -> Self {
        let duration_secs = duration.as_secs().max(1);
        Self {
            duration_secs,
            remaining: Arc::new(AtomicU64::new(duration_secs)),
            fired: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Arms the countdown. A previously armed countdown on this timer
    /// is aborted first, so at most one task ticks at a time.
    pub fn start<F, Fut>(&mut self, on_expire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        self.stop();
        self.remaining.store(self.duration_secs, Ordering::SeqCst);
        self.fired.store(false, Ordering::SeqCst);

        let remaining = Arc::clone(&self.remaining);
        let fired = Arc::clone(&self.fired);
        let mut on_expire = Some(on_expire);

        let handle = tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(1)).await;
                let left = remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                        Some(v.saturating_sub(1))
                    })
                    .unwrap_or(0)
                    .saturating_sub(1);
                if left == 0 {
                    if !fired.swap(true, Ordering::SeqCst) {
                        if let Some(cb) = on_expire.take() {
                            cb().await;
                        }
                    }
                    break;
                }
            }
        });

        self.handle = Some(handle.abort_handle());
    }

    /// Restores the counter to the configured duration without
    /// re-spawning; only meaningful while the countdown is running.
    pub fn reset(&self) {
        self.remaining.store(self.duration_secs, Ordering::SeqCst);
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for ExpirationTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
