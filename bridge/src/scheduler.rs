//! The timeout scheduler: a single logical timer per stack that fires
//! `Stack::timeout()` whenever the stack has been idle for at least its
//! configured interval.
//!
//! Rather than a timer per layer, one task wakes on a fixed tick, reads
//! the whole chain's `last_activity` once, and only calls `timeout()`
//! when idle time has actually elapsed — a tick landing before the
//! interval is a no-op.

use dbgstack_core::Stack;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Default per-stack retransmit interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Drives `Stack::timeout()` off the stack's own activity clock.
pub struct Scheduler {
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawns the scheduler task. `shutdown` lets [`Scheduler::close`]-style
    /// teardown happen without leaking the task; the caller is expected to
    /// fire it via the same [`dbgstack_core::Shutdown`] the bridge uses.
    pub fn spawn(stack: Arc<Mutex<Stack>>, interval: Duration, shutdown: dbgstack_core::Shutdown) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut guard = stack.lock().await;
                        let idle = guard
                            .last_activity_instant()
                            .map(|instant| instant.elapsed() >= interval)
                            .unwrap_or(true);
                        if idle {
                            tracing::trace!("scheduler firing stack timeout");
                            guard.timeout();
                        }
                    }
                    _ = shutdown.wait_for_shutdown() => {
                        tracing::debug!("scheduler shutting down");
                        break;
                    }
                }
            }
        });
        Self { handle }
    }

    /// Waits for the scheduler task to stop, which happens once its
    /// `Shutdown` fires.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbgstack_core::layers::raw::RawLayer;
    use dbgstack_core::{Message, Shutdown};

    #[tokio::test]
    async fn fires_timeout_after_idle_interval() {
        let mut stack = Stack::new(vec![Box::new(RawLayer::new())]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
        stack.set_down(move |data| {
            let _ = tx.send(data);
        });
        stack.encode(Message::new(b"activity".to_vec()));
        let _ = rx.recv().await;

        let shared = Arc::new(Mutex::new(stack));
        let shutdown = Shutdown::new();
        let scheduler = Scheduler::spawn(shared.clone(), Duration::from_millis(20), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(80)).await;
        // RawLayer has no retransmit state, so timeout firing is invisible
        // directly, but we can at least assert the scheduler stays alive
        // and shuts down cleanly.
        shutdown.shut_down();
        scheduler.join().await;
    }
}
