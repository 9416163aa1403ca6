//! # Interruptible Sleep
//!
//! The controller's only two suspension points are this primitive and
//! network I/O. `InterruptibleSleep` lets the poll loop sleep for the
//! configured interval while still waking immediately when a watch task
//! observes a `ProjectMapping` change, without losing a wakeup that arrives
//! before the sleep call starts.

use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;

/// A sleep that can be woken early, exactly once per `sleep()` call, by a
/// call to `wake()` from any other task.
///
/// `wake()` is idempotent and latches: if it's called before `sleep()` is
/// in progress, the next `sleep()` returns immediately instead of the
/// wakeup being lost. `tokio::sync::Notify` already guarantees this for a
/// single pending `notified()` future, which is exactly the semantics this
/// type needs — it exists as a named wrapper so the intent reads clearly
/// at call sites.
#[derive(Clone)]
pub struct InterruptibleSleep {
    notify: Arc<Notify>,
}

impl InterruptibleSleep {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
        }
    }

    /// Sleep for `duration`, or return early if `wake()` is called first
    /// (including a `wake()` that already happened since the last `sleep()`
    /// returned).
    pub async fn sleep(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.notify.notified() => {}
        }
    }

    /// Wake a pending (or the next) `sleep()` call early.
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}

impl Default for InterruptibleSleep {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn sleep_runs_full_duration_without_wake() {
        let sleeper = InterruptibleSleep::new();
        let start = Instant::now();
        sleeper.sleep(Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn wake_interrupts_a_pending_sleep() {
        let sleeper = InterruptibleSleep::new();
        let waker = sleeper.clone();
        let start = Instant::now();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waker.wake();
        });

        sleeper.sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn wake_before_sleep_is_not_lost() {
        let sleeper = InterruptibleSleep::new();
        sleeper.wake();

        let start = Instant::now();
        sleeper.sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
