//! # Poll Loop
//!
//! Drives the reconciliation engine on a fixed interval, woken early
//! whenever the cluster watch observes a `ProjectMapping` change. This is
//! the only place in the crate that owns a `tokio::spawn`'d background
//! task outside of the reconciliation tick itself — deliberately, so the
//! reconciler stays single-threaded and its control flow easy to follow.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::gateway::ClusterGateway;
use crate::sleep::InterruptibleSleep;

/// Owns the poll interval, the interruptible sleep, and the background
/// watch task that wakes it.
pub struct PollLoop<G> {
    interval: Duration,
    gateway: Arc<G>,
    sleeper: InterruptibleSleep,
    shutdown: Arc<Notify>,
}

impl<G> PollLoop<G>
where
    G: ClusterGateway + 'static,
{
    pub fn new(interval_secs: u64, gateway: Arc<G>) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            gateway,
            sleeper: InterruptibleSleep::new(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// A handle that can be used to stop the loop from outside `run()`
    /// (tests use this; the binary relies on the internal Ctrl-C listener
    /// instead).
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run `body` once immediately, then on every `interval`, until either
    /// the process receives Ctrl-C or `shutdown_handle().notify_one()` is
    /// called.
    ///
    /// Each iteration opens a fresh `ProjectMapping` watch, spawns a reader
    /// task that wakes the sleeper on the first change notice, runs `body`,
    /// sleeps (cut short by that wakeup, or by a notice that arrived before
    /// this iteration's sleep even started), then tears the watch task down
    /// — guaranteeing the watcher is finished exactly once per iteration
    /// (§4.7, §5) whether or not an event ever arrived.
    pub async fn run<F, Fut>(self, body: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let ctrl_c_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl-C, shutting down");
                ctrl_c_shutdown.notify_one();
            }
        });

        loop {
            let watch_task = self.spawn_watch_task();

            let tick = async {
                body().await;
                self.sleeper.sleep(self.interval).await;
            };

            let shutting_down = tokio::select! {
                () = tick => false,
                () = self.shutdown.notified() => true,
            };

            // Aborting a task that already returned is a no-op; this is the
            // "finish after a single event (or at the next tick)" path for
            // an iteration where no event ever arrived. Awaiting the handle
            // (ignoring the result either way) ensures the watch is actually
            // torn down before the next iteration opens a new one.
            watch_task.abort();
            let _ = watch_task.await;

            if shutting_down {
                break;
            }
        }
    }

    /// Open one watch session and spawn the task that reads a single change
    /// notice from it before finishing it. Returns a handle the caller
    /// aborts (idempotently) once the iteration's tick is done.
    fn spawn_watch_task(&self) -> tokio::task::JoinHandle<()> {
        let gateway = self.gateway.clone();
        let sleeper = self.sleeper.clone();
        tokio::spawn(async move {
            let mut watch = match gateway.watch_project_mappings().await {
                Ok(watch) => watch,
                Err(e) => {
                    warn!(error = %e, "failed to start ProjectMapping watch");
                    return;
                }
            };
            if watch.next_change().await.is_some() {
                sleeper.wake();
            }
            watch.finish();
        })
    }
}
