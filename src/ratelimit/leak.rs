//! Background leak task.
//!
//! Every `window / rate` the task sweeps the store: each non-empty bucket
//! gives back one unit and each empty bucket is deleted. The task runs on the
//! tokio runtime it was started from and stops when its cancellation token
//! fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::BucketStore;
use crate::error::{KeybucketError, Result};

/// Starts leak tasks for bucket stores.
pub struct LeakScheduler;

impl LeakScheduler {
    /// Spawn the leak loop for `store` on the current tokio runtime.
    ///
    /// The first tick fires one leak interval after this call.
    pub fn start(store: Arc<BucketStore>) -> Result<LeakHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| KeybucketError::NoRuntime)?;

        let interval = store.rate().leak_interval();
        let cancel = CancellationToken::new();
        let task = runtime.spawn(run_leak_loop(store, interval, cancel.clone()));

        Ok(LeakHandle {
            cancel,
            task,
            interval,
        })
    }
}

/// Handle to a running leak task.
///
/// Dropping the handle detaches the task; call [`LeakHandle::shutdown`] or
/// [`LeakHandle::cancel`] to stop it.
#[derive(Debug)]
pub struct LeakHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    interval: Duration,
}

impl LeakHandle {
    /// Time between ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Request the task to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that stops the task when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Leak task ended abnormally");
        }
    }
}

async fn run_leak_loop(store: Arc<BucketStore>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_ms = interval.as_millis() as u64,
        rate = store.rate().rate(),
        max_keys = store.max_keys(),
        "Leak task started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Leak task shutting down");
                break;
            }
            _ = ticker.tick() => {
                let report = store.leak();
                debug!(
                    leaked = report.leaked,
                    removed = report.removed,
                    tracked = report.tracked,
                    "Leak tick"
                );
            }
        }
    }
}
