//! The outer loop: worklist policy, one delivery per follower, capped retry,
//! persistence after every attempt and pacing between messages.

use crate::config::DispatchOptions;
use crate::delivery::{Deliver, DeliveryOutcome};
use crate::errors::Result;
use crate::store::{FailureLog, ProgressState, ProgressStore};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;

/// Discovered usernames minus those already messaged, first-seen order,
/// then `skip_first_n` dropped from the front, then capped at `max`.
pub fn build_worklist(
    discovered: &[String],
    progress: &ProgressState,
    skip_first_n: usize,
    max: Option<usize>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let pending: Vec<String> = discovered
        .iter()
        .filter(|u| !progress.is_messaged(u))
        .filter(|u| seen.insert(u.as_str()))
        .cloned()
        .collect();

    if skip_first_n > 0 {
        if skip_first_n >= pending.len() {
            tracing::warn!(
                skip_first_n,
                pending = pending.len(),
                "skip_first_n covers the whole worklist, nothing to process"
            );
        } else {
            tracing::info!(skip_first_n, "skipping first followers");
        }
    }

    let take = max.unwrap_or(usize::MAX);
    if let Some(max) = max {
        tracing::info!(max, "limiting followers processed");
    }
    pending.into_iter().skip(skip_first_n).take(take).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Delivered, confirmed or not.
    pub sent: u64,
    pub unconfirmed: u64,
    pub failed: u64,
    /// Stopped early on the shutdown signal.
    pub interrupted: bool,
}

pub struct Dispatcher<'a, D: Deliver + ?Sized> {
    courier: &'a mut D,
    store: &'a ProgressStore,
    options: &'a DispatchOptions,
    retry_backoff: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<'a, D: Deliver + ?Sized> Dispatcher<'a, D> {
    pub fn new(
        courier: &'a mut D,
        store: &'a ProgressStore,
        options: &'a DispatchOptions,
        retry_backoff: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            courier,
            store,
            options,
            retry_backoff,
            shutdown,
        }
    }

    /// Work through `worklist` in order. Per-follower failures are recorded and
    /// the loop moves on; only a failed save aborts the run.
    pub async fn run(
        &mut self,
        worklist: &[String],
        progress: &mut ProgressState,
        failures: &mut FailureLog,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let total = worklist.len();
        tracing::info!(total, "starting to message followers");

        for (i, username) in worklist.iter().enumerate() {
            if *self.shutdown.borrow() {
                tracing::warn!(remaining = total - i, "interrupted, stopping before next follower");
                summary.interrupted = true;
                break;
            }
            tracing::info!(username = %username, "processing follower {}/{}", i + 1, total);

            let outcome = self.attempt_with_retry(username).await;
            match outcome {
                DeliveryOutcome::Confirmed => {
                    progress.record_success(username, true);
                    summary.sent += 1;
                }
                DeliveryOutcome::Unconfirmed => {
                    progress.record_success(username, false);
                    summary.sent += 1;
                    summary.unconfirmed += 1;
                }
                DeliveryOutcome::Failed { .. } => {
                    progress.record_failure(failures, username);
                    summary.failed += 1;
                }
            }
            self.store.save(progress, failures)?;
            tracing::info!(
                username = %username,
                outcome = outcome.label(),
                success = progress.stats.success,
                failed = progress.stats.failed,
                "progress saved"
            );

            if i + 1 < total {
                let interval = self.options.dm_interval();
                tracing::info!("waiting {}s before next DM", interval.as_secs());
                if wait_or_shutdown(&mut self.shutdown, interval).await {
                    tracing::warn!(remaining = total - i - 1, "interrupted during pause");
                    summary.interrupted = true;
                    break;
                }
            }
        }
        Ok(summary)
    }

    /// At most two attempts: the second only when the first failed and
    /// `retry_failed` is set.
    async fn attempt_with_retry(&mut self, username: &str) -> DeliveryOutcome {
        let first = self.courier.deliver(username).await;
        if first.is_delivered() || !self.options.retry_failed {
            return first;
        }
        tracing::info!(username, backoff_secs = self.retry_backoff.as_secs_f64(), "retrying failed DM");
        if wait_or_shutdown(&mut self.shutdown, self.retry_backoff).await {
            return first;
        }
        self.courier.deliver(username).await
    }
}

/// Sleep for `duration` unless the shutdown flag goes up first. Returns whether
/// shutdown was requested. A dropped sender means no shutdown can arrive.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        if *shutdown.borrow() {
            return true;
        }
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    sleep.await;
                    return false;
                }
            }
        }
    }
}
