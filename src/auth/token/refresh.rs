//! Background token refresh scheduling.
//!
//! Keeps the [`TokenCache`](crate::auth::token::TokenCache) warm without
//! user-visible loading states. Refreshes fire:
//!
//! - once immediately when the scheduler is spawned (covers first paint),
//! - on a fixed 45 second interval,
//! - on every [`RefreshTrigger`] forwarded from the page (window focus,
//!   document becoming visible).
//!
//! Overlapping refreshes are allowed: each acquisition is spawned as its
//! own task and the cache resolves races by last-write-wins. Dropping the
//! [`RefreshHandle`] aborts the scheduling loop; in-flight acquisitions are
//! not aborted, their results simply land in the cache or are discarded.

use crate::auth::token::TokenAcquirer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Interval between silent background refreshes.
///
/// Deliberately inside the platform's ~60 second token TTL so the cache
/// never holds a token older than its lifetime for long.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(45);

/// Events from the embedding page that should trigger an early refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// The window regained focus.
    FocusGained,
    /// The document became visible again (tab switch back).
    BecameVisible,
}

/// Spawns and owns the background refresh loop.
pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Spawns the refresh loop with the default [`REFRESH_INTERVAL`].
    #[must_use]
    pub fn spawn(acquirer: Arc<TokenAcquirer>) -> RefreshHandle {
        Self::spawn_with_interval(acquirer, REFRESH_INTERVAL)
    }

    /// Spawns the refresh loop with a custom interval (test seam).
    #[must_use]
    pub fn spawn_with_interval(acquirer: Arc<TokenAcquirer>, interval: Duration) -> RefreshHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<RefreshTrigger>(16);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // A missed tick (suspended tab, busy runtime) should not burst
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    // First tick completes immediately: the mount-time warm-up
                    _ = ticker.tick() => {
                        trace!("interval refresh tick");
                        Self::refresh(Arc::clone(&acquirer));
                    }
                    trigger = trigger_rx.recv() => {
                        match trigger {
                            Some(trigger) => {
                                debug!(?trigger, "event-driven token refresh");
                                Self::refresh(Arc::clone(&acquirer));
                            }
                            // All senders gone: the owning scope unmounted
                            None => break,
                        }
                    }
                }
            }
        });

        RefreshHandle { trigger_tx, task }
    }

    /// Fires one silent acquisition as a detached task.
    ///
    /// The result is discarded here; the acquisition's only observable
    /// effect is its cache write.
    fn refresh(acquirer: Arc<TokenAcquirer>) {
        tokio::spawn(async move {
            let _ = acquirer.acquire(true).await;
        });
    }
}

/// Handle owning a running refresh loop.
///
/// Dropping the handle (the "unmount") aborts the loop.
#[derive(Debug)]
pub struct RefreshHandle {
    trigger_tx: mpsc::Sender<RefreshTrigger>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Forwards a page event to the refresh loop.
    ///
    /// Returns `false` if the loop is gone or the trigger queue is full
    /// (a full queue means refreshes are already pending, so dropping the
    /// trigger loses nothing).
    pub fn trigger(&self, trigger: RefreshTrigger) -> bool {
        self.trigger_tx.try_send(trigger).is_ok()
    }

    /// Returns `true` while the refresh loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the refresh loop.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
