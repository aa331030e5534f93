//! In-memory countdowns keyed by run id.
//!
//! At most one live countdown exists per run. Each countdown remembers the
//! run version it was armed for; arming replaces (and cancels) an entry for
//! the same or an older version but never a newer one. When the timer
//! elapses the task must *claim* its entry before running the expiry
//! callback. Claiming and cancelling both take the map shard lock, so
//! exactly one of them wins.
//!
//! A claimed entry stays in the map, marked as firing, until the callback
//! returns or replaces it by re-arming. [`armed_version`] keeps reporting
//! it during that window so a rescan does not arm a duplicate.
//!
//! [`armed_version`]: CountdownRegistry::armed_version

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// Passed to the expiry callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub run_id: Uuid,
    /// Run version the countdown was armed for.
    pub armed_version: i64,
    pub after: Duration,
}

#[derive(Debug)]
struct Entry {
    ticket: u64,
    armed_version: i64,
    token: CancellationToken,
    firing: bool,
}

#[derive(Debug)]
struct Inner {
    entries: DashMap<Uuid, Entry>,
    next_ticket: AtomicU64,
    root: CancellationToken,
    tracker: TaskTracker,
}

#[derive(Debug, Clone)]
pub struct CountdownRegistry {
    inner: Arc<Inner>,
}

impl Default for CountdownRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                next_ticket: AtomicU64::new(1),
                root: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Arm a countdown for `run_id` that calls `on_expire` after `after`
    /// unless cancelled first.
    ///
    /// Returns `false` without arming when a countdown for a newer run
    /// version is live, or after [`shutdown`](Self::shutdown).
    pub fn arm<F, Fut>(
        &self,
        run_id: Uuid,
        armed_version: i64,
        after: Duration,
        on_expire: F,
    ) -> bool
    where
        F: FnOnce(Expired) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.inner.root.is_cancelled() {
            tracing::debug!(run_id = %run_id, "countdown registry shut down, not arming");
            return false;
        }

        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.root.child_token();
        let entry = Entry {
            ticket,
            armed_version,
            token: token.clone(),
            firing: false,
        };
        match self.inner.entries.entry(run_id) {
            MapEntry::Occupied(mut live) => {
                if live.get().armed_version > armed_version {
                    tracing::debug!(
                        run_id = %run_id,
                        armed_version,
                        live_version = live.get().armed_version,
                        "newer countdown already armed"
                    );
                    return false;
                }
                let previous = live.insert(entry);
                previous.token.cancel();
            }
            MapEntry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
        tracing::debug!(run_id = %run_id, armed_version, after_secs = after.as_secs(), "countdown armed");

        let registry = self.clone();
        self.inner.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::trace!(run_id = %run_id, "countdown cancelled");
                    return;
                }
                _ = tokio::time::sleep(after) => {}
            }

            if !registry.claim(run_id, ticket) {
                tracing::trace!(run_id = %run_id, "countdown lost race to cancellation");
                return;
            }
            tracing::info!(run_id = %run_id, after_secs = after.as_secs(), "countdown elapsed");
            on_expire(Expired {
                run_id,
                armed_version,
                after,
            })
            .await;
            registry.release(run_id, ticket);
        });
        true
    }

    /// Cancel the live countdown for `run_id`. Returns `false` when there was
    /// none, including when it already fired.
    pub fn cancel(&self, run_id: &Uuid) -> bool {
        match self.inner.entries.remove(run_id) {
            Some((_, entry)) if !entry.firing => {
                entry.token.cancel();
                tracing::debug!(run_id = %run_id, "countdown cancelled");
                true
            }
            _ => false,
        }
    }

    /// Cancel the live countdown only if it was armed for a version older
    /// than `version`.
    pub fn cancel_before(&self, run_id: &Uuid, version: i64) -> bool {
        match self
            .inner
            .entries
            .remove_if(run_id, |_, entry| entry.armed_version < version)
        {
            Some((_, entry)) if !entry.firing => {
                entry.token.cancel();
                tracing::debug!(run_id = %run_id, armed_version = entry.armed_version, "countdown cancelled");
                true
            }
            _ => false,
        }
    }

    /// Whether a countdown for `run_id` is waiting to elapse.
    pub fn is_armed(&self, run_id: &Uuid) -> bool {
        self.inner
            .entries
            .get(run_id)
            .is_some_and(|entry| !entry.firing)
    }

    /// Version of the countdown tracked for `run_id`, waiting or firing.
    pub fn armed_version(&self, run_id: &Uuid) -> Option<i64> {
        self.inner.entries.get(run_id).map(|e| e.armed_version)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Cancel every countdown and wait for running expiry callbacks.
    pub async fn shutdown(&self) {
        self.inner.root.cancel();
        self.inner.entries.clear();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        tracing::debug!("countdown registry shut down");
    }

    /// Mark the entry as firing if it is still the one armed with `ticket`
    /// and has not been cancelled.
    fn claim(&self, run_id: Uuid, ticket: u64) -> bool {
        match self.inner.entries.get_mut(&run_id) {
            Some(mut entry)
                if entry.ticket == ticket && !entry.firing && !entry.token.is_cancelled() =>
            {
                entry.firing = true;
                true
            }
            _ => false,
        }
    }

    /// Drop the firing entry unless the callback replaced it.
    fn release(&self, run_id: Uuid, ticket: u64) {
        self.inner
            .entries
            .remove_if(&run_id, |_, entry| entry.ticket == ticket);
    }
}
