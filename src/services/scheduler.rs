use super::snapshot_store::InviteSnapshotStore;
use crate::models::GuildId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

/// Default delay between an invite deletion and the refresh it triggers
pub const DEFAULT_DELETE_REFRESH_DELAY: Duration = Duration::from_secs(1);

/// Delays snapshot refreshes after invite deletions
///
/// The platform can report that an invite was deleted (because it reached
/// its use limit) before it reports the join that consumed it. Refreshing
/// right away would drop the invite from the snapshot before the join
/// handler gets to diff against it.
///
/// Every deletion gets its own refresh, `delay` after it arrived. A steady
/// stream of deletions therefore still refreshes the guild once per
/// deletion. Refreshes still pending at shutdown are abandoned.
pub struct DeferredRefreshScheduler {
    store: Arc<InviteSnapshotStore>,
    delay: Duration,
    pending: Arc<Mutex<HashMap<GuildId, HashMap<u64, JoinHandle<()>>>>>,
    next_ticket: AtomicU64,
}

impl DeferredRefreshScheduler {
    pub fn new(store: Arc<InviteSnapshotStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Refresh the guild's snapshot after the configured delay
    pub fn schedule_refresh(&self, guild_id: GuildId) {
        self.schedule_refresh_after(guild_id, self.delay);
    }

    /// Refresh the guild's snapshot after `delay`
    ///
    /// Earlier pending refreshes of the guild keep their own deadlines.
    pub fn schedule_refresh_after(&self, guild_id: GuildId, delay: Duration) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let store = self.store.clone();
        let pending = self.pending.clone();

        // Hold the table while spawning so the task cannot finish and
        // clear its entry before it is inserted.
        let mut table = lock(&self.pending);
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            store.refresh(guild_id).await;

            let mut table = lock(&pending);
            if let Some(tickets) = table.get_mut(&guild_id) {
                tickets.remove(&ticket);
                if tickets.is_empty() {
                    table.remove(&guild_id);
                }
            }
        });

        let tickets = table.entry(guild_id).or_default();
        tickets.insert(ticket, handle);
        debug!(%guild_id, pending = tickets.len(), ?delay, "Scheduled invite refresh");
    }

    /// Refresh immediately; creations carry no evidence-loss risk
    pub async fn refresh_now(&self, guild_id: GuildId) -> bool {
        self.store.refresh(guild_id).await
    }

    /// Drop a guild's pending refreshes without running them
    pub fn cancel(&self, guild_id: GuildId) -> bool {
        match lock(&self.pending).remove(&guild_id) {
            Some(tickets) => {
                for (_, handle) in tickets {
                    handle.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, guild_id: GuildId) -> bool {
        lock(&self.pending).contains_key(&guild_id)
    }

    /// Number of refreshes not yet run, across all guilds
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).values().map(HashMap::len).sum()
    }

    /// Abandon every pending refresh
    pub fn shutdown(&self) {
        let mut table = lock(&self.pending);
        for (_, tickets) in table.drain() {
            for (_, handle) in tickets {
                handle.abort();
            }
        }
    }
}

impl Drop for DeferredRefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
