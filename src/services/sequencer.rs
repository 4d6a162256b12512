use crate::models::GuildId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Per-guild mutual exclusion for join resolution
///
/// Locks are created lazily; guilds never block each other.
#[derive(Default)]
pub struct EventSequencer {
    locks: Mutex<HashMap<GuildId, Arc<AsyncMutex<()>>>>,
}

impl EventSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, guild_id: GuildId) -> Arc<AsyncMutex<()>> {
        // A poisoned table only means another task panicked while inserting.
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(guild_id).or_default().clone()
    }

    /// Run `f` while holding the guild's lock
    ///
    /// The lock is released when `f` completes, fails, panics or is
    /// cancelled. Waiters are granted the lock in FIFO order.
    pub async fn with_lock<F, Fut, T>(&self, guild_id: GuildId, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(guild_id);
        let _guard = lock.lock().await;
        f().await
    }

    /// Drop the lock entry of a guild the bot left
    ///
    /// The entry stays while any task holds or waits on it, so later
    /// callers keep queueing behind them on the same lock. Returns whether
    /// the entry was dropped.
    pub fn remove(&self, guild_id: GuildId) -> bool {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match locks.get(&guild_id) {
            Some(lock) if Arc::strong_count(lock) == 1 => {
                locks.remove(&guild_id);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_same_guild_is_serialized() {
        let sequencer = Arc::new(EventSequencer::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let sequencer = sequencer.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            handles.push(tokio::spawn(async move {
                sequencer
                    .with_lock(GuildId::new(1), || async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(sequencer.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_guilds_do_not_block() {
        let sequencer = Arc::new(EventSequencer::new());
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                sequencer
                    .with_lock(GuildId::new(1), || async {
                        entered_tx.send(()).unwrap();
                        release_rx.await.unwrap();
                    })
                    .await
            })
        };
        entered_rx.await.unwrap();

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            sequencer.with_lock(GuildId::new(2), || async { 7 }),
        )
        .await;
        assert_eq!(other.unwrap(), 7);

        release_tx.send(()).unwrap();
        holder.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_released_after_panic() {
        let sequencer = Arc::new(EventSequencer::new());

        let failed = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                sequencer
                    .with_lock(GuildId::new(1), || async { panic!("resolution blew up") })
                    .await
            })
        };
        assert!(failed.await.is_err());

        let value = sequencer.with_lock(GuildId::new(1), || async { "still usable" }).await;
        assert_eq!(value, "still usable");
    }

    #[tokio::test]
    async fn test_remove_keeps_lock_that_is_still_held() {
        let sequencer = Arc::new(EventSequencer::new());
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                sequencer
                    .with_lock(GuildId::new(1), || async {
                        entered_tx.send(()).unwrap();
                        release_rx.await.unwrap();
                    })
                    .await
            })
        };
        entered_rx.await.unwrap();

        assert!(!sequencer.remove(GuildId::new(1)));
        assert_eq!(sequencer.len(), 1);

        release_tx.send(()).unwrap();
        holder.await.unwrap();

        assert!(sequencer.remove(GuildId::new(1)));
        assert!(sequencer.is_empty());
    }
}
