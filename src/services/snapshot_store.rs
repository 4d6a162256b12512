use crate::error::PlatformError;
use crate::models::{GroupInviteSnapshot, GuildId};
use crate::platform::InviteSource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Last known complete invite list per guild
///
/// Snapshots are replaced wholesale; a failed fetch never clears or
/// mutates the stored snapshot.
pub struct InviteSnapshotStore {
    source: Arc<dyn InviteSource>,
    snapshots: RwLock<HashMap<GuildId, Arc<GroupInviteSnapshot>>>,
    unavailable: RwLock<HashSet<GuildId>>,
}

impl InviteSnapshotStore {
    pub fn new(source: Arc<dyn InviteSource>) -> Self {
        Self {
            source,
            snapshots: RwLock::new(HashMap::new()),
            unavailable: RwLock::new(HashSet::new()),
        }
    }

    /// Fetch the guild's invites and replace its snapshot
    ///
    /// Returns whether the snapshot was replaced. Failures are logged and
    /// leave the previous snapshot in place.
    pub async fn refresh(&self, guild_id: GuildId) -> bool {
        match self.fetch(guild_id).await {
            Some(snapshot) => {
                let count = snapshot.len();
                self.replace(guild_id, snapshot).await;
                debug!(%guild_id, count, "Updated cached invites");
                true
            }
            None => false,
        }
    }

    /// Fetch a fresh snapshot without storing it
    pub async fn fetch(&self, guild_id: GuildId) -> Option<Arc<GroupInviteSnapshot>> {
        if self.is_unavailable(guild_id).await {
            debug!(%guild_id, "Guild is unavailable, skipping invite fetch");
            return None;
        }

        match self.source.list_invites(guild_id).await {
            Ok(invites) => Some(Arc::new(GroupInviteSnapshot::new(invites))),
            Err(PlatformError::Unavailable(reason)) => {
                debug!(%guild_id, %reason, "Guild is unavailable, skipping invite fetch");
                None
            }
            Err(PlatformError::Permission(reason)) => {
                warn!(
                    %guild_id,
                    %reason,
                    "Bot does not have the required permissions to cache invites"
                );
                None
            }
            Err(e) => {
                warn!(%guild_id, "Failed to fetch invites: {}", e);
                None
            }
        }
    }

    /// Store `snapshot` as the guild's current truth
    pub async fn replace(&self, guild_id: GuildId, snapshot: Arc<GroupInviteSnapshot>) {
        self.snapshots.write().await.insert(guild_id, snapshot);
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<GroupInviteSnapshot>> {
        self.snapshots.read().await.get(&guild_id).cloned()
    }

    /// Whether a snapshot was ever stored, including an empty one
    pub async fn exists(&self, guild_id: GuildId) -> bool {
        self.snapshots.read().await.contains_key(&guild_id)
    }

    /// Drop the guild's snapshot, e.g. after the bot left it
    pub async fn forget(&self, guild_id: GuildId) {
        self.snapshots.write().await.remove(&guild_id);
        self.unavailable.write().await.remove(&guild_id);
    }

    /// Record a platform-side outage for the guild
    pub async fn set_unavailable(&self, guild_id: GuildId, unavailable: bool) {
        let mut guilds = self.unavailable.write().await;
        if unavailable {
            guilds.insert(guild_id);
        } else {
            guilds.remove(&guild_id);
        }
    }

    pub async fn is_unavailable(&self, guild_id: GuildId) -> bool {
        self.unavailable.read().await.contains(&guild_id)
    }

    pub async fn guild_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}
