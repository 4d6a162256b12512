use super::resolver::AttributionResolver;
use super::scheduler::DeferredRefreshScheduler;
use super::sequencer::EventSequencer;
use super::snapshot_store::InviteSnapshotStore;
use crate::models::{DeletedInvite, GroupInviteSnapshot, GuildId, InviteDescriptor, Inviter, UserId};
use crate::platform::InviteSource;
use crate::repositories::AttributionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of one join resolution, with the snapshots it compared
#[derive(Debug, Clone)]
pub struct JoinResolution {
    pub guild_id: GuildId,
    pub member_id: UserId,
    pub inviter: Inviter,
    /// Snapshot held when the join acquired the guild lock
    pub before: Option<Arc<GroupInviteSnapshot>>,
    /// Fresh snapshot fetched for this join; `None` if the fetch failed
    pub after: Option<Arc<GroupInviteSnapshot>>,
}

/// Keeps per-guild invite snapshots current and attributes joins to inviters
pub struct InviteTracker {
    snapshots: Arc<InviteSnapshotStore>,
    sequencer: EventSequencer,
    scheduler: DeferredRefreshScheduler,
    resolver: AttributionResolver,
}

impl InviteTracker {
    pub fn new(
        source: Arc<dyn InviteSource>,
        attributions: Arc<dyn AttributionStore>,
        bot_id: UserId,
        delete_refresh_delay: Duration,
    ) -> Self {
        let snapshots = Arc::new(InviteSnapshotStore::new(source));

        Self {
            scheduler: DeferredRefreshScheduler::new(snapshots.clone(), delete_refresh_delay),
            snapshots,
            sequencer: EventSequencer::new(),
            resolver: AttributionResolver::new(bot_id, attributions),
        }
    }

    pub fn snapshots(&self) -> &InviteSnapshotStore {
        &self.snapshots
    }

    pub fn scheduler(&self) -> &DeferredRefreshScheduler {
        &self.scheduler
    }

    pub fn bot_id(&self) -> UserId {
        self.resolver.bot_id()
    }

    /// Cache invites for each guild, e.g. at startup
    pub async fn warm<I>(&self, guilds: I) -> usize
    where
        I: IntoIterator<Item = GuildId>,
    {
        debug!("Caching invites");
        let mut cached = 0;
        for guild_id in guilds {
            if self.snapshots.refresh(guild_id).await {
                cached += 1;
            }
        }
        cached
    }

    /// The guild came online or the bot joined it
    pub async fn on_guild_available(&self, guild_id: GuildId) {
        self.snapshots.set_unavailable(guild_id, false).await;
        self.snapshots.refresh(guild_id).await;
    }

    /// The guild is in a platform-side outage; refreshes are skipped until it returns
    pub async fn on_guild_unavailable(&self, guild_id: GuildId) {
        debug!(%guild_id, "Guild became unavailable");
        self.snapshots.set_unavailable(guild_id, true).await;
    }

    /// The bot left the guild
    ///
    /// Waits for an in-flight join so it cannot store its snapshot after
    /// the guild was forgotten.
    pub async fn on_guild_removed(&self, guild_id: GuildId) {
        self.sequencer
            .with_lock(guild_id, || async {
                self.scheduler.cancel(guild_id);
                self.snapshots.forget(guild_id).await;
            })
            .await;
        self.sequencer.remove(guild_id);
        debug!(%guild_id, "Forgot invites of removed guild");
    }

    pub async fn on_invite_created(&self, invite: &InviteDescriptor) {
        debug!(code = %invite.code, guild_id = %invite.guild_id, "Invite created");
        self.scheduler.refresh_now(invite.guild_id).await;
    }

    /// Schedule a delayed refresh so a pending join can still diff against the invite
    pub fn on_invite_deleted(&self, invite: &DeletedInvite) {
        debug!(
            code = %invite.code,
            guild_id = %invite.guild_id,
            "Invite deleted, waiting for potential member join event"
        );
        self.scheduler.schedule_refresh(invite.guild_id);
    }

    /// Resolve who invited `member_id` into `guild_id`
    pub async fn resolve_join(&self, guild_id: GuildId, member_id: UserId) -> Inviter {
        self.resolve_join_detailed(guild_id, member_id).await.inviter
    }

    /// Resolve a join and report the snapshots used
    ///
    /// Runs under the guild's lock: the "before" snapshot of one join is
    /// always the "after" snapshot of the previous one, unless a refresh
    /// outside any join replaced it in between.
    pub async fn resolve_join_detailed(&self, guild_id: GuildId, member_id: UserId) -> JoinResolution {
        self.sequencer
            .with_lock(guild_id, || async {
                let mut resolution = JoinResolution {
                    guild_id,
                    member_id,
                    inviter: Inviter::Unknown,
                    before: None,
                    after: None,
                };

                let Some(before) = self.snapshots.get(guild_id).await else {
                    debug!(%guild_id, %member_id, "No cached invites for guild, skipping resolution");
                    return resolution;
                };
                resolution.before = Some(before.clone());

                let Some(after) = self.snapshots.fetch(guild_id).await else {
                    info!(%guild_id, %member_id, "Member joined but invites could not be fetched");
                    return resolution;
                };

                resolution.inviter = self.resolver.resolve(&before, &after).await;
                self.snapshots.replace(guild_id, after.clone()).await;
                resolution.after = Some(after);

                match resolution.inviter {
                    Inviter::User(inviter) => {
                        info!(%guild_id, %member_id, %inviter, "Member joined, inviter resolved")
                    }
                    Inviter::Unknown => {
                        info!(%guild_id, %member_id, "Member joined but could not resolve inviter")
                    }
                }

                resolution
            })
            .await
    }

    /// Abandon pending deferred refreshes
    pub fn shutdown(&self) {
        let pending = self.scheduler.pending_count();
        self.scheduler.shutdown();
        if pending > 0 {
            debug!(pending, "Abandoned pending invite refreshes");
        }
    }
}
