use crate::platform::GatewayEvent;
use crate::services::{InviteTracker, JoinLog};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Background task that routes gateway events to the invite tracker
///
/// Joins and refreshes run in their own tasks so a slow guild never holds
/// up events for other guilds; per-guild ordering of joins comes from the
/// tracker's lock.
pub struct EventDispatcher {
    tracker: Arc<InviteTracker>,
    join_log: Arc<JoinLog>,
}

impl EventDispatcher {
    pub fn new(tracker: Arc<InviteTracker>, join_log: Arc<JoinLog>) -> Self {
        Self { tracker, join_log }
    }

    /// Consume events until every sender is dropped
    pub async fn start(self, mut events: mpsc::Receiver<GatewayEvent>) {
        info!("Event dispatcher started");

        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }

        info!("Event channel closed, dispatcher stopping");
    }

    fn dispatch(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { user_id, guilds } => {
                info!(%user_id, guilds = guilds.len(), "Gateway session ready");
            }
            GatewayEvent::GuildAvailable(guild_id) => {
                let tracker = self.tracker.clone();
                tokio::spawn(async move { tracker.on_guild_available(guild_id).await });
            }
            GatewayEvent::GuildUnavailable(guild_id) => {
                let tracker = self.tracker.clone();
                tokio::spawn(async move { tracker.on_guild_unavailable(guild_id).await });
            }
            GatewayEvent::GuildRemoved(guild_id) => {
                let tracker = self.tracker.clone();
                tokio::spawn(async move { tracker.on_guild_removed(guild_id).await });
            }
            GatewayEvent::InviteCreated(invite) => {
                let tracker = self.tracker.clone();
                tokio::spawn(async move { tracker.on_invite_created(&invite).await });
            }
            GatewayEvent::InviteDeleted(invite) => {
                self.tracker.on_invite_deleted(&invite);
            }
            GatewayEvent::MemberJoined { guild_id, member } => {
                let tracker = self.tracker.clone();
                let join_log = self.join_log.clone();
                tokio::spawn(async move {
                    let inviter = tracker.resolve_join(guild_id, member.user_id).await;
                    if !join_log.announce(guild_id, &member, inviter).await {
                        debug!(%guild_id, "Join not announced");
                    }
                });
            }
        }
    }
}
