use crate::models::{GroupInviteSnapshot, InviteDescriptor, Inviter, UserId};
use crate::repositories::AttributionStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Evidence of which invite a join consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsedInvite<'a> {
    /// Exactly one invite disappeared between the snapshots
    Consumed(&'a InviteDescriptor),
    /// An invite present in both snapshots gained uses
    UsesIncreased(&'a InviteDescriptor),
    NotFound,
}

impl<'a> UsedInvite<'a> {
    pub fn invite(&self) -> Option<&'a InviteDescriptor> {
        match *self {
            UsedInvite::Consumed(invite) | UsedInvite::UsesIncreased(invite) => Some(invite),
            UsedInvite::NotFound => None,
        }
    }
}

/// Compare two snapshots of one guild and find the invite a join used
///
/// A single removal wins. Zero or several removals fall back to the first
/// invite, in `after` order, whose use count went up.
pub fn find_used_invite<'a>(
    before: &'a GroupInviteSnapshot,
    after: &'a GroupInviteSnapshot,
) -> UsedInvite<'a> {
    let removed = before.difference(after);
    if let [consumed] = removed.as_slice() {
        return UsedInvite::Consumed(*consumed);
    }

    after
        .iter()
        .find(|invite| {
            before
                .get(&invite.code)
                .map_or(false, |previous| invite.uses > previous.uses)
        })
        .map_or(UsedInvite::NotFound, UsedInvite::UsesIncreased)
}

/// Turns a before/after snapshot pair into the inviter to credit
pub struct AttributionResolver {
    bot_id: UserId,
    attributions: Arc<dyn AttributionStore>,
}

impl AttributionResolver {
    pub fn new(bot_id: UserId, attributions: Arc<dyn AttributionStore>) -> Self {
        Self {
            bot_id,
            attributions,
        }
    }

    pub fn bot_id(&self) -> UserId {
        self.bot_id
    }

    /// Resolve the inviter for a join observed between `before` and `after`
    ///
    /// Consumes the attribution record of a bot-authored invite. Store
    /// failures degrade to [`Inviter::Unknown`].
    pub async fn resolve(&self, before: &GroupInviteSnapshot, after: &GroupInviteSnapshot) -> Inviter {
        match find_used_invite(before, after) {
            UsedInvite::Consumed(invite) => {
                // Lapsing by max_age removes an invite just like consumption does.
                if invite.is_expired_at(Utc::now()) {
                    warn!(
                        guild_id = %invite.guild_id,
                        code = %invite.code,
                        "Removed invite had already passed its max age; attribution may be wrong"
                    );
                }

                if invite.inviter_id != Some(self.bot_id) {
                    return Inviter::from(invite.inviter_id);
                }

                self.take_attribution(&invite.code).await
            }
            UsedInvite::UsesIncreased(invite) => Inviter::from(invite.inviter_id),
            UsedInvite::NotFound => Inviter::Unknown,
        }
    }

    async fn take_attribution(&self, code: &str) -> Inviter {
        match self.attributions.take(code).await {
            Ok(Some(record)) => {
                debug!(%code, inviter = %record.inviter(), "Consumed attribution record");
                Inviter::User(record.inviter())
            }
            Ok(None) => {
                debug!(%code, "Bot-authored invite has no attribution record");
                Inviter::Unknown
            }
            Err(e) => {
                warn!(%code, "Failed to read attribution record: {}", e);
                Inviter::Unknown
            }
        }
    }
}
