use super::ids::{ChannelId, GuildId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metadata for one join link as reported by the platform
///
/// Identity is `code`; only `uses` changes while the invite is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteDescriptor {
    pub code: String,
    pub guild_id: GuildId,
    pub channel_id: Option<ChannelId>,
    /// Absent for some link types (vanity URLs, widget invites)
    pub inviter_id: Option<UserId>,
    pub uses: u32,
    /// `None` means unlimited
    pub max_uses: Option<u32>,
    /// `None` means the invite never expires
    pub max_age: Option<Duration>,
    pub created_at: DateTime<Utc>,
    pub temporary: bool,
}

impl InviteDescriptor {
    /// Point in time after which the platform lapses this invite, if any
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let max_age = chrono::Duration::from_std(self.max_age?).ok()?;
        self.created_at.checked_add_signed(max_age)
    }

    /// Check if the invite had lapsed by `max_age` at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(false, |expiry| expiry <= now)
    }

    /// Check if the invite has reached its use limit
    pub fn is_exhausted(&self) -> bool {
        self.max_uses.map_or(false, |max| self.uses >= max)
    }
}

/// Payload of an invite-deletion notification
///
/// The platform only reports the identity of the deleted invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedInvite {
    pub code: String,
    pub guild_id: GuildId,
    pub channel_id: Option<ChannelId>,
}

/// The last fetched, complete invite list for one guild
///
/// Iteration follows the order the platform returned the invites in.
/// A snapshot is never edited in place; a refresh builds a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupInviteSnapshot {
    invites: Vec<InviteDescriptor>,
    index: HashMap<String, usize>,
}

impl GroupInviteSnapshot {
    /// Build a snapshot; later duplicates of a code are dropped
    pub fn new(invites: Vec<InviteDescriptor>) -> Self {
        let mut unique = Vec::with_capacity(invites.len());
        let mut index = HashMap::with_capacity(invites.len());

        for invite in invites {
            if index.contains_key(&invite.code) {
                continue;
            }
            index.insert(invite.code.clone(), unique.len());
            unique.push(invite);
        }

        Self {
            invites: unique,
            index,
        }
    }

    pub fn get(&self, code: &str) -> Option<&InviteDescriptor> {
        self.index.get(code).map(|&i| &self.invites[i])
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InviteDescriptor> {
        self.invites.iter()
    }

    pub fn len(&self) -> usize {
        self.invites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }

    /// Invites present here but missing from `other`, by code
    pub fn difference<'a>(&'a self, other: &'a GroupInviteSnapshot) -> Vec<&'a InviteDescriptor> {
        self.invites
            .iter()
            .filter(|invite| !other.contains(&invite.code))
            .collect()
    }
}

impl FromIterator<InviteDescriptor> for GroupInviteSnapshot {
    fn from_iter<T: IntoIterator<Item = InviteDescriptor>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
