use super::ids::UserId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Durable `code -> true inviter` mapping for invites the bot created on a
/// user's behalf
///
/// Consumed exactly once, when the resolver matches its invite to a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AttributionRecord {
    pub code: String,
    pub inviter_id: i64, // Stored as BIGINT, use inviter() for the typed id
    pub created_at: NaiveDateTime,
}

impl AttributionRecord {
    pub fn new(code: String, inviter: UserId) -> Self {
        Self {
            code,
            inviter_id: inviter.get() as i64,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Get the inviter as a typed id
    pub fn inviter(&self) -> UserId {
        UserId::new(self.inviter_id as u64)
    }
}

/// Outcome of resolving a join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inviter {
    User(UserId),
    Unknown,
}

impl Inviter {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Inviter::User(id) => Some(*id),
            Inviter::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Inviter::User(_))
    }
}

impl From<Option<UserId>> for Inviter {
    fn from(id: Option<UserId>) -> Self {
        id.map_or(Inviter::Unknown, Inviter::User)
    }
}

impl fmt::Display for Inviter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inviter::User(id) => write!(f, "{}", id),
            Inviter::Unknown => f.write_str("unknown"),
        }
    }
}
