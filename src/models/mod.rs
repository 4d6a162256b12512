//! Domain models for the invite tracker.
//!
//! Snowflake ids, invite descriptors with their per-guild snapshots, and
//! the persisted attribution records.

pub mod attribution;
pub mod ids;
pub mod invite;

// Re-export all models for convenient access
pub use attribution::{AttributionRecord, Inviter};
pub use ids::{ChannelId, GuildId, UserId};
pub use invite::{DeletedInvite, GroupInviteSnapshot, InviteDescriptor};
