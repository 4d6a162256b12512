//! Remote chat platform surface.
//!
//! The tracker only sees the narrow [`InviteSource`] trait; the rest of the
//! bot talks to the platform through [`PlatformClient`].

pub mod events;
pub mod gateway;
pub mod rest;

pub use events::{GatewayEvent, MemberInfo};
pub use gateway::GatewayClient;
pub use rest::DiscordRestClient;

use crate::error::PlatformError;
use crate::models::{ChannelId, GuildId, InviteDescriptor, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Source of complete invite lists for a guild
#[async_trait]
pub trait InviteSource: Send + Sync {
    async fn list_invites(&self, guild_id: GuildId) -> Result<Vec<InviteDescriptor>, PlatformError>;
}

/// Platform operations used outside invite resolution
#[async_trait]
pub trait PlatformClient: InviteSource {
    /// Identity of the bot account
    async fn current_user(&self) -> Result<CurrentUser, PlatformError>;

    async fn create_invite(
        &self,
        channel_id: ChannelId,
        options: &InviteOptions,
    ) -> Result<InviteDescriptor, PlatformError>;

    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
}

/// Limits for a newly created invite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InviteOptions {
    /// `None` creates a non-expiring invite
    pub max_age: Option<Duration>,
    /// `None` creates an unlimited invite
    pub max_uses: Option<u32>,
    /// Always create a new code instead of reusing a similar one
    pub unique: bool,
}

impl Default for InviteOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            max_uses: None,
            unique: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    pub allowed_mentions: AllowedMentions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

/// Mentions in bot messages never ping anyone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
}
