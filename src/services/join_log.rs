use crate::models::{ChannelId, GuildId, Inviter};
use crate::platform::{Embed, EmbedThumbnail, MemberInfo, OutgoingMessage, PlatformClient};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const JOIN_EMBED_COLOR: u32 = 0x2ECC71;

/// Posts resolved joins to each guild's configured log channel
pub struct JoinLog {
    platform: Arc<dyn PlatformClient>,
    channels: HashMap<GuildId, ChannelId>,
}

impl JoinLog {
    pub fn new(platform: Arc<dyn PlatformClient>, channels: HashMap<GuildId, ChannelId>) -> Self {
        Self { platform, channels }
    }

    pub fn channel_for(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.get(&guild_id).copied()
    }

    /// Announce a join; returns whether a message was posted
    pub async fn announce(&self, guild_id: GuildId, member: &MemberInfo, inviter: Inviter) -> bool {
        let Some(channel_id) = self.channel_for(guild_id) else {
            return false;
        };

        let message = join_message(member, inviter);
        match self.platform.send_message(channel_id, &message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%guild_id, %channel_id, "Failed to post join to invite log channel: {}", e);
                false
            }
        }
    }
}

/// Build the log message for a join
pub fn join_message(member: &MemberInfo, inviter: Inviter) -> OutgoingMessage {
    let invited_by = match inviter {
        Inviter::User(id) => format!("<@{}>", id),
        Inviter::Unknown => "unknown".to_string(),
    };

    OutgoingMessage {
        content: None,
        embeds: vec![Embed {
            title: Some("Member joined".to_string()),
            description: Some(format!(
                "{} joined the guild.\n\nInvited by {}",
                member.mention(),
                invited_by
            )),
            color: Some(JOIN_EMBED_COLOR),
            thumbnail: member.avatar_url().map(|url| EmbedThumbnail { url }),
        }],
        allowed_mentions: Default::default(),
    }
}
