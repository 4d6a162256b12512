use crate::error::PlatformError;
use crate::models::{ChannelId, DeletedInvite, GuildId, InviteDescriptor, UserId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Gateway dispatches the tracker cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready {
        user_id: UserId,
        guilds: Vec<GuildId>,
    },
    GuildAvailable(GuildId),
    GuildUnavailable(GuildId),
    /// The bot left or was removed from the guild
    GuildRemoved(GuildId),
    InviteCreated(InviteDescriptor),
    InviteDeleted(DeletedInvite),
    MemberJoined {
        guild_id: GuildId,
        member: MemberInfo,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemberInfo {
    #[serde(rename = "id")]
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl MemberInfo {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }

    pub fn avatar_url(&self) -> Option<String> {
        self.avatar
            .as_ref()
            .map(|hash| format!("https://cdn.discordapp.com/avatars/{}/{}.png", self.user_id, hash))
    }
}

#[derive(Deserialize)]
struct ReadyPayload {
    user: MemberInfo,
    #[serde(default)]
    guilds: Vec<GuildStatePayload>,
}

#[derive(Deserialize)]
struct GuildStatePayload {
    id: GuildId,
    #[serde(default)]
    unavailable: Option<bool>,
}

#[derive(Deserialize)]
struct InviteCreatePayload {
    code: String,
    guild_id: Option<GuildId>,
    channel_id: Option<ChannelId>,
    inviter: Option<MemberInfo>,
    #[serde(default)]
    uses: u32,
    #[serde(default)]
    max_uses: u32,
    #[serde(default)]
    max_age: u64,
    #[serde(default)]
    temporary: bool,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct InviteDeletePayload {
    code: String,
    guild_id: Option<GuildId>,
    channel_id: Option<ChannelId>,
}

#[derive(Deserialize)]
struct MemberAddPayload {
    guild_id: GuildId,
    user: MemberInfo,
}

impl GatewayEvent {
    /// Decode a dispatch payload
    ///
    /// Returns `Ok(None)` for dispatches the tracker ignores, including
    /// invites outside any guild.
    pub fn from_dispatch(name: &str, data: Value) -> Result<Option<Self>, PlatformError> {
        let event = match name {
            "READY" => {
                let ready: ReadyPayload = decode(name, data)?;
                GatewayEvent::Ready {
                    user_id: ready.user.user_id,
                    guilds: ready.guilds.into_iter().map(|g| g.id).collect(),
                }
            }
            "GUILD_CREATE" => {
                let guild: GuildStatePayload = decode(name, data)?;
                if guild.unavailable == Some(true) {
                    GatewayEvent::GuildUnavailable(guild.id)
                } else {
                    GatewayEvent::GuildAvailable(guild.id)
                }
            }
            "GUILD_DELETE" => {
                let guild: GuildStatePayload = decode(name, data)?;
                if guild.unavailable == Some(true) {
                    GatewayEvent::GuildUnavailable(guild.id)
                } else {
                    GatewayEvent::GuildRemoved(guild.id)
                }
            }
            "INVITE_CREATE" => {
                let invite: InviteCreatePayload = decode(name, data)?;
                let Some(guild_id) = invite.guild_id else {
                    return Ok(None);
                };
                GatewayEvent::InviteCreated(InviteDescriptor {
                    code: invite.code,
                    guild_id,
                    channel_id: invite.channel_id,
                    inviter_id: invite.inviter.map(|u| u.user_id),
                    uses: invite.uses,
                    max_uses: (invite.max_uses > 0).then_some(invite.max_uses),
                    max_age: (invite.max_age > 0).then(|| Duration::from_secs(invite.max_age)),
                    created_at: invite.created_at.unwrap_or_else(Utc::now),
                    temporary: invite.temporary,
                })
            }
            "INVITE_DELETE" => {
                let invite: InviteDeletePayload = decode(name, data)?;
                let Some(guild_id) = invite.guild_id else {
                    return Ok(None);
                };
                GatewayEvent::InviteDeleted(DeletedInvite {
                    code: invite.code,
                    guild_id,
                    channel_id: invite.channel_id,
                })
            }
            "GUILD_MEMBER_ADD" => {
                let member: MemberAddPayload = decode(name, data)?;
                GatewayEvent::MemberJoined {
                    guild_id: member.guild_id,
                    member: member.user,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

fn decode<T: for<'de> Deserialize<'de>>(name: &str, data: Value) -> Result<T, PlatformError> {
    serde_json::from_value(data).map_err(|e| PlatformError::Decode(format!("{}: {}", name, e)))
}
