use super::{CurrentUser, InviteOptions, InviteSource, OutgoingMessage, PlatformClient};
use crate::config::DiscordConfig;
use crate::error::PlatformError;
use crate::models::{ChannelId, GuildId, InviteDescriptor, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("DiscordBot (invite-tracker, ", env!("CARGO_PKG_VERSION"), ")");
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Invite object as returned by the REST API
#[derive(Debug, Deserialize)]
pub(crate) struct RawInvite {
    code: String,
    guild: Option<RawId>,
    channel: Option<RawId>,
    inviter: Option<RawId>,
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

#[derive(Debug, Deserialize)]
struct RawId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

impl RawInvite {
    /// Convert into a descriptor; `fallback_guild` covers payloads without a guild object
    pub(crate) fn into_descriptor(self, fallback_guild: Option<GuildId>) -> Result<InviteDescriptor, PlatformError> {
        let guild_id = match self.guild {
            Some(guild) => parse_id::<GuildId>(&guild.id)?,
            None => fallback_guild
                .ok_or_else(|| PlatformError::Decode(format!("invite {} has no guild", self.code)))?,
        };

        Ok(InviteDescriptor {
            guild_id,
            channel_id: self.channel.map(|c| parse_id::<ChannelId>(&c.id)).transpose()?,
            inviter_id: self.inviter.map(|u| parse_id::<UserId>(&u.id)).transpose()?,
            uses: self.uses,
            max_uses: (self.max_uses > 0).then_some(self.max_uses),
            max_age: (self.max_age > 0).then(|| Duration::from_secs(self.max_age)),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            temporary: self.temporary,
            code: self.code,
        })
    }
}

fn parse_id<T: std::str::FromStr>(raw: &str) -> Result<T, PlatformError> {
    raw.parse::<T>()
        .map_err(|_| PlatformError::Decode(format!("invalid snowflake: {}", raw)))
}

/// Map a failed response status to the error taxonomy
///
/// `guild_route` marks routes scoped to a guild, where 404 means the guild
/// itself is gone or unavailable.
pub fn classify_status(
    status: StatusCode,
    message: &str,
    retry_after: Option<Duration>,
    guild_route: bool,
) -> PlatformError {
    let message = if message.is_empty() {
        status.to_string()
    } else {
        message.to_string()
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => PlatformError::Transient { message, retry_after },
        StatusCode::UNAUTHORIZED => PlatformError::Unauthorized(message),
        StatusCode::FORBIDDEN => PlatformError::Permission(message),
        StatusCode::NOT_FOUND if guild_route => PlatformError::Unavailable(message),
        s if s.is_server_error() => PlatformError::transient(message),
        _ => PlatformError::Decode(format!("unexpected status {}: {}", status, message)),
    }
}

/// REST client for the Discord HTTP API
pub struct DiscordRestClient {
    http: Client,
    api_base: String,
}

impl DiscordRestClient {
    /// Create a client authenticating as the bot
    pub fn new(config: &DiscordConfig) -> Result<Self, PlatformError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bot {}", config.token))
            .map_err(|_| PlatformError::Unauthorized("token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn check(response: Response, guild_route: bool) -> Result<Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64);

        let message = response
            .json::<ApiErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or_default();

        Err(classify_status(status, &message, retry_after, guild_route))
    }
}

#[async_trait]
impl InviteSource for DiscordRestClient {
    async fn list_invites(&self, guild_id: GuildId) -> Result<Vec<InviteDescriptor>, PlatformError> {
        let response = self
            .http
            .get(self.url(&format!("/guilds/{}/invites", guild_id)))
            .send()
            .await?;

        let raw: Vec<RawInvite> = Self::check(response, true).await?.json().await?;
        debug!(%guild_id, count = raw.len(), "Fetched invites");

        raw.into_iter()
            .map(|invite| invite.into_descriptor(Some(guild_id)))
            .collect()
    }
}

#[async_trait]
impl PlatformClient for DiscordRestClient {
    async fn current_user(&self) -> Result<CurrentUser, PlatformError> {
        let response = self.http.get(self.url("/users/@me")).send().await?;
        Ok(Self::check(response, false).await?.json().await?)
    }

    async fn create_invite(
        &self,
        channel_id: ChannelId,
        options: &InviteOptions,
    ) -> Result<InviteDescriptor, PlatformError> {
        let body = serde_json::json!({
            "max_age": options.max_age.map_or(0, |age| age.as_secs()),
            "max_uses": options.max_uses.unwrap_or(0),
            "unique": options.unique,
        });

        let response = self
            .http
            .post(self.url(&format!("/channels/{}/invites", channel_id)))
            .json(&body)
            .send()
            .await?;

        let raw: RawInvite = Self::check(response, false).await?.json().await?;
        raw.into_descriptor(None)
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let response = self
            .http
            .post(self.url(&format!("/channels/{}/messages", channel_id)))
            .json(message)
            .send()
            .await?;

        Self::check(response, false).await?;
        Ok(())
    }
}
