use crate::error::{AppError, AppResult};
use crate::models::{ChannelId, InviteDescriptor, UserId};
use crate::platform::{InviteOptions, PlatformClient};
use crate::repositories::AttributionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Lifetime of invites issued on a member's behalf (1 day)
pub const ISSUED_INVITE_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24);

/// Issued invites admit exactly one member
pub const ISSUED_INVITE_MAX_USES: u32 = 1;

/// Creates single-use invites as the bot on behalf of a member
///
/// The platform lists the bot as the inviter of such invites, so the real
/// requester is recorded in the attribution store for the resolver.
pub struct InviteIssuer {
    platform: Arc<dyn PlatformClient>,
    attributions: Arc<dyn AttributionStore>,
}

impl InviteIssuer {
    pub fn new(platform: Arc<dyn PlatformClient>, attributions: Arc<dyn AttributionStore>) -> Self {
        Self {
            platform,
            attributions,
        }
    }

    /// Create a 1-day, 1-use invite in `channel_id` credited to `requester`
    pub async fn issue_invite(&self, channel_id: ChannelId, requester: UserId) -> AppResult<InviteDescriptor> {
        let options = InviteOptions {
            max_age: Some(ISSUED_INVITE_MAX_AGE),
            max_uses: Some(ISSUED_INVITE_MAX_USES),
            unique: true,
        };

        let invite = self.platform.create_invite(channel_id, &options).await?;

        if let Err(e) = self.attributions.create(&invite.code, requester).await {
            warn!(code = %invite.code, %requester, "Failed to record invite attribution: {}", e);
            return Err(AppError::Repository(e));
        }

        info!(
            code = %invite.code,
            guild_id = %invite.guild_id,
            %requester,
            url = %Self::invite_url(&invite.code),
            "Issued invite on behalf of member"
        );
        Ok(invite)
    }

    /// Public join URL for an invite code
    pub fn invite_url(code: &str) -> String {
        format!("https://discord.gg/{}", code)
    }
}
