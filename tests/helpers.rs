#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use invite_tracker::error::PlatformError;
use invite_tracker::models::*;
use invite_tracker::platform::{CurrentUser, InviteOptions, InviteSource, OutgoingMessage, PlatformClient};
use invite_tracker::repositories::InMemoryAttributionStore;
use invite_tracker::services::InviteTracker;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BOT: UserId = UserId::new(1000);
pub const GUILD: GuildId = GuildId::new(1);
pub const CHANNEL: ChannelId = ChannelId::new(10);
pub const LOG_CHANNEL: ChannelId = ChannelId::new(11);

/// Scriptable stand-in for the chat platform
///
/// `list_invites` returns queued responses first, then the guild's current
/// invite list.
#[derive(Default)]
pub struct MockPlatform {
    invites: Mutex<HashMap<GuildId, Vec<InviteDescriptor>>>,
    scripted: Mutex<HashMap<GuildId, VecDeque<Result<Vec<InviteDescriptor>, PlatformError>>>>,
    channel_guilds: Mutex<HashMap<ChannelId, GuildId>>,
    fetch_delay: Mutex<Duration>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_code: AtomicUsize,
    sent: Mutex<Vec<(ChannelId, OutgoingMessage)>>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        let platform = Self::default();
        platform.channel_guilds.lock().unwrap().insert(CHANNEL, GUILD);
        Arc::new(platform)
    }

    pub fn set_invites(&self, guild_id: GuildId, invites: Vec<InviteDescriptor>) {
        self.invites.lock().unwrap().insert(guild_id, invites);
    }

    pub fn current_invites(&self, guild_id: GuildId) -> Vec<InviteDescriptor> {
        self.invites.lock().unwrap().get(&guild_id).cloned().unwrap_or_default()
    }

    /// Simulate a member joining through `code`: bump its uses and drop it
    /// once it reaches its limit
    pub fn use_invite(&self, guild_id: GuildId, code: &str) {
        let mut invites = self.invites.lock().unwrap();
        let list = invites.entry(guild_id).or_default();
        if let Some(invite) = list.iter_mut().find(|i| i.code == code) {
            invite.uses += 1;
        }
        list.retain(|i| !i.is_exhausted());
    }

    pub fn push_response(&self, guild_id: GuildId, response: Result<Vec<InviteDescriptor>, PlatformError>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(guild_id)
            .or_default()
            .push_back(response);
    }

    pub fn fail_next(&self, guild_id: GuildId, error: PlatformError) {
        self.push_response(guild_id, Err(error));
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<(ChannelId, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl InviteSource for MockPlatform {
    async fn list_invites(&self, guild_id: GuildId) -> Result<Vec<InviteDescriptor>, PlatformError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&guild_id)
            .and_then(|queue| queue.pop_front());
        let result = scripted.unwrap_or_else(|| Ok(self.current_invites(guild_id)));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn current_user(&self) -> Result<CurrentUser, PlatformError> {
        Ok(CurrentUser {
            id: BOT,
            username: "tracker".to_string(),
        })
    }

    async fn create_invite(
        &self,
        channel_id: ChannelId,
        options: &InviteOptions,
    ) -> Result<InviteDescriptor, PlatformError> {
        let guild_id = self
            .channel_guilds
            .lock()
            .unwrap()
            .get(&channel_id)
            .copied()
            .ok_or_else(|| PlatformError::Permission(format!("no access to channel {}", channel_id)))?;

        let n = self.next_code.fetch_add(1, Ordering::SeqCst);
        let invite = InviteDescriptor {
            code: format!("issued{}", n),
            guild_id,
            channel_id: Some(channel_id),
            inviter_id: Some(BOT),
            uses: 0,
            max_uses: options.max_uses,
            max_age: options.max_age,
            created_at: Utc::now(),
            temporary: false,
        };

        self.invites
            .lock()
            .unwrap()
            .entry(guild_id)
            .or_default()
            .push(invite.clone());
        Ok(invite)
    }

    async fn send_message(&self, channel_id: ChannelId, message: &OutgoingMessage) -> Result<(), PlatformError> {
        self.sent.lock().unwrap().push((channel_id, message.clone()));
        Ok(())
    }
}

/// Build an invite descriptor for `GUILD`
pub fn invite(code: &str, inviter: u64, uses: u32) -> InviteDescriptor {
    InviteDescriptor {
        code: code.to_string(),
        guild_id: GUILD,
        channel_id: Some(CHANNEL),
        inviter_id: Some(UserId::new(inviter)),
        uses,
        max_uses: None,
        max_age: None,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        temporary: false,
    }
}

/// Same as [`invite`] with a use limit
pub fn limited_invite(code: &str, inviter: u64, uses: u32, max_uses: u32) -> InviteDescriptor {
    InviteDescriptor {
        max_uses: Some(max_uses),
        ..invite(code, inviter, uses)
    }
}

pub fn deleted(code: &str) -> DeletedInvite {
    DeletedInvite {
        code: code.to_string(),
        guild_id: GUILD,
        channel_id: Some(CHANNEL),
    }
}

pub fn codes(snapshot: &GroupInviteSnapshot) -> Vec<String> {
    snapshot.iter().map(|i| i.code.clone()).collect()
}

pub struct TestTracker {
    pub platform: Arc<MockPlatform>,
    pub attributions: Arc<InMemoryAttributionStore>,
    pub tracker: Arc<InviteTracker>,
}

impl TestTracker {
    /// Tracker over a mock platform with a 1 second delete refresh delay
    pub fn new() -> Self {
        Self::with_delay(Duration::from_secs(1))
    }

    pub fn with_delay(delay: Duration) -> Self {
        let platform = MockPlatform::new();
        let attributions = Arc::new(InMemoryAttributionStore::new());
        let tracker = Arc::new(InviteTracker::new(
            platform.clone(),
            attributions.clone(),
            BOT,
            delay,
        ));

        Self {
            platform,
            attributions,
            tracker,
        }
    }

    /// Seed the platform and warm the cache for `GUILD`
    pub async fn seeded(invites: Vec<InviteDescriptor>) -> Self {
        let test = Self::new();
        test.platform.set_invites(GUILD, invites);
        test.tracker.warm([GUILD]).await;
        test
    }

    pub async fn cached_codes(&self) -> Vec<String> {
        self.tracker
            .snapshots()
            .get(GUILD)
            .await
            .map(|s| codes(&s))
            .unwrap_or_default()
    }
}
