use crate::models::{ChannelId, GuildId};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Platform (Discord) connection configuration
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub api_base: String,
    pub gateway_url: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    /// `None` keeps attribution records in memory only
    pub database: Option<DatabaseConfig>,
    pub delete_refresh_delay_ms: u64,
    pub invite_log_channels: HashMap<GuildId, ChannelId>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub environment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl DatabaseConfig {
    /// Create database config from environment variables
    ///
    /// Returns `Ok(None)` when `DATABASE_URL` is not set.
    pub fn from_env() -> Result<Option<Self>, String> {
        let url = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => return Ok(None),
        };

        let max_connections = parse_env("DATABASE_MAX_CONNECTIONS", 5)?;
        let acquire_timeout_secs = parse_env("DATABASE_ACQUIRE_TIMEOUT_SECS", 30)?;
        let idle_timeout_secs = parse_env("DATABASE_IDLE_TIMEOUT_SECS", 600)?; // 10 minutes
        let max_lifetime_secs = parse_env("DATABASE_MAX_LIFETIME_SECS", 1800)?; // 30 minutes
        let test_before_acquire = parse_env("DATABASE_TEST_BEFORE_ACQUIRE", true)?;

        // Validate configuration
        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Some(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        }))
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/invite_tracker".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl DiscordConfig {
    pub fn from_env() -> Result<Self, String> {
        let token = env::var("DISCORD_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or("DISCORD_TOKEN environment variable is required")?;

        let api_base = env::var("DISCORD_API_BASE")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let gateway_url =
            env::var("DISCORD_GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());

        Ok(Self {
            token,
            api_base,
            gateway_url,
        })
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let discord = DiscordConfig::from_env()?;
        let database = DatabaseConfig::from_env()?;

        let delete_refresh_delay_ms = parse_env("INVITE_DELETE_REFRESH_DELAY_MS", 1000)?;
        if delete_refresh_delay_ms == 0 {
            return Err("INVITE_DELETE_REFRESH_DELAY_MS must be greater than 0".to_string());
        }

        let invite_log_channels = match env::var("INVITE_LOG_CHANNELS") {
            Ok(raw) => parse_log_channels(&raw)?,
            Err(_) => HashMap::new(),
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .to_lowercase()
            .as_str()
        {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(format!(
                    "Invalid LOG_FORMAT: {}. Must be one of: [\"pretty\", \"json\"]",
                    other
                ))
            }
        };

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        Ok(Self {
            discord,
            database,
            delete_refresh_delay_ms,
            invite_log_channels,
            log_level: log_level.to_lowercase(),
            log_format,
            environment: environment.to_lowercase(),
        })
    }

    /// Delay between an invite deletion and the snapshot refresh it triggers
    pub fn delete_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.delete_refresh_delay_ms)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig {
                token: String::new(),
                api_base: DEFAULT_API_BASE.to_string(),
                gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            },
            database: None,
            delete_refresh_delay_ms: 1000,
            invite_log_channels: HashMap::new(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            environment: "development".to_string(),
        }
    }
}

/// Parse `guild_id:channel_id` pairs separated by commas
pub fn parse_log_channels(raw: &str) -> Result<HashMap<GuildId, ChannelId>, String> {
    let mut channels = HashMap::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (guild, channel) = entry
            .split_once(':')
            .ok_or_else(|| format!("Invalid INVITE_LOG_CHANNELS entry: {}", entry))?;

        let guild = guild
            .parse::<GuildId>()
            .map_err(|e| format!("Invalid guild id in INVITE_LOG_CHANNELS ({}): {}", entry, e))?;
        let channel = channel
            .parse::<ChannelId>()
            .map_err(|e| format!("Invalid channel id in INVITE_LOG_CHANNELS ({}): {}", entry, e))?;

        channels.insert(guild, channel);
    }

    Ok(channels)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("Invalid value for {}: {}", key, raw)),
        Err(_) => Ok(default),
    }
}
