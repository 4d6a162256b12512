use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wire representation of a snowflake: the platform sends strings, but
/// numbers are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum SnowflakeRepr {
    Text(String),
    Number(u64),
}

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match SnowflakeRepr::deserialize(deserializer)? {
                    SnowflakeRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
                    SnowflakeRepr::Number(id) => Ok(Self(id)),
                }
            }
        }
    };
}

snowflake_id!(
    /// Guild (group) scope; invites and snapshots are partitioned by it
    GuildId
);
snowflake_id!(
    /// User identity, used for members, inviters and the bot itself
    UserId
);
snowflake_id!(ChannelId);
