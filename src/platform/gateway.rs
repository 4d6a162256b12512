use super::events::GatewayEvent;
use crate::config::DiscordConfig;
use crate::error::PlatformError;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INTENT_GUILDS: u64 = 1 << 0;
const INTENT_GUILD_MEMBERS: u64 = 1 << 1;
const INTENT_GUILD_INVITES: u64 = 1 << 6;

/// Intents needed to observe invites and joins
pub const INTENTS: u64 = INTENT_GUILDS | INTENT_GUILD_MEMBERS | INTENT_GUILD_INVITES;

const CLOSE_AUTHENTICATION_FAILED: u16 = 4004;
const CLOSE_DISALLOWED_INTENTS: u16 = 4014;

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelloPayload {
    heartbeat_interval: u64,
}

/// Why a gateway session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Reconnect,
    InvalidSession,
    Closed,
    /// Nobody is consuming events anymore
    Shutdown,
}

/// Websocket client for the platform's event feed
///
/// Each session identifies from scratch; a fresh session re-delivers
/// GUILD_CREATE for every guild, which re-warms the invite snapshots.
pub struct GatewayClient {
    url: String,
    token: String,
    events: mpsc::Sender<GatewayEvent>,
    reconnect_delay: Duration,
}

impl GatewayClient {
    pub fn new(config: &DiscordConfig, events: mpsc::Sender<GatewayEvent>) -> Self {
        Self {
            url: config.gateway_url.clone(),
            token: config.token.clone(),
            events,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Run sessions until the event receiver is dropped or the platform
    /// rejects the credentials
    pub async fn start(self) {
        info!("Gateway client started");

        loop {
            match self.run_session().await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Event receiver closed, stopping gateway client");
                    return;
                }
                Ok(end) => info!(?end, "Gateway session ended, reconnecting"),
                Err(e @ (PlatformError::Unauthorized(_) | PlatformError::Permission(_))) => {
                    error!("Gateway rejected the bot: {}", e);
                    return;
                }
                Err(e) => warn!("Gateway session failed: {}", e),
            }

            if self.events.is_closed() {
                return;
            }
            time::sleep(self.reconnect_delay).await;
        }
    }

    async fn run_session(&self) -> Result<SessionEnd, PlatformError> {
        let (socket, _) = connect_async(self.url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let hello = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload = parse_payload(&text)?;
                    if payload.op != OP_HELLO {
                        return Err(PlatformError::Gateway(format!(
                            "expected hello, got opcode {}",
                            payload.op
                        )));
                    }
                    break serde_json::from_value::<HelloPayload>(payload.d)
                        .map_err(|e| PlatformError::Decode(format!("HELLO: {}", e)))?;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(SessionEnd::Closed),
            }
        };

        sink.send(Message::Text(self.identify().to_string())).await?;
        debug!(heartbeat_interval_ms = hello.heartbeat_interval, "Identified with gateway");

        let period = Duration::from_millis(hello.heartbeat_interval.max(1));
        let mut heartbeat = time::interval_at(time::Instant::now() + period, period);
        let mut sequence: Option<u64> = None;
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        return Err(PlatformError::Gateway("heartbeat not acknowledged".into()));
                    }
                    sink.send(heartbeat_message(sequence)).await?;
                    awaiting_ack = true;
                }
                message = stream.next() => {
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code));
                            return match code {
                                Some(CLOSE_AUTHENTICATION_FAILED) => {
                                    Err(PlatformError::Unauthorized("authentication failed".into()))
                                }
                                Some(CLOSE_DISALLOWED_INTENTS) => Err(PlatformError::Permission(
                                    "privileged intents are not enabled".into(),
                                )),
                                _ => Ok(SessionEnd::Closed),
                            };
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::Closed),
                    };

                    let payload = match parse_payload(&text) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("Dropping gateway frame: {}", e);
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }

                    match payload.op {
                        OP_DISPATCH => {
                            let name = payload.t.unwrap_or_default();
                            match GatewayEvent::from_dispatch(&name, payload.d) {
                                Ok(Some(event)) => {
                                    if self.events.send(event).await.is_err() {
                                        return Ok(SessionEnd::Shutdown);
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => warn!("Failed to decode {} dispatch: {}", name, e),
                            }
                        }
                        OP_HEARTBEAT => sink.send(heartbeat_message(sequence)).await?,
                        OP_HEARTBEAT_ACK => awaiting_ack = false,
                        OP_RECONNECT => return Ok(SessionEnd::Reconnect),
                        OP_INVALID_SESSION => return Ok(SessionEnd::InvalidSession),
                        other => debug!(opcode = other, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }

    fn identify(&self) -> Value {
        json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.token,
                "intents": INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "invite-tracker",
                    "device": "invite-tracker",
                },
            },
        })
    }
}

fn parse_payload(text: &str) -> Result<GatewayPayload, PlatformError> {
    serde_json::from_str(text).map_err(|e| PlatformError::Decode(e.to_string()))
}

fn heartbeat_message(sequence: Option<u64>) -> Message {
    Message::Text(json!({ "op": OP_HEARTBEAT, "d": sequence }).to_string())
}
