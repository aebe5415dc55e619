use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ClientError;
use crate::models::message::{Author, Message};

/// Opcodes for gateway frames.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Close codes.
pub mod close_code {
    /// Clean shutdown; the gateway will not keep the session alive.
    pub const NORMAL: u16 = 1000;
    /// Client-initiated close that leaves the session resumable server-side.
    pub const RESUMABLE: u16 = 4000;

    /// A terminal close ends the session for good; everything else may be
    /// resumed on the next connection.
    pub fn is_terminal(code: u16) -> bool {
        code == NORMAL
    }
}

/// Intent bitmask sent with IDENTIFY: guilds + guild messages.
pub const INTENTS: u64 = 513;

/// Gateway frame envelope. Wire shape: `{"op": .., "d": .., "s": .., "t": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    /// Heartbeat carrying the last seen sequence, or an explicit null before
    /// any sequence has arrived.
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            op: opcode::HEARTBEAT,
            d: Some(json!(last_sequence)),
            s: None,
            t: None,
        }
    }

    pub fn identify(token: &str) -> Self {
        Self {
            op: opcode::IDENTIFY,
            d: Some(json!({
                "token": token,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "fluxbot",
                    "device": "fluxbot",
                },
                "intents": INTENTS,
            })),
            s: None,
            t: None,
        }
    }

    pub fn resume(token: &str, session_id: &str, seq: u64) -> Self {
        Self {
            op: opcode::RESUME,
            d: Some(json!({
                "token": token,
                "session_id": session_id,
                "seq": seq,
            })),
            s: None,
            t: None,
        }
    }
}

/// HELLO payload.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloData {
    pub heartbeat_interval: u64,
}

/// READY payload. The gateway sends more; only what the client stores.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyData {
    pub session_id: String,
    #[serde(default)]
    pub user: Option<Author>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuildData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Control-plane view of an inbound frame, one variant per opcode the client
/// consumes.
#[derive(Debug)]
pub enum ControlFrame {
    Dispatch(DispatchEvent),
    Hello(HelloData),
    HeartbeatAck,
    Reconnect,
    InvalidSession { resumable: bool },
    /// Opcodes this client does not consume; ignored, not an error.
    Unknown(u8),
}

/// Application-plane dispatch events, one variant per recognized event name.
#[derive(Debug)]
pub enum DispatchEvent {
    Ready(ReadyData),
    Resumed,
    MessageCreate {
        message: Message,
        raw: serde_json::Value,
    },
    GuildCreate(GuildData),
    /// Event names this client does not recognize; ignored, not an error.
    Unknown(String),
}

impl ControlFrame {
    pub fn decode(frame: GatewayFrame) -> Result<Self, ClientError> {
        match frame.op {
            opcode::DISPATCH => Ok(ControlFrame::Dispatch(DispatchEvent::decode(frame)?)),
            opcode::HELLO => {
                let d = frame
                    .d
                    .ok_or_else(|| ClientError::MalformedFrame("HELLO without payload".into()))?;
                Ok(ControlFrame::Hello(serde_json::from_value(d)?))
            }
            opcode::HEARTBEAT_ACK => Ok(ControlFrame::HeartbeatAck),
            opcode::RECONNECT => Ok(ControlFrame::Reconnect),
            opcode::INVALID_SESSION => Ok(ControlFrame::InvalidSession {
                resumable: frame.d.as_ref().and_then(|d| d.as_bool()).unwrap_or(false),
            }),
            other => Ok(ControlFrame::Unknown(other)),
        }
    }
}

impl DispatchEvent {
    fn decode(frame: GatewayFrame) -> Result<Self, ClientError> {
        let name = frame.t.unwrap_or_default();
        match name.as_str() {
            "READY" => {
                let d = frame
                    .d
                    .ok_or_else(|| ClientError::MalformedFrame("READY without payload".into()))?;
                Ok(DispatchEvent::Ready(serde_json::from_value(d)?))
            }
            "RESUMED" => Ok(DispatchEvent::Resumed),
            "MESSAGE_CREATE" => {
                let raw = frame.d.ok_or_else(|| {
                    ClientError::MalformedFrame("MESSAGE_CREATE without payload".into())
                })?;
                let message = serde_json::from_value(raw.clone())?;
                Ok(DispatchEvent::MessageCreate { message, raw })
            }
            "GUILD_CREATE" => {
                let guild = match frame.d {
                    Some(d) => serde_json::from_value(d)?,
                    None => GuildData::default(),
                };
                Ok(DispatchEvent::GuildCreate(guild))
            }
            _ => Ok(DispatchEvent::Unknown(name)),
        }
    }
}
