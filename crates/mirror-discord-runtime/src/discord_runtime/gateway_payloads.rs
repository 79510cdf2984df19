//! Typed gateway frames and dispatch payloads consumed by the mirror runtime.
//!
//! Only the operations and dispatch events the relay acts on get a concrete
//! type; everything else stays in the raw frame and is ignored explicitly.

use serde::Deserialize;
use serde_json::Value;

pub(super) const DISPATCH_READY: &str = "READY";
pub(super) const DISPATCH_MESSAGE_CREATE: &str = "MESSAGE_CREATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum GatewayOpcode {
    Dispatch,
    Heartbeat,
    Reconnect,
    InvalidSession,
    Hello,
    HeartbeatAck,
}

impl GatewayOpcode {
    pub(super) fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            7 => Some(Self::Reconnect),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }
}

/// Raw `{op, d, s, t}` gateway frame.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct GatewayFrame {
    pub(super) op: u8,
    #[serde(default)]
    pub(super) d: Value,
    #[serde(default)]
    pub(super) s: Option<u64>,
    #[serde(default)]
    pub(super) t: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct HelloPayload {
    pub(super) heartbeat_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ReadyPayload {
    pub(super) session_id: String,
    pub(super) resume_gateway_url: String,
    pub(super) user: ReadyUser,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ReadyUser {
    pub(super) id: String,
    pub(super) username: String,
    #[serde(default)]
    pub(super) discriminator: Option<String>,
}

impl ReadyUser {
    /// Login name as shown in the greeting log line: the `#discriminator`
    /// suffix appears only for legacy non-zero discriminators.
    pub(super) fn login_name(&self) -> String {
        match self.discriminator.as_deref() {
            Some(discriminator) if discriminator.parse::<u32>().is_ok_and(|value| value != 0) => {
                format!("{}#{}", self.username, discriminator)
            }
            _ => self.username.clone(),
        }
    }
}

/// MessageCreate dispatch envelope, reduced to the fields the relay uses.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct InboundMessage {
    pub(super) id: String,
    pub(super) channel_id: String,
    #[serde(default)]
    pub(super) content: Option<String>,
    pub(super) author: MessageAuthor,
    #[serde(default)]
    pub(super) attachments: Vec<MessageAttachment>,
    #[serde(default)]
    pub(super) embeds: Vec<Value>,
    #[serde(default)]
    pub(super) sticker_items: Option<Vec<StickerItem>>,
    #[serde(default)]
    pub(super) webhook_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct MessageAuthor {
    pub(super) id: String,
    pub(super) username: String,
    #[serde(default)]
    pub(super) discriminator: Option<String>,
    #[serde(default)]
    pub(super) avatar: Option<String>,
    #[serde(default)]
    pub(super) bot: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct MessageAttachment {
    pub(super) url: String,
    #[serde(default)]
    pub(super) size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct StickerItem {
    pub(super) id: String,
}
