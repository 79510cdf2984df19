//! Gateway transport health counters shared with the keep-alive server.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Health snapshot handle shared between the gateway runtime (writer) and the
/// keep-alive server (reader).
pub type SharedGatewayHealth = Arc<Mutex<GatewayHealthSnapshot>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayHealthSnapshot {
    pub started_unix_ms: u64,
    pub connected: bool,
    pub last_connect_unix_ms: u64,
    pub last_event_unix_ms: u64,
    pub reconnects: u64,
    pub relayed_messages: u64,
    pub dropped_messages: u64,
    pub delivery_failures: u64,
}

impl GatewayHealthSnapshot {
    pub fn started_at(started_unix_ms: u64) -> Self {
        Self {
            started_unix_ms,
            ..Self::default()
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.connected {
            "connected"
        } else {
            "disconnected"
        }
    }
}

/// Creates a fresh shared health handle stamped with the process start time.
pub fn new_shared_gateway_health(started_unix_ms: u64) -> SharedGatewayHealth {
    Arc::new(Mutex::new(GatewayHealthSnapshot::started_at(
        started_unix_ms,
    )))
}
