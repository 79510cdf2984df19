//! Foundational utilities shared across mirror crates.
//!
//! Provides unix-time helpers and the gateway health snapshot consumed by the
//! keep-alive server and the Discord runtime.

pub mod gateway_health;
pub mod time_utils;

pub use gateway_health::{GatewayHealthSnapshot, SharedGatewayHealth};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
