//! Discord gateway mirror runtime.
//!
//! Owns the gateway session state machine, the inbound message filter
//! pipeline, and the webhook relay fan-out used to mirror source channels
//! into destination webhooks.

mod discord_helpers;
pub mod discord_runtime;
pub mod mirror_map;

pub use discord_runtime::{run_discord_mirror, DiscordMirrorRuntimeConfig, DEFAULT_GATEWAY_URL};
pub use mirror_map::{extract_webhook_id, MirrorMap, WebhookDestination};
