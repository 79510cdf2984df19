//! Source-channel to destination-webhook routing table.
//!
//! Parsed once from the mirror-map JSON object and never mutated afterwards.
//! The key set doubles as the channel subscription filter: channels absent
//! from the map are ignored entirely by the runtime.

use std::collections::HashMap;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookDestination {
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct MirrorMap {
    routes: HashMap<String, Vec<WebhookDestination>>,
}

impl MirrorMap {
    /// Parses the `{"channel_id": ["webhook url", ...]}` configuration shape.
    pub fn parse(raw: &str) -> Result<Self> {
        let routes: HashMap<String, Vec<String>> =
            serde_json::from_str(raw).context("failed to parse mirror map JSON")?;
        Ok(Self {
            routes: routes
                .into_iter()
                .map(|(channel_id, urls)| {
                    let destinations = urls
                        .into_iter()
                        .map(|url| WebhookDestination { url })
                        .collect();
                    (channel_id, destinations)
                })
                .collect(),
        })
    }

    pub fn contains_channel(&self, channel_id: &str) -> bool {
        self.routes.contains_key(channel_id)
    }

    /// Destination list for a source channel; empty when the channel is not
    /// routed.
    pub fn destinations_for(&self, channel_id: &str) -> &[WebhookDestination] {
        self.routes
            .get(channel_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every configured destination URL across all source channels.
    pub fn destination_urls(&self) -> impl Iterator<Item = &str> {
        self.routes
            .values()
            .flatten()
            .map(|destination| destination.url.as_str())
    }

    pub fn channel_count(&self) -> usize {
        self.routes.len()
    }

    pub fn destination_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Extracts the webhook id from a `.../webhooks/{id}/{token}` URL.
pub fn extract_webhook_id(url: &str) -> Option<String> {
    let (_, tail) = url.split_once("/webhooks/")?;
    let (id, token) = tail.split_once('/')?;
    if id.is_empty() || token.is_empty() || !id.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    Some(id.to_string())
}
