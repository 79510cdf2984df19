//! Outbound payload construction and per-destination fan-out delivery.

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use super::gateway_payloads::{InboundMessage, MessageAuthor};
use super::webhook_client::{WebhookClient, WebhookProfile};
use crate::mirror_map::{extract_webhook_id, WebhookDestination};

/// Largest attachment size relayed as a file reference; bigger payloads are
/// degraded to plain links because destinations reject oversized files.
pub(super) const ATTACHMENT_INLINE_LIMIT_BYTES: u64 = 8 * 1024 * 1024;

/// Destinations reject a fully empty body with no attachments.
const EMPTY_CONTENT_PLACEHOLDER: &str = "** **\n";

#[derive(Debug, Clone, Copy)]
pub(super) struct RelayOptions {
    pub(super) enable_bot_indicator: bool,
    pub(super) use_webhook_profile: bool,
    pub(super) override_webhook_avatar: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct RelayPayload {
    pub(super) content: String,
    pub(super) username: String,
    pub(super) avatar_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) embeds: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) files: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct RelayOutcome {
    pub(super) delivered: usize,
    pub(super) failed: usize,
}

pub(super) fn author_avatar_url(author: &MessageAuthor) -> String {
    match author.avatar.as_deref() {
        Some(hash) if !hash.is_empty() => {
            let ext = if hash.starts_with("a_") { "gif" } else { "jpg" };
            format!(
                "https://cdn.discordapp.com/avatars/{}/{hash}.{ext}",
                author.id
            )
        }
        _ => {
            let id = author.id.parse::<u64>().unwrap_or(0);
            format!(
                "https://cdn.discordapp.com/embed/avatars/{}.png",
                (id >> 22) % 6
            )
        }
    }
}

fn sticker_media_url(sticker_id: &str) -> String {
    format!("https://media.discordapp.net/stickers/{sticker_id}.webp")
}

fn webhook_avatar_url(webhook_id: &str, hash: &str) -> String {
    format!("https://cdn.discordapp.com/avatars/{webhook_id}/{hash}.png")
}

/// Builds the source-author payload for one message. Embeds, stickers, and
/// attachments are mutually exclusive, checked in that order.
pub(super) fn build_relay_payload(
    message: &InboundMessage,
    enable_bot_indicator: bool,
) -> RelayPayload {
    let author = &message.author;

    let mut username = author.username.clone();
    if let Some(discriminator) = author.discriminator.as_deref() {
        if discriminator.parse::<u32>().is_ok_and(|value| value != 0) {
            username.push('#');
            username.push_str(discriminator);
        }
    }
    if enable_bot_indicator {
        username.push_str(if author.bot.unwrap_or(false) {
            " [BOT]"
        } else {
            " [USER]"
        });
    }

    let mut content = match message.content.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => EMPTY_CONTENT_PLACEHOLDER.to_string(),
    };

    let mut embeds = None;
    let mut files = None;
    if !message.embeds.is_empty() {
        embeds = Some(message.embeds.clone());
    } else if let Some(stickers) = message
        .sticker_items
        .as_deref()
        .filter(|items| !items.is_empty())
    {
        files = Some(
            stickers
                .iter()
                .map(|sticker| sticker_media_url(&sticker.id))
                .collect(),
        );
    } else if !message.attachments.is_empty() {
        let largest = message
            .attachments
            .iter()
            .map(|attachment| attachment.size)
            .max()
            .unwrap_or(0);
        if largest < ATTACHMENT_INLINE_LIMIT_BYTES {
            files = Some(
                message
                    .attachments
                    .iter()
                    .map(|attachment| attachment.url.clone())
                    .collect(),
            );
        } else {
            let links = message
                .attachments
                .iter()
                .map(|attachment| attachment.url.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            content.push_str(&links);
        }
    }

    RelayPayload {
        content,
        username,
        avatar_url: author_avatar_url(author),
        embeds,
        files,
    }
}

/// Applies the destination webhook's own identity to a built payload. The
/// avatar half is gated separately because some destinations want the source
/// author's face kept while branding the name.
pub(super) fn apply_webhook_profile(
    payload: &mut RelayPayload,
    profile: &WebhookProfile,
    override_avatar: bool,
) {
    payload.username = profile.name.clone();
    if override_avatar {
        if let (Some(webhook_id), Some(hash)) = (profile.id.as_deref(), profile.avatar.as_deref()) {
            payload.avatar_url = webhook_avatar_url(webhook_id, hash);
        }
    }
}

/// Delivers one message to every destination concurrently. Failures are
/// logged and isolated per destination; nothing is retried.
pub(super) async fn relay_to_destinations(
    client: &WebhookClient,
    message: &InboundMessage,
    destinations: &[WebhookDestination],
    options: RelayOptions,
) -> RelayOutcome {
    let deliveries = destinations.iter().map(|destination| async move {
        let mut payload = build_relay_payload(message, options.enable_bot_indicator);
        if options.use_webhook_profile {
            match client.fetch_webhook_profile(&destination.url).await {
                Ok(profile) => {
                    apply_webhook_profile(&mut payload, &profile, options.override_webhook_avatar);
                }
                Err(error) => {
                    tracing::warn!(
                        message_id = %message.id,
                        destination = %destination_label(&destination.url),
                        error = %error,
                        "webhook profile lookup failed; keeping source identity"
                    );
                }
            }
        }
        client.execute_webhook(&destination.url, &payload).await
    });

    let mut outcome = RelayOutcome::default();
    for (destination, result) in destinations.iter().zip(join_all(deliveries).await) {
        match result {
            Ok(()) => outcome.delivered += 1,
            Err(error) => {
                outcome.failed += 1;
                tracing::warn!(
                    message_id = %message.id,
                    destination = %destination_label(&destination.url),
                    error = %error,
                    "webhook delivery failed"
                );
            }
        }
    }
    outcome
}

/// Loggable identifier for a destination; webhook URLs embed a secret token
/// and must never be logged whole.
fn destination_label(url: &str) -> String {
    extract_webhook_id(url).unwrap_or_else(|| "unknown-webhook".to_string())
}
