//! Inbound message admission checks for the mirror pipeline.
//!
//! Checks run in order and short-circuit on the first hit. Messages that
//! arrived through an external webhook skip the blocklist and heuristic
//! checks entirely; loop prevention is the only constraint on them.

use std::collections::HashSet;

use super::gateway_payloads::InboundMessage;

pub(crate) const DEFAULT_BLOCKED_AUTHOR_IDS: &[&str] = &[
    "859535759501033534",
    "1422307880899444766",
    "681226848256000027",
];

pub(crate) const DEFAULT_COMMAND_PREFIXES: &[&str] = &["!", "t!", "t?"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DropReason {
    SelfAuthored,
    WebhookLoop,
    BlockedAuthor,
    BracketCommand,
    PrefixedCommand,
    EmptyContent,
}

impl DropReason {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::SelfAuthored => "self_authored",
            Self::WebhookLoop => "webhook_loop",
            Self::BlockedAuthor => "blocked_author",
            Self::BracketCommand => "bracket_command",
            Self::PrefixedCommand => "prefixed_command",
            Self::EmptyContent => "empty_content",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FilterVerdict {
    Relay,
    Drop(DropReason),
}

pub(super) fn evaluate_message(
    message: &InboundMessage,
    bot_user_id: Option<&str>,
    destination_webhook_ids: &HashSet<String>,
    blocked_author_ids: &HashSet<String>,
    command_prefixes: &[String],
) -> FilterVerdict {
    if bot_user_id.is_some_and(|id| id == message.author.id) {
        return FilterVerdict::Drop(DropReason::SelfAuthored);
    }

    if let Some(webhook_id) = message.webhook_id.as_deref() {
        if destination_webhook_ids.contains(webhook_id) {
            return FilterVerdict::Drop(DropReason::WebhookLoop);
        }
        // Already-proxied content from a recognized external webhook is
        // legitimate relay input; no further admission checks apply.
        return FilterVerdict::Relay;
    }

    if blocked_author_ids.contains(&message.author.id) {
        return FilterVerdict::Drop(DropReason::BlockedAuthor);
    }

    let trimmed = message.content.as_deref().unwrap_or("").trim();
    if trimmed.starts_with('[') {
        return FilterVerdict::Drop(DropReason::BracketCommand);
    }

    let lowered = trimmed.to_lowercase();
    if command_prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && lowered.starts_with(&prefix.to_lowercase()))
    {
        return FilterVerdict::Drop(DropReason::PrefixedCommand);
    }

    if trimmed.is_empty() && message.attachments.is_empty() && message.embeds.is_empty() {
        return FilterVerdict::Drop(DropReason::EmptyContent);
    }

    FilterVerdict::Relay
}
