//! Webhook HTTP client used for relay delivery and identity lookups.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::relay_engine::RelayPayload;
use crate::discord_helpers::truncate_for_error;

/// Identity metadata returned by a webhook GET.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct WebhookProfile {
    pub(super) name: String,
    #[serde(default)]
    pub(super) id: Option<String>,
    #[serde(default)]
    pub(super) avatar: Option<String>,
}

#[derive(Clone)]
pub(super) struct WebhookClient {
    http: reqwest::Client,
    lookup_headers: Vec<(String, String)>,
}

impl WebhookClient {
    pub(super) fn new(
        request_timeout_ms: u64,
        lookup_headers: Vec<(String, String)>,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("mirror-discord-relay"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create webhook http client")?;

        Ok(Self {
            http,
            lookup_headers,
        })
    }

    pub(super) async fn execute_webhook(&self, url: &str, payload: &RelayPayload) -> Result<()> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .context("webhook delivery request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "webhook delivery failed with status {}: {}",
                status.as_u16(),
                truncate_for_error(&body, 320)
            );
        }
        Ok(())
    }

    pub(super) async fn fetch_webhook_profile(&self, url: &str) -> Result<WebhookProfile> {
        let mut request = self.http.get(url);
        for (name, value) in &self.lookup_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .context("webhook profile request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "webhook profile lookup failed with status {}: {}",
                status.as_u16(),
                truncate_for_error(&body, 320)
            );
        }
        response
            .json::<WebhookProfile>()
            .await
            .context("failed to decode webhook profile")
    }
}
