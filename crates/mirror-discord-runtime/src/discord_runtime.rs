//! Discord gateway runtime that mirrors source-channel messages to webhooks.
//!
//! One logical gateway connection at a time: the session loop owns the
//! socket, the heartbeat interval, and the resume state, and reconnects
//! forever on transient faults. Only a non-retryable invalid session is
//! fatal.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use mirror_core::{current_unix_timestamp_ms, GatewayHealthSnapshot, SharedGatewayHealth};
use serde_json::json;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::mirror_map::{extract_webhook_id, MirrorMap};

mod gateway_payloads;
mod message_filters;
mod relay_engine;
mod webhook_client;

use gateway_payloads::{
    GatewayFrame, GatewayOpcode, HelloPayload, InboundMessage, ReadyPayload, DISPATCH_MESSAGE_CREATE,
    DISPATCH_READY,
};
use message_filters::{
    evaluate_message, FilterVerdict, DEFAULT_BLOCKED_AUTHOR_IDS, DEFAULT_COMMAND_PREFIXES,
};
use relay_engine::{relay_to_destinations, RelayOptions};
use webhook_client::WebhookClient;

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const GATEWAY_QUERY_SUFFIX: &str = "?v=10&encoding=json";

/// Guilds + guild messages + message content.
const GATEWAY_INTENTS: u64 = 33_281;

#[derive(Clone)]
/// Runtime configuration for the gateway mirror loop.
pub struct DiscordMirrorRuntimeConfig {
    pub bot_token: String,
    pub gateway_url: String,
    pub mirror_map: MirrorMap,
    pub blocked_author_ids: Vec<String>,
    pub command_prefixes: Vec<String>,
    pub enable_bot_indicator: bool,
    pub use_webhook_profile: bool,
    pub override_webhook_avatar: bool,
    pub lookup_headers: Vec<(String, String)>,
    pub request_timeout_ms: u64,
    pub reconnect_delay: Duration,
}

impl DiscordMirrorRuntimeConfig {
    pub fn default_blocked_author_ids() -> Vec<String> {
        DEFAULT_BLOCKED_AUTHOR_IDS
            .iter()
            .map(|id| id.to_string())
            .collect()
    }

    pub fn default_command_prefixes() -> Vec<String> {
        DEFAULT_COMMAND_PREFIXES
            .iter()
            .map(|prefix| prefix.to_string())
            .collect()
    }
}

/// Runs the gateway mirror loop until shutdown or a fatal session error.
pub async fn run_discord_mirror(
    config: DiscordMirrorRuntimeConfig,
    health: SharedGatewayHealth,
) -> Result<()> {
    let mut runtime = DiscordMirrorRuntime::new(config, health)?;
    runtime.run().await
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SessionState {
    session_id: String,
    resume_gateway_url: String,
    sequence: Option<u64>,
    authenticated: bool,
    bot_user_id: Option<String>,
}

impl SessionState {
    fn can_resume(&self) -> bool {
        !self.session_id.is_empty() && !self.resume_gateway_url.is_empty()
    }

    /// Sequence numbers never regress, even if the gateway replays an older
    /// frame during resume.
    fn observe_sequence(&mut self, observed: Option<u64>) {
        if let Some(value) = observed {
            self.sequence = Some(self.sequence.map_or(value, |current| current.max(value)));
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

enum SessionOutcome {
    Reconnect,
    Shutdown,
    Fatal { reason: String },
}

enum FrameFlow {
    Continue,
    Reconnect,
    Fatal { reason: String },
}

struct DiscordMirrorRuntime {
    config: DiscordMirrorRuntimeConfig,
    webhook_client: WebhookClient,
    session: SessionState,
    destination_webhook_ids: HashSet<String>,
    identity_cache_built: bool,
    blocked_author_ids: HashSet<String>,
    health: SharedGatewayHealth,
}

impl DiscordMirrorRuntime {
    fn new(config: DiscordMirrorRuntimeConfig, health: SharedGatewayHealth) -> Result<Self> {
        let webhook_client =
            WebhookClient::new(config.request_timeout_ms, config.lookup_headers.clone())?;
        let blocked_author_ids = config.blocked_author_ids.iter().cloned().collect();
        Ok(Self {
            config,
            webhook_client,
            session: SessionState::default(),
            destination_webhook_ids: HashSet::new(),
            identity_cache_built: false,
            blocked_author_ids,
            health,
        })
    }

    async fn run(&mut self) -> Result<()> {
        loop {
            match self.run_socket_session().await {
                Ok(SessionOutcome::Shutdown) => {
                    tracing::info!("mirror runtime shutdown requested");
                    return Ok(());
                }
                Ok(SessionOutcome::Reconnect) => {}
                Ok(SessionOutcome::Fatal { reason }) => {
                    self.session.reset();
                    self.update_health(|health| health.connected = false);
                    bail!("gateway session invalidated: {reason}");
                }
                Err(error) => {
                    tracing::warn!(error = %error, "gateway session error");
                }
            }

            self.update_health(|health| {
                health.connected = false;
                health.reconnects = health.reconnects.saturating_add(1);
            });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("mirror runtime shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    async fn run_socket_session(&mut self) -> Result<SessionOutcome> {
        let resuming = self.session.can_resume();
        let connect_url = if resuming {
            tracing::info!(
                session_id = %self.session.session_id,
                sequence = ?self.session.sequence,
                "resuming gateway session"
            );
            self.session.resume_gateway_url.clone()
        } else {
            tracing::info!("starting fresh gateway connection");
            self.session.authenticated = false;
            self.config.gateway_url.clone()
        };

        let (stream, _response) = connect_async(connect_url.as_str())
            .await
            .context("failed to connect to the discord gateway")?;
        let (mut sink, mut source) = stream.split();
        tracing::info!("connected to the discord gateway");
        self.update_health(|health| {
            health.connected = true;
            health.last_connect_unix_ms = current_unix_timestamp_ms();
        });

        if resuming {
            let resume = json!({
                "op": 6,
                "d": {
                    "token": format!("Bot {}", self.config.bot_token),
                    "session_id": self.session.session_id,
                    "seq": self.session.sequence.unwrap_or(0),
                }
            });
            sink.send(WsMessage::Text(resume.to_string().into()))
                .await
                .context("failed to send gateway resume")?;
        }

        // The heartbeat interval is armed by the hello frame and dies with
        // this connection's stack frame; a replaced connection can never be
        // ticked by a stale timer.
        let mut heartbeat: Option<Interval> = None;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    return Ok(SessionOutcome::Shutdown);
                }
                _ = heartbeat_tick(&mut heartbeat) => {
                    self.send_heartbeat(&mut sink).await?;
                }
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        tracing::warn!("gateway connection closed; reconnecting");
                        return Ok(SessionOutcome::Reconnect);
                    };
                    let message = match message_result {
                        Ok(message) => message,
                        Err(error) => {
                            tracing::warn!(error = %error, "gateway socket error; reconnecting");
                            return Ok(SessionOutcome::Reconnect);
                        }
                    };
                    let frame = match parse_gateway_frame(message) {
                        Ok(Some(frame)) => frame,
                        Ok(None) => continue,
                        Err(error) => {
                            tracing::warn!(error = %error, "failed to decode gateway frame");
                            continue;
                        }
                    };
                    match self.handle_frame(frame, &mut sink, &mut heartbeat).await? {
                        FrameFlow::Continue => {}
                        FrameFlow::Reconnect => return Ok(SessionOutcome::Reconnect),
                        FrameFlow::Fatal { reason } => {
                            return Ok(SessionOutcome::Fatal { reason });
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame<S>(
        &mut self,
        frame: GatewayFrame,
        sink: &mut S,
        heartbeat: &mut Option<Interval>,
    ) -> Result<FrameFlow>
    where
        S: futures_util::Sink<WsMessage> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        self.session.observe_sequence(frame.s);
        self.update_health(|health| health.last_event_unix_ms = current_unix_timestamp_ms());

        let Some(opcode) = GatewayOpcode::from_u8(frame.op) else {
            tracing::debug!(op = frame.op, "ignoring unrecognized gateway opcode");
            return Ok(FrameFlow::Continue);
        };

        match opcode {
            GatewayOpcode::Hello => {
                let hello: HelloPayload = serde_json::from_value(frame.d)
                    .context("failed to decode gateway hello payload")?;
                self.send_heartbeat(sink).await?;
                let period = Duration::from_millis(hello.heartbeat_interval.max(1));
                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *heartbeat = Some(timer);
                tracing::info!(
                    interval_ms = hello.heartbeat_interval,
                    "gateway heartbeat started"
                );
            }
            GatewayOpcode::Heartbeat => {
                tracing::debug!("gateway requested an immediate heartbeat");
                self.send_heartbeat(sink).await?;
            }
            GatewayOpcode::HeartbeatAck => {
                if !self.session.authenticated {
                    self.send_identify(sink).await?;
                    self.session.authenticated = true;
                    tracing::info!("gateway identify sent; authenticating");
                }
            }
            GatewayOpcode::Dispatch => return self.handle_dispatch(frame).await,
            GatewayOpcode::Reconnect => {
                tracing::info!("gateway requested a reconnect");
                return Ok(FrameFlow::Reconnect);
            }
            GatewayOpcode::InvalidSession => {
                if frame.d.as_bool().unwrap_or(false) {
                    tracing::warn!("gateway session invalid but retryable; reconnecting");
                    return Ok(FrameFlow::Reconnect);
                }
                return Ok(FrameFlow::Fatal {
                    reason: "gateway reported a non-retryable invalid session".to_string(),
                });
            }
        }

        Ok(FrameFlow::Continue)
    }

    async fn handle_dispatch(&mut self, frame: GatewayFrame) -> Result<FrameFlow> {
        match frame.t.as_deref() {
            Some(DISPATCH_READY) => {
                let ready: ReadyPayload = serde_json::from_value(frame.d)
                    .context("failed to decode gateway ready payload")?;
                self.session.session_id = ready.session_id;
                self.session.resume_gateway_url =
                    format!("{}{}", ready.resume_gateway_url, GATEWAY_QUERY_SUFFIX);
                self.session.bot_user_id = Some(ready.user.id.clone());
                tracing::info!(
                    user = %ready.user.login_name(),
                    bot_id = %ready.user.id,
                    "logged in to the gateway"
                );
                self.build_identity_cache_once();
            }
            Some(DISPATCH_MESSAGE_CREATE) => match serde_json::from_value::<InboundMessage>(frame.d)
            {
                Ok(message) => self.handle_message_create(message).await,
                Err(error) => {
                    tracing::warn!(error = %error, "failed to decode message create payload");
                }
            },
            _ => {
                tracing::debug!(event = ?frame.t, "ignoring gateway dispatch event");
            }
        }
        Ok(FrameFlow::Continue)
    }

    async fn handle_message_create(&self, message: InboundMessage) {
        if !self.config.mirror_map.contains_channel(&message.channel_id) {
            return;
        }

        let verdict = evaluate_message(
            &message,
            self.session.bot_user_id.as_deref(),
            &self.destination_webhook_ids,
            &self.blocked_author_ids,
            &self.config.command_prefixes,
        );
        if let FilterVerdict::Drop(reason) = verdict {
            tracing::debug!(
                message_id = %message.id,
                channel_id = %message.channel_id,
                author_id = %message.author.id,
                reason = reason.as_str(),
                "dropping message"
            );
            self.update_health(|health| {
                health.dropped_messages = health.dropped_messages.saturating_add(1);
            });
            return;
        }

        let destinations = self.config.mirror_map.destinations_for(&message.channel_id);
        if destinations.is_empty() {
            tracing::warn!(
                channel_id = %message.channel_id,
                "no destinations configured for source channel; skipping"
            );
            self.update_health(|health| {
                health.dropped_messages = health.dropped_messages.saturating_add(1);
            });
            return;
        }

        tracing::info!(
            message_id = %message.id,
            channel_id = %message.channel_id,
            destinations = destinations.len(),
            "mirroring message"
        );
        let options = RelayOptions {
            enable_bot_indicator: self.config.enable_bot_indicator,
            use_webhook_profile: self.config.use_webhook_profile,
            override_webhook_avatar: self.config.override_webhook_avatar,
        };
        let outcome =
            relay_to_destinations(&self.webhook_client, &message, destinations, options).await;
        self.update_health(|health| {
            health.relayed_messages = health.relayed_messages.saturating_add(outcome.delivered as u64);
            health.delivery_failures = health.delivery_failures.saturating_add(outcome.failed as u64);
        });
    }

    /// Extracts a webhook id from every destination URL exactly once per
    /// process lifetime. Malformed URLs are skipped and stay outside loop
    /// prevention coverage.
    fn build_identity_cache_once(&mut self) {
        if self.identity_cache_built {
            return;
        }
        self.identity_cache_built = true;

        let mut total = 0_usize;
        for url in self.config.mirror_map.destination_urls() {
            total += 1;
            match extract_webhook_id(url) {
                Some(webhook_id) => {
                    tracing::debug!(webhook_id = %webhook_id, "registered destination webhook id");
                    self.destination_webhook_ids.insert(webhook_id);
                }
                None => {
                    tracing::warn!(
                        "failed to extract a webhook id from a destination url; loop prevention will not cover it"
                    );
                }
            }
        }
        if total > 0 {
            tracing::info!(
                destinations = total,
                covered = self.destination_webhook_ids.len(),
                "loop prevention initialized"
            );
        }
    }

    async fn send_heartbeat<S>(&self, sink: &mut S) -> Result<()>
    where
        S: futures_util::Sink<WsMessage> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let heartbeat = json!({ "op": 1, "d": self.session.sequence });
        sink.send(WsMessage::Text(heartbeat.to_string().into()))
            .await
            .context("failed to send gateway heartbeat")?;
        tracing::debug!(sequence = ?self.session.sequence, "heartbeat sent");
        Ok(())
    }

    async fn send_identify<S>(&self, sink: &mut S) -> Result<()>
    where
        S: futures_util::Sink<WsMessage> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let identify = json!({
            "op": 2,
            "d": {
                "token": format!("Bot {}", self.config.bot_token),
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "mirror-discord-relay",
                    "device": "mirror-discord-relay",
                },
                "intents": GATEWAY_INTENTS,
            }
        });
        sink.send(WsMessage::Text(identify.to_string().into()))
            .await
            .context("failed to send gateway identify")
    }

    fn update_health(&self, update: impl FnOnce(&mut GatewayHealthSnapshot)) {
        if let Ok(mut guard) = self.health.lock() {
            update(&mut guard);
        }
    }
}

async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn parse_gateway_frame(message: WsMessage) -> Result<Option<GatewayFrame>> {
    match message {
        WsMessage::Text(text) => {
            let frame = serde_json::from_str::<GatewayFrame>(&text)
                .context("failed to parse gateway frame")?;
            Ok(Some(frame))
        }
        WsMessage::Binary(bytes) => {
            let text =
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 gateway payload")?;
            let frame = serde_json::from_str::<GatewayFrame>(&text)
                .context("failed to parse gateway frame")?;
            Ok(Some(frame))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) => Ok(None),
        WsMessage::Close(_) => Ok(None),
        WsMessage::Frame(_) => Ok(None),
    }
}
