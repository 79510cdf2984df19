//! Mirror bot entrypoint: configuration, keep-alive server, gateway runtime.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mirror_core::current_unix_timestamp_ms;
use mirror_core::gateway_health::new_shared_gateway_health;
use mirror_discord_runtime::{
    run_discord_mirror, DiscordMirrorRuntimeConfig, MirrorMap, DEFAULT_GATEWAY_URL,
};
use mirror_keepalive::serve_keep_alive;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "mirror",
    about = "Mirrors Discord source channels into destination webhooks",
    version
)]
struct MirrorArgs {
    #[arg(
        long,
        env = "DISCORD_TOKEN",
        hide_env_values = true,
        help = "Discord bot token used for gateway authentication"
    )]
    token: String,

    #[arg(
        long,
        env = "DISCORD_MIRROR_MAP",
        default_value = "{}",
        help = "JSON object mapping source channel ids to arrays of destination webhook URLs"
    )]
    mirror_map: String,

    #[arg(
        long,
        env = "ENABLE_BOT_INDICATOR",
        default_value_t = false,
        help = "Append a [BOT]/[USER] suffix to relayed usernames"
    )]
    enable_bot_indicator: bool,

    #[arg(
        long,
        env = "USE_WEBHOOK_PROFILE",
        default_value_t = false,
        help = "Brand relayed messages with the destination webhook's own name"
    )]
    use_webhook_profile: bool,

    #[arg(
        long,
        env = "OVERRIDE_WEBHOOK_AVATAR",
        default_value_t = false,
        help = "Also replace the avatar when --use-webhook-profile is enabled"
    )]
    override_webhook_avatar: bool,

    #[arg(
        long,
        env = "WEBHOOK_LOOKUP_HEADERS",
        default_value = "{}",
        help = "JSON object of extra headers sent with webhook profile lookups"
    )]
    lookup_headers: String,

    #[arg(
        long,
        env = "BLOCKED_AUTHOR_IDS",
        help = "Comma-separated author ids whose direct posts are never mirrored"
    )]
    blocked_author_ids: Option<String>,

    #[arg(
        long,
        env = "COMMAND_PREFIXES",
        help = "Comma-separated command prefixes dropped by the noise filter"
    )]
    command_prefixes: Option<String>,

    #[arg(long, env = "GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    gateway_url: String,

    #[arg(
        long,
        env = "REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        help = "HTTP timeout for webhook deliveries and lookups in milliseconds"
    )]
    request_timeout_ms: u64,

    #[arg(
        long,
        env = "RECONNECT_DELAY_MS",
        default_value_t = 1_000,
        help = "Delay between gateway reconnect attempts in milliseconds"
    )]
    reconnect_delay_ms: u64,

    #[arg(
        long,
        env = "PORT",
        default_value_t = 3000,
        help = "Keep-alive HTTP port; hosting platforms probe this for liveness"
    )]
    port: u16,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_lookup_headers(raw: &str) -> Result<Vec<(String, String)>> {
    let headers: HashMap<String, String> =
        serde_json::from_str(raw).context("failed to parse webhook lookup headers JSON")?;
    Ok(headers.into_iter().collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = MirrorArgs::parse();

    let mirror_map = match MirrorMap::parse(&args.mirror_map) {
        Ok(map) => map,
        Err(error) => {
            tracing::error!(
                error = %error,
                "failed to parse mirror map; continuing with an empty routing table"
            );
            MirrorMap::default()
        }
    };
    if mirror_map.is_empty() {
        tracing::warn!("mirror map is empty; no messages will be relayed");
    } else {
        tracing::info!(
            channels = mirror_map.channel_count(),
            destinations = mirror_map.destination_count(),
            "mirror routing table loaded"
        );
    }

    let lookup_headers = parse_lookup_headers(&args.lookup_headers)?;
    let blocked_author_ids = args
        .blocked_author_ids
        .as_deref()
        .map(parse_csv_list)
        .unwrap_or_else(DiscordMirrorRuntimeConfig::default_blocked_author_ids);
    let command_prefixes = args
        .command_prefixes
        .as_deref()
        .map(parse_csv_list)
        .unwrap_or_else(DiscordMirrorRuntimeConfig::default_command_prefixes);

    let health = new_shared_gateway_health(current_unix_timestamp_ms());
    let keepalive_health = health.clone();
    let keepalive_port = args.port;
    tokio::spawn(async move {
        if let Err(error) = serve_keep_alive(keepalive_port, keepalive_health).await {
            tracing::error!(error = %error, "keep-alive server failed");
        }
    });

    let config = DiscordMirrorRuntimeConfig {
        bot_token: args.token,
        gateway_url: args.gateway_url,
        mirror_map,
        blocked_author_ids,
        command_prefixes,
        enable_bot_indicator: args.enable_bot_indicator,
        use_webhook_profile: args.use_webhook_profile,
        override_webhook_avatar: args.override_webhook_avatar,
        lookup_headers,
        request_timeout_ms: args.request_timeout_ms,
        reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
    };

    run_discord_mirror(config, health).await
}
