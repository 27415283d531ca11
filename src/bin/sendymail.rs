use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sendymail::botx::{BotxClient, CallbackRegistry, CallbackVerifier};
use sendymail::commands::CommandHandler;
use sendymail::config::Config;
use sendymail::web_api::{self, AppState};
use sendymail::{AddressResolver, GatewayPipeline, MetadataSealer, MuteStore, PlatformClient, TokenStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate().context("invalid configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let tokens = Arc::new(TokenStore::load(&config.token_file).context("unable to load tokens")?);
    tracing::info!(
        path = %tokens.path().display(),
        tokens = tokens.generation().len(),
        "tokens loaded"
    );
    let _refresh = tokens.spawn_refresh(config.token_refresh());

    let mutes = Arc::new(MuteStore::open(&config.mute_file).context("unable to open mute file")?);
    tracing::info!(path = %mutes.path().display(), entries = mutes.len(), "mute file loaded");

    let callbacks = Arc::new(CallbackRegistry::new(config.sync_timeout()));
    let credentials = config.credentials()?;
    let platform_auth = CallbackVerifier::new(&credentials);
    let client = BotxClient::new(
        credentials,
        config.debug,
        callbacks.clone(),
        config.sync_timeout(),
    )
    .context("unable to build platform client")?;
    let platform: Arc<dyn PlatformClient> = Arc::new(client);

    let resolver = AddressResolver::new(config.group_chat_suffix.trim());
    let pipeline = GatewayPipeline::new(
        tokens,
        mutes.clone(),
        MetadataSealer::new(config.metadata_secret()),
        resolver.clone(),
        platform.clone(),
    );
    let commands = CommandHandler::new(mutes, resolver, platform);
    let state = AppState::new(pipeline, commands, Some(callbacks), platform_auth);

    web_api::run_http_server(config.listen, state)
        .await
        .context("http server failed")
}
