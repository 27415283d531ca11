use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::botx::{BotxCredentials, InvalidCredentials};
use crate::types::DEFAULT_GROUP_CHAT_SUFFIX;

pub const MIN_METADATA_SECRET_LEN: usize = 20;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sendymail",
    about = "Mail-addressed message gateway for BotX chats",
    args_override_self = true
)]
pub struct Config {
    /// Bot credentials as `host@secret_key@bot_id`.
    #[arg(long, env = "BOT_CREDENTIALS", hide_env_values = true)]
    pub bot_credentials: String,

    /// Secret the caller metadata key is derived from.
    #[arg(long, env = "METADATA_SECRET", hide_env_values = true)]
    pub metadata_secret: String,

    /// YAML list of `{ token: ... }` records accepted as bearer tokens.
    #[arg(long, env = "TOKEN_FILE")]
    pub token_file: PathBuf,

    /// Newline-delimited list of muted addresses and chat ids.
    #[arg(long, env = "MUTE_FILE")]
    pub mute_file: PathBuf,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Verbose logging and plain-HTTP platform access.
    #[arg(long, env = "DEBUG", default_value_t = false)]
    pub debug: bool,

    #[arg(long, env = "GROUP_CHAT_SUFFIX", default_value = DEFAULT_GROUP_CHAT_SUFFIX)]
    pub group_chat_suffix: String,

    #[arg(long, env = "TOKEN_REFRESH_SECS", default_value_t = 600)]
    pub token_refresh_secs: u64,

    /// How long a synchronous send waits for the delivery report.
    #[arg(long, env = "SYNC_TIMEOUT_SECS", default_value_t = 60)]
    pub sync_timeout_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Credentials(#[from] InvalidCredentials),
    #[error("METADATA_SECRET must be at least {} characters", MIN_METADATA_SECRET_LEN)]
    ShortSecret,
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials()?;
        if self.metadata_secret.trim().chars().count() < MIN_METADATA_SECRET_LEN {
            return Err(ConfigError::ShortSecret);
        }
        if self.token_file.as_os_str().is_empty() {
            return Err(ConfigError::Empty("TOKEN_FILE"));
        }
        if self.mute_file.as_os_str().is_empty() {
            return Err(ConfigError::Empty("MUTE_FILE"));
        }
        if self.group_chat_suffix.trim().is_empty() {
            return Err(ConfigError::Empty("GROUP_CHAT_SUFFIX"));
        }
        if self.token_refresh_secs == 0 {
            return Err(ConfigError::Zero("TOKEN_REFRESH_SECS"));
        }
        if self.sync_timeout_secs == 0 {
            return Err(ConfigError::Zero("SYNC_TIMEOUT_SECS"));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Result<BotxCredentials, InvalidCredentials> {
        self.bot_credentials.parse()
    }

    pub fn metadata_secret(&self) -> &str {
        self.metadata_secret.trim()
    }

    pub fn token_refresh(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "sendymail=debug,tower_http=debug"
        } else {
            "sendymail=info"
        }
    }
}
