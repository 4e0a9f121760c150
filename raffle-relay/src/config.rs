//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `RAFFLE_RELAY_CONFIG`
//! environment variable. A missing file is fine: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `RAFFLE_RELAY_` override YAML values
//! 3. **ALPHABOT_WEBHOOK_SECRET** / **DISCORD_BOT_TOKEN** - Special cases: set `webhook.secret`
//!    and `notifications.discord.bot_token` respectively
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `RAFFLE_RELAY_FANOUT__MAX_CONCURRENCY=16` sets the `fanout.max_concurrency` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! RAFFLE_RELAY_PORT=8080
//!
//! # Shared webhook secret (preferred method)
//! ALPHABOT_WEBHOOK_SECRET=...
//!
//! # Point at a staging Alphabot
//! RAFFLE_RELAY_ALPHABOT__BASE_URL=https://staging.alphabot.app/v1
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "RAFFLE_RELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Export traces over OTLP (configured through the standard `OTEL_*` variables)
    pub enable_otel_export: bool,
    /// Serve Prometheus metrics on `/internal/metrics`
    pub enable_metrics: bool,
    pub alphabot: AlphabotConfig,
    pub webhook: WebhookConfig,
    pub fanout: FanoutConfig,
    pub storage: StorageConfig,
    pub notifications: NotificationsConfig,
}

/// Upstream Alphabot API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlphabotConfig {
    pub base_url: Url,
    /// Per-request timeout (connect + response)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Wait used when a 429 carries no usable `Retry-After`
    #[serde(with = "humantime_serde")]
    pub default_retry_after: Duration,
    /// Ceiling on any rate-limit wait
    #[serde(with = "humantime_serde")]
    pub max_retry_after: Duration,
}

/// Inbound webhook authentication.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebhookConfig {
    /// Shared HMAC secret. Unset or empty disables verification (development only).
    #[serde(skip_serializing)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FanoutConfig {
    /// Registrations in flight at once during one fan-out
    pub max_concurrency: usize,
    /// How long the webhook response waits for a fan-out before letting it finish in the background
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// JSON file holding participant API keys
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationsConfig {
    /// Deliver outcomes as Discord DMs. Without it, outcomes are only logged.
    pub discord: Option<DiscordConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscordConfig {
    #[serde(skip_serializing)]
    pub bot_token: String,
    pub api_base_url: Url,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            enable_otel_export: false,
            enable_metrics: false,
            alphabot: AlphabotConfig::default(),
            webhook: WebhookConfig::default(),
            fanout: FanoutConfig::default(),
            storage: StorageConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl Default for AlphabotConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://api.alphabot.app/v1").expect("Invalid default Alphabot URL"),
            request_timeout: Duration::from_secs(30),
            user_agent: "AlphabotDiscordBot/1.0".to_string(),
            default_retry_after: Duration::from_secs(60),
            max_retry_after: Duration::from_secs(120),
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            timeout: Duration::from_secs(25),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/user_keys.json"),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: Url::parse("https://discord.com/api/v10").expect("Invalid default Discord URL"),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.fanout.max_concurrency < 1 {
            return Err(Error::Internal {
                operation: "Config validation: fanout.max_concurrency must be at least 1".to_string(),
            });
        }

        if self.fanout.timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: fanout.timeout must be greater than zero".to_string(),
            });
        }

        if self.alphabot.request_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: alphabot.request_timeout must be greater than zero".to_string(),
            });
        }

        if self.alphabot.default_retry_after > self.alphabot.max_retry_after {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: alphabot.default_retry_after ({:?}) cannot be greater than alphabot.max_retry_after ({:?})",
                    self.alphabot.default_retry_after, self.alphabot.max_retry_after
                ),
            });
        }

        if self.alphabot.base_url.cannot_be_a_base() {
            return Err(Error::Internal {
                operation: format!("Config validation: alphabot.base_url {} is not a valid base URL", self.alphabot.base_url),
            });
        }

        if self.storage.path.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.path must not be empty".to_string(),
            });
        }

        if let Some(discord) = &self.notifications.discord
            && discord.bot_token.is_empty()
        {
            return Err(Error::Internal {
                operation: "Config validation: notifications.discord is configured but bot_token is empty. \
                 Please set DISCORD_BOT_TOKEN or add bot_token to the config file."
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            // (RAFFLE_RELAY_CONFIG names the file itself and is not a field)
            .merge(Env::prefixed("RAFFLE_RELAY_").ignore(&["config"]).split("__"))
            // Variable names the bot has always used
            .merge(
                Env::raw()
                    .only(&["ALPHABOT_WEBHOOK_SECRET"])
                    .map(|_| "webhook.secret".into()),
            )
            .merge(
                Env::raw()
                    .only(&["DISCORD_BOT_TOKEN"])
                    .map(|_| "notifications.discord.bot_token".into()),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
