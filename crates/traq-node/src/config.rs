//! Node configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `TRAQ_`-prefixed environment variables (`TRAQ_BOT__WORKERS=4`), then
//! command-line flags applied by the binary.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use traq_bot::BotConfig;
use traq_oauth2::OAuth2Config;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TRAQ";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a traQ node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Public origin used to build absolute URLs.
    pub origin: String,
    /// Development mode relaxes cookie security.
    pub dev_mode: bool,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// `json` or `pretty`.
    pub log_format: String,
    /// Password given to the `traq` administrator when it is first created.
    pub admin_password: String,
    pub oauth2: OAuth2Config,
    pub external: ExternalConfig,
    pub media: MediaConfig,
    pub bot: BotConfig,
    pub realtime: RealtimeConfig,
    pub webhook: WebhookConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            origin: "http://localhost:3000".to_string(),
            dev_mode: false,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            admin_password: "traq".to_string(),
            oauth2: OAuth2Config::default(),
            external: ExternalConfig::default(),
            media: MediaConfig::default(),
            bot: BotConfig::default(),
            realtime: RealtimeConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// Credentials for one external sign-in provider.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Issuer or origin URL. Required by OIDC and traQ providers.
    pub issuer: String,
    pub allow_sign_up: bool,
}

/// External sign-in providers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub github: ProviderConfig,
    pub google: ProviderConfig,
    pub oidc: ProviderConfig,
    pub slack: ProviderConfig,
    pub traq: ProviderConfig,
}

impl ExternalConfig {
    /// Every provider with its name and whether it is fully specified.
    pub fn providers(&self) -> [(&'static str, &ProviderConfig, bool); 5] {
        [
            ("github", &self.github, false),
            ("google", &self.google, false),
            ("oidc", &self.oidc, true),
            ("slack", &self.slack, false),
            ("traq", &self.traq, true),
        ]
    }

    /// Names of the providers that are usable.
    pub fn valid_providers(&self) -> Vec<&'static str> {
        self.providers()
            .into_iter()
            .filter(|(_, provider, needs_issuer)| provider.is_valid(*needs_issuer))
            .map(|(name, _, _)| name)
            .collect()
    }
}

impl ProviderConfig {
    /// True when nothing was configured for this provider.
    pub fn is_empty(&self) -> bool {
        self.client_id.is_empty() && self.client_secret.is_empty() && self.issuer.is_empty()
    }

    pub fn is_valid(&self, needs_issuer: bool) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && (!needs_issuer || !self.issuer.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path of the external image converter binary.
    pub converter_exec: Option<PathBuf>,
}

/// SSE and presence settings.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Per-connection SSE queue length.
    pub sse_buffer: usize,
    pub keepalive_secs: u64,
    pub heartbeat_ttl_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            sse_buffer: traq_realtime::DEFAULT_CLIENT_BUFFER,
            keepalive_secs: 10,
            heartbeat_ttl_secs: traq_realtime::DEFAULT_HEARTBEAT_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// YAML file replacing the built-in GitHub templates.
    pub github_templates: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        use config::{Environment, File};

        let mut builder = config::Config::builder()
            .set_default("log_level", "info")?
            .set_default("log_format", "pretty")?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config: Config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.origin).is_err() {
            return Err(ConfigError::Invalid(format!("origin {} is not a URL", self.origin)));
        }
        if self.oauth2.access_token_exp <= 0 {
            return Err(ConfigError::Invalid("oauth2.access_token_exp must be positive".into()));
        }
        if self.bot.workers == 0 {
            return Err(ConfigError::Invalid("bot.workers must be at least 1".into()));
        }
        if self.realtime.sse_buffer == 0 || self.realtime.keepalive_secs == 0 {
            return Err(ConfigError::Invalid(
                "realtime.sse_buffer and realtime.keepalive_secs must be positive".into(),
            ));
        }
        if let Some(exec) = &self.media.converter_exec {
            if !exec.is_file() {
                return Err(ConfigError::Invalid(format!(
                    "media.converter_exec {} does not exist",
                    exec.display()
                )));
            }
        }
        Ok(())
    }

    /// Log which external providers are enabled and which were ignored.
    pub fn log_external_providers(&self) {
        for (name, provider, needs_issuer) in self.external.providers() {
            if provider.is_empty() {
                continue;
            }
            if provider.is_valid(needs_issuer) {
                tracing::info!(provider = name, allow_sign_up = provider.allow_sign_up, "External sign-in enabled");
            } else {
                tracing::warn!(provider = name, "External sign-in provider is incomplete and will be ignored");
            }
        }
    }
}
