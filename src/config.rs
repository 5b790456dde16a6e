use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Front-end origins allowed to submit the contact form.
///
/// `Origin` headers must equal an entry exactly; `Referer` headers only need
/// to start with one.
pub const ALLOWED_ORIGINS: &[&str] = &[
    "https://www.noviacitraandini.site",
    "https://noviacitraandini.vercel.app/",
    "http://localhost:5173",
    "http://localhost:3000",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    pub statistics: Option<StatisticsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_address: String,
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub owner_name: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_attempts: usize,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    pub enabled: bool,
    pub flush_interval_seconds: Option<u64>,
}

fn default_endpoint_path() -> String {
    "/api/send-email".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Implicit-TLS submission port.
fn default_smtp_port() -> u16 {
    465
}

fn default_subject_prefix() -> String {
    "New message from portfolio".to_string()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 15 * 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(30))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                listen_address: "0.0.0.0:3000".to_string(),
                endpoint_path: default_endpoint_path(),
                max_body_bytes: default_max_body_bytes(),
            },
            relay: RelayConfig {
                host: "smtp.gmail.com".to_string(),
                port: default_smtp_port(),
                timeout_seconds: Some(30),
            },
            site: SiteConfig {
                owner_name: "Novia Citra Andini".to_string(),
                subject_prefix: default_subject_prefix(),
            },
            rate_limit: RateLimitConfig::default(),
            statistics: Some(StatisticsConfig {
                enabled: true,
                flush_interval_seconds: Some(300),
            }),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {path}"))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {path}"))?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {path}"))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let host = self.relay.host.trim();
        if host.is_empty() || host.contains(char::is_whitespace) {
            bail!("Invalid relay host: '{}'", self.relay.host);
        }
        if self.relay.port == 0 {
            bail!("Relay port must be non-zero");
        }
        if !self.server.endpoint_path.starts_with('/') {
            bail!(
                "Endpoint path must start with '/': {}",
                self.server.endpoint_path
            );
        }
        if self.rate_limit.max_attempts == 0 || self.rate_limit.window_seconds == 0 {
            bail!("Rate limit attempts and window must be non-zero");
        }
        if self.server.max_body_bytes == 0 {
            bail!("Maximum body size must be non-zero");
        }
        Ok(())
    }

    pub fn statistics_interval(&self) -> Option<Duration> {
        match &self.statistics {
            Some(stats) if stats.enabled => Some(Duration::from_secs(
                stats.flush_interval_seconds.unwrap_or(300).max(1),
            )),
            _ => None,
        }
    }
}

/// How the deployment treats its trust boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Origin allow-list enforced, relay TLS verified.
    Production,
    /// Origin check bypassed, relay certificate validation disabled.
    Development,
    /// Origin check bypassed, relay TLS verified.
    Local,
}

impl DeploymentMode {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("production") => DeploymentMode::Production,
            Some("development") => DeploymentMode::Development,
            _ => DeploymentMode::Local,
        }
    }

    /// Whether requests from origins outside [`ALLOWED_ORIGINS`] are refused.
    ///
    /// Only production enforces the allow-list; every other mode accepts any
    /// origin so the form can be exercised from local tooling.
    pub fn enforces_origin(self) -> bool {
        self == DeploymentMode::Production
    }

    pub fn verifies_relay_tls(self) -> bool {
        self != DeploymentMode::Development
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeploymentMode::Production => "production",
            DeploymentMode::Development => "development",
            DeploymentMode::Local => "local",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

// Keep the secret out of debug logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings taken from the process environment at start-up.
#[derive(Debug, Clone)]
pub struct Environment {
    pub mode: DeploymentMode,
    pub credentials: Option<Credentials>,
}

impl Environment {
    pub const MODE_VAR: &'static str = "DEPLOY_ENV";
    pub const USER_VAR: &'static str = "MAIL_USER";
    pub const PASSWORD_VAR: &'static str = "MAIL_APP_PASSWORD";

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mode = DeploymentMode::parse(lookup(Self::MODE_VAR).as_deref());
        let credentials = match (non_empty(Self::USER_VAR), non_empty(Self::PASSWORD_VAR)) {
            (Some(user), Some(password)) => Some(Credentials { user, password }),
            _ => None,
        };

        Self { mode, credentials }
    }
}
