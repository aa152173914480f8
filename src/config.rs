//! Provider configuration
//!
//! Settings are read once at start-up. Precedence: CLI flags > environment
//! variables > config file > defaults.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Prefix for environment overrides, e.g. `PCC_CONSOLE_URL`
pub const ENV_PREFIX: &str = "PCC_";

/// Process-wide provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Console host, or a full URL including scheme
    pub console_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Pre-issued JSON web token; skips the login call when set
    pub token: Option<String>,
    pub protocol: String,
    pub port: Option<u16>,
    pub skip_cert_verification: bool,
    /// Request timeout in seconds
    pub timeout: u64,
    /// Path prepended to every API path, e.g. a SaaS tenant id
    pub endpoint_prefix: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            console_url: String::new(),
            username: None,
            password: None,
            token: None,
            protocol: "https".to_string(),
            port: Some(8083),
            skip_cert_verification: false,
            timeout: 30,
            endpoint_prefix: String::new(),
        }
    }
}

impl ProviderConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pccprov").join("config.yaml"))
    }

    /// Load settings from `path` (or the default location) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML (or JSON) config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay environment variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());

        if let Some(v) = var("CONSOLE_URL") {
            self.console_url = v;
        }
        if let Some(v) = var("USERNAME") {
            self.username = Some(v);
        }
        if let Some(v) = var("PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = var("TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = var("PROTOCOL") {
            self.protocol = v;
        }
        if let Some(v) = var("PORT") {
            self.port = Some(v.parse().with_context(|| format!("Invalid {}PORT: {}", ENV_PREFIX, v))?);
        }
        if let Some(v) = var("SKIP_CERT_VERIFICATION") {
            self.skip_cert_verification = parse_bool(&v)
                .with_context(|| format!("Invalid {}SKIP_CERT_VERIFICATION: {}", ENV_PREFIX, v))?;
        }
        if let Some(v) = var("TIMEOUT") {
            self.timeout = v.parse().with_context(|| format!("Invalid {}TIMEOUT: {}", ENV_PREFIX, v))?;
        }
        if let Some(v) = var("ENDPOINT_PREFIX") {
            self.endpoint_prefix = v;
        }

        Ok(())
    }

    /// Check the settings are complete enough to talk to a console
    pub fn validate(&self) -> Result<()> {
        if self.console_url.trim().is_empty() {
            bail!("No console configured. Set {}CONSOLE_URL or console_url in the config file", ENV_PREFIX);
        }
        if !matches!(self.protocol.as_str(), "http" | "https") {
            bail!("Unsupported protocol: {}", self.protocol);
        }
        let has_token = self.token.as_deref().is_some_and(|t| !t.is_empty());
        let has_password = self.username.is_some() && self.password.is_some();
        if !has_token && !has_password {
            bail!("No credentials configured. Set a token or a username and password");
        }
        if self.timeout == 0 {
            bail!("Timeout must be at least one second");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Base URL every API path is joined onto. Always ends with `/`.
    pub fn base_url(&self) -> Result<Url> {
        let console = self.console_url.trim().trim_end_matches('/');

        let mut url = if console.contains("://") {
            Url::parse(console).with_context(|| format!("Invalid console URL: {}", console))?
        } else {
            let authority = match self.port {
                Some(port) => format!("{}:{}", console, port),
                None => console.to_string(),
            };
            Url::parse(&format!("{}://{}", self.protocol, authority))
                .with_context(|| format!("Invalid console URL: {}", console))?
        };

        let mut path = url.path().trim_end_matches('/').to_string();
        let prefix = self.endpoint_prefix.trim_matches('/');
        if !prefix.is_empty() {
            path.push('/');
            path.push_str(prefix);
        }
        path.push('/');
        url.set_path(&path);

        Ok(url)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
