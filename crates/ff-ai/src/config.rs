//! Service configuration
//!
//! Layered in this order, later layers winning:
//! - Built-in defaults (public provider endpoints, no timeout)
//! - `~/.config/flashfusion/config.toml`, if present
//! - `FF_*` environment variables

use std::{fs, path::PathBuf, time::Duration};

use ff_protocol::ProviderId;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::{AiError, Result};

/// Default OpenAI API base
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default Anthropic API base
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
/// Default Google base (OpenAI-compatible surface of the Gemini API)
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Keychain service name used when none is configured
pub const DEFAULT_KEYRING_SERVICE: &str = "flashfusion";

/// Runtime configuration for [`crate::AiService`]
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// OpenAI API base URL
    pub openai_base_url: Url,
    /// Anthropic API base URL
    pub anthropic_base_url: Url,
    /// Google API base URL
    pub google_base_url: Url,
    /// Request timeout; `None` leaves the transport default in place
    pub timeout: Option<Duration>,
    /// Directory holding persisted settings
    pub data_dir: PathBuf,
    /// Keychain service name for stored API keys
    pub keyring_service: String,
    /// Fall back to `*_API_KEY` environment variables for missing keys
    pub env_fallback: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            openai_base_url: default_url(OPENAI_BASE_URL),
            anthropic_base_url: default_url(ANTHROPIC_BASE_URL),
            google_base_url: default_url(GOOGLE_BASE_URL),
            timeout: None,
            data_dir: default_data_dir(),
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            env_fallback: true,
        }
    }
}

#[allow(clippy::expect_used)]
fn default_url(raw: &str) -> Url {
    Url::parse(raw).expect("built-in provider URL is valid")
}

fn default_data_dir() -> PathBuf {
    let mut base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("flashfusion");
    base
}

/// Location of the optional config file
pub fn config_file_path() -> PathBuf {
    let mut base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("flashfusion");
    base.push("config.toml");
    base
}

/// On-disk configuration; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Override for the OpenAI base URL
    pub openai_base_url: Option<String>,
    /// Override for the Anthropic base URL
    pub anthropic_base_url: Option<String>,
    /// Override for the Google base URL
    pub google_base_url: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: Option<u64>,
    /// Settings directory
    pub data_dir: Option<PathBuf>,
    /// Keychain service name
    pub keyring_service: Option<String>,
    /// Environment credential fallback
    pub env_fallback: Option<bool>,
}

impl ConfigFile {
    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AiError::InvalidConfig(e.to_string()))
    }
}

impl AiConfig {
    /// Load configuration from the config file and the process environment
    pub fn load() -> Result<Self> {
        let path = config_file_path();
        let file = if path.exists() {
            info!(path = %path.display(), "Loading configuration file");
            Some(ConfigFile::parse(&fs::read_to_string(&path)?)?)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            None
        };
        Self::from_sources(file, |name| std::env::var(name).ok())
    }

    /// Build a configuration from an optional file and an environment lookup
    pub fn from_sources<F>(file: Option<ConfigFile>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let file = file.unwrap_or_default();

        let openai = env("FF_OPENAI_BASE_URL").or(file.openai_base_url);
        if let Some(raw) = openai {
            config.openai_base_url = validate_base_url(&raw)?;
        }
        let anthropic = env("FF_ANTHROPIC_BASE_URL").or(file.anthropic_base_url);
        if let Some(raw) = anthropic {
            config.anthropic_base_url = validate_base_url(&raw)?;
        }
        let google = env("FF_GOOGLE_BASE_URL").or(file.google_base_url);
        if let Some(raw) = google {
            config.google_base_url = validate_base_url(&raw)?;
        }

        let timeout = match env("FF_AI_TIMEOUT_SECONDS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                AiError::InvalidConfig(format!("FF_AI_TIMEOUT_SECONDS is not a number: {raw}"))
            })?),
            None => file.timeout_seconds,
        };
        config.timeout = timeout.filter(|s| *s > 0).map(Duration::from_secs);

        if let Some(dir) = env("FF_DATA_DIR").map(PathBuf::from).or(file.data_dir) {
            config.data_dir = dir;
        }
        if let Some(service) = env("FF_KEYRING_SERVICE").or(file.keyring_service) {
            config.keyring_service = service;
        }
        config.env_fallback = match env("FF_ENV_KEYS") {
            Some(v) => !matches!(v.trim(), "0" | "false" | "no" | "off"),
            None => file.env_fallback.unwrap_or(true),
        };

        Ok(config)
    }

    /// Base URL configured for a provider
    pub fn base_url(&self, provider: ProviderId) -> &Url {
        match provider {
            ProviderId::OpenAI => &self.openai_base_url,
            ProviderId::Anthropic => &self.anthropic_base_url,
            ProviderId::Google => &self.google_base_url,
        }
    }

    /// Point one provider at a different base URL
    pub fn with_base_url(mut self, provider: ProviderId, raw: &str) -> Result<Self> {
        let url = validate_base_url(raw)?;
        match provider {
            ProviderId::OpenAI => self.openai_base_url = url,
            ProviderId::Anthropic => self.anthropic_base_url = url,
            ProviderId::Google => self.google_base_url = url,
        }
        Ok(self)
    }

    /// Path of the persisted settings document
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

/// Validate a provider base URL
///
/// - Rejects empty input, control characters and embedded credentials
/// - Allows http for localhost only; otherwise requires https
/// - Drops query, fragment and trailing slashes
pub fn validate_base_url(input: &str) -> Result<Url> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(AiError::InvalidConfig("base URL is empty".to_string()));
    }
    if raw.chars().any(|c| c.is_control()) {
        return Err(AiError::InvalidConfig(
            "base URL contains control characters".to_string(),
        ));
    }
    let mut url = Url::parse(raw).map_err(|e| AiError::InvalidConfig(e.to_string()))?;

    if !url.username().is_empty() || url.password().is_some() {
        return Err(AiError::InvalidConfig(
            "base URL must not include userinfo".to_string(),
        ));
    }

    url.set_query(None);
    url.set_fragment(None);

    let host = url.host_str().unwrap_or_default().to_lowercase();
    let is_local = host == "localhost" || host == "127.0.0.1" || host == "[::1]";

    match url.scheme() {
        "https" => {}
        "http" if is_local => {}
        other => {
            return Err(AiError::InvalidConfig(format!(
                "unsupported scheme for {host}: {other}"
            )))
        }
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);
    Ok(url)
}

/// Append a path segment to a base URL without replacing its last segment
pub(crate) fn join_endpoint(base: &Url, segment: &str) -> Result<Url> {
    // Url::join treats "v1" as a file name; force a directory-style base
    let mut raw = base.to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    raw.push_str(segment.trim_start_matches('/'));
    Url::parse(&raw).map_err(|e| AiError::InvalidConfig(e.to_string()))
}

/// Whether the process runs in development mode
///
/// Reads `FLASHFUSION_ENV`, then `NODE_ENV`. When neither is set, debug builds
/// count as development.
pub fn is_development_mode() -> bool {
    let value = std::env::var("FLASHFUSION_ENV")
        .or_else(|_| std::env::var("NODE_ENV"))
        .ok();
    development_mode_from(value.as_deref())
}

fn development_mode_from(value: Option<&str>) -> bool {
    match value {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "development" | "dev"),
        None => cfg!(debug_assertions),
    }
}
