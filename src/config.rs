//! Client configuration.
//!
//! A [`ClientConfig`] holds the credential, the service base URL and the
//! per-request timeout. It is built once, handed to [`Client::new`], and
//! never changes afterwards.
//!
//! Three ways to build one:
//!
//! - from a bare credential: [`ClientConfig::new`] (or `"key".into()`),
//! - from the environment: [`ClientConfig::from_env`],
//! - from a TOML file: [`load_config`].
//!
//! ```toml
//! [client]
//! api_key = "sk_live_..."                  # or DOCRAG_API_KEY
//! base_url = "https://api.docrag.io"       # optional
//! timeout_ms = 30000                       # optional
//! ```
//!
//! [`Client::new`]: crate::client::Client::new

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Production endpoint of the service.
pub const DEFAULT_BASE_URL: &str = "https://api.docrag.io";

/// Default per-request timeout (30 000 ms).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Environment variable holding the credential.
pub const API_KEY_ENV: &str = "DOCRAG_API_KEY";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "DOCRAG_BASE_URL";

/// Connection settings for a [`Client`](crate::client::Client).
///
/// The credential may be a long-lived API key or a short-lived frontend
/// token obtained from [`Client::create_token`](crate::client::Client::create_token);
/// both are sent the same way.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout", rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl ClientConfig {
    /// Config with the given credential and default base URL and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a config from `DOCRAG_API_KEY` and the optional `DOCRAG_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", API_KEY_ENV))?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Check the invariants the client relies on.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            anyhow::bail!("client.api_key must not be empty");
        }
        if self.timeout.is_zero() {
            anyhow::bail!("client.timeout_ms must be > 0");
        }
        let url = reqwest::Url::parse(self.base())
            .with_context(|| format!("client.base_url is not a valid URL: {}", self.base_url))?;
        match url.scheme() {
            "http" | "https" => {}
            other => anyhow::bail!(
                "client.base_url must use http or https, got '{}'",
                other
            ),
        }
        if url.cannot_be_a_base() {
            anyhow::bail!("client.base_url must be an absolute URL");
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl From<&str> for ClientConfig {
    fn from(api_key: &str) -> Self {
        Self::new(api_key)
    }
}

impl From<String> for ClientConfig {
    fn from(api_key: String) -> Self {
        Self::new(api_key)
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    client: RawClientConfig,
}

#[derive(Debug, Deserialize)]
struct RawClientConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Load and validate a [`ClientConfig`] from a TOML file.
///
/// A missing `api_key` falls back to `DOCRAG_API_KEY`. `DOCRAG_BASE_URL`
/// is only consulted when the file has no `base_url`.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content, |name| std::env::var(name).ok())
}

fn parse_config(content: &str, env: impl Fn(&str) -> Option<String>) -> Result<ClientConfig> {
    let file: ConfigFile = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    let raw = file.client;

    let api_key = match raw.api_key.or_else(|| env(API_KEY_ENV)) {
        Some(key) => key,
        None => anyhow::bail!(
            "client.api_key must be set in the config file or via {}",
            API_KEY_ENV
        ),
    };

    let mut config = ClientConfig::new(api_key);
    if let Some(base_url) = raw.base_url.or_else(|| env(BASE_URL_ENV)) {
        config.base_url = base_url;
    }
    if let Some(ms) = raw.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_new_uses_defaults() {
        let config = ClientConfig::new("sk_test");
        assert_eq!(config.api_key, "sk_test");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_millis(30_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_str() {
        let config: ClientConfig = "sk_test".into();
        assert_eq!(config.api_key, "sk_test");
    }

    #[test]
    fn test_object_form_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"api_key":"k"}"#).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);

        let config: ClientConfig =
            serde_json::from_str(r#"{"api_key":"k","base_url":"http://x","timeout_ms":5}"#)
                .unwrap();
        assert_eq!(config.base_url, "http://x");
        assert_eq!(config.timeout, Duration::from_millis(5));
    }

    #[test]
    fn test_base_trims_trailing_slash() {
        let config = ClientConfig::new("k").with_base_url("http://localhost:8080/");
        assert_eq!(config.base(), "http://localhost:8080");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ClientConfig::new("super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::new("  ").validate().is_err());
        assert!(ClientConfig::new("k")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ClientConfig::new("k")
            .with_base_url("ftp://example.com")
            .validate()
            .is_err());
        assert!(ClientConfig::new("k")
            .with_base_url("not a url")
            .validate()
            .is_err());
    }

    #[test]
    fn test_parse_config_full() {
        let config = parse_config(
            r#"[client]
api_key = "sk_file"
base_url = "http://127.0.0.1:9000"
timeout_ms = 1500
"#,
            no_env,
        )
        .unwrap();
        assert_eq!(config.api_key, "sk_file");
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_config_env_fallback() {
        let env = |name: &str| match name {
            API_KEY_ENV => Some("sk_env".to_string()),
            BASE_URL_ENV => Some("http://env.local".to_string()),
            _ => None,
        };
        let config = parse_config("[client]\n", env).unwrap();
        assert_eq!(config.api_key, "sk_env");
        assert_eq!(config.base_url, "http://env.local");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_parse_config_file_key_wins_over_env() {
        let env = |_: &str| Some("sk_env".to_string());
        let config = parse_config("[client]\napi_key = \"sk_file\"\n", env).unwrap();
        assert_eq!(config.api_key, "sk_file");
    }

    #[test]
    fn test_parse_config_missing_key() {
        let err = parse_config("[client]\n", no_env).unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_parse_config_zero_timeout() {
        let err = parse_config("[client]\napi_key = \"k\"\ntimeout_ms = 0\n", no_env).unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\napi_key = \"sk_file\"\ntimeout_ms = 250").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.api_key, "sk_file");
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/docrag.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
