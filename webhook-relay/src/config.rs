//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup into an immutable [`Config`]. Tests
//! build a `Config` from a closure via [`Config::from_lookup`] so they never
//! touch process state.

use std::env;
use std::fmt;
use std::time::Duration;

use tracing::warn;
use url::Url;

/// Default forward timeout in milliseconds.
const DEFAULT_FORWARD_TIMEOUT_MS: u64 = 10_000;

/// How the relay hands events to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardMode {
    /// Wait for the backend call before answering the provider.
    Sync,
    /// Answer the provider first; forward on a background task.
    #[default]
    Async,
}

impl ForwardMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sync" => Some(ForwardMode::Sync),
            "async" => Some(ForwardMode::Async),
            _ => None,
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardMode::Sync => f.write_str("sync"),
            ForwardMode::Async => f.write_str("async"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Token the provider echoes back during the subscription handshake
    pub verify_token: Option<String>,

    /// App secret used for `X-Hub-Signature-256` verification
    pub app_secret: Option<String>,

    /// Accept unsigned deliveries. Local simulation only.
    pub signature_fail_open: bool,

    /// Backend ingestion endpoint
    pub backend_ingest_url: Option<Url>,

    /// Bearer secret shared with the backend
    pub backend_shared_secret: Option<String>,

    /// Raw channel → tenant routing table (JSON object)
    pub tenant_routing_json: String,

    /// Whether forwarding blocks the provider response
    pub forward_mode: ForwardMode,

    /// Upper bound for a single forward call
    pub forward_timeout: Duration,

    /// Enables the unsigned simulation endpoint
    pub simulate_enabled: bool,
}

// Secrets are redacted so the struct can be logged with `?`.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("verify_token_set", &self.verify_token.is_some())
            .field("app_secret_set", &self.app_secret.is_some())
            .field("signature_fail_open", &self.signature_fail_open)
            .field("backend_ingest_url", &self.backend_ingest_url.as_ref().map(Url::as_str))
            .field("backend_shared_secret_set", &self.backend_shared_secret.is_some())
            .field("tenant_routing_json_length", &self.tenant_routing_json.len())
            .field("forward_mode", &self.forward_mode)
            .field("forward_timeout", &self.forward_timeout)
            .field("simulate_enabled", &self.simulate_enabled)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            port: parse_or("PORT", lookup("PORT"), 8080),

            verify_token: non_empty(lookup("WHATSAPP_VERIFY_TOKEN")),

            app_secret: non_empty(lookup("META_APP_SECRET")),

            signature_fail_open: parse_flag("SIGNATURE_FAIL_OPEN", lookup("SIGNATURE_FAIL_OPEN")),

            backend_ingest_url: parse_url("BACKEND_INGEST_URL", lookup("BACKEND_INGEST_URL")),

            backend_shared_secret: non_empty(lookup("BACKEND_SHARED_SECRET")),

            tenant_routing_json: lookup("TENANT_ROUTING_JSON").unwrap_or_else(|| "{}".to_string()),

            forward_mode: match lookup("FORWARD_MODE") {
                None => ForwardMode::default(),
                Some(raw) => ForwardMode::parse(&raw).unwrap_or_else(|| {
                    warn!(env_var = "FORWARD_MODE", value = %raw, "Invalid forward mode, using default");
                    ForwardMode::default()
                }),
            },

            forward_timeout: parse_timeout("FORWARD_TIMEOUT_MS", lookup("FORWARD_TIMEOUT_MS")),

            simulate_enabled: parse_flag("SIMULATE_ENABLED", lookup("SIMULATE_ENABLED")),
        }
    }
}

/// Treat empty or whitespace-only values as unset.
fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|v| !v.trim().is_empty())
}

/// Parse a value, falling back to the default on error.
fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr,
{
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Parse a positive timeout in milliseconds.
fn parse_timeout(name: &str, raw: Option<String>) -> Duration {
    let millis = match parse_or(name, raw, DEFAULT_FORWARD_TIMEOUT_MS) {
        0 => {
            warn!(env_var = name, value = 0, "Timeout must be positive, using default");
            DEFAULT_FORWARD_TIMEOUT_MS
        }
        millis => millis,
    };
    Duration::from_millis(millis)
}

/// Parse a boolean flag such as "true", "1", "yes".
fn parse_flag(name: &str, raw: Option<String>) -> bool {
    let Some(raw) = raw else {
        return false;
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "" | "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid flag, using false");
            false
        }
    }
}

/// Parse an absolute http(s) URL.
fn parse_url(name: &str, raw: Option<String>) -> Option<Url> {
    let raw = non_empty(raw)?;

    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        _ => {
            warn!(env_var = name, value = %raw, "Invalid URL, treating as unset");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8080);
        assert!(config.verify_token.is_none());
        assert!(config.app_secret.is_none());
        assert!(!config.signature_fail_open);
        assert!(config.backend_ingest_url.is_none());
        assert_eq!(config.tenant_routing_json, "{}");
        assert_eq!(config.forward_mode, ForwardMode::Async);
        assert_eq!(config.forward_timeout, Duration::from_millis(10_000));
        assert!(!config.simulate_enabled);
    }

    #[test]
    fn test_full_config() {
        let config = config_from(&[
            ("PORT", "3000"),
            ("WHATSAPP_VERIFY_TOKEN", "verify-me"),
            ("META_APP_SECRET", "app-secret"),
            ("BACKEND_INGEST_URL", "https://backend.example.com/ingest"),
            ("BACKEND_SHARED_SECRET", "shared"),
            ("TENANT_ROUTING_JSON", r#"{"111":"tenantA"}"#),
            ("FORWARD_MODE", "SYNC"),
            ("FORWARD_TIMEOUT_MS", "2500"),
            ("SIMULATE_ENABLED", "true"),
        ]);

        assert_eq!(config.port, 3000);
        assert_eq!(config.verify_token.as_deref(), Some("verify-me"));
        assert_eq!(config.app_secret.as_deref(), Some("app-secret"));
        assert_eq!(
            config.backend_ingest_url.as_ref().map(Url::as_str),
            Some("https://backend.example.com/ingest")
        );
        assert_eq!(config.backend_shared_secret.as_deref(), Some("shared"));
        assert_eq!(config.forward_mode, ForwardMode::Sync);
        assert_eq!(config.forward_timeout, Duration::from_millis(2500));
        assert!(config.simulate_enabled);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "eighty"),
            ("FORWARD_MODE", "later"),
            ("FORWARD_TIMEOUT_MS", "-5"),
            ("SIGNATURE_FAIL_OPEN", "maybe"),
            ("BACKEND_INGEST_URL", "ftp://backend.example.com"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.forward_mode, ForwardMode::Async);
        assert_eq!(config.forward_timeout, Duration::from_millis(10_000));
        assert!(!config.signature_fail_open);
        assert!(config.backend_ingest_url.is_none());
    }

    #[test]
    fn test_zero_timeout_falls_back() {
        let config = config_from(&[("FORWARD_TIMEOUT_MS", "0")]);
        assert_eq!(
            config.forward_timeout,
            Duration::from_millis(DEFAULT_FORWARD_TIMEOUT_MS)
        );
        assert!(!config.forward_timeout.is_zero());
    }

    #[test]
    fn test_blank_secrets_are_unset() {
        let config = config_from(&[("META_APP_SECRET", "   "), ("BACKEND_SHARED_SECRET", "")]);
        assert!(config.app_secret.is_none());
        assert!(config.backend_shared_secret.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(&[
            ("META_APP_SECRET", "super-secret-value"),
            ("BACKEND_SHARED_SECRET", "another-secret"),
        ]);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret-value"));
        assert!(!rendered.contains("another-secret"));
        assert!(rendered.contains("app_secret_set: true"));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        env::set_var("FORWARD_MODE", "sync");
        let config = Config::from_env();
        assert_eq!(config.forward_mode, ForwardMode::Sync);
        env::remove_var("FORWARD_MODE");
    }
}
