// common/src/config.rs
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use config::{Config as ConfigFile, File, Environment};
use thiserror::Error;
use url::Url;

use crate::utils::parse_flag;

/// Value of `PORTAL_HOST` that switches the SSO redirect off.
pub const PORTAL_DISABLED: &str = "disabled";

const DEFAULT_BASE_PATH: &str = "/app";
const DEFAULT_APP_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_SESSION_NAME: &str = "connect.sid";
const DEFAULT_SESSION_PREFIX: &str = "sess:";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
const DEV_SESSION_SECRET: &str = "dev-session-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
    #[error("APP_URL `{value}` is not a valid URL: {source}")]
    InvalidAppUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("PORT `{0}` is not a valid port number")]
    InvalidPort(String),
    #[error("UPSTREAM_TIMEOUT_SECS `{0}` is not a positive number of seconds")]
    InvalidTimeout(String),
    #[error("unknown SESSION_STORE_KIND `{0}` (expected `redis` or `memory`)")]
    UnknownStoreKind(String),
    #[error("SESSION_STORE_KIND=redis requires REDIS_URL to be set")]
    MissingRedisUrl,
    #[error("SESSION_SECRET or SESSION_SECRETS must be set when NODE_ENV=production")]
    MissingSessionSecret,
}

/// Which session backend the gateway reads from. Chosen once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStoreKind {
    Redis { url: String },
    Memory,
}

/// Raw settings as they come out of the layered sources.
///
/// Every field is optional text; [`GatewayConfig::from_raw`] owns parsing
/// and defaults so that file and environment sources behave identically.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawSettings {
    pub app_base_path: Option<String>,
    pub app_url: Option<String>,
    pub redis_url: Option<String>,
    pub session_store_kind: Option<String>,
    pub session_prefix: Option<String>,
    pub session_secrets: Option<String>,
    pub session_secret: Option<String>,
    pub session_name: Option<String>,
    pub session_domain: Option<String>,
    pub node_env: Option<String>,
    pub portal_host: Option<String>,
    pub disable_sso: Option<String>,
    pub trust_forwarded_headers: Option<String>,
    pub port: Option<String>,
    pub bind_addr: Option<String>,
    pub upstream_timeout_secs: Option<String>,
}

/// Process-wide gateway configuration, immutable after startup.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Normalized: empty, or a leading slash and no trailing slash.
    pub base_path: String,
    pub app_url: Url,
    /// As configured; the SSO gate interprets unset and [`PORTAL_DISABLED`].
    pub portal_host: Option<String>,
    pub disable_sso: bool,
    /// Honour `Forwarded` / `X-Forwarded-*` from the client connection.
    /// Only safe when a trusted proxy sits in front and overwrites them.
    pub trust_forwarded_headers: bool,
    pub session_store: SessionStoreKind,
    pub session_prefix: String,
    pub session_name: String,
    /// Newest first. Every secret is accepted when verifying a cookie.
    pub session_secrets: Vec<String>,
    pub session_domain: Option<String>,
    pub environment: String,
    pub upstream_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            base_path: DEFAULT_BASE_PATH.to_string(),
            app_url: Url::parse(DEFAULT_APP_URL).expect("default APP_URL is a valid URL"),
            portal_host: None,
            disable_sso: false,
            trust_forwarded_headers: false,
            session_store: SessionStoreKind::Memory,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            session_name: DEFAULT_SESSION_NAME.to_string(),
            session_secrets: vec![DEV_SESSION_SECRET.to_string()],
            session_domain: None,
            environment: "development".to_string(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from optional files, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("NODE_ENV").unwrap_or_else(|_| "development".into());

        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./config"));

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let raw: RawSettings = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Unprefixed on purpose: the deployment already exports APP_URL, PORT, ...
            .add_source(Environment::default())
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let environment = non_empty(raw.node_env).unwrap_or_else(|| "development".to_string());
        let production = environment == "production";

        let base_path = normalize_base_path(raw.app_base_path.as_deref().unwrap_or(DEFAULT_BASE_PATH));

        let app_url_text = non_empty(raw.app_url).unwrap_or_else(|| DEFAULT_APP_URL.to_string());
        let app_url = Url::parse(&app_url_text).map_err(|source| ConfigError::InvalidAppUrl {
            value: app_url_text.clone(),
            source,
        })?;

        let port = match non_empty(raw.port) {
            Some(text) => text.parse::<u16>().map_err(|_| ConfigError::InvalidPort(text))?,
            None => DEFAULT_PORT,
        };

        let upstream_timeout = match non_empty(raw.upstream_timeout_secs) {
            Some(text) => match text.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidTimeout(text)),
            },
            None => Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        };

        let redis_url = non_empty(raw.redis_url);
        let session_store = match non_empty(raw.session_store_kind).map(|k| k.to_ascii_lowercase()) {
            Some(kind) if kind == "redis" => SessionStoreKind::Redis {
                url: redis_url.ok_or(ConfigError::MissingRedisUrl)?,
            },
            Some(kind) if kind == "memory" => SessionStoreKind::Memory,
            Some(kind) => return Err(ConfigError::UnknownStoreKind(kind)),
            None => match redis_url {
                Some(url) => SessionStoreKind::Redis { url },
                None => SessionStoreKind::Memory,
            },
        };

        let mut session_secrets = split_secrets(raw.session_secrets.as_deref());
        if session_secrets.is_empty() {
            session_secrets = split_secrets(raw.session_secret.as_deref());
        }
        if session_secrets.is_empty() {
            if production {
                return Err(ConfigError::MissingSessionSecret);
            }
            tracing::warn!("No session secret configured; using the development secret");
            session_secrets.push(DEV_SESSION_SECRET.to_string());
        }

        Ok(Self {
            bind_addr: non_empty(raw.bind_addr).unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            base_path,
            app_url,
            portal_host: non_empty(raw.portal_host),
            disable_sso: raw.disable_sso.as_deref().map(parse_flag).unwrap_or(false),
            trust_forwarded_headers: raw
                .trust_forwarded_headers
                .as_deref()
                .map(parse_flag)
                .unwrap_or(false),
            session_store,
            session_prefix: raw
                .session_prefix
                .unwrap_or_else(|| DEFAULT_SESSION_PREFIX.to_string()),
            session_name: non_empty(raw.session_name)
                .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
            session_secrets,
            session_domain: non_empty(raw.session_domain),
            environment,
            upstream_timeout,
        })
    }

    pub fn server_addr(&self) -> (String, u16) {
        (self.bind_addr.clone(), self.port)
    }
}

/// `""` and `"/"` mean "no base path"; otherwise a single leading slash and
/// no trailing slash.
pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn split_secrets(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_settings() {
        let config = GatewayConfig::from_raw(RawSettings::default()).unwrap();
        assert_eq!(config.base_path, "/app");
        assert_eq!(config.port, 8080);
        assert_eq!(config.session_name, "connect.sid");
        assert_eq!(config.session_store, SessionStoreKind::Memory);
        assert_eq!(config.session_secrets, vec![DEV_SESSION_SECRET.to_string()]);
        assert!(!config.disable_sso);
        assert!(!config.trust_forwarded_headers);
    }

    #[test]
    fn test_trust_forwarded_headers_flag() {
        let raw = RawSettings {
            trust_forwarded_headers: Some("on".into()),
            ..RawSettings::default()
        };
        assert!(GatewayConfig::from_raw(raw).unwrap().trust_forwarded_headers);
    }

    #[test]
    fn test_base_path_normalization() {
        assert_eq!(normalize_base_path("/app/"), "/app");
        assert_eq!(normalize_base_path("app"), "/app");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/nested/app/"), "/nested/app");
    }

    #[test]
    fn test_explicit_empty_base_path_disables_prefix() {
        let raw = RawSettings {
            app_base_path: Some(String::new()),
            ..RawSettings::default()
        };
        assert_eq!(GatewayConfig::from_raw(raw).unwrap().base_path, "");
    }

    #[test]
    fn test_store_kind_follows_redis_url() {
        let raw = RawSettings {
            redis_url: Some("redis://cache:6379".into()),
            ..RawSettings::default()
        };
        let config = GatewayConfig::from_raw(raw).unwrap();
        assert_eq!(
            config.session_store,
            SessionStoreKind::Redis { url: "redis://cache:6379".into() }
        );
    }

    #[test]
    fn test_explicit_memory_kind_wins_over_redis_url() {
        let raw = RawSettings {
            redis_url: Some("redis://cache:6379".into()),
            session_store_kind: Some("Memory".into()),
            ..RawSettings::default()
        };
        assert_eq!(GatewayConfig::from_raw(raw).unwrap().session_store, SessionStoreKind::Memory);
    }

    #[test]
    fn test_unknown_store_kind_is_fatal() {
        let raw = RawSettings {
            session_store_kind: Some("memcached".into()),
            ..RawSettings::default()
        };
        assert!(matches!(
            GatewayConfig::from_raw(raw),
            Err(ConfigError::UnknownStoreKind(kind)) if kind == "memcached"
        ));
    }

    #[test]
    fn test_redis_kind_without_url_is_fatal() {
        let raw = RawSettings {
            session_store_kind: Some("redis".into()),
            ..RawSettings::default()
        };
        assert!(matches!(GatewayConfig::from_raw(raw), Err(ConfigError::MissingRedisUrl)));
    }

    #[test]
    fn test_secrets_list_takes_precedence() {
        let raw = RawSettings {
            session_secrets: Some("new, old ,".into()),
            session_secret: Some("single".into()),
            ..RawSettings::default()
        };
        let config = GatewayConfig::from_raw(raw).unwrap();
        assert_eq!(config.session_secrets, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn test_production_requires_secret() {
        let raw = RawSettings {
            node_env: Some("production".into()),
            ..RawSettings::default()
        };
        assert!(matches!(GatewayConfig::from_raw(raw), Err(ConfigError::MissingSessionSecret)));
    }

    #[test]
    fn test_invalid_port_and_url() {
        let raw = RawSettings {
            port: Some("eighty".into()),
            ..RawSettings::default()
        };
        assert!(matches!(GatewayConfig::from_raw(raw), Err(ConfigError::InvalidPort(_))));

        let raw = RawSettings {
            app_url: Some("not a url".into()),
            ..RawSettings::default()
        };
        assert!(matches!(GatewayConfig::from_raw(raw), Err(ConfigError::InvalidAppUrl { .. })));
    }

    #[test]
    fn test_disable_sso_flag_values() {
        for (value, expected) in [("true", true), ("1", true), ("YES", true), ("false", false), ("", false)] {
            let raw = RawSettings {
                disable_sso: Some(value.into()),
                ..RawSettings::default()
            };
            assert_eq!(GatewayConfig::from_raw(raw).unwrap().disable_sso, expected, "{value}");
        }
    }
}
