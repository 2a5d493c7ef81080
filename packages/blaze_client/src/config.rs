use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::ChatError;
use crate::transport::{Endpoint, TransportKind};

// =============================================================================
// File config (figment-deserialized from defaults / blaze.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   blaze.toml:      url = "http://localhost:8000/chat"
//                    [reconnection]
//                    delay_ms = 500
//
//   env var:         BLAZE_RECONNECTION__DELAY_MS=500   (double underscore = nesting)
//
//   (single underscore stays within field names: BLAZE_CONNECT_TIMEOUT_MS)

pub const DEFAULT_URL: &str = "http://localhost:8000/chat";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_transports")]
    pub transports: Vec<TransportKind>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub reconnection: ReconnectionFileConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            transports: default_transports(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnection: ReconnectionFileConfig::default(),
        }
    }
}

/// Reconnection tunables (lives under `[reconnection]` in blaze.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconnectionFileConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Give up after this many consecutive failures; unset means never.
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
}

impl Default for ReconnectionFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: None,
            delay_ms: default_delay_ms(),
            delay_max_ms: default_delay_max_ms(),
            randomization_factor: default_randomization_factor(),
        }
    }
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}
fn default_transports() -> Vec<TransportKind> {
    vec![TransportKind::Websocket, TransportKind::Polling]
}
fn default_connect_timeout_ms() -> u64 {
    20_000
}
fn default_true() -> bool {
    true
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_delay_max_ms() -> u64 {
    5000
}
fn default_randomization_factor() -> f64 {
    0.5
}

/// Build a figment that layers: defaults → blaze.toml (if given) → BLAZE_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `BLAZE_URL=http://host/chat`  →  `url = "http://host/chat"`
///   `BLAZE_RECONNECTION__ENABLED=false`  →  `reconnection.enabled = false`
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("BLAZE_").split("__"))
}

/// Resolved reconnection policy (runtime view).
#[derive(Clone, Debug)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub attempts: Option<u32>,
    pub delay: Duration,
    pub delay_max: Duration,
    pub randomization_factor: f64,
}

impl ReconnectConfig {
    pub fn from_file(fc: &ReconnectionFileConfig) -> Self {
        Self {
            enabled: fc.enabled,
            attempts: fc.attempts,
            delay: Duration::from_millis(fc.delay_ms),
            delay_max: Duration::from_millis(fc.delay_max_ms.max(fc.delay_ms)),
            randomization_factor: fc.randomization_factor.clamp(0.0, 1.0),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::from_file(&ReconnectionFileConfig::default())
        }
    }
}

/// Resolved client configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub transports: Vec<TransportKind>,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    /// Defaults for `url`.
    pub fn new(url: &str) -> Result<Self, ChatError> {
        Self::from_file(&FileConfig {
            url: url.to_string(),
            ..Default::default()
        })
    }

    pub fn from_file(fc: &FileConfig) -> Result<Self, ChatError> {
        let endpoint = Endpoint::parse(&fc.url)?;

        let mut transports = Vec::new();
        for kind in &fc.transports {
            if !transports.contains(kind) {
                transports.push(*kind);
            }
        }
        if transports.is_empty() {
            return Err(ChatError::InvalidConfig(
                "no transports configured".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            transports,
            connect_timeout: Duration::from_millis(fc.connect_timeout_ms),
            reconnect: ReconnectConfig::from_file(&fc.reconnection),
        })
    }

    /// Load from defaults, an optional TOML file, and `BLAZE_*` env vars.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ChatError> {
        let fc: FileConfig = load_config(config_path).extract()?;
        debug!(url = %fc.url, transports = ?fc.transports, "config: loaded");
        Self::from_file(&fc)
    }

    pub fn with_transports(mut self, transports: Vec<TransportKind>) -> Self {
        if !transports.is_empty() {
            self.transports = transports;
        }
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.url, "http://localhost:8000/chat");
        assert_eq!(
            fc.transports,
            vec![TransportKind::Websocket, TransportKind::Polling]
        );
        assert!(fc.reconnection.enabled);
        assert!(fc.reconnection.attempts.is_none());
    }

    #[test]
    fn test_client_config_from_defaults() {
        let cc = ClientConfig::from_file(&FileConfig::default()).unwrap();
        assert_eq!(cc.endpoint.namespace(), "/chat");
        assert_eq!(cc.connect_timeout, Duration::from_secs(20));
        assert_eq!(cc.reconnect.delay, Duration::from_millis(1000));
        assert_eq!(cc.reconnect.delay_max, Duration::from_millis(5000));
        assert_eq!(cc.reconnect.randomization_factor, 0.5);
    }

    #[test]
    fn test_duplicate_transports_collapse() {
        let fc = FileConfig {
            transports: vec![
                TransportKind::Polling,
                TransportKind::Polling,
                TransportKind::Websocket,
            ],
            ..Default::default()
        };
        let cc = ClientConfig::from_file(&fc).unwrap();
        assert_eq!(
            cc.transports,
            vec![TransportKind::Polling, TransportKind::Websocket]
        );
    }

    #[test]
    fn test_empty_transports_rejected() {
        let fc = FileConfig {
            transports: vec![],
            ..Default::default()
        };
        let err = ClientConfig::from_file(&fc).unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig(_)));
        assert_eq!(err.to_string(), "invalid configuration: no transports configured");
    }

    #[test]
    fn test_bad_url_rejected() {
        assert!(ClientConfig::new("localhost:8000/chat").is_err());
    }

    #[test]
    fn test_delay_max_never_below_delay() {
        let rc = ReconnectConfig::from_file(&ReconnectionFileConfig {
            delay_ms: 8000,
            delay_max_ms: 1000,
            ..Default::default()
        });
        assert_eq!(rc.delay_max, Duration::from_millis(8000));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_without_file() {
        let fc: FileConfig = load_config(None).extract().unwrap();
        assert_eq!(fc.connect_timeout_ms, 20_000);
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(Some(&tmp.path().join("blaze.toml")))
            .extract()
            .unwrap();
        assert_eq!(fc.reconnection.delay_ms, 1000);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("blaze.toml");
        std::fs::write(
            &path,
            "url = \"https://blaze.example/chat\"\ntransports = [\"polling\"]\n\n[reconnection]\nenabled = false\nattempts = 3\ndelay_ms = 250\n",
        )
        .unwrap();

        let cc = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(cc.endpoint.origin().as_str(), "https://blaze.example/");
        assert_eq!(cc.transports, vec![TransportKind::Polling]);
        assert!(!cc.reconnect.enabled);
        assert_eq!(cc.reconnect.attempts, Some(3));
        assert_eq!(cc.reconnect.delay, Duration::from_millis(250));
        assert_eq!(cc.reconnect.delay_max, Duration::from_millis(5000));
    }

    #[test]
    fn test_load_config_rejects_bad_toml_types() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("blaze.toml");
        std::fs::write(&path, "connect_timeout_ms = \"soon\"\n").unwrap();
        assert!(matches!(
            ClientConfig::load(Some(&path)),
            Err(ChatError::Config(_))
        ));
    }
}
