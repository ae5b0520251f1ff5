//! Configuration for the filespool daemon.

use std::path::Path;
use std::time::Duration;

use filespool_core::{
    DEFAULT_MAX_RECORD_SIZE, ReceiverTimings, SenderTimings, SpoolError, TlsSettings,
};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolConfig {
    /// Receiver mode settings.
    pub receiver: ReceiverConfig,
    /// Sender mode settings.
    pub sender: SenderConfig,
    /// Certificates, shared by both modes.
    pub tls: TlsConfig,
    /// Deadlines and periods.
    pub timing: TimingConfig,
    /// Size limits.
    pub limits: LimitsConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Receiver mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Listen address; `:port` binds every IPv4 interface.
    pub listen: String,
    /// Directory received files are written to.
    pub target: String,
    /// Client certificate names (CN or DNS SAN) allowed to send.
    pub allow: Vec<String>,
}

/// Sender mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Receiver address; the default port is appended when missing.
    pub connect: String,
    /// Directory files are picked up from.
    pub source: String,
}

/// TLS material, PEM encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub cert: String,
    pub key: String,
    /// CA bundle used to verify the peer; empty trusts the system store.
    pub ca: String,
}

/// Timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub accept_poll_ms: u64,
    pub handshake_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub data_timeout_ms: u64,
    pub keepalive_interval_ms: u64,
    pub file_check_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest encoded record accepted or sent, in bytes.
    pub max_record_size: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    /// `RUST_LOG` takes precedence.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen: format!(":{}", filespool_core::DEFAULT_PORT),
            target: String::new(),
            allow: Vec::new(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        let host = local_hostname();
        Self {
            cert: format!("etc/{host}.crt"),
            key: format!("etc/{host}.key"),
            ca: "etc/ca.crt".into(),
        }
    }
}

/// This machine's hostname, or `localhost` when it cannot be read.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".into())
}

impl Default for TimingConfig {
    fn default() -> Self {
        let receiver = ReceiverTimings::default();
        let sender = SenderTimings::default();
        Self {
            accept_poll_ms: millis(receiver.accept_poll),
            handshake_timeout_ms: millis(receiver.handshake_timeout),
            read_timeout_ms: millis(receiver.read_timeout),
            idle_timeout_ms: millis(receiver.idle_timeout),
            connect_timeout_ms: millis(sender.connect_timeout),
            data_timeout_ms: millis(sender.data_timeout),
            keepalive_interval_ms: millis(sender.keepalive_interval),
            file_check_interval_ms: millis(sender.file_check_interval),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Zero would make timers spin; clamp to one millisecond.
fn ms(value: u64) -> Duration {
    Duration::from_millis(value.max(1))
}

// ── Loading ──────────────────────────────────────────────────────

impl SpoolConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn to_receiver_timings(&self) -> ReceiverTimings {
        ReceiverTimings {
            accept_poll: ms(self.timing.accept_poll_ms),
            handshake_timeout: ms(self.timing.handshake_timeout_ms),
            read_timeout: ms(self.timing.read_timeout_ms),
            idle_timeout: ms(self.timing.idle_timeout_ms),
        }
    }

    pub fn to_sender_timings(&self) -> SenderTimings {
        SenderTimings {
            connect_timeout: ms(self.timing.connect_timeout_ms),
            handshake_timeout: ms(self.timing.handshake_timeout_ms),
            data_timeout: ms(self.timing.data_timeout_ms),
            keepalive_interval: ms(self.timing.keepalive_interval_ms),
            file_check_interval: ms(self.timing.file_check_interval_ms),
        }
    }

    pub fn tls_settings(&self) -> TlsSettings {
        let ca = (!self.tls.ca.is_empty()).then(|| self.tls.ca.clone().into());
        TlsSettings::new(&self.tls.cert, &self.tls.key, ca)
    }

    // ── Validation ───────────────────────────────────────────────

    /// Everything receiver mode needs before it touches the network.
    pub fn validate_receiver(&self) -> Result<(), SpoolError> {
        require(&self.receiver.target, "--target")?;
        self.validate_tls()?;
        if self.receiver.allow.iter().all(|name| name.trim().is_empty()) {
            return Err(SpoolError::Config(
                "please specify one or more --allow".into(),
            ));
        }
        self.validate_limits()
    }

    /// Everything sender mode needs before it touches the network.
    pub fn validate_sender(&self) -> Result<(), SpoolError> {
        require(&self.sender.connect, "--connect")?;
        require(&self.sender.source, "--source")?;
        self.validate_tls()?;
        self.validate_limits()
    }

    /// The CA bundle is optional; without one the system store is used.
    fn validate_tls(&self) -> Result<(), SpoolError> {
        require(&self.tls.cert, "--cert")?;
        require(&self.tls.key, "--key")
    }

    fn validate_limits(&self) -> Result<(), SpoolError> {
        if self.limits.max_record_size == 0 {
            return Err(SpoolError::Config(
                "limits.max_record_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn require(value: &str, flag: &str) -> Result<(), SpoolError> {
    if value.trim().is_empty() {
        return Err(SpoolError::Config(format!("please specify {flag}")));
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver_ready() -> SpoolConfig {
        let mut cfg = SpoolConfig::default();
        cfg.receiver.target = "/var/spool/in".into();
        cfg.receiver.allow = vec!["alice".into()];
        cfg
    }

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&SpoolConfig::default()).unwrap();
        assert!(text.contains("listen = \":5664\""));
        assert!(text.contains("idle_timeout_ms = 60000"));
        assert!(text.contains("[logging]"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: SpoolConfig = toml::from_str(
            r#"
            [sender]
            connect = "spool.example.com"

            [timing]
            keepalive_interval_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sender.connect, "spool.example.com");
        assert_eq!(cfg.receiver.listen, ":5664");
        assert_eq!(
            cfg.to_sender_timings().keepalive_interval,
            Duration::from_millis(2500)
        );
        assert_eq!(cfg.to_sender_timings().file_check_interval, Duration::from_secs(5));
    }

    #[test]
    fn timings_match_engine_defaults() {
        let cfg = SpoolConfig::default();
        assert_eq!(cfg.to_receiver_timings(), ReceiverTimings::default());
        assert_eq!(cfg.to_sender_timings(), SenderTimings::default());
    }

    #[test]
    fn zero_timing_is_clamped() {
        let mut cfg = SpoolConfig::default();
        cfg.timing.read_timeout_ms = 0;
        assert_eq!(cfg.to_receiver_timings().read_timeout, Duration::from_millis(1));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SpoolConfig::load(&dir.path().join("nope.toml"));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[receiver\nlisten = 3").unwrap();
        let cfg = SpoolConfig::load(&path);
        assert_eq!(cfg.receiver.listen, ":5664");
    }

    #[test]
    fn receiver_requirements() {
        assert!(receiver_ready().validate_receiver().is_ok());

        let mut cfg = receiver_ready();
        cfg.receiver.target.clear();
        match cfg.validate_receiver() {
            Err(SpoolError::Config(msg)) => assert!(msg.contains("--target")),
            other => panic!("unexpected: {other:?}"),
        }

        let mut cfg = receiver_ready();
        cfg.receiver.allow.clear();
        match cfg.validate_receiver() {
            Err(SpoolError::Config(msg)) => assert!(msg.contains("--allow")),
            other => panic!("unexpected: {other:?}"),
        }

        let mut cfg = receiver_ready();
        cfg.tls.key.clear();
        match cfg.validate_receiver() {
            Err(SpoolError::Config(msg)) => assert!(msg.contains("--key")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn sender_requirements() {
        let mut cfg = SpoolConfig::default();
        assert!(cfg.validate_sender().is_err());

        cfg.sender.connect = "10.0.0.1".into();
        cfg.sender.source = "/var/spool/out".into();
        assert!(cfg.validate_sender().is_ok());

        cfg.tls.ca.clear();
        assert!(cfg.validate_sender().is_ok());

        cfg.tls.cert.clear();
        match cfg.validate_sender() {
            Err(SpoolError::Config(msg)) => assert!(msg.contains("--cert")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn default_identity_is_named_after_the_host() {
        let host = local_hostname();
        assert!(!host.is_empty());
        let tls = TlsConfig::default();
        assert_eq!(tls.cert, format!("etc/{host}.crt"));
        assert_eq!(tls.key, format!("etc/{host}.key"));
    }

    #[test]
    fn empty_ca_means_no_bundle() {
        let mut cfg = SpoolConfig::default();
        assert!(cfg.tls_settings().ca.is_some());
        cfg.tls.ca.clear();
        assert!(cfg.tls_settings().ca.is_none());
    }
}
