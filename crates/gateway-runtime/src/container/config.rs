//! # Gateway Configuration
//!
//! The fixed option set, loaded from the environment and validated once.
//! The validated config is threaded into every component at construction.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `KG_OPERATING_MODE` | `constraint-only` | The only accepted mode |
//! | `KG_SHARED_SECRET` | unset | Hex key, at least 32 bytes |
//! | `KG_ACK_TIMEOUT_SECS` | `10` | Decision wait, 1..=600 |
//! | `KG_REPLAY_WINDOW_SECS` | `3600` | Must be >= max signal ttl |
//! | `KG_MAX_PENDING_REQUESTS` | `1024` | Pending bound, > 0 |
//! | `KG_MAX_SIGNAL_TTL_SECS` | replay window | Largest accepted ttl |
//! | `KG_REPLAY_CACHE_CAPACITY` | `100000` | Live replay entries |
//! | `KG_AUDIT_PATH` | unset (in-memory) | JSON-lines audit file |
//! | `KG_AUDIT_HASHER` | `sha256` | `sha256` or `sha3-256` |
//!
//! ## Security Requirements
//!
//! - `shared_secret` MUST be set and non-zero in production
//!   ([`GatewayConfig::validate_for_production`])

use kg_04_authorization_gate::{DEFAULT_ARCHIVE_CAPACITY, DEFAULT_MAX_PENDING_REQUESTS};
use shared_bus::ReplayCache;
use shared_types::{OperatingMode, SecretError, SharedSecret};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Bounds on `ack_timeout`, in seconds.
pub const ACK_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=600;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("unsupported operating mode {0:?}; only constraint-only is allowed")]
    UnsupportedMode(String),

    #[error("KG_SHARED_SECRET: {0}")]
    Secret(#[from] SecretError),

    #[error("SECURITY VIOLATION: shared secret not set. Set KG_SHARED_SECRET.")]
    MissingSecret,

    #[error("SECURITY VIOLATION: shared secret is all zero bytes.")]
    InsecureSecret,

    #[error("ack_timeout {secs}s outside 1..=600")]
    AckTimeoutOutOfRange { secs: u64 },

    #[error("replay_window {window}s shorter than max signal ttl {max_ttl}s")]
    ReplayWindowTooShort { window: u64, max_ttl: u64 },

    #[error("{field} must be greater than zero")]
    ZeroBound { field: &'static str },
}

/// Which chain hasher the audit log uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditHasherKind {
    #[default]
    Sha256,
    Sha3_256,
}

impl FromStr for AuditHasherKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(AuditHasherKind::Sha256),
            "sha3-256" | "sha3" => Ok(AuditHasherKind::Sha3_256),
            _ => Err(()),
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub operating_mode: OperatingMode,
    pub shared_secret: Option<SharedSecret>,
    pub ack_timeout: Duration,
    pub replay_window_secs: u64,
    pub max_pending_requests: usize,
    pub max_signal_ttl: u64,
    pub replay_cache_capacity: usize,
    pub archive_capacity: usize,
    pub audit_path: Option<PathBuf>,
    pub audit_hasher: AuditHasherKind,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            operating_mode: OperatingMode::ConstraintOnly,
            shared_secret: None,
            ack_timeout: Duration::from_secs(10),
            replay_window_secs: ReplayCache::DEFAULT_WINDOW_SECS,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            max_signal_ttl: ReplayCache::DEFAULT_WINDOW_SECS,
            replay_cache_capacity: ReplayCache::DEFAULT_CAPACITY,
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
            audit_path: None,
            audit_hasher: AuditHasherKind::Sha256,
        }
    }
}

fn parse<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
    })
}

impl GatewayConfig {
    /// Load from process environment and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("KG_OPERATING_MODE") {
            config.operating_mode = raw
                .parse()
                .map_err(|_| ConfigError::UnsupportedMode(raw.clone()))?;
        }
        if let Some(raw) = lookup("KG_SHARED_SECRET") {
            config.shared_secret = Some(SharedSecret::from_hex(&raw)?);
        }
        if let Some(raw) = lookup("KG_ACK_TIMEOUT_SECS") {
            config.ack_timeout = Duration::from_secs(parse("KG_ACK_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = lookup("KG_REPLAY_WINDOW_SECS") {
            config.replay_window_secs = parse("KG_REPLAY_WINDOW_SECS", &raw)?;
            config.max_signal_ttl = config.replay_window_secs;
        }
        if let Some(raw) = lookup("KG_MAX_SIGNAL_TTL_SECS") {
            config.max_signal_ttl = parse("KG_MAX_SIGNAL_TTL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("KG_MAX_PENDING_REQUESTS") {
            config.max_pending_requests = parse("KG_MAX_PENDING_REQUESTS", &raw)?;
        }
        if let Some(raw) = lookup("KG_REPLAY_CACHE_CAPACITY") {
            config.replay_cache_capacity = parse("KG_REPLAY_CACHE_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("KG_AUDIT_PATH") {
            if !raw.trim().is_empty() {
                config.audit_path = Some(PathBuf::from(raw.trim()));
            }
        }
        if let Some(raw) = lookup("KG_AUDIT_HASHER") {
            config.audit_hasher = raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "KG_AUDIT_HASHER",
                value: raw.clone(),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Structural checks every configuration must pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secs = self.ack_timeout.as_secs();
        if !ACK_TIMEOUT_RANGE.contains(&secs) || self.ack_timeout.subsec_nanos() != 0 {
            return Err(ConfigError::AckTimeoutOutOfRange { secs });
        }
        if self.max_signal_ttl == 0 {
            return Err(ConfigError::ZeroBound {
                field: "max_signal_ttl",
            });
        }
        if self.replay_window_secs < self.max_signal_ttl {
            return Err(ConfigError::ReplayWindowTooShort {
                window: self.replay_window_secs,
                max_ttl: self.max_signal_ttl,
            });
        }
        if self.max_pending_requests == 0 {
            return Err(ConfigError::ZeroBound {
                field: "max_pending_requests",
            });
        }
        if self.replay_cache_capacity == 0 {
            return Err(ConfigError::ZeroBound {
                field: "replay_cache_capacity",
            });
        }
        Ok(())
    }

    /// Validate configuration for production readiness.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - the structural checks fail
    /// - the shared secret is missing or all zero
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        self.validate()?;
        match &self.shared_secret {
            None => Err(ConfigError::MissingSecret),
            Some(secret) if secret.is_weak() => Err(ConfigError::InsecureSecret),
            Some(_) => Ok(()),
        }
    }
}
