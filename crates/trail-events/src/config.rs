//! Configuration surface for the audit service and the CSV sink.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Audit service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name of the sink that answers `read` and `query`. When unset or not
    /// registered, a null query sink answers with an informative error.
    pub handler_for_queries: Option<String>,
}

/// CSV sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvSinkConfig {
    /// Directory receiving one `<topic>.csv` per topic.
    pub log_directory: PathBuf,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub buffering: BufferingConfig,
    #[serde(default)]
    pub algorithms: AlgorithmsConfig,
}

impl CsvSinkConfig {
    pub fn new(log_directory: impl Into<PathBuf>) -> Self {
        Self {
            log_directory: log_directory.into(),
            security: SecurityConfig::default(),
            buffering: BufferingConfig::default(),
            algorithms: AlgorithmsConfig::default(),
        }
    }
}

/// Tamper-evidence settings for the CSV sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// When false the sink writes plain rows without MAC or signature
    /// columns.
    pub enabled: bool,
    /// Path of the master key store container holding `InitialKey` and the
    /// `Signature` keypair.
    pub filename: PathBuf,
    /// Password protecting the key store container.
    pub password: String,
    /// Delay between a data row and the signature row sealing it.
    pub signature_interval_ms: u64,
}

impl SecurityConfig {
    pub fn signature_interval(&self) -> Duration {
        Duration::from_millis(self.signature_interval_ms)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: PathBuf::from("./logs/audit-keystore"),
            password: String::new(),
            signature_interval_ms: 10_000,
        }
    }
}

/// Buffering wrapper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferingConfig {
    /// When false the wrapper is a pass-through.
    pub enabled: bool,
    /// Flush when the queue reaches this many events.
    pub max_size: usize,
    /// Flush this long after the first queued event; 0 disables the timer.
    pub max_time_ms: u64,
    /// When true `publish` never blocks on the downstream sink; when false
    /// every publish also drains the backlog synchronously.
    pub autoflush: bool,
}

impl BufferingConfig {
    pub fn max_time(&self) -> Duration {
        Duration::from_millis(self.max_time_ms)
    }
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_size: 1_000,
            max_time_ms: 100,
            autoflush: true,
        }
    }
}

/// Names of the cryptographic algorithms, identical on writer and
/// verifier. Unknown names are rejected when the chain components are
/// constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmsConfig {
    pub mac: String,
    pub signature: String,
}

impl Default for AlgorithmsConfig {
    fn default() -> Self {
        Self {
            mac: "hmac-sha256".to_owned(),
            signature: "ed25519".to_owned(),
        }
    }
}
