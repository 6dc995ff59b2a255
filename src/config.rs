use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "ledger.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            enable_tracing: false,
            ledger: LedgerConfig::default(),
        }
    }
}

/// Upper bound for `idempotency_ttl_secs` (30 days)
pub const MAX_IDEMPOTENCY_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Transfer engine settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Lifetime of an idempotency record
    pub idempotency_ttl_secs: u64,
    /// Deadline for all port I/O of one request
    pub request_timeout_ms: u64,
    /// Fresh bound for recording a FAILED transfer
    pub failure_write_timeout_ms: u64,
    pub account_number_max_attempts: u32,
    /// Capacity of the channel event sink
    pub event_buffer: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl_secs: 24 * 60 * 60,
            request_timeout_ms: 5_000,
            failure_write_timeout_ms: 2_000,
            account_number_max_attempts: 10,
            event_buffer: 1_024,
        }
    }
}

impl LedgerConfig {
    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn failure_write_timeout(&self) -> Duration {
        Duration::from_millis(self.failure_write_timeout_ms)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.idempotency_ttl_secs > 0, "idempotency_ttl_secs must be > 0");
        anyhow::ensure!(
            self.idempotency_ttl_secs <= MAX_IDEMPOTENCY_TTL_SECS,
            "idempotency_ttl_secs must be <= {}",
            MAX_IDEMPOTENCY_TTL_SECS
        );
        anyhow::ensure!(self.request_timeout_ms > 0, "request_timeout_ms must be > 0");
        anyhow::ensure!(
            self.failure_write_timeout_ms > 0,
            "failure_write_timeout_ms must be > 0"
        );
        anyhow::ensure!(
            self.account_number_max_attempts > 0,
            "account_number_max_attempts must be > 0"
        );
        anyhow::ensure!(self.event_buffer > 0, "event_buffer must be > 0");
        Ok(())
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> anyhow::Result<Self> {
        Self::load_from(format!("config/{}.yaml", env))
    }

    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(content).context("Failed to parse config yaml")?;
        config.ledger.validate()?;
        Ok(config)
    }
}
