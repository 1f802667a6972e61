use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::error::EngineError;

/// Engine configuration, supplied at construction time.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub log: LogConfig,
    pub ledger: LedgerConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Optimistic-check attempts before giving up with `ConcurrentModification`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "pix_lifecycle.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
        }
    }
}

/// Monetary tags and accounts used for ledger entries
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    pub currency: String,
    /// Clearing account representing the settlement network
    pub settlement_account: String,
    /// Account holding funds blocked by infraction refund operations
    pub refund_reserve_account: String,
    /// Quarantine for deposits blocked by a compliance warning
    #[serde(default = "default_blocked_account")]
    pub blocked_account: String,
    pub tags: LedgerTags,
}

fn default_blocked_account() -> String {
    "pix-blocked".to_string()
}

fn default_deposit_blocked_tag() -> String {
    "PIXBLOCK".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerTags {
    pub deposit_received: String,
    #[serde(default = "default_deposit_blocked_tag")]
    pub deposit_blocked: String,
    pub devolution: String,
    pub payment: String,
    pub refund: String,
    pub refund_hold: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: "BRL".to_string(),
            settlement_account: "pix-settlement".to_string(),
            refund_reserve_account: "pix-refund-reserve".to_string(),
            blocked_account: default_blocked_account(),
            tags: LedgerTags {
                deposit_received: "PIXREC".to_string(),
                deposit_blocked: default_deposit_blocked_tag(),
                devolution: "PIXDEVSEND".to_string(),
                payment: "PIXSEND".to_string(),
                refund: "PIXREFUND".to_string(),
                refund_hold: "PIXREFUNDHOLD".to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub timeout_ms: u64,
    /// Base URL the PSP calls back on, e.g. `https://api.bank.example/pix/callbacks`
    pub callback_base_url: String,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Callback URL for one instrument kind, e.g. `<base>/admin-banking-ted`
    pub fn callback_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.callback_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            callback_base_url: "http://localhost:3000/pix/callbacks".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReconciliationConfig {
    /// Remote statuses updated within this window are pulled on each pass
    pub lookback_secs: u64,
    /// Delay between two reconciliation ticks
    pub interval_secs: u64,
    /// Lease held while a pass runs
    pub lease_ttl_secs: u64,
    pub lease_key: String,
}

impl ReconciliationConfig {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            lookback_secs: 3_600,
            interval_secs: 60,
            lease_ttl_secs: 300,
            lease_key: "pix-lifecycle:reconciliation".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            ledger: LedgerConfig::default(),
            gateway: GatewayConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl EngineConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> Result<Self, EngineError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_file(path: &str) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        if config.max_attempts == 0 {
            return Err(EngineError::Config("max_attempts must be at least 1".into()));
        }
        Ok(config)
    }
}
