use exchange_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Service configuration, loaded from environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,

    /// RocksDB data directory
    pub data_dir: PathBuf,

    /// Actor mailbox capacity
    pub mailbox_capacity: usize,

    /// Exchange gateway connection; empty `api_base` selects the mock
    pub gateway: GatewayConfig,

    /// Deadline for a single gateway order, in seconds
    pub gateway_timeout_secs: u64,

    /// Delay between reconciliation passes, in seconds
    pub reconcile_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8084,
            data_dir: PathBuf::from("./data/royalty"),
            mailbox_capacity: 1000,
            gateway: GatewayConfig::default(),
            gateway_timeout_secs: 30,
            reconcile_interval_secs: 60,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, String> {
        let mut config = ServiceConfig::default();

        if let Ok(host) = env::var("TUNERAIL_HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("TUNERAIL_PORT") {
            config.port = port.parse().map_err(|e| format!("Invalid port: {}", e))?;
        }
        if let Ok(data_dir) = env::var("TUNERAIL_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(capacity) = env::var("TUNERAIL_MAILBOX_CAPACITY") {
            config.mailbox_capacity = capacity
                .parse()
                .map_err(|e| format!("Invalid mailbox capacity: {}", e))?;
        }
        if let Ok(api_base) = env::var("EXCHANGE_API_BASE") {
            config.gateway.api_base = api_base;
        }
        if let Ok(secret) = env::var("EXCHANGE_API_SECRET") {
            config.gateway.api_secret = Some(secret);
        }
        if let Ok(affiliate) = env::var("EXCHANGE_AFFILIATE_ID") {
            config.gateway.affiliate_id = Some(affiliate);
        }
        if let Ok(timeout) = env::var("EXCHANGE_TIMEOUT_SECS") {
            config.gateway_timeout_secs = timeout
                .parse()
                .map_err(|e| format!("Invalid gateway timeout: {}", e))?;
            config.gateway.timeout_secs = config.gateway_timeout_secs;
        }
        if let Ok(interval) = env::var("RECONCILE_INTERVAL_SECS") {
            config.reconcile_interval_secs = interval
                .parse()
                .map_err(|e| format!("Invalid reconcile interval: {}", e))?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }
        if self.gateway_timeout_secs == 0 {
            return Err("Gateway timeout cannot be 0".to_string());
        }
        if self.reconcile_interval_secs == 0 {
            return Err("Reconcile interval cannot be 0".to_string());
        }
        Ok(())
    }

    /// Use the real HTTP gateway only when an API base is configured
    pub fn use_mock_gateway(&self) -> bool {
        self.gateway.api_base.is_empty()
    }
}
