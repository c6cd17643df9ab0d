// 9.0 config.rs: all settings in one place. endpoints, credential, submission
// limits. The core never reads this directly; the wiring layer translates it
// into reader/sender construction and Liquidator policy.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Complete configuration for one bot instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    // HTTP JSON-RPC endpoint for reads and submission
    pub http_rpc_url: String,
    // Optional websocket endpoint for new-block signals; absent means the
    // periodic refresh is the only trigger
    pub ws_rpc_url: Option<String>,
    // Chain the endpoints are expected to serve
    pub chain_id: u64,
    // Signing credential. None puts the bot in read-only mode: it observes
    // and reports opportunities but never submits
    pub wallet_key: Option<String>,
    // Priority fee cap for submitted transactions, in gwei
    pub max_priority_fee_gwei: Decimal,
    // Upper bound on troves named in a single liquidation batch
    pub max_troves_to_liquidate: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            http_rpc_url: "http://localhost:8545".to_string(),
            ws_rpc_url: None,
            chain_id: 1,
            wallet_key: None,
            max_priority_fee_gwei: Decimal::new(5, 0), // 5 gwei
            max_troves_to_liquidate: 10,
        }
    }
}

impl BotConfig {
    pub fn read_only(&self) -> bool {
        self.wallet_key.is_none()
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_rpc_url.is_empty() {
            return Err(ConfigError::InvalidEndpoint {
                reason: "HTTP RPC URL must not be empty".to_string(),
            });
        }

        if let Some(ws) = &self.ws_rpc_url {
            if ws.is_empty() {
                return Err(ConfigError::InvalidEndpoint {
                    reason: "websocket URL must not be empty when given".to_string(),
                });
            }
        }

        if self.chain_id == 0 {
            return Err(ConfigError::InvalidChain {
                reason: "chain id must be non-zero".to_string(),
            });
        }

        if self.max_priority_fee_gwei < Decimal::ZERO {
            return Err(ConfigError::InvalidSubmission {
                reason: "priority fee must not be negative".to_string(),
            });
        }

        if self.max_troves_to_liquidate == 0 {
            return Err(ConfigError::InvalidSubmission {
                reason: "batch size must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid endpoint: {reason}")]
    InvalidEndpoint { reason: String },

    #[error("invalid chain: {reason}")]
    InvalidChain { reason: String },

    #[error("invalid submission settings: {reason}")]
    InvalidSubmission { reason: String },
}
