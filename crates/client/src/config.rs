//! Client configuration.

use std::path::Path;
use std::time::Duration;

use dutch_types::{TokenConfig, SEPOLIA_CHAIN_ID};
use thiserror::Error;

/// Runtime settings of a client session.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the node / wallet
    pub rpc_endpoint: String,
    /// How often the auction timer refreshes live state
    pub poll_interval: Duration,
    /// How often a submitted transaction's receipt is polled
    pub receipt_poll_interval: Duration,
    /// Chain confidential transfers must be sent on
    pub confidential_chain_id: u64,
    /// Number of segments in the price chart
    pub chart_steps: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: "http://127.0.0.1:8545".to_string(),
            poll_interval: Duration::from_secs(5),
            receipt_poll_interval: Duration::from_secs(2),
            confidential_chain_id: SEPOLIA_CHAIN_ID,
            chart_steps: 12,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read token list: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid token list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Load a JSON array of [`TokenConfig`] entries.
pub fn load_token_list(path: impl AsRef<Path>) -> Result<Vec<TokenConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    parse_token_list(&raw)
}

pub fn parse_token_list(raw: &str) -> Result<Vec<TokenConfig>, ConfigError> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dutch_types::TokenKind;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.confidential_chain_id, 11_155_111);
        assert_eq!(config.chart_steps, 12);
    }

    #[test]
    fn test_parse_token_list() {
        let raw = r#"[
            {"id": "eth", "symbol": "ETH", "name": "Ether", "kind": "native"},
            {"id": "ctok", "symbol": "cTOK", "name": "Confidential", "kind": "confidential",
             "address": "0x0707070707070707070707070707070707070707", "decimals": 6}
        ]"#;
        let tokens = parse_token_list(raw).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Native);
        assert!(tokens[0].address.is_none());
        assert_eq!(tokens[1].decimals, Some(6));
    }

    #[test]
    fn test_parse_token_list_rejects_garbage() {
        assert!(matches!(parse_token_list("{"), Err(ConfigError::Parse(_))));
    }
}
