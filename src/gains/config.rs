//! Configuration for the gains pipeline and its HTTP collaborators.

use crate::types::{default_contract_aliases, Address, DEAD_ADDRESS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Where the live wallet balance comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceMode {
    /// `balanceOf` through the chain's JSON-RPC endpoint.
    OnChain,
    /// The indexed balances API, for wallets entered by hand.
    Indexed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GainsConfig {
    /// Chain id used by the indexer API (56 = BNB Smart Chain)
    pub chain_id: u64,
    /// Ticker of the wrapped native coin used to trace swaps
    pub reference_symbol: String,
    /// Decimals of the wrapped native coin
    pub reference_decimals: u32,
    /// Burn wallet excluded from circulating supply
    pub dead_address: Address,

    pub bscscan_url: String,
    pub covalent_url: String,
    pub livecoinwatch_url: String,
    pub pancakeswap_url: String,
    pub rpc_url: String,

    pub bscscan_api_key: Option<String>,
    pub covalent_api_key: Option<String>,
    pub livecoinwatch_api_key: Option<String>,

    /// Per-request HTTP timeout in seconds
    pub http_timeout_seconds: u64,
    /// Retry attempts for a failed HTTP call
    pub retry_attempts: usize,
    /// Outbound request budget
    pub rate_limit_requests_per_second: u32,

    /// Transactions priced concurrently
    pub max_parallel_resolutions: usize,
    /// Half-width of the historical price query window
    pub history_window_ms: i64,
    /// How long the top coins list is reused
    pub top_coins_ttl_seconds: u64,
    /// 1-based rank of the coin to compare market caps against
    pub comparison_rank: usize,
    /// Price cache database file
    pub cache_db_path: PathBuf,
    pub balance_mode: BalanceMode,
    pub contract_aliases: HashMap<String, Address>,
}

impl Default for GainsConfig {
    fn default() -> Self {
        Self {
            chain_id: 56,
            reference_symbol: "WBNB".to_string(),
            reference_decimals: 18,
            dead_address: DEAD_ADDRESS.to_string(),
            bscscan_url: "https://api.bscscan.com/api".to_string(),
            covalent_url: "https://api.covalenthq.com/v1".to_string(),
            livecoinwatch_url: "https://api.livecoinwatch.com".to_string(),
            pancakeswap_url: "https://api.pancakeswap.info/api/v2".to_string(),
            rpc_url: "https://bsc-dataseed3.binance.org/".to_string(),
            bscscan_api_key: None,
            covalent_api_key: None,
            livecoinwatch_api_key: None,
            http_timeout_seconds: 10,
            retry_attempts: 3,
            rate_limit_requests_per_second: 5,
            max_parallel_resolutions: 4,
            history_window_ms: 150_000,
            top_coins_ttl_seconds: 300,
            comparison_rank: 50,
            cache_db_path: PathBuf::from("./prices.db"),
            balance_mode: BalanceMode::OnChain,
            contract_aliases: default_contract_aliases(),
        }
    }
}

impl GainsConfig {
    /// Defaults with API keys taken from `BSC_API_KEY`, `COVALENT_API_KEY`
    /// and `LCW_API_KEY`.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty("BSC_API_KEY") {
            self.bscscan_api_key = Some(key);
        }
        if let Some(key) = non_empty("COVALENT_API_KEY") {
            self.covalent_api_key = Some(key);
        }
        if let Some(key) = non_empty("LCW_API_KEY") {
            self.livecoinwatch_api_key = Some(key);
        }
        if let Some(url) = non_empty("BSC_RPC_URL") {
            self.rpc_url = url;
        }
        self
    }

    /// Resolves a short alias (`pye`) or returns the address itself,
    /// lowercased.
    pub fn resolve_contract(&self, input: &str) -> Address {
        let input = input.trim().trim_start_matches('#');
        self.contract_aliases
            .get(&input.to_lowercase())
            .cloned()
            .unwrap_or_else(|| input.to_string())
            .to_lowercase()
    }

    pub fn with_cache_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_db_path = path.into();
        self
    }

    pub fn with_balance_mode(mut self, mode: BalanceMode) -> Self {
        self.balance_mode = mode;
        self
    }

    pub fn with_comparison_rank(mut self, rank: usize) -> Self {
        self.comparison_rank = rank;
        self
    }

    pub fn with_max_parallel_resolutions(mut self, max: usize) -> Self {
        self.max_parallel_resolutions = max;
        self
    }

    pub fn with_reference_asset(mut self, symbol: impl Into<String>, decimals: u32) -> Self {
        self.reference_symbol = symbol.into();
        self.reference_decimals = decimals;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GainsConfig::default();
        assert_eq!(config.chain_id, 56);
        assert_eq!(config.reference_symbol, "WBNB");
        assert_eq!(config.history_window_ms, 150_000);
        assert_eq!(config.comparison_rank, 50);
        assert_eq!(config.balance_mode, BalanceMode::OnChain);
    }

    #[test]
    fn test_env_overrides_skip_blank_values() {
        let config = GainsConfig::default().with_env_overrides(|name| match name {
            "BSC_API_KEY" => Some("scan-key".to_string()),
            "LCW_API_KEY" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.bscscan_api_key.as_deref(), Some("scan-key"));
        assert_eq!(config.livecoinwatch_api_key, None);
        assert_eq!(config.covalent_api_key, None);
    }

    #[test]
    fn test_resolve_contract_alias() {
        let config = GainsConfig::default();
        assert_eq!(
            config.resolve_contract("PYE"),
            "0xaad87f47cdea777faf87e7602e91e3a6afbe4d57"
        );
        assert_eq!(config.resolve_contract("#0xABCdef"), "0xabcdef");
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: GainsConfig =
            serde_json::from_str(r#"{"comparison_rank": 10, "balance_mode": "Indexed"}"#).unwrap();
        assert_eq!(config.comparison_rank, 10);
        assert_eq!(config.balance_mode, BalanceMode::Indexed);
        assert_eq!(config.reference_decimals, 18);
    }
}
