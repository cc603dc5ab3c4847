//! Configuration for the intent gateway

pub mod rpc;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// Re-export RPC config
pub use rpc::RpcConfig;

/// 1inch API key environment variable name
pub const ONE_INCH_API_KEY_ENV: &str = "ONE_INCH_API_KEY";

/// Gateway API key environment variable name
pub const GATEWAY_API_KEY_ENV: &str = "GATEWAY_API_KEY";

/// Execution model of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    /// Account + nonce chains driven by ABI-encoded calls
    Evm,
    /// Recent-blockhash chains driven by instruction lists
    Solana,
}

/// Supported blockchains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Ethereum,
    Polygon,
    Solana,
}

impl ChainId {
    pub const ALL: [ChainId; 3] = [ChainId::Ethereum, ChainId::Polygon, ChainId::Solana];

    pub const DEFAULT: ChainId = ChainId::Ethereum;

    pub fn name(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Polygon => "polygon",
            ChainId::Solana => "solana",
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            ChainId::Ethereum | ChainId::Polygon => ChainFamily::Evm,
            ChainId::Solana => ChainFamily::Solana,
        }
    }

    /// EIP-155 chain id, `None` for non-EVM chains
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            ChainId::Ethereum => Some(1),
            ChainId::Polygon => Some(137),
            ChainId::Solana => None,
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ETH",
            ChainId::Polygon => "MATIC",
            ChainId::Solana => "SOL",
        }
    }

    pub fn native_decimals(&self) -> u8 {
        match self {
            ChainId::Ethereum | ChainId::Polygon => 18,
            ChainId::Solana => 9,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(ChainId::Ethereum),
            "polygon" | "matic" => Ok(ChainId::Polygon),
            "solana" | "sol" => Ok(ChainId::Solana),
            other => Err(format!("unknown blockchain '{}'", other)),
        }
    }
}

/// Supported DeFi protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolId {
    Uniswap,
    Sushiswap,
    Quickswap,
    Aave,
    Compound,
    Raydium,
    Orca,
}

impl ProtocolId {
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolId::Uniswap => "uniswap",
            ProtocolId::Sushiswap => "sushiswap",
            ProtocolId::Quickswap => "quickswap",
            ProtocolId::Aave => "aave",
            ProtocolId::Compound => "compound",
            ProtocolId::Raydium => "raydium",
            ProtocolId::Orca => "orca",
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProtocolId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uniswap" | "uniswap_v2" => Ok(ProtocolId::Uniswap),
            "sushiswap" | "sushi" => Ok(ProtocolId::Sushiswap),
            "quickswap" => Ok(ProtocolId::Quickswap),
            "aave" | "aave_v2" => Ok(ProtocolId::Aave),
            "compound" => Ok(ProtocolId::Compound),
            "raydium" => Ok(ProtocolId::Raydium),
            "orca" => Ok(ProtocolId::Orca),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// When set, requests must carry a matching `X-API-Key` header
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            api_key: std::env::var(GATEWAY_API_KEY_ENV).ok().map(SecretString::from),
        }
    }
}

/// Bounds on every suspension point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Off-chain HTTP calls (aggregators, price feed)
    pub http_secs: u64,
    /// Chain node reads
    pub chain_read_secs: u64,
    /// Default deadline for one gateway call
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }

    pub fn chain_read(&self) -> Duration {
        Duration::from_secs(self.chain_read_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            http_secs: 30,
            chain_read_secs: 10,
            request_secs: 60,
        }
    }
}

/// Upstream quote and price endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub oneinch_base_url: String,
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub oneinch_api_key: Option<SecretString>,
    pub jupiter_base_url: String,
    pub coingecko_base_url: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            oneinch_base_url: "https://api.1inch.dev/swap/v5.2".to_string(),
            oneinch_api_key: std::env::var(ONE_INCH_API_KEY_ENV)
                .ok()
                .map(SecretString::from),
            jupiter_base_url: "https://quote-api.jup.ag/v6".to_string(),
            coingecko_base_url: "https://api.coingecko.com/api/v3".to_string(),
        }
    }
}

/// Defaults applied to intents that omit them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDefaults {
    /// Swap slippage tolerance in percent (0.5 = 0.5%)
    pub swap_slippage_percent: Decimal,
    /// Tolerance used for liquidity minimums in percent
    pub liquidity_slippage_percent: Decimal,
    /// Upper bound accepted from callers
    pub max_slippage_percent: Decimal,
    /// Router deadline offset
    pub deadline_secs: u64,
}

impl Default for IntentDefaults {
    fn default() -> Self {
        Self {
            swap_slippage_percent: Decimal::new(5, 1), // 0.5%
            liquidity_slippage_percent: Decimal::from(5), // amount_min = 95% of desired
            max_slippage_percent: Decimal::from(50),
            deadline_secs: 3600,
        }
    }
}

/// Main configuration
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub aggregators: AggregatorConfig,
    #[serde(default)]
    pub defaults: IntentDefaults,
    /// JSONL file receiving every terminal execution result
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
}

impl Config {
    /// Read a JSON config file, or defaults when no path is given
    ///
    /// Secrets missing from the file fall back to their environment variables.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("{}: {}", path.display(), e)))?;
        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("{}: {}", path.display(), e)))?;

        if config.server.api_key.is_none() {
            config.server.api_key = std::env::var(GATEWAY_API_KEY_ENV).ok().map(SecretString::from);
        }
        if config.aggregators.oneinch_api_key.is_none() {
            config.aggregators.oneinch_api_key = std::env::var(ONE_INCH_API_KEY_ENV)
                .ok()
                .map(SecretString::from);
        }
        Ok(config)
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}
