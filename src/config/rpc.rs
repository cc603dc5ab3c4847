//! RPC endpoint configuration
//!
//! Resolution order per chain:
//! 1. Per-chain env vars (ETH_RPC_URL, POLYGON_RPC_URL, SOLANA_RPC_URL) - highest priority
//! 2. Provider API keys (ALCHEMY_API_KEY, INFURA_API_KEY) - builds URLs automatically
//! 3. Public RPC fallbacks - for testing only
//!
//! # Examples
//!
//! ```bash
//! # Option 1: Per-chain URLs (recommended for production)
//! export ETH_RPC_URL="https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY"
//! export SOLANA_RPC_URL="https://solana-mainnet.g.alchemy.com/v2/YOUR_KEY"
//!
//! # Option 2: Single provider API key
//! export ALCHEMY_API_KEY="YOUR_KEY"
//!
//! # Option 3: No env vars - uses public RPCs (rate limited, for testing only)
//! ```

use super::ChainId;
use std::collections::HashMap;
use url::Url;

/// RPC configuration for every supported chain
#[derive(Debug, Clone)]
pub struct RpcConfig {
    urls: HashMap<ChainId, String>,
}

/// Environment variable names
mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const ETHEREUM_RPC_URL: &str = "ETHEREUM_RPC_URL";
    pub const POLYGON_RPC_URL: &str = "POLYGON_RPC_URL";
    pub const SOLANA_RPC_URL: &str = "SOLANA_RPC_URL";

    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
    pub const INFURA_API_KEY: &str = "INFURA_API_KEY";
}

/// Public RPC endpoints (rate limited, for testing only)
mod public_rpcs {
    pub const ETHEREUM: &str = "https://eth.llamarpc.com";
    pub const POLYGON: &str = "https://polygon-rpc.com";
    pub const SOLANA: &str = "https://api.mainnet-beta.solana.com";
}

fn per_chain_vars(chain: ChainId) -> &'static [&'static str] {
    match chain {
        ChainId::Ethereum => &[env_vars::ETH_RPC_URL, env_vars::ETHEREUM_RPC_URL],
        ChainId::Polygon => &[env_vars::POLYGON_RPC_URL],
        ChainId::Solana => &[env_vars::SOLANA_RPC_URL],
    }
}

fn alchemy_url(chain: ChainId, key: &str) -> String {
    match chain {
        ChainId::Ethereum => format!("https://eth-mainnet.g.alchemy.com/v2/{}", key),
        ChainId::Polygon => format!("https://polygon-mainnet.g.alchemy.com/v2/{}", key),
        ChainId::Solana => format!("https://solana-mainnet.g.alchemy.com/v2/{}", key),
    }
}

fn infura_url(chain: ChainId, key: &str) -> Option<String> {
    match chain {
        ChainId::Ethereum => Some(format!("https://mainnet.infura.io/v3/{}", key)),
        ChainId::Polygon => Some(format!("https://polygon-mainnet.infura.io/v3/{}", key)),
        // Infura has no Solana endpoint
        ChainId::Solana => None,
    }
}

fn public_url(chain: ChainId) -> &'static str {
    match chain {
        ChainId::Ethereum => public_rpcs::ETHEREUM,
        ChainId::Polygon => public_rpcs::POLYGON,
        ChainId::Solana => public_rpcs::SOLANA,
    }
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Resolve URLs through an arbitrary variable lookup
    pub(crate) fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut urls = HashMap::new();

        for chain in ChainId::ALL {
            let explicit = per_chain_vars(chain)
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.is_empty()));
            if let Some(url) = explicit {
                tracing::debug!(chain = %chain, "Using per-chain RPC URL");
                urls.insert(chain, url);
                continue;
            }

            if let Some(key) = lookup(env_vars::ALCHEMY_API_KEY) {
                tracing::debug!(chain = %chain, "Building RPC URL from ALCHEMY_API_KEY");
                urls.insert(chain, alchemy_url(chain, &key));
                continue;
            }

            if let Some(url) =
                lookup(env_vars::INFURA_API_KEY).and_then(|key| infura_url(chain, &key))
            {
                tracing::debug!(chain = %chain, "Building RPC URL from INFURA_API_KEY");
                urls.insert(chain, url);
                continue;
            }

            tracing::warn!(chain = %chain, "No RPC configured, using public RPC (rate limited)");
            urls.insert(chain, public_url(chain).to_string());
        }

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<ChainId, String>) -> Self {
        Self { urls }
    }

    /// Get RPC URL for a chain
    pub fn get(&self, chain: ChainId) -> Option<&str> {
        self.urls.get(&chain).map(|s| s.as_str())
    }

    /// Get the RPC URL for a chain as a parsed URL
    pub fn url(&self, chain: ChainId) -> crate::Result<Url> {
        let raw = self
            .get(chain)
            .ok_or_else(|| crate::Error::Config(format!("no RPC URL for {}", chain)))?;
        Url::parse(raw)
            .map_err(|e| crate::Error::Config(format!("invalid RPC URL for {}: {}", chain, e)))
    }

    /// Check if a chain is configured
    pub fn has_chain(&self, chain: ChainId) -> bool {
        self.urls.contains_key(&chain)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
