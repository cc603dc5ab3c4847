//! Shared token registry
//!
//! Lists the tokens whose balances make up a portfolio snapshot, per chain.
//! Decimals are deliberately absent: adapters read them from chain.

use crate::config::ChainId;
use std::collections::HashMap;

/// Token metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    /// Token symbol (e.g., "USDC", "WETH")
    pub symbol: &'static str,
    /// Contract address (EVM) or mint (Solana)
    pub address: &'static str,
}

impl TokenInfo {
    pub const fn new(symbol: &'static str, address: &'static str) -> Self {
        Self { symbol, address }
    }
}

/// Well-known token addresses per chain
pub mod addresses {
    // === Ethereum Mainnet ===
    pub const USDC_ETH: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    pub const USDT_ETH: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";
    pub const DAI_ETH: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";
    pub const WETH_ETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    pub const WBTC_ETH: &str = "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599";

    // === Polygon ===
    pub const USDC_POLYGON: &str = "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359";
    pub const USDT_POLYGON: &str = "0xc2132d05d31c914a87c6611c10748aeb04b58e8f";
    pub const DAI_POLYGON: &str = "0x8f3cf7ad23cd3cadbd9735aff958023239c6a063";
    pub const WETH_POLYGON: &str = "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619";
    pub const WMATIC_POLYGON: &str = "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270";

    // === Solana ===
    pub const USDC_SOLANA: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    pub const USDT_SOLANA: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";
    pub const WSOL: &str = "So11111111111111111111111111111111111111112";

    // === Native asset representations ===
    pub const NATIVE_EVM: &str = "0x0000000000000000000000000000000000000000";
    pub const NATIVE_SOLANA: &str = WSOL;
}

/// Token registry providing per-chain lookups
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens_per_chain: HashMap<ChainId, Vec<TokenInfo>>,
}

impl TokenRegistry {
    /// Create a new token registry with all known tokens
    pub fn new() -> Self {
        use addresses::*;

        let mut tokens_per_chain = HashMap::new();

        tokens_per_chain.insert(
            ChainId::Ethereum,
            vec![
                TokenInfo::new("USDC", USDC_ETH),
                TokenInfo::new("USDT", USDT_ETH),
                TokenInfo::new("DAI", DAI_ETH),
                TokenInfo::new("WETH", WETH_ETH),
                TokenInfo::new("WBTC", WBTC_ETH),
            ],
        );
        tokens_per_chain.insert(
            ChainId::Polygon,
            vec![
                TokenInfo::new("USDC", USDC_POLYGON),
                TokenInfo::new("USDT", USDT_POLYGON),
                TokenInfo::new("DAI", DAI_POLYGON),
                TokenInfo::new("WETH", WETH_POLYGON),
                TokenInfo::new("WMATIC", WMATIC_POLYGON),
            ],
        );
        tokens_per_chain.insert(
            ChainId::Solana,
            vec![
                TokenInfo::new("USDC", USDC_SOLANA),
                TokenInfo::new("USDT", USDT_SOLANA),
            ],
        );

        Self { tokens_per_chain }
    }

    /// Get tokens to query for a chain
    pub fn tokens_for_chain(&self, chain: ChainId) -> &[TokenInfo] {
        self.tokens_per_chain
            .get(&chain)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}
