//! Protocol routing
//!
//! A fixed table maps `(ChainId, ProtocolId)` to the handler that encodes
//! intents for that protocol on that chain. A missing key is the only way a
//! route can be unsupported, so it is detected before any network call.

pub mod aave;
pub mod compound;
pub mod payload;
pub mod solana_amm;
pub mod uniswap_v2;

use crate::config::{ChainId, ProtocolId};
use crate::intent::{AddLiquidityIntent, LendIntent, RemoveLiquidityIntent, SwapIntent, WithdrawIntent};
use crate::quotes::Quote;
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub use aave::AaveV2Pool;
pub use compound::CompoundMarkets;
pub use payload::{CallPayload, ContractCall, WithdrawAmount};
pub use solana_amm::SolanaAmm;
pub use uniswap_v2::V2Router;

/// What a protocol can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Swaps and liquidity provision
    Dex,
    /// Deposits and withdrawals
    Lending,
}

impl ProtocolKind {
    pub fn supports(&self, operation: &str) -> bool {
        matches!(
            (self, operation),
            (ProtocolKind::Dex, "swap" | "add_liquidity" | "remove_liquidity")
                | (ProtocolKind::Lending, "lend" | "withdraw")
        )
    }
}

/// Category of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    Lending,
    Farming,
    Staking,
}

/// Receipt token whose balance represents a position
#[derive(Debug, Clone, Copy)]
pub struct PositionToken {
    pub symbol: &'static str,
    pub token: &'static str,
    pub kind: PositionKind,
    /// Asset priced in place of the receipt token, when they trade 1:1
    pub priced_as: Option<&'static str>,
}

/// A fully encoded call ready for an adapter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedCall {
    pub target: String,
    pub payload: CallPayload,
    /// Native value attached to the transaction
    pub value: Decimal,
}

impl PlannedCall {
    pub fn new(target: impl Into<String>, payload: CallPayload) -> Self {
        Self {
            target: target.into(),
            payload,
            value: Decimal::ZERO,
        }
    }
}

/// Inputs to a swap encoding once the quote is known
#[derive(Debug)]
pub struct SwapPlan<'a> {
    pub intent: &'a SwapIntent,
    pub quote: &'a Quote,
    pub min_amount_out: Decimal,
    pub deadline: u64,
}

/// Inputs to a liquidity removal once pool reserves are known
#[derive(Debug)]
pub struct RemovalPlan<'a> {
    pub intent: &'a RemoveLiquidityIntent,
    pub lp_token: &'a str,
    pub min_a: Decimal,
    pub min_b: Decimal,
    pub deadline: u64,
}

fn not_offered(protocol: ProtocolId, what: &str) -> Error {
    Error::unsupported(format!("{} does not offer {}", protocol, what))
}

/// Encodes intents for one protocol deployment
///
/// Implementations are pure: they never perform I/O, so a route that cannot
/// be encoded fails before anything reaches the network.
pub trait ProtocolHandler: Send + Sync {
    fn protocol(&self) -> ProtocolId;

    fn swap(&self, _plan: &SwapPlan<'_>) -> Result<PlannedCall> {
        Err(not_offered(self.protocol(), "swaps"))
    }

    fn deposit(&self, _intent: &LendIntent) -> Result<PlannedCall> {
        Err(not_offered(self.protocol(), "deposits"))
    }

    fn withdraw(&self, _intent: &WithdrawIntent) -> Result<PlannedCall> {
        Err(not_offered(self.protocol(), "withdrawals"))
    }

    fn add_liquidity(&self, _intent: &AddLiquidityIntent, _deadline: u64) -> Result<PlannedCall> {
        Err(not_offered(self.protocol(), "liquidity provision"))
    }

    /// LP token burned by a removal
    fn lp_token(&self, intent: &RemoveLiquidityIntent) -> Result<String> {
        intent
            .lp_token
            .clone()
            .ok_or_else(|| Error::invalid(format!("lp_token is required by {}", self.protocol())))
    }

    fn remove_liquidity(&self, _plan: &RemovalPlan<'_>) -> Result<PlannedCall> {
        Err(not_offered(self.protocol(), "liquidity removal"))
    }
}

/// One `(chain, protocol)` deployment
#[derive(Clone)]
pub struct RouteEntry {
    pub chain: ChainId,
    pub protocol: ProtocolId,
    pub kind: ProtocolKind,
    pub handler: Arc<dyn ProtocolHandler>,
    pub positions: Vec<PositionToken>,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("chain", &self.chain)
            .field("protocol", &self.protocol)
            .field("kind", &self.kind)
            .field("positions", &self.positions.len())
            .finish()
    }
}

/// Contract addresses of the standard deployments
pub mod contracts {
    pub const UNISWAP_V2_ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
    pub const SUSHISWAP_ROUTER_ETH: &str = "0xd9e1cE17f2641f24aE83637ab66a2cca9C378B9F";
    pub const AAVE_V2_POOL_ETH: &str = "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9";
    pub const COMPOUND_CUSDC: &str = "0x39AA39c021dfbaE8faC545936693aC917d5E7563";
    pub const COMPOUND_CDAI: &str = "0x5d3a536E4D6DbD6114cc1Ead35777bAB948E3643";

    pub const QUICKSWAP_ROUTER: &str = "0xa5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff";
    pub const SUSHISWAP_ROUTER_POLYGON: &str = "0x1b02dA8Cb0d097eB8D57A175b88c7D8b47997506";
    pub const AAVE_V2_POOL_POLYGON: &str = "0x8dFf5E27EA6b7AC08EbFdf9eB090F32ee9a30fcf";

    pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
    pub const ORCA_TOKEN_SWAP_V2: &str = "9W959DqEETiGZocYWCQPaJ6sBmUzgfxXfqGeTEdp3aQP";
}

/// Receipt tokens read by the positions path
mod position_tokens {
    use super::{PositionKind, PositionToken};
    use crate::tokens::addresses::*;

    pub const AAVE_ETH: &[PositionToken] = &[
        PositionToken {
            symbol: "aUSDC",
            token: "0xBcca60bB61934080951369a648Fb03DF4F96263C",
            kind: PositionKind::Lending,
            priced_as: Some(USDC_ETH),
        },
        PositionToken {
            symbol: "aDAI",
            token: "0x028171bCA77440897B824Ca71D1c56caC55b68A3",
            kind: PositionKind::Lending,
            priced_as: Some(DAI_ETH),
        },
        PositionToken {
            symbol: "aWETH",
            token: "0x030bA81f1c18d280636F32af80b9AAd02Cf0854e",
            kind: PositionKind::Lending,
            priced_as: Some(WETH_ETH),
        },
    ];

    // cToken balances accrue against an exchange rate, so they stay unpriced
    pub const COMPOUND_ETH: &[PositionToken] = &[
        PositionToken {
            symbol: "cUSDC",
            token: super::contracts::COMPOUND_CUSDC,
            kind: PositionKind::Lending,
            priced_as: None,
        },
        PositionToken {
            symbol: "cDAI",
            token: super::contracts::COMPOUND_CDAI,
            kind: PositionKind::Lending,
            priced_as: None,
        },
    ];

    pub const UNISWAP_ETH: &[PositionToken] = &[PositionToken {
        symbol: "UNI-V2 USDC/WETH",
        token: "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc",
        kind: PositionKind::Farming,
        priced_as: None,
    }];

    pub const SUSHISWAP_ETH: &[PositionToken] = &[PositionToken {
        symbol: "SLP USDC/WETH",
        token: "0x397FF1542f962076d0BFE58eA045FfA2d347ACa0",
        kind: PositionKind::Farming,
        priced_as: None,
    }];

    pub const AAVE_POLYGON: &[PositionToken] = &[PositionToken {
        symbol: "amUSDC",
        token: "0x1a13F4Ca1d028320A707D99520AbFefca3998b7F",
        kind: PositionKind::Lending,
        priced_as: Some(USDC_POLYGON),
    }];

    pub const QUICKSWAP_POLYGON: &[PositionToken] = &[PositionToken {
        symbol: "QLP USDC/WETH",
        token: "0x853Ee4b2A13f8a742d64C8F088bE7bA2131f670d",
        kind: PositionKind::Farming,
        priced_as: None,
    }];

    pub const SUSHISWAP_POLYGON: &[PositionToken] = &[PositionToken {
        symbol: "SLP USDC/WETH",
        token: "0x34965ba0ac2451A34a0471F04CCa3F990b8dea27",
        kind: PositionKind::Farming,
        priced_as: None,
    }];

    pub const RAYDIUM_SOLANA: &[PositionToken] = &[PositionToken {
        symbol: "RAY-LP SOL/USDC",
        token: "8HoQnePLqPj4M7PUDzfw8e3Ymdwgc7NLGnaTUapubyvu",
        kind: PositionKind::Farming,
        priced_as: None,
    }];

    pub const ORCA_SOLANA: &[PositionToken] = &[PositionToken {
        symbol: "ORCA-LP SOL/USDC",
        token: "APDFRM3HMr8CAGXwKHiu2f5ePSpaiEJhaURwhsRrUUt9",
        kind: PositionKind::Farming,
        priced_as: None,
    }];
}

/// Immutable `(chain, protocol)` routing table
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<(ChainId, ProtocolId), RouteEntry>,
}

impl RouteTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The deployments this gateway ships with
    pub fn standard() -> Self {
        use crate::tokens::addresses::{DAI_ETH, USDC_ETH};
        use contracts::*;
        use position_tokens::*;

        let mut table = Self::empty();

        // === Ethereum ===
        table.register(
            ChainId::Ethereum,
            ProtocolKind::Dex,
            Arc::new(V2Router::new(ProtocolId::Uniswap, UNISWAP_V2_ROUTER)),
            UNISWAP_ETH,
        );
        table.register(
            ChainId::Ethereum,
            ProtocolKind::Dex,
            Arc::new(V2Router::new(ProtocolId::Sushiswap, SUSHISWAP_ROUTER_ETH)),
            SUSHISWAP_ETH,
        );
        table.register(
            ChainId::Ethereum,
            ProtocolKind::Lending,
            Arc::new(AaveV2Pool::new(AAVE_V2_POOL_ETH)),
            AAVE_ETH,
        );
        table.register(
            ChainId::Ethereum,
            ProtocolKind::Lending,
            Arc::new(CompoundMarkets::new(vec![
                (USDC_ETH, COMPOUND_CUSDC),
                (DAI_ETH, COMPOUND_CDAI),
            ])),
            COMPOUND_ETH,
        );

        // === Polygon ===
        table.register(
            ChainId::Polygon,
            ProtocolKind::Dex,
            Arc::new(V2Router::new(ProtocolId::Quickswap, QUICKSWAP_ROUTER)),
            QUICKSWAP_POLYGON,
        );
        table.register(
            ChainId::Polygon,
            ProtocolKind::Dex,
            Arc::new(V2Router::new(ProtocolId::Sushiswap, SUSHISWAP_ROUTER_POLYGON)),
            SUSHISWAP_POLYGON,
        );
        table.register(
            ChainId::Polygon,
            ProtocolKind::Lending,
            Arc::new(AaveV2Pool::new(AAVE_V2_POOL_POLYGON)),
            AAVE_POLYGON,
        );

        // === Solana ===
        table.register(
            ChainId::Solana,
            ProtocolKind::Dex,
            Arc::new(SolanaAmm::new(ProtocolId::Raydium, RAYDIUM_AMM_V4)),
            RAYDIUM_SOLANA,
        );
        table.register(
            ChainId::Solana,
            ProtocolKind::Dex,
            Arc::new(SolanaAmm::new(ProtocolId::Orca, ORCA_TOKEN_SWAP_V2)),
            ORCA_SOLANA,
        );

        table
    }

    /// Add or replace a deployment
    pub fn register(
        &mut self,
        chain: ChainId,
        kind: ProtocolKind,
        handler: Arc<dyn ProtocolHandler>,
        positions: &[PositionToken],
    ) {
        let protocol = handler.protocol();
        self.routes.insert(
            (chain, protocol),
            RouteEntry {
                chain,
                protocol,
                kind,
                handler,
                positions: positions.to_vec(),
            },
        );
    }

    pub fn get(&self, chain: ChainId, protocol: ProtocolId) -> Option<&RouteEntry> {
        self.routes.get(&(chain, protocol))
    }

    /// Route for an operation, or `UnsupportedRoute`
    pub fn resolve(
        &self,
        chain: ChainId,
        protocol: ProtocolId,
        operation: &str,
    ) -> Result<&RouteEntry> {
        let entry = self.get(chain, protocol).ok_or_else(|| {
            Error::unsupported(format!("{} is not configured on {}", protocol, chain))
        })?;
        if !entry.kind.supports(operation) {
            return Err(Error::unsupported(format!(
                "{} on {} does not support {}",
                protocol, chain, operation
            )));
        }
        Ok(entry)
    }

    /// Exchange used when a swap names no protocol
    pub fn default_swap_protocol(&self, chain: ChainId) -> ProtocolId {
        match chain {
            ChainId::Ethereum => ProtocolId::Uniswap,
            ChainId::Polygon => ProtocolId::Quickswap,
            ChainId::Solana => ProtocolId::Raydium,
        }
    }

    /// Deployments on one chain, in protocol order
    pub fn entries_for_chain(&self, chain: ChainId) -> Vec<&RouteEntry> {
        let mut entries: Vec<&RouteEntry> = self
            .routes
            .values()
            .filter(|entry| entry.chain == chain)
            .collect();
        entries.sort_by_key(|entry| entry.protocol);
        entries
    }

    /// Protocol names per chain, as served by `defi.protocols`
    pub fn protocols_by_chain(&self) -> BTreeMap<ChainId, Vec<&'static str>> {
        let mut by_chain: BTreeMap<ChainId, Vec<&'static str>> = BTreeMap::new();
        for chain in ChainId::ALL {
            let names = self
                .entries_for_chain(chain)
                .into_iter()
                .map(|entry| entry.protocol.name())
                .collect();
            by_chain.insert(chain, names);
        }
        by_chain
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::is_address_for;

    #[test]
    fn test_standard_table_shape() {
        let table = RouteTable::standard();
        assert_eq!(table.len(), 9);

        let protocols = table.protocols_by_chain();
        assert_eq!(
            protocols[&ChainId::Ethereum],
            vec!["uniswap", "sushiswap", "aave", "compound"]
        );
        assert_eq!(protocols[&ChainId::Polygon], vec!["sushiswap", "quickswap", "aave"]);
        assert_eq!(protocols[&ChainId::Solana], vec!["raydium", "orca"]);
    }

    #[test]
    fn test_compound_is_not_on_polygon() {
        let table = RouteTable::standard();
        let err = table
            .resolve(ChainId::Polygon, ProtocolId::Compound, "lend")
            .unwrap_err();
        assert_eq!(err.kind(), "UnsupportedRoute");
    }

    #[test]
    fn test_operation_must_match_kind() {
        let table = RouteTable::standard();
        assert!(table.resolve(ChainId::Ethereum, ProtocolId::Aave, "lend").is_ok());
        assert!(table.resolve(ChainId::Ethereum, ProtocolId::Uniswap, "swap").is_ok());

        let err = table
            .resolve(ChainId::Ethereum, ProtocolId::Aave, "swap")
            .unwrap_err();
        assert_eq!(err.kind(), "UnsupportedRoute");

        let err = table
            .resolve(ChainId::Solana, ProtocolId::Raydium, "lend")
            .unwrap_err();
        assert_eq!(err.kind(), "UnsupportedRoute");
    }

    #[test]
    fn test_default_swap_protocols_are_routable() {
        let table = RouteTable::standard();
        for chain in ChainId::ALL {
            let protocol = table.default_swap_protocol(chain);
            assert!(table.resolve(chain, protocol, "swap").is_ok(), "{}", chain);
        }
    }

    #[test]
    fn test_position_tokens_are_addresses_on_their_chain() {
        let table = RouteTable::standard();
        for chain in ChainId::ALL {
            for entry in table.entries_for_chain(chain) {
                for position in &entry.positions {
                    assert!(
                        is_address_for(chain, position.token),
                        "{} {}",
                        chain,
                        position.symbol
                    );
                    if let Some(asset) = position.priced_as {
                        assert!(is_address_for(chain, asset));
                    }
                }
            }
        }
    }

    #[test]
    fn test_contract_addresses_are_well_formed() {
        use contracts::*;
        for evm in [
            UNISWAP_V2_ROUTER,
            SUSHISWAP_ROUTER_ETH,
            AAVE_V2_POOL_ETH,
            COMPOUND_CUSDC,
            COMPOUND_CDAI,
            QUICKSWAP_ROUTER,
            SUSHISWAP_ROUTER_POLYGON,
            AAVE_V2_POOL_POLYGON,
        ] {
            assert!(is_address_for(ChainId::Ethereum, evm), "{}", evm);
        }
        for program in [RAYDIUM_AMM_V4, ORCA_TOKEN_SWAP_V2] {
            assert!(is_address_for(ChainId::Solana, program), "{}", program);
        }
    }
}
