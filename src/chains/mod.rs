//! Chain adapters
//!
//! One adapter per chain family implements the same read/build/submit/poll
//! contract. ABI encoding (EVM) and instruction encoding (Solana) stay inside
//! the implementations; callers only ever see [`CallPayload`].
//!
//! Adapters are long-lived and shared behind `Arc` by every concurrent call.
//! Implementations hold connection pools, never per-request state.

pub mod evm;
pub mod solana;

use crate::config::{ChainId, ProtocolId};
use crate::protocols::CallPayload;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use evm::EvmAdapter;
pub use solana::SolanaAdapter;

/// Errors raised by chain adapters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("chain unreachable: {0}")]
    Unreachable(String),

    #[error("chain read timed out after {0:?}")]
    Timeout(Duration),

    #[error("token metadata unavailable: {0}")]
    TokenMetadata(String),

    #[error("no signer for {0}")]
    Signing(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("call not supported on this chain: {0}")]
    UnsupportedCall(String),

    #[error("amount out of range: {0}")]
    Amount(String),
}

impl From<crate::units::UnitsError> for ChainError {
    fn from(err: crate::units::UnitsError) -> Self {
        ChainError::Amount(err.to_string())
    }
}

/// Bound a chain read so a stalled node surfaces as an error
pub(crate) async fn with_read_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ChainError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ChainError::Timeout(limit))?
}

/// Fee estimate for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeEstimate {
    /// Gas limit (EVM) or signature count (Solana)
    pub units: u64,
    /// Price per unit in the chain's smallest denomination (wei, lamports)
    pub unit_price: u128,
    /// Total fee in native token units
    pub total_native: Decimal,
    /// True when estimation failed and the conservative default was used
    pub is_default: bool,
}

/// Token reserves of a liquidity pool and the supply of its LP token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReserves {
    pub reserve_a: Decimal,
    pub reserve_b: Decimal,
    pub lp_supply: Decimal,
}

impl PoolReserves {
    /// Underlying amounts redeemed by burning `liquidity` LP tokens
    ///
    /// `None` when the pool is empty or `liquidity` exceeds the LP supply.
    pub fn share(&self, liquidity: Decimal) -> Option<(Decimal, Decimal)> {
        if self.lp_supply.is_zero() || liquidity > self.lp_supply {
            return None;
        }
        let fraction = liquidity.checked_div(self.lp_supply)?;
        Some((
            self.reserve_a.checked_mul(fraction)?,
            self.reserve_b.checked_mul(fraction)?,
        ))
    }
}

/// Chain-native transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxReference(String);

impl TxReference {
    /// Validate `value` as a transaction reference on `chain`
    pub fn parse(chain: ChainId, value: &str) -> Result<Self, ChainError> {
        crate::validation::require_tx_reference(chain, value)
            .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
        Ok(Self(value.to_string()))
    }

    pub(crate) fn new_unchecked(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Pending,
    Confirmed,
    Failed,
    NotFound,
    Unknown,
}

/// Result of one status poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub tx_hash: String,
    pub blockchain: ChainId,
    pub status: TxState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionStatus {
    pub fn new(reference: &TxReference, chain: ChainId, status: TxState) -> Self {
        Self {
            tx_hash: reference.to_string(),
            blockchain: chain,
            status,
            confirmations: None,
            block_number: None,
            slot: None,
            gas_used: None,
            error: None,
        }
    }
}

/// Uniform contract over every supported chain
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> ChainId;

    /// Native balance in human units
    ///
    /// A successful node response is authoritative, so `0` is only returned
    /// when the node reports zero. Transport failures are errors, never `0`.
    async fn get_native_balance(&self, address: &str) -> Result<Decimal, ChainError>;

    /// Token balance scaled by the token's own decimals
    async fn get_token_balance(&self, address: &str, token: &str) -> Result<Decimal, ChainError>;

    /// Decimals read from the token's on-chain metadata
    async fn token_decimals(&self, token: &str) -> Result<u8, ChainError>;

    /// Best-effort fee estimate; falls back to a documented default
    async fn estimate_fee(&self, from: &str, target: &str, payload: &CallPayload) -> FeeEstimate;

    /// Encode, sign through the signing service, and submit
    async fn build_and_submit(
        &self,
        from: &str,
        target: &str,
        payload: &CallPayload,
        value: Decimal,
        fee_hint: Option<&FeeEstimate>,
    ) -> Result<TxReference, ChainError>;

    /// Reserves of `token_a` and `token_b` held by `pool`, plus the LP supply
    async fn pool_reserves(
        &self,
        protocol: ProtocolId,
        pool: &str,
        lp_token: &str,
        token_a: &str,
        token_b: &str,
    ) -> Result<PoolReserves, ChainError>;

    /// Single-shot status lookup
    async fn poll_status(&self, reference: &TxReference) -> Result<TransactionStatus, ChainError>;

    /// Current block number (EVM) or slot (Solana)
    async fn block_height(&self) -> Result<u64, ChainError>;
}

/// Adapters indexed by chain, built once at startup
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.insert(adapter);
        self
    }

    pub fn insert(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn get(&self, chain: ChainId) -> Option<&Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain)
    }

    /// Adapter for `chain`, or `UnsupportedRoute` when none is registered
    pub fn require(&self, chain: ChainId) -> crate::Result<&Arc<dyn ChainAdapter>> {
        self.get(chain)
            .ok_or_else(|| crate::Error::unsupported(format!("no adapter configured for {}", chain)))
    }

    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.adapters.keys().copied().collect();
        chains.sort();
        chains
    }
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterSet")
            .field("chains", &self.chains())
            .finish()
    }
}
