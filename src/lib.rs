//! DeFi Intent Gateway
//!
//! Executes chain-agnostic DeFi intents (swap, lend, withdraw, add and
//! remove liquidity) against EVM chains and Solana, and reads portfolios and
//! protocol positions, behind a JSON-RPC 2.0 gateway.
//!
//! # Layers
//!
//! - [`gateway`] frames JSON-RPC requests, batches and error codes
//! - [`dispatcher`] routes an [`intent::Intent`] through the protocol table
//!   to a chain adapter, recording every outcome to a [`sink::ResultSink`]
//! - [`chains`] hides EVM and Solana execution models behind one contract
//! - [`portfolio`] aggregates balances, positions and prices
//!
//! Private keys never leave the [`wallet`] signing service.

pub mod chains;
pub mod config;
pub mod dispatcher;
pub mod gateway;
pub mod intent;
pub mod portfolio;
pub mod prices;
pub mod protocols;
pub mod quotes;
pub mod services;
pub mod sink;
pub mod tokens;
pub mod units;
pub mod validation;
pub mod wallet;

mod error;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{ChainId, Config, ProtocolId, RpcConfig};
pub use dispatcher::{Dispatcher, ExecutionResult};
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use services::Services;
