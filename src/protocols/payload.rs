//! Chain-agnostic protocol calls
//!
//! Protocol handlers describe *what* to call in human units. Chain adapters
//! turn a [`CallPayload`] into ABI calldata or a Solana instruction, scaling
//! amounts with decimals read from chain.

use crate::config::ProtocolId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Amount requested from a lending withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawAmount {
    Exact(Decimal),
    /// Entire supplied balance
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ContractCall {
    /// Exact-input swap along a single pool or router path
    Swap {
        token_in: String,
        token_out: String,
        amount_in: Decimal,
        min_amount_out: Decimal,
        recipient: String,
        deadline: u64,
        /// Pool account chosen by the aggregator, when it names one
        pool: Option<String>,
    },
    /// Supply `asset` to a pooled lending market
    LendingDeposit {
        asset: String,
        amount: Decimal,
        on_behalf_of: String,
    },
    /// Withdraw `asset` from a pooled lending market
    LendingWithdraw {
        asset: String,
        amount: WithdrawAmount,
        to: String,
    },
    /// Mint market tokens against `asset` (target is the market token)
    MarketMint { asset: String, amount: Decimal },
    /// Redeem an exact `asset` amount from a market token
    MarketRedeem { asset: String, amount: Decimal },
    AddLiquidity {
        pool: String,
        token_a: String,
        token_b: String,
        amount_a: Decimal,
        amount_b: Decimal,
        min_a: Decimal,
        min_b: Decimal,
        recipient: String,
        deadline: u64,
    },
    RemoveLiquidity {
        pool: String,
        lp_token: String,
        token_a: String,
        token_b: String,
        liquidity: Decimal,
        min_a: Decimal,
        min_b: Decimal,
        recipient: String,
        deadline: u64,
    },
}

impl ContractCall {
    pub fn name(&self) -> &'static str {
        match self {
            ContractCall::Swap { .. } => "swap",
            ContractCall::LendingDeposit { .. } => "lending_deposit",
            ContractCall::LendingWithdraw { .. } => "lending_withdraw",
            ContractCall::MarketMint { .. } => "market_mint",
            ContractCall::MarketRedeem { .. } => "market_redeem",
            ContractCall::AddLiquidity { .. } => "add_liquidity",
            ContractCall::RemoveLiquidity { .. } => "remove_liquidity",
        }
    }

    /// Amounts the call spends or redeems, which must be exact in base units
    pub fn exact_amounts(&self) -> Vec<(&str, Decimal)> {
        match self {
            ContractCall::Swap { token_in, amount_in, .. } => vec![(token_in.as_str(), *amount_in)],
            ContractCall::LendingDeposit { asset, amount, .. }
            | ContractCall::MarketMint { asset, amount }
            | ContractCall::MarketRedeem { asset, amount } => vec![(asset.as_str(), *amount)],
            ContractCall::LendingWithdraw { asset, amount, .. } => match amount {
                WithdrawAmount::Exact(value) => vec![(asset.as_str(), *value)],
                WithdrawAmount::Max => vec![],
            },
            ContractCall::AddLiquidity {
                token_a,
                token_b,
                amount_a,
                amount_b,
                ..
            } => vec![(token_a.as_str(), *amount_a), (token_b.as_str(), *amount_b)],
            ContractCall::RemoveLiquidity { lp_token, liquidity, .. } => {
                vec![(lp_token.as_str(), *liquidity)]
            }
        }
    }

    /// Minimum output the call will accept, for swaps
    pub fn min_amount_out(&self) -> Option<Decimal> {
        match self {
            ContractCall::Swap { min_amount_out, .. } => Some(*min_amount_out),
            _ => None,
        }
    }
}

/// A protocol call tagged with the protocol that defines its encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallPayload {
    pub protocol: ProtocolId,
    #[serde(flatten)]
    pub call: ContractCall,
}

impl CallPayload {
    pub fn new(protocol: ProtocolId, call: ContractCall) -> Self {
        Self { protocol, call }
    }
}
