//! Constant-product AMM programs on Solana (Raydium, Orca)
//!
//! Swaps execute against the pool the aggregator routed through, so the
//! quote's route must name one.

use super::{CallPayload, ContractCall, PlannedCall, ProtocolHandler, RemovalPlan, SwapPlan};
use crate::config::ProtocolId;
use crate::intent::AddLiquidityIntent;
use crate::quotes::QuoteError;
use crate::units::apply_slippage;
use crate::{Error, Result};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct SolanaAmm {
    protocol: ProtocolId,
    program: &'static str,
}

impl SolanaAmm {
    pub fn new(protocol: ProtocolId, program: &'static str) -> Self {
        Self { protocol, program }
    }
}

/// Pool account of the first hop in an aggregator route
pub fn route_pool(route: &Value) -> Option<&str> {
    route
        .get("routePlan")?
        .as_array()?
        .first()?
        .get("swapInfo")?
        .get("ammKey")?
        .as_str()
}

impl ProtocolHandler for SolanaAmm {
    fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    fn swap(&self, plan: &SwapPlan<'_>) -> Result<PlannedCall> {
        let pool = route_pool(&plan.quote.route).ok_or_else(|| {
            Error::QuoteUnavailable(QuoteError::NoRoute(format!(
                "quote for {} names no pool",
                self.protocol
            )))
        })?;

        let intent = plan.intent;
        let call = ContractCall::Swap {
            token_in: intent.token_in.clone(),
            token_out: intent.token_out.clone(),
            amount_in: intent.amount_in,
            min_amount_out: plan.min_amount_out,
            recipient: intent.wallet.clone(),
            deadline: plan.deadline,
            pool: Some(pool.to_string()),
        };
        Ok(PlannedCall::new(self.program, CallPayload::new(self.protocol, call)))
    }

    fn add_liquidity(&self, intent: &AddLiquidityIntent, deadline: u64) -> Result<PlannedCall> {
        let call = ContractCall::AddLiquidity {
            pool: intent.pool_id.clone(),
            token_a: intent.token_a.clone(),
            token_b: intent.token_b.clone(),
            amount_a: intent.amount_a,
            amount_b: intent.amount_b,
            min_a: apply_slippage(intent.amount_a, intent.slippage),
            min_b: apply_slippage(intent.amount_b, intent.slippage),
            recipient: intent.wallet.clone(),
            deadline,
        };
        Ok(PlannedCall::new(self.program, CallPayload::new(self.protocol, call)))
    }

    // The LP mint is its own account, so `lp_token` keeps the required default
    fn remove_liquidity(&self, plan: &RemovalPlan<'_>) -> Result<PlannedCall> {
        let intent = plan.intent;
        let call = ContractCall::RemoveLiquidity {
            pool: intent.pool_id.clone(),
            lp_token: plan.lp_token.to_string(),
            token_a: intent.token_a.clone(),
            token_b: intent.token_b.clone(),
            liquidity: intent.liquidity,
            min_a: plan.min_a,
            min_b: plan.min_b,
            recipient: intent.wallet.clone(),
            deadline: plan.deadline,
        };
        Ok(PlannedCall::new(self.program, CallPayload::new(self.protocol, call)))
    }
}
