//! Uniswap V2 style routers
//!
//! Uniswap, SushiSwap and QuickSwap share the V2 router interface, so one
//! handler serves all three with a different router address.

use super::{CallPayload, ContractCall, PlannedCall, ProtocolHandler, RemovalPlan, SwapPlan};
use crate::config::ProtocolId;
use crate::intent::{AddLiquidityIntent, RemoveLiquidityIntent};
use crate::units::apply_slippage;
use crate::Result;

#[derive(Debug, Clone)]
pub struct V2Router {
    protocol: ProtocolId,
    router: &'static str,
}

impl V2Router {
    pub fn new(protocol: ProtocolId, router: &'static str) -> Self {
        Self { protocol, router }
    }
}

impl ProtocolHandler for V2Router {
    fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    fn swap(&self, plan: &SwapPlan<'_>) -> Result<PlannedCall> {
        let intent = plan.intent;
        let call = ContractCall::Swap {
            token_in: intent.token_in.clone(),
            token_out: intent.token_out.clone(),
            amount_in: intent.amount_in,
            min_amount_out: plan.min_amount_out,
            recipient: intent.wallet.clone(),
            deadline: plan.deadline,
            pool: None,
        };
        Ok(PlannedCall::new(self.router, CallPayload::new(self.protocol, call)))
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
        Ok(PlannedCall::new(self.router, CallPayload::new(self.protocol, call)))
    }

    fn lp_token(&self, intent: &RemoveLiquidityIntent) -> Result<String> {
        // The pair contract is its own LP token
        Ok(intent
            .lp_token
            .clone()
            .unwrap_or_else(|| intent.pool_id.clone()))
    }

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
        Ok(PlannedCall::new(self.router, CallPayload::new(self.protocol, call)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainId;
    use crate::intent::SwapIntent;
    use crate::protocols::contracts::UNISWAP_V2_ROUTER;
    use crate::quotes::Quote;
    use rust_decimal_macros::dec;

    const WALLET: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    const PAIR: &str = "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc";

    #[test]
    fn test_swap_targets_router_with_min_out() {
        let router = V2Router::new(ProtocolId::Uniswap, UNISWAP_V2_ROUTER);
        let intent = SwapIntent {
            chain: ChainId::Ethereum,
            protocol: Some(ProtocolId::Uniswap),
            wallet: WALLET.into(),
            token_in: USDC.into(),
            token_out: WETH.into(),
            amount_in: dec!(1000),
            slippage: dec!(1),
        };
        let quote = Quote::fixture(ChainId::Ethereum, ProtocolId::Uniswap, dec!(1000), dec!(0.3));

        let planned = router
            .swap(&SwapPlan {
                intent: &intent,
                quote: &quote,
                min_amount_out: dec!(0.297),
                deadline: 1_700_000_000,
            })
            .unwrap();

        assert_eq!(planned.target, UNISWAP_V2_ROUTER);
        assert_eq!(planned.payload.protocol, ProtocolId::Uniswap);
        assert_eq!(planned.payload.call.min_amount_out(), Some(dec!(0.297)));
    }

    #[test]
    fn test_add_liquidity_minimums() {
        let router = V2Router::new(ProtocolId::Quickswap, "0xa5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff");
        let intent = AddLiquidityIntent {
            chain: ChainId::Polygon,
            protocol: ProtocolId::Quickswap,
            wallet: WALLET.into(),
            pool_id: PAIR.into(),
            token_a: USDC.into(),
            token_b: WETH.into(),
            amount_a: dec!(1000),
            amount_b: dec!(0.4),
            slippage: dec!(5),
        };

        let planned = router.add_liquidity(&intent, 42).unwrap();
        match planned.payload.call {
            ContractCall::AddLiquidity { min_a, min_b, deadline, .. } => {
                assert_eq!(min_a, dec!(950));
                assert_eq!(min_b, dec!(0.38));
                assert_eq!(deadline, 42);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_remove_liquidity_defaults_lp_token_to_pair() {
        let router = V2Router::new(ProtocolId::Uniswap, UNISWAP_V2_ROUTER);
        let intent = RemoveLiquidityIntent {
            chain: ChainId::Ethereum,
            protocol: ProtocolId::Uniswap,
            wallet: WALLET.into(),
            pool_id: PAIR.into(),
            lp_token: None,
            token_a: USDC.into(),
            token_b: WETH.into(),
            liquidity: dec!(1.5),
            slippage: dec!(5),
        };

        let lp_token = router.lp_token(&intent).unwrap();
        assert_eq!(lp_token, PAIR);

        let planned = router
            .remove_liquidity(&RemovalPlan {
                intent: &intent,
                lp_token: &lp_token,
                min_a: dec!(950),
                min_b: dec!(0.38),
                deadline: 7,
            })
            .unwrap();
        match planned.payload.call {
            ContractCall::RemoveLiquidity { lp_token, liquidity, min_a, min_b, deadline, .. } => {
                assert_eq!(lp_token, PAIR);
                assert_eq!(liquidity, dec!(1.5));
                assert_eq!(min_a, dec!(950));
                assert_eq!(min_b, dec!(0.38));
                assert_eq!(deadline, 7);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_router_does_not_lend() {
        let router = V2Router::new(ProtocolId::Uniswap, UNISWAP_V2_ROUTER);
        let intent = crate::intent::LendIntent {
            chain: ChainId::Ethereum,
            protocol: ProtocolId::Uniswap,
            wallet: WALLET.into(),
            token: USDC.into(),
            amount: dec!(1),
        };
        assert_eq!(router.deposit(&intent).unwrap_err().kind(), "UnsupportedRoute");
    }
}
