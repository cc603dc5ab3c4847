mod common;

use common::*;
use defi_intent_gateway::chains::{AdapterSet, ChainError};
use defi_intent_gateway::dispatcher::Dispatcher;
use defi_intent_gateway::config::{ChainId, ProtocolId};
use defi_intent_gateway::intent::{
    Intent, LendIntent, RemoveLiquidityIntent, SwapIntent, WithdrawIntent,
};
use defi_intent_gateway::protocols::{ContractCall, ProtocolKind, RouteTable, WithdrawAmount};
use defi_intent_gateway::quotes::QuoteError;
use defi_intent_gateway::sink::JsonlResultSink;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

const RAYDIUM_POOL: &str = "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2";
const WMATIC: &str = "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270";

const ALL_PROTOCOLS: [ProtocolId; 7] = [
    ProtocolId::Uniswap,
    ProtocolId::Sushiswap,
    ProtocolId::Quickswap,
    ProtocolId::Aave,
    ProtocolId::Compound,
    ProtocolId::Raydium,
    ProtocolId::Orca,
];

/// (wallet, token_in, token_out) valid on `chain`
fn fixtures(chain: ChainId) -> (&'static str, &'static str, &'static str) {
    match chain {
        ChainId::Ethereum => (WALLET, USDC, WETH),
        ChainId::Polygon => (WALLET, USDC_POLYGON, WMATIC),
        ChainId::Solana => (SOL_WALLET, WSOL, USDC_SOLANA),
    }
}

fn swap(chain: ChainId, protocol: Option<ProtocolId>, slippage: Decimal) -> Intent {
    let (wallet, token_in, token_out) = fixtures(chain);
    Intent::Swap(SwapIntent {
        chain,
        protocol,
        wallet: wallet.to_string(),
        token_in: token_in.to_string(),
        token_out: token_out.to_string(),
        amount_in: dec!(1.0),
        slippage,
    })
}

fn lend(chain: ChainId, protocol: ProtocolId) -> Intent {
    let (wallet, token, _) = fixtures(chain);
    Intent::Lend(LendIntent {
        chain,
        protocol,
        wallet: wallet.to_string(),
        token: token.to_string(),
        amount: dec!(250),
    })
}

fn all_chains() -> (Harness, Vec<Arc<MockAdapter>>) {
    let adapters: Vec<Arc<MockAdapter>> = ChainId::ALL
        .iter()
        .map(|chain| Arc::new(MockAdapter::new(*chain)))
        .collect();
    let harness = Harness::new(
        adapters.clone(),
        ScriptedQuotes::returning(Decimal::ONE_HUNDRED).with_pool(RAYDIUM_POOL),
        CountingPriceFeed::new(),
    );
    (harness, adapters)
}

#[tokio::test]
async fn test_uniswap_swap_applies_slippage_to_quote() {
    let (harness, eth, _) = Harness::evm();

    let result = harness
        .dispatcher
        .execute(swap(ChainId::Ethereum, Some(ProtocolId::Uniswap), dec!(0.5)), None)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert!(result.error.is_none());
    assert!(is_evm_tx_hash(result.tx_reference.as_deref().unwrap()));
    assert_eq!(result.metadata.min_amount_out, Some(dec!(99.5)));

    let submitted = eth.submitted();
    assert_eq!(submitted.len(), 1);
    let (target, payload, value) = &submitted[0];
    assert_eq!(target.to_lowercase(), "0x7a250d5630b4cf539739df2c5dacb4c659f2488d");
    assert_eq!(payload.call.min_amount_out(), Some(dec!(99.5)));
    assert_eq!(*value, Decimal::ZERO);

    let requests = harness.quotes.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].protocol, ProtocolId::Uniswap);
    assert_eq!(requests[0].decimals_in, 18);
}

#[tokio::test]
async fn test_swap_without_protocol_uses_chain_default() {
    let (harness, _, polygon) = Harness::evm();

    let result = harness
        .dispatcher
        .execute(swap(ChainId::Polygon, None, dec!(1)), None)
        .await;

    assert!(result.success);
    assert_eq!(result.protocol, Some(ProtocolId::Quickswap));
    assert_eq!(polygon.submitted().len(), 1);
}

#[tokio::test]
async fn test_min_out_never_rises_with_slippage() {
    let (harness, _, _) = Harness::evm();

    let mut previous: Option<Decimal> = None;
    for slippage in [dec!(0), dec!(0.1), dec!(0.5), dec!(1), dec!(3), dec!(10), dec!(50)] {
        let result = harness
            .dispatcher
            .execute(swap(ChainId::Ethereum, Some(ProtocolId::Uniswap), slippage), None)
            .await;
        let min_out = result.metadata.min_amount_out.unwrap();

        assert_eq!(min_out, Decimal::ONE_HUNDRED * (Decimal::ONE - slippage / Decimal::ONE_HUNDRED));
        if let Some(prev) = previous {
            assert!(min_out <= prev, "{} rose above {}", min_out, prev);
        }
        previous = Some(min_out);
    }
}

#[tokio::test]
async fn test_every_configured_route_reaches_submission() {
    let (harness, adapters) = all_chains();
    let routes = RouteTable::standard();

    let mut dispatched = 0;
    for chain in ChainId::ALL {
        for entry in routes.entries_for_chain(chain) {
            let intent = match entry.kind {
                ProtocolKind::Dex => swap(chain, Some(entry.protocol), dec!(0.5)),
                ProtocolKind::Lending => lend(chain, entry.protocol),
            };
            let result = harness.dispatcher.execute(intent, None).await;
            assert!(
                result.success,
                "{} on {}: {:?}",
                entry.protocol,
                chain,
                result.error
            );
            assert!(result.metadata.call.is_some());
            dispatched += 1;
        }
    }

    let submitted: usize = adapters.iter().map(|a| a.submitted().len()).sum();
    assert_eq!(submitted, dispatched);
    assert_eq!(dispatched, routes.len());
}

#[tokio::test]
async fn test_unsupported_pairs_never_touch_quotes_or_chain() {
    let (harness, adapters) = all_chains();
    let routes = RouteTable::standard();

    let mut rejected = 0;
    for chain in ChainId::ALL {
        for protocol in ALL_PROTOCOLS {
            for (operation, intent) in [
                ("swap", swap(chain, Some(protocol), dec!(0.5))),
                ("lend", lend(chain, protocol)),
            ] {
                if routes.resolve(chain, protocol, operation).is_ok() {
                    continue;
                }
                let result = harness.dispatcher.execute(intent, None).await;
                assert!(!result.success);
                assert_eq!(result.error.as_ref().unwrap().kind, "UnsupportedRoute");
                rejected += 1;
            }
        }
    }

    assert!(rejected > 0);
    assert_eq!(harness.quotes.calls(), 0);
    for adapter in adapters {
        assert_eq!(adapter.calls(), 0);
    }
}

#[tokio::test]
async fn test_compound_on_polygon_is_unsupported() {
    let (harness, eth, polygon) = Harness::evm();

    let result = harness
        .dispatcher
        .execute(lend(ChainId::Polygon, ProtocolId::Compound), None)
        .await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, "UnsupportedRoute");
    assert_eq!(polygon.calls(), 0);
    assert_eq!(eth.calls(), 0);
}

#[tokio::test]
async fn test_compound_market_must_exist() {
    let (harness, eth, _) = Harness::evm();

    let intent = Intent::Lend(LendIntent {
        chain: ChainId::Ethereum,
        protocol: ProtocolId::Compound,
        wallet: WALLET.to_string(),
        token: WETH.to_string(),
        amount: dec!(1),
    });
    let result = harness.dispatcher.execute(intent, None).await;

    assert_eq!(result.error.unwrap().kind, "UnsupportedRoute");
    assert_eq!(eth.calls(), 0);
}

#[tokio::test]
async fn test_aave_withdraw_max() {
    let (harness, eth, _) = Harness::evm();

    let intent = Intent::Withdraw(WithdrawIntent {
        chain: ChainId::Ethereum,
        protocol: ProtocolId::Aave,
        wallet: WALLET.to_string(),
        token: DAI.to_string(),
        amount: WithdrawAmount::Max,
    });
    let result = harness.dispatcher.execute(intent, None).await;
    assert!(result.success);

    let submitted = eth.submitted();
    match &submitted[0].1.call {
        ContractCall::LendingWithdraw { amount, to, .. } => {
            assert_eq!(*amount, WithdrawAmount::Max);
            assert_eq!(to, WALLET);
        }
        other => panic!("unexpected call {:?}", other),
    }
}

fn remove_liquidity(liquidity: Decimal, slippage: Decimal) -> Intent {
    Intent::RemoveLiquidity(RemoveLiquidityIntent {
        chain: ChainId::Ethereum,
        protocol: ProtocolId::Uniswap,
        wallet: WALLET.to_string(),
        pool_id: PAIR.to_string(),
        lp_token: None,
        token_a: USDC.to_string(),
        token_b: WETH.to_string(),
        liquidity,
        slippage,
    })
}

fn harness_with(eth: MockAdapter) -> (Harness, Arc<MockAdapter>) {
    let eth = Arc::new(eth);
    let harness = Harness::new(
        vec![eth.clone()],
        ScriptedQuotes::returning(dec!(100)),
        CountingPriceFeed::new(),
    );
    (harness, eth)
}

#[tokio::test]
async fn test_remove_liquidity_minimums_follow_pool_share_and_slippage() {
    let (harness, eth) = harness_with(
        MockAdapter::new(ChainId::Ethereum).with_pool_reserves(dec!(2000), dec!(1), dec!(40)),
    );

    let result = harness
        .dispatcher
        .execute(remove_liquidity(dec!(10), dec!(0.1)), None)
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.amounts_out[0].amount, dec!(500));
    assert_eq!(result.amounts_out[1].amount, dec!(0.25));

    let submitted = eth.submitted();
    match &submitted[0].1.call {
        ContractCall::RemoveLiquidity {
            lp_token,
            liquidity,
            min_a,
            min_b,
            ..
        } => {
            assert_eq!(lp_token, PAIR);
            assert_eq!(*liquidity, dec!(10));
            assert_eq!(*min_a, dec!(499.5));
            assert_eq!(*min_b, dec!(0.24975));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_remove_liquidity_minimums_fall_as_slippage_rises() {
    let (harness, eth) = harness_with(
        MockAdapter::new(ChainId::Ethereum).with_pool_reserves(dec!(2000), dec!(1), dec!(40)),
    );

    for slippage in [dec!(0), dec!(1), dec!(10)] {
        let result = harness
            .dispatcher
            .execute(remove_liquidity(dec!(10), slippage), None)
            .await;
        assert!(result.success, "{:?}", result.error);
    }

    let minimums: Vec<(Decimal, Decimal)> = eth
        .submitted()
        .iter()
        .map(|(_, payload, _)| match &payload.call {
            ContractCall::RemoveLiquidity { min_a, min_b, .. } => (*min_a, *min_b),
            other => panic!("unexpected call {:?}", other),
        })
        .collect();
    assert_eq!(
        minimums,
        vec![
            (dec!(500), dec!(0.25)),
            (dec!(495), dec!(0.2475)),
            (dec!(450), dec!(0.225)),
        ]
    );
}

#[tokio::test]
async fn test_remove_liquidity_beyond_supply_is_rejected() {
    let (harness, eth) = harness_with(
        MockAdapter::new(ChainId::Ethereum).with_pool_reserves(dec!(2000), dec!(1), dec!(40)),
    );

    let result = harness
        .dispatcher
        .execute(remove_liquidity(dec!(41), dec!(0.5)), None)
        .await;

    assert_eq!(result.error.unwrap().kind, "InvalidParameter");
    assert!(eth.submitted().is_empty());
}

#[tokio::test]
async fn test_remove_liquidity_without_pool_state_is_not_submitted() {
    let (harness, eth) = harness_with(MockAdapter::new(ChainId::Ethereum));

    let result = harness
        .dispatcher
        .execute(remove_liquidity(dec!(1), dec!(0.5)), None)
        .await;

    assert!(!result.success);
    assert!(eth.submitted().is_empty());
}

#[tokio::test]
async fn test_sub_atomic_deposit_is_rejected_before_submission() {
    let (harness, eth) = harness_with(MockAdapter::new(ChainId::Ethereum).with_decimals(USDC, 6));

    let intent = Intent::Lend(LendIntent {
        chain: ChainId::Ethereum,
        protocol: ProtocolId::Aave,
        wallet: WALLET.to_string(),
        token: USDC.to_string(),
        amount: dec!(0.0000001),
    });
    let result = harness.dispatcher.execute(intent, None).await;

    let error = result.error.unwrap();
    assert_eq!(error.kind, "InvalidParameter");
    assert!(error.message.contains("6 decimals"), "{}", error.message);
    assert!(result.tx_reference.is_none());
    assert!(result.metadata.fee.is_none());
    assert!(eth.submitted().is_empty());
    assert_eq!(harness.sink.results().len(), 1);
}

#[tokio::test]
async fn test_deposit_at_token_precision_is_submitted() {
    let (harness, eth) = harness_with(MockAdapter::new(ChainId::Ethereum).with_decimals(USDC, 6));

    let intent = Intent::Lend(LendIntent {
        chain: ChainId::Ethereum,
        protocol: ProtocolId::Aave,
        wallet: WALLET.to_string(),
        token: USDC.to_string(),
        amount: dec!(0.000001),
    });
    let result = harness.dispatcher.execute(intent, None).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(eth.submitted().len(), 1);
}

#[tokio::test]
async fn test_over_precise_swap_is_rejected_before_quoting() {
    let (harness, eth) = harness_with(MockAdapter::new(ChainId::Ethereum).with_decimals(USDC, 6));

    let intent = Intent::Swap(SwapIntent {
        chain: ChainId::Ethereum,
        protocol: Some(ProtocolId::Uniswap),
        wallet: WALLET.to_string(),
        token_in: USDC.to_string(),
        token_out: WETH.to_string(),
        amount_in: dec!(1.0000005),
        slippage: dec!(0.5),
    });
    let result = harness.dispatcher.execute(intent, None).await;

    assert_eq!(result.error.unwrap().kind, "InvalidParameter");
    assert_eq!(harness.quotes.calls(), 0);
    assert!(eth.submitted().is_empty());
}

#[tokio::test]
async fn test_quote_failure_stops_before_build() {
    let eth = Arc::new(MockAdapter::new(ChainId::Ethereum));
    let harness = Harness::new(
        vec![eth.clone()],
        ScriptedQuotes::failing(QuoteError::NoRoute("no pool for pair".into())),
        CountingPriceFeed::new(),
    );

    let result = harness
        .dispatcher
        .execute(swap(ChainId::Ethereum, None, dec!(0.5)), None)
        .await;

    let error = result.error.unwrap();
    assert_eq!(error.kind, "QuoteUnavailable");
    assert_eq!(error.reason, Some("NoRoute"));
    assert!(result.tx_reference.is_none());
    assert!(eth.submitted().is_empty());
}

#[tokio::test]
async fn test_node_rejection_is_submission_rejected() {
    let eth = Arc::new(MockAdapter::new(ChainId::Ethereum).rejecting("nonce too low"));
    let harness = Harness::new(
        vec![eth],
        ScriptedQuotes::returning(dec!(100)),
        CountingPriceFeed::new(),
    );

    let result = harness
        .dispatcher
        .execute(lend(ChainId::Ethereum, ProtocolId::Aave), None)
        .await;

    let error = result.error.unwrap();
    assert_eq!(error.kind, "SubmissionRejected");
    assert!(error.message.contains("nonce too low"));
}

#[tokio::test]
async fn test_deadline_fails_with_timeout_and_is_recorded() {
    let eth = Arc::new(MockAdapter::new(ChainId::Ethereum).slow(Duration::from_secs(5)));
    let harness = Harness::new(
        vec![eth.clone()],
        ScriptedQuotes::returning(dec!(100)),
        CountingPriceFeed::new(),
    );

    let result = harness
        .dispatcher
        .execute(
            swap(ChainId::Ethereum, None, dec!(0.5)),
            Some(Duration::from_millis(50)),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error.as_ref().unwrap().kind, "Timeout");
    assert!(eth.submitted().is_empty());

    let recorded = harness.sink.results();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].execution_id, result.execution_id);
}

#[tokio::test]
async fn test_every_outcome_reaches_the_sink() {
    let (harness, _, _) = Harness::evm();

    harness
        .dispatcher
        .execute(swap(ChainId::Ethereum, None, dec!(0.5)), None)
        .await;
    harness
        .dispatcher
        .execute(lend(ChainId::Polygon, ProtocolId::Compound), None)
        .await;

    let recorded = harness.sink.results();
    assert_eq!(recorded.len(), 2);
    assert!(recorded[0].success);
    assert!(!recorded[1].success);
}

#[tokio::test]
async fn test_flushed_results_are_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("executions.jsonl");
    let dispatcher = Dispatcher::new(
        Arc::new(RouteTable::standard()),
        AdapterSet::new(),
        Arc::new(ScriptedQuotes::returning(dec!(100))),
        Arc::new(JsonlResultSink::new(&path)),
    );

    let result = dispatcher
        .execute(lend(ChainId::Ethereum, ProtocolId::Aave), None)
        .await;
    dispatcher.flush_results().await;

    let content = std::fs::read_to_string(&path).unwrap();
    let recorded: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(recorded["execution_id"], result.execution_id.to_string());
    assert_eq!(recorded["error"]["kind"], "UnsupportedRoute");
}

#[tokio::test]
async fn test_status_poll_is_idempotent() {
    let (harness, _, _) = Harness::evm();
    let reference = defi_intent_gateway::chains::TxReference::parse(
        ChainId::Ethereum,
        &format!("0x{}", "cd".repeat(32)),
    )
    .unwrap();

    let first = harness
        .dispatcher
        .transaction_status(ChainId::Ethereum, &reference)
        .await
        .unwrap();
    let second = harness
        .dispatcher
        .transaction_status(ChainId::Ethereum, &reference)
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_adapter_is_unsupported_route() {
    let (harness, _, _) = Harness::evm();

    let result = harness
        .dispatcher
        .execute(swap(ChainId::Solana, Some(ProtocolId::Raydium), dec!(0.5)), None)
        .await;

    assert_eq!(result.error.unwrap().kind, "UnsupportedRoute");
    assert_eq!(harness.quotes.calls(), 0);
}

#[tokio::test]
async fn test_unreachable_chain_read_is_chain_unreachable() {
    let eth = Arc::new(
        MockAdapter::new(ChainId::Ethereum)
            .failing_reads(ChainError::Unreachable("connection refused".into())),
    );
    let harness = Harness::new(
        vec![eth],
        ScriptedQuotes::returning(dec!(100)),
        CountingPriceFeed::new(),
    );

    let err = harness
        .portfolio
        .snapshot(WALLET, ChainId::Ethereum)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ChainUnreachable");
}
