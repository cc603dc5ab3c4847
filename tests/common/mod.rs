//! Test doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use defi_intent_gateway::chains::{
    AdapterSet, ChainAdapter, ChainError, FeeEstimate, PoolReserves, TransactionStatus,
    TxReference, TxState,
};
use defi_intent_gateway::config::{ChainFamily, ChainId, ProtocolId};
use defi_intent_gateway::dispatcher::{Dispatcher, ExecutionResult};
use defi_intent_gateway::gateway::Gateway;
use defi_intent_gateway::portfolio::Portfolio;
use defi_intent_gateway::prices::{AssetId, PriceError, PriceFeed};
use defi_intent_gateway::protocols::{CallPayload, RouteTable};
use defi_intent_gateway::quotes::{Quote, QuoteError, QuoteRequest, QuoteSource};
use defi_intent_gateway::sink::ResultSink;
use defi_intent_gateway::tokens::TokenRegistry;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WALLET: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
pub const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
pub const DAI: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";
pub const USDC_POLYGON: &str = "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359";
pub const PAIR: &str = "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc";

pub const SOL_WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const USDC_SOLANA: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const WSOL: &str = "So11111111111111111111111111111111111111112";

/// Chain adapter that counts every call and records submissions
pub struct MockAdapter {
    chain: ChainId,
    native: Decimal,
    tokens: HashMap<String, Decimal>,
    token_errors: HashMap<String, ChainError>,
    read_error: Option<ChainError>,
    reject: Option<String>,
    decimals: u8,
    token_decimals: HashMap<String, u8>,
    pool: Option<PoolReserves>,
    read_delay: Option<Duration>,
    calls: AtomicUsize,
    submitted: Mutex<Vec<(String, CallPayload, Decimal)>>,
}

impl MockAdapter {
    pub fn new(chain: ChainId) -> Self {
        Self {
            chain,
            native: Decimal::ZERO,
            tokens: HashMap::new(),
            token_errors: HashMap::new(),
            read_error: None,
            reject: None,
            decimals: 18,
            token_decimals: HashMap::new(),
            pool: None,
            read_delay: None,
            calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_native(mut self, balance: Decimal) -> Self {
        self.native = balance;
        self
    }

    pub fn with_token(mut self, token: &str, balance: Decimal) -> Self {
        self.tokens.insert(token.to_lowercase(), balance);
        self
    }

    pub fn with_token_error(mut self, token: &str, err: ChainError) -> Self {
        self.token_errors.insert(token.to_lowercase(), err);
        self
    }

    pub fn with_decimals(mut self, token: &str, decimals: u8) -> Self {
        self.token_decimals.insert(token.to_lowercase(), decimals);
        self
    }

    pub fn with_pool_reserves(mut self, reserve_a: Decimal, reserve_b: Decimal, lp_supply: Decimal) -> Self {
        self.pool = Some(PoolReserves {
            reserve_a,
            reserve_b,
            lp_supply,
        });
        self
    }

    /// Every balance read fails with `err`
    pub fn failing_reads(mut self, err: ChainError) -> Self {
        self.read_error = Some(err);
        self
    }

    pub fn rejecting(mut self, reason: &str) -> Self {
        self.reject = Some(reason.to_string());
        self
    }

    /// Delay every decimals read, to exercise caller deadlines
    pub fn slow(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<(String, CallPayload, Decimal)> {
        self.submitted.lock().unwrap().clone()
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn reference(&self, n: usize) -> TxReference {
        let raw = match self.chain.family() {
            ChainFamily::Evm => format!("0x{:064x}", n + 1),
            ChainFamily::Solana => {
                solana_sdk::signature::Signature::from([n as u8 + 1; 64]).to_string()
            }
        };
        TxReference::parse(self.chain, &raw).unwrap()
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn get_native_balance(&self, _address: &str) -> Result<Decimal, ChainError> {
        self.hit();
        match &self.read_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.native),
        }
    }

    async fn get_token_balance(&self, _address: &str, token: &str) -> Result<Decimal, ChainError> {
        self.hit();
        if let Some(err) = &self.read_error {
            return Err(err.clone());
        }
        let key = token.to_lowercase();
        if let Some(err) = self.token_errors.get(&key) {
            return Err(err.clone());
        }
        Ok(self.tokens.get(&key).copied().unwrap_or(Decimal::ZERO))
    }

    async fn token_decimals(&self, token: &str) -> Result<u8, ChainError> {
        self.hit();
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .token_decimals
            .get(&token.to_lowercase())
            .copied()
            .unwrap_or(self.decimals))
    }

    async fn pool_reserves(
        &self,
        _protocol: ProtocolId,
        pool: &str,
        _lp_token: &str,
        _token_a: &str,
        _token_b: &str,
    ) -> Result<PoolReserves, ChainError> {
        self.hit();
        if let Some(err) = &self.read_error {
            return Err(err.clone());
        }
        self.pool
            .ok_or_else(|| ChainError::InvalidAddress(format!("{} is not a known pool", pool)))
    }

    async fn estimate_fee(&self, _from: &str, _target: &str, _payload: &CallPayload) -> FeeEstimate {
        self.hit();
        FeeEstimate {
            units: 150_000,
            unit_price: 10_000_000_000,
            total_native: Decimal::new(15, 4),
            is_default: false,
        }
    }

    async fn build_and_submit(
        &self,
        _from: &str,
        target: &str,
        payload: &CallPayload,
        value: Decimal,
        _fee_hint: Option<&FeeEstimate>,
    ) -> Result<TxReference, ChainError> {
        self.hit();
        if let Some(reason) = &self.reject {
            return Err(ChainError::Rejected(reason.clone()));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((target.to_string(), payload.clone(), value));
        Ok(self.reference(submitted.len()))
    }

    async fn poll_status(&self, reference: &TxReference) -> Result<TransactionStatus, ChainError> {
        self.hit();
        let mut status = TransactionStatus::new(reference, self.chain, TxState::Confirmed);
        status.block_number = Some(100);
        status.confirmations = Some(3);
        Ok(status)
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        self.hit();
        Ok(102)
    }
}

/// Quote source answering every request with the same output
pub struct ScriptedQuotes {
    expected_out: Decimal,
    route: Value,
    error: Option<QuoteError>,
    calls: AtomicUsize,
    requests: Mutex<Vec<QuoteRequest>>,
}

impl ScriptedQuotes {
    pub fn returning(expected_out: Decimal) -> Self {
        Self {
            expected_out,
            route: Value::Null,
            error: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: QuoteError) -> Self {
        Self {
            error: Some(err),
            ..Self::returning(Decimal::ZERO)
        }
    }

    /// Route payload naming a Solana pool, as Jupiter returns it
    pub fn with_pool(mut self, pool: &str) -> Self {
        self.route = serde_json::json!({
            "routePlan": [{ "swapInfo": { "ammKey": pool } }]
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<QuoteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteSource for ScriptedQuotes {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(Quote {
            chain: request.chain,
            protocol: request.protocol,
            source: "scripted".to_string(),
            amount_in: request.amount_in,
            expected_out: self.expected_out,
            price_impact: None,
            route: self.route.clone(),
            quoted_at: Utc::now(),
        })
    }
}

/// Price feed with fixed prices that counts lookups per asset
#[derive(Default)]
pub struct CountingPriceFeed {
    prices: HashMap<AssetId, Decimal>,
    lookups: Mutex<HashMap<AssetId, usize>>,
}

impl CountingPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, asset: AssetId, price: Decimal) -> Self {
        self.prices.insert(asset, price);
        self
    }

    pub fn lookups(&self, asset: &AssetId) -> usize {
        self.lookups.lock().unwrap().get(asset).copied().unwrap_or(0)
    }

    pub fn total_lookups(&self) -> usize {
        self.lookups.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl PriceFeed for CountingPriceFeed {
    async fn price_usd(&self, asset: &AssetId) -> Result<Decimal, PriceError> {
        *self.lookups.lock().unwrap().entry(asset.clone()).or_insert(0) += 1;
        self.prices
            .get(asset)
            .copied()
            .ok_or_else(|| PriceError::NotListed(asset.to_string()))
    }
}

/// Sink keeping every recorded result in memory
#[derive(Default)]
pub struct CollectingSink {
    results: Mutex<Vec<ExecutionResult>>,
}

impl CollectingSink {
    pub fn results(&self) -> Vec<ExecutionResult> {
        self.results.lock().unwrap().clone()
    }
}

impl ResultSink for CollectingSink {
    fn record(&self, result: &ExecutionResult) {
        self.results.lock().unwrap().push(result.clone());
    }
}

/// Dispatcher, portfolio and gateway wired to test doubles
pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub portfolio: Arc<Portfolio>,
    pub gateway: Gateway,
    pub quotes: Arc<ScriptedQuotes>,
    pub prices: Arc<CountingPriceFeed>,
    pub sink: Arc<CollectingSink>,
}

impl Harness {
    pub fn new(
        adapters: Vec<Arc<MockAdapter>>,
        quotes: ScriptedQuotes,
        prices: CountingPriceFeed,
    ) -> Self {
        let mut set = AdapterSet::new();
        for adapter in adapters {
            set.insert(adapter);
        }
        let routes = Arc::new(RouteTable::standard());
        let quotes = Arc::new(quotes);
        let prices = Arc::new(prices);
        let sink = Arc::new(CollectingSink::default());

        let dispatcher = Arc::new(Dispatcher::new(
            routes.clone(),
            set.clone(),
            quotes.clone(),
            sink.clone(),
        ));
        let portfolio = Arc::new(Portfolio::new(
            set,
            routes,
            Arc::new(TokenRegistry::new()),
            prices.clone(),
        ));
        let gateway = Gateway::new(dispatcher.clone(), portfolio.clone());

        Self {
            dispatcher,
            portfolio,
            gateway,
            quotes,
            prices,
            sink,
        }
    }

    /// Ethereum and Polygon mocks with a quote of 100 out
    pub fn evm() -> (Self, Arc<MockAdapter>, Arc<MockAdapter>) {
        let eth = Arc::new(MockAdapter::new(ChainId::Ethereum));
        let polygon = Arc::new(MockAdapter::new(ChainId::Polygon));
        let harness = Self::new(
            vec![eth.clone(), polygon.clone()],
            ScriptedQuotes::returning(Decimal::ONE_HUNDRED),
            CountingPriceFeed::new(),
        );
        (harness, eth, polygon)
    }
}

pub fn is_evm_tx_hash(value: &str) -> bool {
    value.len() == 66
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}
