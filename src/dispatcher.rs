//! Operation dispatcher
//!
//! Each intent walks `Received -> Quoted -> Built -> Submitted -> Terminal`.
//! Routing is a `(chain, protocol)` table lookup, so an unsupported pair fails
//! before any quote or chain call. Non-swap intents skip `Quoted`.
//!
//! The dispatcher never waits for confirmation; callers poll
//! [`Dispatcher::transaction_status`] with the returned reference.
//! Concurrent intents for one wallet are not serialized here.

use crate::chains::{AdapterSet, ChainAdapter, FeeEstimate, TransactionStatus, TxReference};
use crate::config::{ChainId, IntentDefaults, ProtocolId};
use crate::intent::{Intent, QuoteIntent};
use crate::protocols::{
    CallPayload, ContractCall, PlannedCall, RemovalPlan, RouteTable, SwapPlan, WithdrawAmount,
};
use crate::quotes::{Quote, QuoteRequest, QuoteSource};
use crate::sink::ResultSink;
use crate::units::{apply_slippage, to_base_units};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default caller deadline for one intent
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Received,
    Quoted,
    Built,
    Submitted,
    Terminal,
}

/// A token and an amount in human units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetAmount {
    pub token: String,
    pub amount: Decimal,
}

impl AssetAmount {
    pub fn new(token: &str, amount: Decimal) -> Self {
        Self {
            token: token.to_string(),
            amount,
        }
    }
}

/// Error part of a failed execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionError {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub message: String,
}

impl From<&Error> for ExecutionError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            reason: err.reason(),
            message: err.to_string(),
        }
    }
}

/// Raw quote and build payloads, kept for auditing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount_out: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<FeeEstimate>,
}

/// Outcome of one intent; `error` is present iff `success` is false
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub operation: String,
    pub blockchain: ChainId,
    pub protocol: Option<ProtocolId>,
    pub wallet_address: String,
    pub amounts_in: Vec<AssetAmount>,
    pub amounts_out: Vec<AssetAmount>,
    pub metadata: ExecutionMetadata,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    /// Failed result for an intent that never got past routing
    pub fn rejected(operation: &str, chain: ChainId, wallet: &str, err: &Error) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            success: false,
            tx_reference: None,
            error: Some(err.into()),
            operation: operation.to_string(),
            blockchain: chain,
            protocol: None,
            wallet_address: wallet.to_string(),
            amounts_in: Vec::new(),
            amounts_out: Vec::new(),
            metadata: ExecutionMetadata::default(),
            timestamp: Utc::now(),
        }
    }
}

/// What a dispatch learned before it ended
#[derive(Default)]
struct Trace {
    protocol: Option<ProtocolId>,
    amounts_in: Vec<AssetAmount>,
    amounts_out: Vec<AssetAmount>,
    quote: Option<Quote>,
    min_amount_out: Option<Decimal>,
    planned: Option<PlannedCall>,
    fee: Option<FeeEstimate>,
}

impl Trace {
    fn for_intent(intent: &Intent) -> Self {
        let mut trace = Trace::default();
        match intent {
            Intent::Swap(i) => {
                trace.protocol = i.protocol;
                trace.amounts_in = vec![AssetAmount::new(&i.token_in, i.amount_in)];
            }
            Intent::Lend(i) => {
                trace.protocol = Some(i.protocol);
                trace.amounts_in = vec![AssetAmount::new(&i.token, i.amount)];
            }
            Intent::Withdraw(i) => {
                trace.protocol = Some(i.protocol);
                if let WithdrawAmount::Exact(amount) = i.amount {
                    trace.amounts_out = vec![AssetAmount::new(&i.token, amount)];
                }
            }
            Intent::AddLiquidity(i) => {
                trace.protocol = Some(i.protocol);
                trace.amounts_in = vec![
                    AssetAmount::new(&i.token_a, i.amount_a),
                    AssetAmount::new(&i.token_b, i.amount_b),
                ];
            }
            Intent::RemoveLiquidity(i) => {
                trace.protocol = Some(i.protocol);
                let lp = i.lp_token.as_deref().unwrap_or(&i.pool_id);
                trace.amounts_in = vec![AssetAmount::new(lp, i.liquidity)];
            }
        }
        trace
    }

    fn into_result(self, intent: &Intent, outcome: &Result<TxReference>) -> ExecutionResult {
        let (target, call, value) = match self.planned {
            Some(planned) => (Some(planned.target), Some(planned.payload), Some(planned.value)),
            None => (None, None, None),
        };

        ExecutionResult {
            execution_id: Uuid::new_v4(),
            success: outcome.is_ok(),
            tx_reference: outcome.as_ref().ok().map(|r| r.to_string()),
            error: outcome.as_ref().err().map(ExecutionError::from),
            operation: intent.operation().to_string(),
            blockchain: intent.chain(),
            protocol: self.protocol,
            wallet_address: intent.wallet().to_string(),
            amounts_in: self.amounts_in,
            amounts_out: self.amounts_out,
            metadata: ExecutionMetadata {
                quote: self.quote,
                min_amount_out: self.min_amount_out,
                target,
                call,
                value,
                fee: self.fee,
            },
            timestamp: Utc::now(),
        }
    }
}

fn log_phase(phase: Phase, intent: &Intent, protocol: ProtocolId) {
    tracing::debug!(
        phase = ?phase,
        operation = intent.operation(),
        chain = %intent.chain(),
        protocol = %protocol,
        "Dispatch phase"
    );
}

/// Routes intents to protocol handlers and chain adapters
///
/// Shared by every concurrent request; holds only immutable tables and
/// `Arc`s to thread-safe collaborators.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    adapters: AdapterSet,
    quotes: Arc<dyn QuoteSource>,
    sink: Arc<dyn ResultSink>,
    defaults: IntentDefaults,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        routes: Arc<RouteTable>,
        adapters: AdapterSet,
        quotes: Arc<dyn QuoteSource>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            routes,
            adapters,
            quotes,
            sink,
            defaults: IntentDefaults::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_defaults(mut self, defaults: IntentDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn defaults(&self) -> &IntentDefaults {
        &self.defaults
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Wait until every recorded result has reached the sink's storage
    pub async fn flush_results(&self) {
        self.sink.flush().await;
    }

    /// Run one intent to a terminal result and hand it to the sink
    ///
    /// `deadline` bounds the whole dispatch; when it elapses in-flight calls
    /// are dropped and the result fails with `Timeout`.
    pub async fn execute(&self, intent: Intent, deadline: Option<Duration>) -> ExecutionResult {
        let limit = deadline.unwrap_or(self.request_timeout);
        let mut trace = Trace::for_intent(&intent);

        let outcome = match tokio::time::timeout(limit, self.run(&intent, &mut trace)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout(format!(
                "{} did not finish within {:?}",
                intent.operation(),
                limit
            ))),
        };

        let result = trace.into_result(&intent, &outcome);
        match &outcome {
            Ok(reference) => tracing::info!(
                phase = ?Phase::Terminal,
                operation = intent.operation(),
                chain = %intent.chain(),
                tx = %reference,
                "Intent submitted"
            ),
            Err(e) => tracing::warn!(
                phase = ?Phase::Terminal,
                operation = intent.operation(),
                chain = %intent.chain(),
                kind = e.kind(),
                error = %e,
                "Intent failed"
            ),
        }

        self.sink.record(&result);
        result
    }

    async fn run(&self, intent: &Intent, trace: &mut Trace) -> Result<TxReference> {
        let chain = intent.chain();
        let wallet = intent.wallet();
        let deadline = self.router_deadline();

        let (adapter, planned, protocol) = match intent {
            Intent::Swap(swap) => {
                let protocol = swap
                    .protocol
                    .unwrap_or_else(|| self.routes.default_swap_protocol(chain));
                trace.protocol = Some(protocol);
                let route = self.routes.resolve(chain, protocol, intent.operation())?;
                let adapter = self.adapters.require(chain)?;
                log_phase(Phase::Received, intent, protocol);

                let request = QuoteIntent {
                    chain,
                    protocol: Some(protocol),
                    token_in: swap.token_in.clone(),
                    token_out: swap.token_out.clone(),
                    amount_in: swap.amount_in,
                };
                let quote = self
                    .fetch_quote(adapter.as_ref(), &request, protocol, swap.slippage)
                    .await?;
                log_phase(Phase::Quoted, intent, protocol);

                let min_amount_out = apply_slippage(quote.expected_out, swap.slippage);
                trace.min_amount_out = Some(min_amount_out);
                trace.amounts_out = vec![AssetAmount::new(&swap.token_out, quote.expected_out)];

                let planned = route.handler.swap(&SwapPlan {
                    intent: swap,
                    quote: &quote,
                    min_amount_out,
                    deadline,
                });
                trace.quote = Some(quote);
                (adapter, planned?, protocol)
            }
            Intent::Lend(lend) => {
                let route = self.routes.resolve(chain, lend.protocol, intent.operation())?;
                let adapter = self.adapters.require(chain)?;
                log_phase(Phase::Received, intent, lend.protocol);
                (adapter, route.handler.deposit(lend)?, lend.protocol)
            }
            Intent::Withdraw(withdraw) => {
                let route = self
                    .routes
                    .resolve(chain, withdraw.protocol, intent.operation())?;
                let adapter = self.adapters.require(chain)?;
                log_phase(Phase::Received, intent, withdraw.protocol);
                (adapter, route.handler.withdraw(withdraw)?, withdraw.protocol)
            }
            Intent::AddLiquidity(add) => {
                let route = self.routes.resolve(chain, add.protocol, intent.operation())?;
                let adapter = self.adapters.require(chain)?;
                log_phase(Phase::Received, intent, add.protocol);
                (adapter, route.handler.add_liquidity(add, deadline)?, add.protocol)
            }
            Intent::RemoveLiquidity(remove) => {
                let route = self
                    .routes
                    .resolve(chain, remove.protocol, intent.operation())?;
                let adapter = self.adapters.require(chain)?;
                log_phase(Phase::Received, intent, remove.protocol);

                let lp_token = route.handler.lp_token(remove)?;
                let reserves = adapter
                    .pool_reserves(
                        remove.protocol,
                        &remove.pool_id,
                        &lp_token,
                        &remove.token_a,
                        &remove.token_b,
                    )
                    .await?;
                let (out_a, out_b) = reserves.share(remove.liquidity).ok_or_else(|| {
                    Error::invalid(format!(
                        "liquidity {} exceeds the pool's LP supply of {}",
                        remove.liquidity, reserves.lp_supply
                    ))
                })?;
                trace.amounts_out = vec![
                    AssetAmount::new(&remove.token_a, out_a),
                    AssetAmount::new(&remove.token_b, out_b),
                ];

                let planned = route.handler.remove_liquidity(&RemovalPlan {
                    intent: remove,
                    lp_token: &lp_token,
                    min_a: apply_slippage(out_a, remove.slippage),
                    min_b: apply_slippage(out_b, remove.slippage),
                    deadline,
                })?;
                (adapter, planned, remove.protocol)
            }
        };

        // Swap input was checked against its decimals before quoting
        if !matches!(intent, Intent::Swap(_)) {
            self.check_precision(adapter.as_ref(), &planned.payload.call)
                .await?;
        }

        let fee = adapter
            .estimate_fee(wallet, &planned.target, &planned.payload)
            .await;
        if fee.is_default {
            tracing::debug!(chain = %chain, "Using default fee estimate");
        }
        trace.fee = Some(fee);
        let planned = trace.planned.insert(planned);
        log_phase(Phase::Built, intent, protocol);

        let reference = adapter
            .build_and_submit(
                wallet,
                &planned.target,
                &planned.payload,
                planned.value,
                trace.fee.as_ref(),
            )
            .await?;
        log_phase(Phase::Submitted, intent, protocol);

        Ok(reference)
    }

    async fn fetch_quote(
        &self,
        adapter: &dyn ChainAdapter,
        request: &QuoteIntent,
        protocol: ProtocolId,
        slippage: Decimal,
    ) -> Result<Quote> {
        let decimals_in = adapter.token_decimals(&request.token_in).await?;
        to_base_units(request.amount_in, decimals_in)?;
        let decimals_out = adapter.token_decimals(&request.token_out).await?;

        let quote = self
            .quotes
            .get_quote(&QuoteRequest {
                chain: request.chain,
                protocol,
                token_in: request.token_in.clone(),
                token_out: request.token_out.clone(),
                amount_in: request.amount_in,
                decimals_in,
                decimals_out,
                slippage,
            })
            .await?;
        Ok(quote)
    }

    /// Reject amounts finer than a token's decimals before anything is signed
    async fn check_precision(&self, adapter: &dyn ChainAdapter, call: &ContractCall) -> Result<()> {
        for (token, amount) in call.exact_amounts() {
            let decimals = adapter.token_decimals(token).await?;
            to_base_units(amount, decimals)?;
        }
        Ok(())
    }

    /// Price a swap without executing it
    pub async fn quote(&self, request: QuoteIntent) -> Result<Quote> {
        let protocol = request
            .protocol
            .unwrap_or_else(|| self.routes.default_swap_protocol(request.chain));
        self.routes.resolve(request.chain, protocol, "swap")?;
        let adapter = self.adapters.require(request.chain)?;

        self.fetch_quote(
            adapter.as_ref(),
            &request,
            protocol,
            self.defaults.swap_slippage_percent,
        )
        .await
    }

    /// Single status poll for a submitted transaction
    pub async fn transaction_status(
        &self,
        chain: ChainId,
        reference: &TxReference,
    ) -> Result<TransactionStatus> {
        let adapter = self.adapters.require(chain)?;
        Ok(adapter.poll_status(reference).await?)
    }

    /// Unix time after which routers reject the call
    fn router_deadline(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        now + self.defaults.deadline_secs
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("adapters", &self.adapters)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
