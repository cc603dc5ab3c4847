//! JSON-RPC gateway
//!
//! Maps the fixed `defi.*` method registry onto dispatcher and portfolio
//! operations. Every call (and every item of a batch) is independent: a
//! failing item never aborts its neighbours, and batch responses keep the
//! order of the request array.

pub mod envelope;
pub mod server;

use crate::chains::TxReference;
use crate::config::ChainId;
use crate::dispatcher::Dispatcher;
use crate::intent::{
    parse_chain, FarmParams, Intent, LendParams, QuoteParams, RemoveLiquidityParams, SwapParams,
    WithdrawParams,
};
use crate::portfolio::Portfolio;
use crate::validation::detect_tx_chain;
use crate::{Error, Result};
use envelope::{RpcError, RpcRequest, RpcResponse, INTERNAL_ERROR, METHOD_NOT_FOUND};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use server::{router, serve};

/// Registered methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Swap,
    Lend,
    Farm,
    Withdraw,
    RemoveLiquidity,
    Quote,
    Portfolio,
    Positions,
    TransactionStatus,
    Protocols,
    Chains,
}

impl Method {
    pub const ALL: [Method; 11] = [
        Method::Swap,
        Method::Lend,
        Method::Farm,
        Method::Withdraw,
        Method::RemoveLiquidity,
        Method::Quote,
        Method::Portfolio,
        Method::Positions,
        Method::TransactionStatus,
        Method::Protocols,
        Method::Chains,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::Swap => "defi.swap",
            Method::Lend => "defi.lend",
            Method::Farm => "defi.farm",
            Method::Withdraw => "defi.withdraw",
            Method::RemoveLiquidity => "defi.remove_liquidity",
            Method::Quote => "defi.quote",
            Method::Portfolio => "defi.portfolio",
            Method::Positions => "defi.positions",
            Method::TransactionStatus => "defi.transaction_status",
            Method::Protocols => "defi.protocols",
            Method::Chains => "defi.chains",
        }
    }

    /// Exact, case-sensitive lookup
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

#[derive(Debug, Deserialize)]
struct WalletParams {
    wallet_address: String,
    blockchain: String,
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    tx_hash: String,
    #[serde(default)]
    blockchain: Option<String>,
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::invalid(format!("invalid params: {}", e)))
}

fn encode<T: Serialize>(value: &T) -> std::result::Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
}

/// Caller deadline from `params.timeout_ms`
fn requested_deadline(params: &Value) -> Option<Duration> {
    params
        .get("timeout_ms")
        .and_then(Value::as_u64)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

async fn with_deadline<T, F>(limit: Duration, method: Method, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        Error::Timeout(format!("{} did not finish within {:?}", method.name(), limit))
    })?
}

/// Resolve the chain of a transaction reference, inferring it when absent
pub fn resolve_tx_reference(
    tx_hash: &str,
    blockchain: Option<&str>,
) -> Result<(ChainId, TxReference)> {
    let chain = match blockchain {
        Some(name) if !name.trim().is_empty() => parse_chain(name)?,
        _ => detect_tx_chain(tx_hash).ok_or_else(|| {
            Error::invalid(format!("'{}' is not a transaction hash or signature", tx_hash))
        })?,
    };
    let reference = TxReference::parse(chain, tx_hash)?;
    Ok((chain, reference))
}

/// Stateless request handler shared by every connection
pub struct Gateway {
    dispatcher: Arc<Dispatcher>,
    portfolio: Arc<Portfolio>,
}

impl Gateway {
    pub fn new(dispatcher: Arc<Dispatcher>, portfolio: Arc<Portfolio>) -> Self {
        Self {
            dispatcher,
            portfolio,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle a raw request body; malformed JSON yields a `-32700` envelope
    pub async fn handle_body(&self, body: &str) -> Value {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => RpcResponse::parse_error(&e.to_string()).to_value(),
        }
    }

    /// Handle a parsed single request or batch
    pub async fn handle_value(&self, value: Value) -> Value {
        match value {
            Value::Array(items) => {
                tracing::debug!(items = items.len(), "Handling batch");
                let responses = join_all(items.into_iter().map(|item| self.handle_item(item))).await;
                Value::Array(responses.iter().map(RpcResponse::to_value).collect())
            }
            single => self.handle_item(single).await.to_value(),
        }
    }

    async fn handle_item(&self, item: Value) -> RpcResponse {
        let Some(RpcRequest { method, params, id }) = RpcRequest::from_value(item) else {
            return RpcResponse::failure(
                Value::Null,
                RpcError::new(METHOD_NOT_FOUND, "Invalid request: expected an object"),
            );
        };
        let Some(name) = method else {
            return RpcResponse::failure(
                id,
                RpcError::new(METHOD_NOT_FOUND, "Invalid request: missing method"),
            );
        };
        let Some(method) = Method::from_name(&name) else {
            return RpcResponse::failure(id, RpcError::method_not_found(&name));
        };

        tracing::debug!(method = method.name(), "Handling request");
        match self.call(method, params).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(error) => {
                tracing::debug!(method = method.name(), code = error.code, error = %error.message, "Request failed");
                RpcResponse::failure(id, error)
            }
        }
    }

    async fn call(&self, method: Method, params: Value) -> std::result::Result<Value, RpcError> {
        let deadline = requested_deadline(&params).unwrap_or(self.dispatcher.request_timeout());
        let defaults = self.dispatcher.defaults();

        match method {
            Method::Swap => {
                let intent = parse_params::<SwapParams>(params)?.into_intent(defaults)?;
                self.execute(Intent::Swap(intent), deadline).await
            }
            Method::Lend => {
                let intent = parse_params::<LendParams>(params)?.into_intent()?;
                self.execute(Intent::Lend(intent), deadline).await
            }
            Method::Farm => {
                let intent = parse_params::<FarmParams>(params)?.into_intent(defaults)?;
                self.execute(Intent::AddLiquidity(intent), deadline).await
            }
            Method::Withdraw => {
                let intent = parse_params::<WithdrawParams>(params)?.into_intent()?;
                self.execute(Intent::Withdraw(intent), deadline).await
            }
            Method::RemoveLiquidity => {
                let intent = parse_params::<RemoveLiquidityParams>(params)?.into_intent(defaults)?;
                self.execute(Intent::RemoveLiquidity(intent), deadline).await
            }
            Method::Quote => {
                let intent = parse_params::<QuoteParams>(params)?.into_intent()?;
                let quote = with_deadline(deadline, method, self.dispatcher.quote(intent)).await?;
                encode(&quote)
            }
            Method::Portfolio => {
                let p = parse_params::<WalletParams>(params)?;
                let chain = parse_chain(&p.blockchain)?;
                let snapshot = with_deadline(
                    deadline,
                    method,
                    self.portfolio.snapshot(&p.wallet_address, chain),
                )
                .await?;
                encode(&snapshot)
            }
            Method::Positions => {
                let p = parse_params::<WalletParams>(params)?;
                let chain = parse_chain(&p.blockchain)?;
                let report = with_deadline(
                    deadline,
                    method,
                    self.portfolio.positions(&p.wallet_address, chain),
                )
                .await?;
                encode(&report)
            }
            Method::TransactionStatus => {
                let p = parse_params::<StatusParams>(params)?;
                let (chain, reference) = resolve_tx_reference(&p.tx_hash, p.blockchain.as_deref())?;
                let status = with_deadline(
                    deadline,
                    method,
                    self.dispatcher.transaction_status(chain, &reference),
                )
                .await?;
                encode(&status)
            }
            Method::Protocols => {
                let protocols: BTreeMap<&str, Vec<&str>> = self
                    .dispatcher
                    .routes()
                    .protocols_by_chain()
                    .into_iter()
                    .map(|(chain, names)| (chain.name(), names))
                    .collect();
                Ok(json!({ "protocols": protocols }))
            }
            Method::Chains => {
                let chains: Vec<&str> = ChainId::ALL.iter().map(ChainId::name).collect();
                let configured: Vec<&str> = self
                    .dispatcher
                    .adapters()
                    .chains()
                    .iter()
                    .map(ChainId::name)
                    .collect();
                Ok(json!({
                    "chains": chains,
                    "configured": configured,
                    "default_chain": ChainId::DEFAULT.name(),
                }))
            }
        }
    }

    async fn execute(&self, intent: Intent, deadline: Duration) -> std::result::Result<Value, RpcError> {
        let result = self.dispatcher.execute(intent, Some(deadline)).await;
        if result.success {
            encode(&result)
        } else {
            Err(RpcError::execution_failed(&result))
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("dispatcher", &self.dispatcher)
            .field("portfolio", &self.portfolio)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_registry_is_exact() {
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.name()), Some(method));
        }
        assert_eq!(Method::from_name("defi.SWAP"), None);
        assert_eq!(Method::from_name("swap"), None);
        assert_eq!(Method::from_name("defi.bridge"), None);
    }

    #[test]
    fn test_requested_deadline() {
        assert_eq!(
            requested_deadline(&json!({"timeout_ms": 1500})),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(requested_deadline(&json!({"timeout_ms": 0})), None);
        assert_eq!(requested_deadline(&json!({"timeout_ms": "soon"})), None);
        assert_eq!(requested_deadline(&json!({})), None);
    }

    #[test]
    fn test_resolve_tx_reference_infers_chain() {
        let hash = format!("0x{}", "ab".repeat(32));
        let (chain, reference) = resolve_tx_reference(&hash, None).unwrap();
        assert_eq!(chain, ChainId::Ethereum);
        assert_eq!(reference.as_str(), hash);

        let (chain, _) = resolve_tx_reference(&hash, Some("polygon")).unwrap();
        assert_eq!(chain, ChainId::Polygon);

        let err = resolve_tx_reference("0x1234", None).unwrap_err();
        assert_eq!(err.kind(), "InvalidParameter");

        let err = resolve_tx_reference(&hash, Some("solana")).unwrap_err();
        assert_eq!(err.kind(), "InvalidParameter");
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_kind() {
        let err = with_deadline(Duration::from_millis(10), Method::Portfolio, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "Timeout");
    }
}
