//! Portfolio and position aggregation
//!
//! Snapshots are recomputed on every call; nothing is cached. Balance reads
//! run concurrently and prices are fetched once per unique asset. Read
//! failures degrade to partial results and are reported in `diagnostics`.

use crate::chains::{AdapterSet, ChainAdapter, ChainError};
use crate::config::{ChainFamily, ChainId, ProtocolId};
use crate::prices::{AssetId, PriceError, PriceFeed};
use crate::protocols::{PositionKind, PositionToken, RouteEntry, RouteTable};
use crate::tokens::addresses::{NATIVE_EVM, NATIVE_SOLANA};
use crate::tokens::TokenRegistry;
use crate::units::allocation_percent;
use crate::validation::require_address;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One sub-query that failed while building a read result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// What was being read, e.g. `balance:USDC`, `price:ethereum:native`, `protocol:aave`
    pub source: String,
    pub kind: &'static str,
    pub message: String,
}

impl Diagnostic {
    fn new(source: impl Into<String>, err: &Error) -> Self {
        Self {
            source: source.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub symbol: String,
    /// Contract address or mint; the chain's native marker for the gas token
    pub address: String,
    pub balance: Decimal,
    /// `None` when the price source had no price
    pub price_usd: Option<Decimal>,
    pub value_usd: Decimal,
    pub allocation_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub wallet_address: String,
    pub blockchain: ChainId,
    pub holdings: Vec<Holding>,
    pub total_value_usd: Decimal,
    pub diagnostics: Vec<Diagnostic>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub protocol: ProtocolId,
    pub kind: PositionKind,
    pub symbol: String,
    pub token: String,
    pub balance: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlying: Option<String>,
    pub price_usd: Option<Decimal>,
    pub value_usd: Option<Decimal>,
}

/// Position counts per category
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionSummary {
    pub lending: usize,
    pub farming: usize,
    pub staking: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionsReport {
    pub wallet_address: String,
    pub blockchain: ChainId,
    pub positions: Vec<Position>,
    pub summary: PositionSummary,
    pub total_value_locked: Decimal,
    pub diagnostics: Vec<Diagnostic>,
    pub timestamp: DateTime<Utc>,
}

struct BalanceTarget {
    asset: AssetId,
    symbol: String,
    address: String,
}

fn native_marker(chain: ChainId) -> &'static str {
    match chain.family() {
        ChainFamily::Evm => NATIVE_EVM,
        ChainFamily::Solana => NATIVE_SOLANA,
    }
}

async fn read_balance(
    adapter: &dyn ChainAdapter,
    wallet: &str,
    target: &BalanceTarget,
) -> std::result::Result<Decimal, ChainError> {
    match &target.asset {
        AssetId::Native { .. } => adapter.get_native_balance(wallet).await,
        AssetId::Token { address, .. } => adapter.get_token_balance(wallet, address).await,
    }
}

/// `price * balance`, or a diagnostic when the product overflows
fn value_usd(
    source: &str,
    price: Decimal,
    balance: Decimal,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Decimal> {
    let value = price.checked_mul(balance);
    if value.is_none() {
        let err = Error::from(PriceError::Unavailable(format!(
            "price {} times balance {} overflows",
            price, balance
        )));
        diagnostics.push(Diagnostic::new(format!("value:{}", source), &err));
    }
    value
}

/// Reads every position token of one protocol; any failure voids the protocol
async fn read_protocol(
    adapter: &dyn ChainAdapter,
    wallet: &str,
    entry: &RouteEntry,
) -> std::result::Result<Vec<(PositionToken, Decimal)>, ChainError> {
    let mut held = Vec::new();
    for token in &entry.positions {
        let balance = adapter.get_token_balance(wallet, token.token).await?;
        if !balance.is_zero() {
            held.push((*token, balance));
        }
    }
    Ok(held)
}

/// Values holdings and positions across chains
pub struct Portfolio {
    adapters: AdapterSet,
    routes: Arc<RouteTable>,
    tokens: Arc<TokenRegistry>,
    prices: Arc<dyn PriceFeed>,
}

impl Portfolio {
    pub fn new(
        adapters: AdapterSet,
        routes: Arc<RouteTable>,
        tokens: Arc<TokenRegistry>,
        prices: Arc<dyn PriceFeed>,
    ) -> Self {
        Self {
            adapters,
            routes,
            tokens,
            prices,
        }
    }

    /// Fetch each unique asset's price once; failures become diagnostics
    async fn price_all(
        &self,
        assets: impl IntoIterator<Item = AssetId>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> HashMap<AssetId, Decimal> {
        let unique: BTreeSet<AssetId> = assets.into_iter().collect();
        let fetched = join_all(unique.iter().map(|asset| self.prices.price_usd(asset))).await;

        let mut prices = HashMap::new();
        for (asset, result) in unique.into_iter().zip(fetched) {
            match result {
                Ok(price) => {
                    prices.insert(asset, price);
                }
                Err(e) => {
                    tracing::debug!(asset = %asset, error = %e, "Price unavailable");
                    diagnostics.push(Diagnostic::new(format!("price:{}", asset), &Error::from(e)));
                }
            }
        }
        prices
    }

    /// Native and registry token balances, valued in USD
    pub async fn snapshot(&self, wallet: &str, chain: ChainId) -> Result<PortfolioSnapshot> {
        require_address(chain, "wallet_address", wallet)?;
        let adapter = self.adapters.require(chain)?;

        let mut targets = vec![BalanceTarget {
            asset: AssetId::native(chain),
            symbol: chain.native_symbol().to_string(),
            address: native_marker(chain).to_string(),
        }];
        targets.extend(self.tokens.tokens_for_chain(chain).iter().map(|token| {
            BalanceTarget {
                asset: AssetId::token(chain, token.address),
                symbol: token.symbol.to_string(),
                address: token.address.to_string(),
            }
        }));

        let balances = join_all(
            targets
                .iter()
                .map(|target| read_balance(adapter.as_ref(), wallet, target)),
        )
        .await;

        let mut diagnostics = Vec::new();
        let mut first_error = None;
        let mut any_read = false;
        let mut held = Vec::new();
        for (target, result) in targets.into_iter().zip(balances) {
            match result {
                Ok(balance) => {
                    any_read = true;
                    if !balance.is_zero() {
                        held.push((target, balance));
                    }
                }
                Err(e) => {
                    let err = Error::from(e);
                    diagnostics.push(Diagnostic::new(format!("balance:{}", target.symbol), &err));
                    first_error.get_or_insert(err);
                }
            }
        }
        if !any_read {
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        let prices = self
            .price_all(held.iter().map(|(t, _)| t.asset.clone()), &mut diagnostics)
            .await;

        let mut holdings: Vec<Holding> = held
            .into_iter()
            .map(|(target, balance)| {
                let price = prices.get(&target.asset).copied();
                let value = price
                    .and_then(|p| value_usd(&target.symbol, p, balance, &mut diagnostics));
                Holding {
                    symbol: target.symbol,
                    address: target.address,
                    balance,
                    price_usd: value.and(price),
                    value_usd: value.unwrap_or(Decimal::ZERO),
                    allocation_percent: Decimal::ZERO,
                }
            })
            .collect();

        let total = holdings
            .iter()
            .fold(Decimal::ZERO, |acc, h| acc.saturating_add(h.value_usd));
        for holding in &mut holdings {
            holding.allocation_percent = allocation_percent(holding.value_usd, total);
        }

        tracing::debug!(
            chain = %chain,
            holdings = holdings.len(),
            diagnostics = diagnostics.len(),
            "Built portfolio snapshot"
        );

        Ok(PortfolioSnapshot {
            wallet_address: wallet.to_string(),
            blockchain: chain,
            holdings,
            total_value_usd: total,
            diagnostics,
            timestamp: Utc::now(),
        })
    }

    /// Open lending and liquidity positions across every configured protocol
    pub async fn positions(&self, wallet: &str, chain: ChainId) -> Result<PositionsReport> {
        require_address(chain, "wallet_address", wallet)?;
        let adapter = self.adapters.require(chain)?;

        let entries = self.routes.entries_for_chain(chain);
        let reads = join_all(
            entries
                .iter()
                .map(|entry| read_protocol(adapter.as_ref(), wallet, entry)),
        )
        .await;

        let mut diagnostics = Vec::new();
        let mut held = Vec::new();
        for (entry, result) in entries.iter().zip(reads) {
            match result {
                Ok(tokens) => held.extend(tokens.into_iter().map(|(t, b)| (entry.protocol, t, b))),
                Err(e) => {
                    tracing::debug!(protocol = %entry.protocol, error = %e, "Position read failed");
                    diagnostics.push(Diagnostic::new(
                        format!("protocol:{}", entry.protocol),
                        &Error::from(e),
                    ));
                }
            }
        }

        let priced = held
            .iter()
            .filter_map(|(_, token, _)| token.priced_as.map(|u| AssetId::token(chain, u)));
        let prices = self.price_all(priced, &mut diagnostics).await;

        let mut summary = PositionSummary::default();
        let positions: Vec<Position> = held
            .into_iter()
            .map(|(protocol, token, balance)| {
                match token.kind {
                    PositionKind::Lending => summary.lending += 1,
                    PositionKind::Farming => summary.farming += 1,
                    PositionKind::Staking => summary.staking += 1,
                }
                let price = token
                    .priced_as
                    .and_then(|u| prices.get(&AssetId::token(chain, u)).copied());
                let value =
                    price.and_then(|p| value_usd(token.symbol, p, balance, &mut diagnostics));
                Position {
                    protocol,
                    kind: token.kind,
                    symbol: token.symbol.to_string(),
                    token: token.token.to_string(),
                    balance,
                    underlying: token.priced_as.map(str::to_string),
                    price_usd: value.and(price),
                    value_usd: value,
                }
            })
            .collect();

        let total_value_locked = positions
            .iter()
            .filter_map(|p| p.value_usd)
            .fold(Decimal::ZERO, Decimal::saturating_add);

        Ok(PositionsReport {
            wallet_address: wallet.to_string(),
            blockchain: chain,
            positions,
            summary,
            total_value_locked,
            diagnostics,
            timestamp: Utc::now(),
        })
    }
}

impl std::fmt::Debug for Portfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portfolio")
            .field("adapters", &self.adapters)
            .field("routes", &self.routes.len())
            .finish()
    }
}
