//! Swap quotes from external aggregators
//!
//! Each `(chain, protocol)` pair is served by exactly one upstream: 1inch for
//! EVM routers, Jupiter for Solana AMMs. Providers never retry and never
//! blend quotes from several sources. A quote is consumed by the dispatch
//! that requested it and never cached.

pub mod jupiter;
pub mod oneinch;

use crate::config::{AggregatorConfig, ChainFamily, ChainId, ProtocolId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use jupiter::JupiterClient;
pub use oneinch::OneInchClient;

/// Quote failures, by cause
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error("no route: {0}")]
    NoRoute(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("invalid pair: {0}")]
    InvalidPair(String),

    #[error("quote timed out: {0}")]
    Timeout(String),
}

impl QuoteError {
    pub fn reason(&self) -> &'static str {
        match self {
            QuoteError::NoRoute(_) => "NoRoute",
            QuoteError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            QuoteError::InvalidPair(_) => "InvalidPair",
            QuoteError::Timeout(_) => "Timeout",
        }
    }
}

/// Transport failure from `reqwest`, split into timeout vs. unavailable
pub(crate) fn transport_error(source: &str, err: reqwest::Error) -> QuoteError {
    if err.is_timeout() {
        QuoteError::Timeout(format!("{} did not answer in time", source))
    } else {
        QuoteError::UpstreamUnavailable(format!("{}: {}", source, err))
    }
}

/// What to quote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteRequest {
    pub chain: ChainId,
    pub protocol: ProtocolId,
    pub token_in: String,
    pub token_out: String,
    /// Human units
    pub amount_in: Decimal,
    pub decimals_in: u8,
    pub decimals_out: u8,
    /// Percent; only sources that filter routes by tolerance read it
    pub slippage: Decimal,
}

/// Upstream price and route for a swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub chain: ChainId,
    pub protocol: ProtocolId,
    /// Aggregator that produced the quote
    pub source: String,
    pub amount_in: Decimal,
    pub expected_out: Decimal,
    /// Percent, when the upstream reports one
    pub price_impact: Option<Decimal>,
    /// Raw route payload, opaque to everything but protocol handlers
    pub route: Value,
    pub quoted_at: DateTime<Utc>,
}

#[cfg(test)]
impl Quote {
    pub(crate) fn fixture(
        chain: ChainId,
        protocol: ProtocolId,
        amount_in: Decimal,
        expected_out: Decimal,
    ) -> Self {
        Self {
            chain,
            protocol,
            source: "fixture".to_string(),
            amount_in,
            expected_out,
            price_impact: None,
            route: Value::Null,
            quoted_at: Utc::now(),
        }
    }
}

/// Source of swap quotes
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError>;
}

/// Picks the aggregator for a request by chain family
pub struct AggregatorQuotes {
    oneinch: OneInchClient,
    jupiter: JupiterClient,
}

impl AggregatorQuotes {
    pub fn new(oneinch: OneInchClient, jupiter: JupiterClient) -> Self {
        Self { oneinch, jupiter }
    }

    pub fn from_config(config: &AggregatorConfig, http: reqwest::Client) -> Self {
        Self::new(
            OneInchClient::new(
                http.clone(),
                &config.oneinch_base_url,
                config
                    .oneinch_api_key
                    .as_ref()
                    .map(|key| SecretString::from(key.expose_secret().to_string())),
            ),
            JupiterClient::new(http, &config.jupiter_base_url),
        )
    }
}

#[async_trait]
impl QuoteSource for AggregatorQuotes {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        tracing::debug!(
            chain = %request.chain,
            protocol = %request.protocol,
            amount_in = %request.amount_in,
            "Requesting quote"
        );

        match request.chain.family() {
            ChainFamily::Evm => self.oneinch.quote(request).await,
            ChainFamily::Solana => self.jupiter.quote(request).await,
        }
    }
}
