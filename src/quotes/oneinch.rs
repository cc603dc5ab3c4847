//! 1inch quote API for EVM routers

use super::{transport_error, Quote, QuoteError, QuoteRequest};
use crate::config::{ChainId, ProtocolId};
use crate::units::{from_base_units_str, to_base_units};
use chrono::Utc;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

const SOURCE: &str = "1inch";

/// 1inch liquidity-source id for a router deployment
pub fn protocol_filter(chain: ChainId, protocol: ProtocolId) -> Option<&'static str> {
    match (chain, protocol) {
        (ChainId::Ethereum, ProtocolId::Uniswap) => Some("UNISWAP_V2"),
        (ChainId::Ethereum, ProtocolId::Sushiswap) => Some("SUSHI"),
        (ChainId::Polygon, ProtocolId::Quickswap) => Some("POLYGON_QUICKSWAP"),
        (ChainId::Polygon, ProtocolId::Sushiswap) => Some("POLYGON_SUSHISWAP"),
        _ => None,
    }
}

pub struct OneInchClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OneInchClient {
    pub fn new(http: Client, base_url: &str, api_key: Option<SecretString>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let chain_id = request.chain.evm_chain_id().ok_or_else(|| {
            QuoteError::InvalidPair(format!("1inch does not serve {}", request.chain))
        })?;
        let filter = protocol_filter(request.chain, request.protocol).ok_or_else(|| {
            QuoteError::InvalidPair(format!(
                "1inch has no {} source on {}",
                request.protocol, request.chain
            ))
        })?;
        let amount = to_base_units(request.amount_in, request.decimals_in)
            .map_err(|e| QuoteError::InvalidPair(e.to_string()))?;

        let url = format!("{}/{}/quote", self.base_url, chain_id);
        let mut builder = self.http.get(&url).query(&[
            ("src", request.token_in.as_str()),
            ("dst", request.token_out.as_str()),
            ("amount", amount.to_string().as_str()),
            ("protocols", filter),
            ("includeProtocols", "true"),
        ]);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(SOURCE, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(SOURCE, e))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        let raw_out = body
            .get("toAmount")
            .or_else(|| body.get("toTokenAmount"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                QuoteError::UpstreamUnavailable("1inch response has no toAmount".to_string())
            })?;
        let expected_out = from_base_units_str(raw_out, request.decimals_out)
            .map_err(|e| QuoteError::UpstreamUnavailable(e.to_string()))?;
        if expected_out.is_zero() {
            return Err(QuoteError::NoRoute("1inch quoted zero output".to_string()));
        }

        Ok(Quote {
            chain: request.chain,
            protocol: request.protocol,
            source: SOURCE.to_string(),
            amount_in: request.amount_in,
            expected_out,
            price_impact: None,
            route: body,
            quoted_at: Utc::now(),
        })
    }
}

fn classify_failure(status: StatusCode, body: &Value) -> QuoteError {
    let description = body
        .get("description")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let detail = format!("1inch {}: {}", status.as_u16(), description);

    if status.is_server_error() {
        return QuoteError::UpstreamUnavailable(detail);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            QuoteError::UpstreamUnavailable(detail)
        }
        _ => {
            let lowered = description.to_lowercase();
            if lowered.contains("liquidity") || lowered.contains("route") {
                QuoteError::NoRoute(detail)
            } else {
                QuoteError::InvalidPair(detail)
            }
        }
    }
}
