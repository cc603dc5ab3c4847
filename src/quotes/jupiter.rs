//! Jupiter quote API for Solana AMMs

use super::{transport_error, Quote, QuoteError, QuoteRequest};
use crate::config::ProtocolId;
use crate::units::{decimal_from_json, from_base_units_str, to_base_units};
use chrono::Utc;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

const SOURCE: &str = "jupiter";

/// Jupiter DEX label restricting the route to one AMM
pub fn dex_label(protocol: ProtocolId) -> Option<&'static str> {
    match protocol {
        ProtocolId::Raydium => Some("Raydium"),
        ProtocolId::Orca => Some("Orca V2"),
        _ => None,
    }
}

pub struct JupiterClient {
    http: Client,
    base_url: String,
}

impl JupiterClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let dex = dex_label(request.protocol).ok_or_else(|| {
            QuoteError::InvalidPair(format!("jupiter has no {} source", request.protocol))
        })?;
        let amount = to_base_units(request.amount_in, request.decimals_in)
            .map_err(|e| QuoteError::InvalidPair(e.to_string()))?;
        let slippage_bps = (request.slippage * Decimal::ONE_HUNDRED)
            .round()
            .to_u32()
            .unwrap_or(50);

        let url = format!("{}/quote", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("inputMint", request.token_in.as_str()),
                ("outputMint", request.token_out.as_str()),
                ("amount", amount.to_string().as_str()),
                ("slippageBps", slippage_bps.to_string().as_str()),
                ("dexes", dex),
                ("onlyDirectRoutes", "true"),
            ])
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
            let detail = format!(
                "jupiter {}: {}",
                status.as_u16(),
                body.get("error").and_then(Value::as_str).unwrap_or("")
            );
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(QuoteError::UpstreamUnavailable(detail));
            }
            return Err(
                match body.get("errorCode").and_then(Value::as_str).unwrap_or("") {
                    "COULD_NOT_FIND_ANY_ROUTE" | "NO_ROUTES_FOUND" => QuoteError::NoRoute(detail),
                    _ => QuoteError::InvalidPair(detail),
                },
            );
        }

        let raw_out = body
            .get("outAmount")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                QuoteError::UpstreamUnavailable("jupiter response has no outAmount".to_string())
            })?;
        let expected_out = from_base_units_str(raw_out, request.decimals_out)
            .map_err(|e| QuoteError::UpstreamUnavailable(e.to_string()))?;
        if expected_out.is_zero() {
            return Err(QuoteError::NoRoute("jupiter quoted zero output".to_string()));
        }

        // Jupiter reports impact as a fraction
        let price_impact = body
            .get("priceImpactPct")
            .and_then(decimal_from_json)
            .map(|fraction| fraction * Decimal::ONE_HUNDRED);

        Ok(Quote {
            chain: request.chain,
            protocol: request.protocol,
            source: SOURCE.to_string(),
            amount_in: request.amount_in,
            expected_out,
            price_impact,
            route: body,
            quoted_at: Utc::now(),
        })
    }
}
