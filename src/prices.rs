//! USD price feed
//!
//! Prices are fetched fresh on every call. Callers dedupe assets before
//! asking, so one snapshot costs one request per unique asset.

use crate::config::{ChainFamily, ChainId};
use crate::units::decimal_from_json;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("price source unavailable: {0}")]
    Unavailable(String),

    #[error("no price listed for {0}")]
    NotListed(String),

    #[error("price request timed out")]
    Timeout,
}

/// Asset identity for pricing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetId {
    Native { chain: ChainId },
    Token { chain: ChainId, address: String },
}

impl AssetId {
    pub fn native(chain: ChainId) -> Self {
        AssetId::Native { chain }
    }

    /// Token asset; EVM addresses are lowercased so casing never splits a dedupe
    pub fn token(chain: ChainId, address: &str) -> Self {
        let address = match chain.family() {
            ChainFamily::Evm => address.to_lowercase(),
            ChainFamily::Solana => address.to_string(),
        };
        AssetId::Token { chain, address }
    }

    pub fn chain(&self) -> ChainId {
        match self {
            AssetId::Native { chain } | AssetId::Token { chain, .. } => *chain,
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native { chain } => write!(f, "{}:native", chain),
            AssetId::Token { chain, address } => write!(f, "{}:{}", chain, address),
        }
    }
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn price_usd(&self, asset: &AssetId) -> Result<Decimal, PriceError>;
}

/// CoinGecko simple-price endpoints
pub struct CoinGeckoFeed {
    http: Client,
    base_url: String,
}

impl CoinGeckoFeed {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn coin_id(chain: ChainId) -> &'static str {
        match chain {
            ChainId::Ethereum => "ethereum",
            ChainId::Polygon => "matic-network",
            ChainId::Solana => "solana",
        }
    }

    fn platform(chain: ChainId) -> &'static str {
        match chain {
            ChainId::Ethereum => "ethereum",
            ChainId::Polygon => "polygon-pos",
            ChainId::Solana => "solana",
        }
    }

    async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, PriceError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PriceError::Timeout
                } else {
                    PriceError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(PriceError::Unavailable(format!(
                "coingecko returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PriceError::Unavailable(format!("bad coingecko response: {}", e)))
    }
}

/// `{key: {"usd": price}}`, tolerating key casing differences
fn usd_entry(body: &Value, key: &str) -> Option<Decimal> {
    let entry = body.get(key).or_else(|| body.get(key.to_lowercase()))?;
    decimal_from_json(entry.get("usd")?)
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn price_usd(&self, asset: &AssetId) -> Result<Decimal, PriceError> {
        let (body, key) = match asset {
            AssetId::Native { chain } => {
                let id = Self::coin_id(*chain);
                let url = format!("{}/simple/price", self.base_url);
                let body = self
                    .fetch(&url, &[("ids", id), ("vs_currencies", "usd")])
                    .await?;
                (body, id.to_string())
            }
            AssetId::Token { chain, address } => {
                let url = format!(
                    "{}/simple/token_price/{}",
                    self.base_url,
                    Self::platform(*chain)
                );
                let body = self
                    .fetch(
                        &url,
                        &[("contract_addresses", address.as_str()), ("vs_currencies", "usd")],
                    )
                    .await?;
                (body, address.clone())
            }
        };

        let price = usd_entry(&body, &key).ok_or_else(|| PriceError::NotListed(asset.to_string()))?;
        tracing::trace!(asset = %asset, price = %price, "Fetched price");
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use crate::tokens::addresses::{USDC_ETH, USDC_SOLANA};
    use axum::extract::{Path, Query};
    use axum::routing::get;
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;

    async fn feed() -> CoinGeckoFeed {
        let app = Router::new()
            .route(
                "/simple/price",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let mut body = serde_json::Map::new();
                    body.insert(q["ids"].clone(), json!({"usd": 3120.45}));
                    Json(Value::Object(body))
                }),
            )
            .route(
                "/simple/token_price/:platform",
                get(
                    |Path(platform): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                        let address = q["contract_addresses"].clone();
                        let mut body = serde_json::Map::new();
                        if platform != "unknown" && !address.starts_with("0x1111") {
                            body.insert(address, json!({"usd": "1.0001"}));
                        }
                        Json(Value::Object(body))
                    },
                ),
            );
        CoinGeckoFeed::new(Client::new(), &serve(app).await)
    }

    #[test]
    fn test_evm_token_ids_are_case_insensitive() {
        assert_eq!(
            AssetId::token(ChainId::Ethereum, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            AssetId::token(ChainId::Ethereum, USDC_ETH)
        );
        assert_ne!(
            AssetId::token(ChainId::Solana, USDC_SOLANA),
            AssetId::token(ChainId::Solana, &USDC_SOLANA.to_lowercase())
        );
    }

    #[tokio::test]
    async fn test_native_price() {
        let price = feed()
            .await
            .price_usd(&AssetId::native(ChainId::Polygon))
            .await
            .unwrap();
        assert_eq!(price, dec!(3120.45));
    }

    #[tokio::test]
    async fn test_token_price_from_string() {
        let feed = feed().await;
        let price = feed
            .price_usd(&AssetId::token(ChainId::Ethereum, USDC_ETH))
            .await
            .unwrap();
        assert_eq!(price, dec!(1.0001));

        let price = feed
            .price_usd(&AssetId::token(ChainId::Solana, USDC_SOLANA))
            .await
            .unwrap();
        assert_eq!(price, dec!(1.0001));
    }

    #[tokio::test]
    async fn test_unlisted_token() {
        let err = feed()
            .await
            .price_usd(&AssetId::token(
                ChainId::Ethereum,
                "0x1111111111111111111111111111111111111111",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, PriceError::NotListed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_feed() {
        let feed = CoinGeckoFeed::new(Client::new(), "http://127.0.0.1:9");
        let err = feed
            .price_usd(&AssetId::native(ChainId::Ethereum))
            .await
            .unwrap_err();
        assert!(matches!(err, PriceError::Unavailable(_)));
    }
}
