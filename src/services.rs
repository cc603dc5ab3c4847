//! Startup wiring
//!
//! Everything here is built once and shared read-only afterwards.

use crate::chains::{AdapterSet, ChainAdapter, EvmAdapter, SolanaAdapter};
use crate::config::{ChainFamily, ChainId, Config, RpcConfig};
use crate::dispatcher::Dispatcher;
use crate::gateway::Gateway;
use crate::portfolio::Portfolio;
use crate::prices::CoinGeckoFeed;
use crate::protocols::RouteTable;
use crate::quotes::AggregatorQuotes;
use crate::sink::{JsonlResultSink, ResultSink, TracingSink};
use crate::tokens::TokenRegistry;
use crate::wallet::SigningService;
use crate::{Error, Result};
use std::sync::Arc;

/// Shared HTTP client for aggregators and the price feed
pub fn http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeouts.http())
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

/// One adapter per chain with a resolved RPC endpoint
pub fn build_adapters(
    config: &Config,
    rpc: &RpcConfig,
    signer: Arc<dyn SigningService>,
) -> Result<AdapterSet> {
    let mut adapters = AdapterSet::new();
    for chain in ChainId::ALL {
        if !rpc.has_chain(chain) {
            tracing::warn!(chain = %chain, "No RPC endpoint configured; chain disabled");
            continue;
        }
        let url = rpc.url(chain)?;
        let adapter: Arc<dyn ChainAdapter> = match chain.family() {
            ChainFamily::Evm => Arc::new(EvmAdapter::new(
                chain,
                url,
                signer.clone(),
                config.timeouts.chain_read(),
            )?),
            ChainFamily::Solana => Arc::new(SolanaAdapter::new(
                url.as_str(),
                signer.clone(),
                config.timeouts.chain_read(),
            )),
        };
        tracing::debug!(chain = %chain, "Chain adapter ready");
        adapters.insert(adapter);
    }
    Ok(adapters)
}

fn build_sink(config: &Config) -> Arc<dyn ResultSink> {
    match &config.audit_log_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Recording execution results");
            Arc::new(JsonlResultSink::new(path))
        }
        None => Arc::new(TracingSink),
    }
}

/// Dispatcher and portfolio reader built from configuration
pub struct Services {
    pub dispatcher: Arc<Dispatcher>,
    pub portfolio: Arc<Portfolio>,
}

impl Services {
    pub fn new(dispatcher: Dispatcher, portfolio: Portfolio) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            portfolio: Arc::new(portfolio),
        }
    }

    pub fn from_config(
        config: &Config,
        rpc: &RpcConfig,
        signer: Arc<dyn SigningService>,
    ) -> Result<Self> {
        let http = http_client(config)?;
        let adapters = build_adapters(config, rpc, signer)?;
        let routes = Arc::new(RouteTable::standard());

        let quotes = Arc::new(AggregatorQuotes::from_config(&config.aggregators, http.clone()));
        let prices = Arc::new(CoinGeckoFeed::new(http, &config.aggregators.coingecko_base_url));

        let dispatcher = Dispatcher::new(routes.clone(), adapters.clone(), quotes, build_sink(config))
            .with_defaults(config.defaults.clone())
            .with_request_timeout(config.timeouts.request());
        let portfolio = Portfolio::new(adapters, routes, Arc::new(TokenRegistry::new()), prices);

        tracing::info!(
            chains = ?dispatcher.adapters().chains(),
            routes = dispatcher.routes().len(),
            "Services initialized"
        );
        Ok(Self::new(dispatcher, portfolio))
    }

    pub fn gateway(&self) -> Gateway {
        Gateway::new(self.dispatcher.clone(), self.portfolio.clone())
    }
}
