//! Caller intents
//!
//! Wire params are parsed into typed, validated intents here. Construction is
//! the `Received` phase: nothing in this module touches the network, and an
//! intent that exists is well-formed for its chain.

use crate::config::{ChainId, IntentDefaults, ProtocolId};
use crate::protocols::WithdrawAmount;
use crate::validation::{check_slippage, parse_amount, require_address};
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An amount as sent on the wire: decimal string, or a JSON number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountParam {
    Text(String),
    Number(serde_json::Number),
}

impl AmountParam {
    fn as_text(&self) -> String {
        match self {
            AmountParam::Text(s) => s.clone(),
            AmountParam::Number(n) => n.to_string(),
        }
    }

    fn parse(&self, field: &str) -> Result<Decimal> {
        parse_amount(field, &self.as_text())
    }

    /// Slippage accepts zero, unlike amounts
    fn parse_slippage(&self, max: Decimal) -> Result<Decimal> {
        let text = self.as_text();
        let value = text
            .trim()
            .parse::<Decimal>()
            .or_else(|_| Decimal::from_scientific(text.trim()))
            .map_err(|_| Error::invalid(format!("slippage '{}' is not a decimal number", text)))?;
        check_slippage(value, max)
    }
}

/// Parse a chain name; unknown names are a routing miss
pub fn parse_chain(raw: &str) -> Result<ChainId> {
    if raw.trim().is_empty() {
        return Err(Error::invalid("blockchain is required"));
    }
    raw.parse::<ChainId>().map_err(Error::UnsupportedRoute)
}

fn parse_protocol(raw: &str) -> Result<ProtocolId> {
    if raw.trim().is_empty() {
        return Err(Error::invalid("protocol is required"));
    }
    raw.parse::<ProtocolId>().map_err(Error::UnsupportedRoute)
}

fn optional_protocol(raw: Option<&str>) -> Result<Option<ProtocolId>> {
    match raw {
        Some(name) if !name.trim().is_empty() => parse_protocol(name).map(Some),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapIntent {
    pub chain: ChainId,
    /// `None` selects the chain's default exchange
    pub protocol: Option<ProtocolId>,
    pub wallet: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    /// Percent tolerance on the quoted output
    pub slippage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LendIntent {
    pub chain: ChainId,
    pub protocol: ProtocolId,
    pub wallet: String,
    pub token: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawIntent {
    pub chain: ChainId,
    pub protocol: ProtocolId,
    pub wallet: String,
    pub token: String,
    pub amount: WithdrawAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddLiquidityIntent {
    pub chain: ChainId,
    pub protocol: ProtocolId,
    pub wallet: String,
    pub pool_id: String,
    pub token_a: String,
    pub token_b: String,
    pub amount_a: Decimal,
    pub amount_b: Decimal,
    pub slippage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoveLiquidityIntent {
    pub chain: ChainId,
    pub protocol: ProtocolId,
    pub wallet: String,
    pub pool_id: String,
    /// LP token burned; defaults to the pool itself on EVM routers
    pub lp_token: Option<String>,
    pub token_a: String,
    pub token_b: String,
    pub liquidity: Decimal,
    pub slippage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    Swap(SwapIntent),
    Lend(LendIntent),
    Withdraw(WithdrawIntent),
    AddLiquidity(AddLiquidityIntent),
    RemoveLiquidity(RemoveLiquidityIntent),
}

impl Intent {
    pub fn chain(&self) -> ChainId {
        match self {
            Intent::Swap(i) => i.chain,
            Intent::Lend(i) => i.chain,
            Intent::Withdraw(i) => i.chain,
            Intent::AddLiquidity(i) => i.chain,
            Intent::RemoveLiquidity(i) => i.chain,
        }
    }

    pub fn wallet(&self) -> &str {
        match self {
            Intent::Swap(i) => &i.wallet,
            Intent::Lend(i) => &i.wallet,
            Intent::Withdraw(i) => &i.wallet,
            Intent::AddLiquidity(i) => &i.wallet,
            Intent::RemoveLiquidity(i) => &i.wallet,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Intent::Swap(_) => "swap",
            Intent::Lend(_) => "lend",
            Intent::Withdraw(_) => "withdraw",
            Intent::AddLiquidity(_) => "add_liquidity",
            Intent::RemoveLiquidity(_) => "remove_liquidity",
        }
    }
}

/// `defi.swap` params
#[derive(Debug, Clone, Deserialize)]
pub struct SwapParams {
    pub wallet_address: String,
    pub blockchain: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: AmountParam,
    #[serde(default)]
    pub slippage: Option<AmountParam>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl SwapParams {
    pub fn into_intent(self, defaults: &IntentDefaults) -> Result<SwapIntent> {
        let chain = parse_chain(&self.blockchain)?;
        require_address(chain, "wallet_address", &self.wallet_address)?;
        require_address(chain, "token_in", &self.token_in)?;
        require_address(chain, "token_out", &self.token_out)?;
        if self.token_in.eq_ignore_ascii_case(&self.token_out) {
            return Err(Error::invalid("token_in and token_out must differ"));
        }
        let amount_in = self.amount_in.parse("amount_in")?;
        let slippage = match &self.slippage {
            Some(s) => s.parse_slippage(defaults.max_slippage_percent)?,
            None => defaults.swap_slippage_percent,
        };
        let protocol = optional_protocol(self.protocol.as_deref())?;

        Ok(SwapIntent {
            chain,
            protocol,
            wallet: self.wallet_address,
            token_in: self.token_in,
            token_out: self.token_out,
            amount_in,
            slippage,
        })
    }
}

/// `defi.lend` params
#[derive(Debug, Clone, Deserialize)]
pub struct LendParams {
    pub wallet_address: String,
    pub blockchain: String,
    pub protocol: String,
    pub token: String,
    pub amount: AmountParam,
}

impl LendParams {
    pub fn into_intent(self) -> Result<LendIntent> {
        let chain = parse_chain(&self.blockchain)?;
        require_address(chain, "wallet_address", &self.wallet_address)?;
        require_address(chain, "token", &self.token)?;
        let amount = self.amount.parse("amount")?;
        let protocol = parse_protocol(&self.protocol)?;

        Ok(LendIntent {
            chain,
            protocol,
            wallet: self.wallet_address,
            token: self.token,
            amount,
        })
    }
}

/// `defi.withdraw` params; `amount` may be `"max"`
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawParams {
    pub wallet_address: String,
    pub blockchain: String,
    pub protocol: String,
    pub token: String,
    pub amount: AmountParam,
}

impl WithdrawParams {
    pub fn into_intent(self) -> Result<WithdrawIntent> {
        let chain = parse_chain(&self.blockchain)?;
        require_address(chain, "wallet_address", &self.wallet_address)?;
        require_address(chain, "token", &self.token)?;
        let amount = match &self.amount {
            AmountParam::Text(s) if s.trim().eq_ignore_ascii_case("max") => WithdrawAmount::Max,
            other => WithdrawAmount::Exact(other.parse("amount")?),
        };
        let protocol = parse_protocol(&self.protocol)?;

        Ok(WithdrawIntent {
            chain,
            protocol,
            wallet: self.wallet_address,
            token: self.token,
            amount,
        })
    }
}

/// `defi.farm` params
#[derive(Debug, Clone, Deserialize)]
pub struct FarmParams {
    pub wallet_address: String,
    pub blockchain: String,
    pub protocol: String,
    pub pool_id: String,
    pub token_a: String,
    pub token_b: String,
    pub amount_a: AmountParam,
    pub amount_b: AmountParam,
    #[serde(default)]
    pub slippage: Option<AmountParam>,
}

impl FarmParams {
    pub fn into_intent(self, defaults: &IntentDefaults) -> Result<AddLiquidityIntent> {
        let chain = parse_chain(&self.blockchain)?;
        require_address(chain, "wallet_address", &self.wallet_address)?;
        require_address(chain, "pool_id", &self.pool_id)?;
        require_address(chain, "token_a", &self.token_a)?;
        require_address(chain, "token_b", &self.token_b)?;
        let amount_a = self.amount_a.parse("amount_a")?;
        let amount_b = self.amount_b.parse("amount_b")?;
        let slippage = match &self.slippage {
            Some(s) => s.parse_slippage(defaults.max_slippage_percent)?,
            None => defaults.liquidity_slippage_percent,
        };
        let protocol = parse_protocol(&self.protocol)?;

        Ok(AddLiquidityIntent {
            chain,
            protocol,
            wallet: self.wallet_address,
            pool_id: self.pool_id,
            token_a: self.token_a,
            token_b: self.token_b,
            amount_a,
            amount_b,
            slippage,
        })
    }
}

/// `defi.remove_liquidity` params
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveLiquidityParams {
    pub wallet_address: String,
    pub blockchain: String,
    pub protocol: String,
    pub pool_id: String,
    #[serde(default)]
    pub lp_token: Option<String>,
    pub token_a: String,
    pub token_b: String,
    pub liquidity: AmountParam,
    #[serde(default)]
    pub slippage: Option<AmountParam>,
}

impl RemoveLiquidityParams {
    pub fn into_intent(self, defaults: &IntentDefaults) -> Result<RemoveLiquidityIntent> {
        let chain = parse_chain(&self.blockchain)?;
        require_address(chain, "wallet_address", &self.wallet_address)?;
        require_address(chain, "pool_id", &self.pool_id)?;
        if let Some(lp) = &self.lp_token {
            require_address(chain, "lp_token", lp)?;
        }
        require_address(chain, "token_a", &self.token_a)?;
        require_address(chain, "token_b", &self.token_b)?;
        let liquidity = self.liquidity.parse("liquidity")?;
        let slippage = match &self.slippage {
            Some(s) => s.parse_slippage(defaults.max_slippage_percent)?,
            None => defaults.liquidity_slippage_percent,
        };
        let protocol = parse_protocol(&self.protocol)?;

        Ok(RemoveLiquidityIntent {
            chain,
            protocol,
            wallet: self.wallet_address,
            pool_id: self.pool_id,
            lp_token: self.lp_token,
            token_a: self.token_a,
            token_b: self.token_b,
            liquidity,
            slippage,
        })
    }
}

/// `defi.quote` params: a swap priced without executing
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteParams {
    pub blockchain: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: AmountParam,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteIntent {
    pub chain: ChainId,
    pub protocol: Option<ProtocolId>,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
}

impl QuoteParams {
    pub fn into_intent(self) -> Result<QuoteIntent> {
        let chain = parse_chain(&self.blockchain)?;
        require_address(chain, "token_in", &self.token_in)?;
        require_address(chain, "token_out", &self.token_out)?;
        if self.token_in.eq_ignore_ascii_case(&self.token_out) {
            return Err(Error::invalid("token_in and token_out must differ"));
        }
        let amount_in = self.amount_in.parse("amount_in")?;
        let protocol = optional_protocol(self.protocol.as_deref())?;

        Ok(QuoteIntent {
            chain,
            protocol,
            token_in: self.token_in,
            token_out: self.token_out,
            amount_in,
        })
    }
}
