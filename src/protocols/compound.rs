//! Compound V2 markets
//!
//! Each supported asset has its own cToken contract. An asset without a
//! market is an unsupported route, not an internal failure.

use super::{CallPayload, ContractCall, PlannedCall, ProtocolHandler, WithdrawAmount};
use crate::config::ProtocolId;
use crate::intent::{LendIntent, WithdrawIntent};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct CompoundMarkets {
    /// (underlying, cToken) pairs
    markets: Vec<(&'static str, &'static str)>,
}

impl CompoundMarkets {
    pub fn new(markets: Vec<(&'static str, &'static str)>) -> Self {
        Self { markets }
    }

    fn market_for(&self, asset: &str) -> Result<&'static str> {
        self.markets
            .iter()
            .find(|(underlying, _)| underlying.eq_ignore_ascii_case(asset))
            .map(|(_, ctoken)| *ctoken)
            .ok_or_else(|| Error::unsupported(format!("compound has no market for {}", asset)))
    }
}

impl ProtocolHandler for CompoundMarkets {
    fn protocol(&self) -> ProtocolId {
        ProtocolId::Compound
    }

    fn deposit(&self, intent: &LendIntent) -> Result<PlannedCall> {
        let ctoken = self.market_for(&intent.token)?;
        let call = ContractCall::MarketMint {
            asset: intent.token.clone(),
            amount: intent.amount,
        };
        Ok(PlannedCall::new(ctoken, CallPayload::new(ProtocolId::Compound, call)))
    }

    fn withdraw(&self, intent: &WithdrawIntent) -> Result<PlannedCall> {
        let ctoken = self.market_for(&intent.token)?;
        let amount = match intent.amount {
            WithdrawAmount::Exact(amount) => amount,
            WithdrawAmount::Max => {
                return Err(Error::invalid(
                    "compound withdrawals need an exact amount, not \"max\"",
                ))
            }
        };
        let call = ContractCall::MarketRedeem {
            asset: intent.token.clone(),
            amount,
        };
        Ok(PlannedCall::new(ctoken, CallPayload::new(ProtocolId::Compound, call)))
    }
}
