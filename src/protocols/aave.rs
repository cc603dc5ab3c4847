//! Aave V2 lending pool

use super::{CallPayload, ContractCall, PlannedCall, ProtocolHandler};
use crate::config::ProtocolId;
use crate::intent::{LendIntent, WithdrawIntent};
use crate::Result;

#[derive(Debug, Clone)]
pub struct AaveV2Pool {
    pool: &'static str,
}

impl AaveV2Pool {
    pub fn new(pool: &'static str) -> Self {
        Self { pool }
    }
}

impl ProtocolHandler for AaveV2Pool {
    fn protocol(&self) -> ProtocolId {
        ProtocolId::Aave
    }

    fn deposit(&self, intent: &LendIntent) -> Result<PlannedCall> {
        let call = ContractCall::LendingDeposit {
            asset: intent.token.clone(),
            amount: intent.amount,
            on_behalf_of: intent.wallet.clone(),
        };
        Ok(PlannedCall::new(self.pool, CallPayload::new(ProtocolId::Aave, call)))
    }

    fn withdraw(&self, intent: &WithdrawIntent) -> Result<PlannedCall> {
        let call = ContractCall::LendingWithdraw {
            asset: intent.token.clone(),
            amount: intent.amount,
            to: intent.wallet.clone(),
        };
        Ok(PlannedCall::new(self.pool, CallPayload::new(ProtocolId::Aave, call)))
    }
}
