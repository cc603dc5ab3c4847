//! Solana chain adapter
//!
//! AMM instructions are encoded here from the program's documented
//! instruction tags. User token accounts are the associated token accounts
//! of the wallet, derived rather than looked up.

use super::{
    with_read_timeout, ChainAdapter, ChainError, FeeEstimate, PoolReserves, TransactionStatus,
    TxReference, TxState,
};
use crate::config::{ChainId, ProtocolId};
use crate::protocols::{CallPayload, ContractCall};
use crate::units::{from_base_units, from_base_units_str, to_base_units, to_base_units_floor};
use crate::wallet::SigningService;
use async_trait::async_trait;
use rust_decimal::Decimal;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::TransactionConfirmationStatus;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Base fee per signature, used when the node cannot price a message
pub const DEFAULT_LAMPORTS_PER_SIGNATURE: u64 = 5_000;

pub const SPL_TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const ASSOCIATED_TOKEN_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

mod raydium {
    pub const SWAP_BASE_IN: u8 = 9;
    pub const DEPOSIT: u8 = 3;
    pub const WITHDRAW: u8 = 4;
    /// AMM v4 state: base vault, quote vault, base mint, quote mint
    pub const POOL_OFFSETS: [usize; 4] = [336, 368, 400, 432];
}

mod orca {
    pub const SWAP: u8 = 1;
    pub const DEPOSIT_ALL: u8 = 2;
    pub const WITHDRAW_ALL: u8 = 3;
    /// Token-swap state: token A account, token B account, mint A, mint B
    pub const POOL_OFFSETS: [usize; 4] = [35, 67, 131, 163];
}

/// Vaults and mints recorded in an AMM pool account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLayout {
    pub vault_a: Pubkey,
    pub vault_b: Pubkey,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
}

fn key_at(data: &[u8], offset: usize) -> Result<Pubkey, ChainError> {
    data.get(offset..offset + 32)
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .map(Pubkey::new_from_array)
        .ok_or_else(|| {
            ChainError::InvalidAddress(format!("pool account of {} bytes is not an AMM pool", data.len()))
        })
}

/// Read vaults and mints out of raw pool account data
pub fn pool_layout(protocol: ProtocolId, data: &[u8]) -> Result<PoolLayout, ChainError> {
    let [vault_a, vault_b, mint_a, mint_b] = match protocol {
        ProtocolId::Raydium => raydium::POOL_OFFSETS,
        ProtocolId::Orca => orca::POOL_OFFSETS,
        other => {
            return Err(ChainError::UnsupportedCall(format!(
                "{} has no pools on solana",
                other
            )))
        }
    };
    Ok(PoolLayout {
        vault_a: key_at(data, vault_a)?,
        vault_b: key_at(data, vault_b)?,
        mint_a: key_at(data, mint_a)?,
        mint_b: key_at(data, mint_b)?,
    })
}

impl PoolLayout {
    /// Pool instructions take per-side minimums in pool order
    pub fn require_order(&self, token_a: &Pubkey, token_b: &Pubkey) -> Result<(), ChainError> {
        if (&self.mint_a, &self.mint_b) == (token_a, token_b) {
            return Ok(());
        }
        Err(ChainError::InvalidAddress(format!(
            "pool trades {}/{}; token_a and token_b must name them in that order",
            self.mint_a, self.mint_b
        )))
    }
}

fn pubkey(field: &str, value: &str) -> Result<Pubkey, ChainError> {
    Pubkey::from_str(value)
        .map_err(|e| ChainError::InvalidAddress(format!("{} {}: {}", field, value, e)))
}

/// Associated token account of `wallet` for `mint`
pub fn associated_token_account(wallet: &Pubkey, mint: &Pubkey) -> Result<Pubkey, ChainError> {
    let token_program = pubkey("token program", SPL_TOKEN_PROGRAM)?;
    let ata_program = pubkey("associated token program", ASSOCIATED_TOKEN_PROGRAM)?;
    let (address, _) = Pubkey::find_program_address(
        &[wallet.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ata_program,
    );
    Ok(address)
}

fn base_u64(amount: Decimal, decimals: u8) -> Result<u64, ChainError> {
    let raw = to_base_units(amount, decimals)?;
    u64::try_from(raw).map_err(|_| ChainError::Amount(format!("{} exceeds u64", amount)))
}

fn min_u64(amount: Decimal, decimals: u8) -> Result<u64, ChainError> {
    let raw = to_base_units_floor(amount, decimals)?;
    u64::try_from(raw).map_err(|_| ChainError::Amount(format!("{} exceeds u64", amount)))
}

fn pack(tag: u8, fields: &[u64]) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + fields.len() * 8);
    data.push(tag);
    for field in fields {
        data.extend_from_slice(&field.to_le_bytes());
    }
    data
}

/// Mints whose decimals an instruction needs
pub fn mints_needing_decimals(call: &ContractCall) -> Vec<&str> {
    match call {
        ContractCall::Swap { token_in, token_out, .. } => vec![token_in, token_out],
        ContractCall::AddLiquidity { token_a, token_b, .. } => vec![token_a, token_b],
        ContractCall::RemoveLiquidity { lp_token, token_a, token_b, .. } => {
            vec![lp_token, token_a, token_b]
        }
        _ => vec![],
    }
}

/// Instruction data for an AMM call, amounts scaled by mint decimals
pub fn instruction_data(
    protocol: ProtocolId,
    call: &ContractCall,
    decimals: &HashMap<String, u8>,
) -> Result<Vec<u8>, ChainError> {
    let dec = |mint: &str| -> Result<u8, ChainError> {
        decimals
            .get(mint)
            .copied()
            .ok_or_else(|| ChainError::TokenMetadata(format!("decimals of {} not loaded", mint)))
    };

    let data = match (protocol, call) {
        (
            ProtocolId::Raydium | ProtocolId::Orca,
            ContractCall::Swap {
                token_in,
                token_out,
                amount_in,
                min_amount_out,
                ..
            },
        ) => {
            let tag = if protocol == ProtocolId::Raydium {
                raydium::SWAP_BASE_IN
            } else {
                orca::SWAP
            };
            pack(
                tag,
                &[
                    base_u64(*amount_in, dec(token_in)?)?,
                    min_u64(*min_amount_out, dec(token_out)?)?,
                ],
            )
        }
        (
            ProtocolId::Raydium,
            ContractCall::AddLiquidity {
                token_a,
                token_b,
                amount_a,
                amount_b,
                ..
            },
        ) => pack(
            raydium::DEPOSIT,
            &[
                base_u64(*amount_a, dec(token_a)?)?,
                base_u64(*amount_b, dec(token_b)?)?,
                0,
            ],
        ),
        (
            ProtocolId::Orca,
            ContractCall::AddLiquidity {
                token_a,
                token_b,
                amount_a,
                amount_b,
                ..
            },
        ) => pack(
            orca::DEPOSIT_ALL,
            &[
                0,
                base_u64(*amount_a, dec(token_a)?)?,
                base_u64(*amount_b, dec(token_b)?)?,
            ],
        ),
        (
            ProtocolId::Raydium,
            ContractCall::RemoveLiquidity {
                lp_token,
                token_a,
                token_b,
                liquidity,
                min_a,
                min_b,
                ..
            },
        ) => pack(
            raydium::WITHDRAW,
            &[
                base_u64(*liquidity, dec(lp_token)?)?,
                min_u64(*min_a, dec(token_a)?)?,
                min_u64(*min_b, dec(token_b)?)?,
            ],
        ),
        (
            ProtocolId::Orca,
            ContractCall::RemoveLiquidity {
                lp_token,
                token_a,
                token_b,
                liquidity,
                min_a,
                min_b,
                ..
            },
        ) => pack(
            orca::WITHDRAW_ALL,
            &[
                base_u64(*liquidity, dec(lp_token)?)?,
                min_u64(*min_a, dec(token_a)?)?,
                min_u64(*min_b, dec(token_b)?)?,
            ],
        ),
        (protocol, call) => {
            return Err(ChainError::UnsupportedCall(format!(
                "{} has no {} instruction on solana",
                protocol,
                call.name()
            )))
        }
    };

    Ok(data)
}

/// Account list for an AMM call: signer, pool, user token accounts, mints, token program
pub fn instruction_accounts(wallet: &Pubkey, call: &ContractCall) -> Result<Vec<AccountMeta>, ChainError> {
    let (pool, mints): (Option<&str>, Vec<&str>) = match call {
        ContractCall::Swap { pool, token_in, token_out, .. } => {
            (pool.as_deref(), vec![token_in, token_out])
        }
        ContractCall::AddLiquidity { pool, token_a, token_b, .. } => {
            (Some(pool.as_str()), vec![token_a, token_b])
        }
        ContractCall::RemoveLiquidity { pool, lp_token, token_a, token_b, .. } => {
            (Some(pool.as_str()), vec![lp_token, token_a, token_b])
        }
        other => {
            return Err(ChainError::UnsupportedCall(other.name().to_string()));
        }
    };
    let pool = pool.ok_or_else(|| ChainError::UnsupportedCall("swap without a pool".into()))?;

    let mut accounts = vec![
        AccountMeta::new(*wallet, true),
        AccountMeta::new(pubkey("pool", pool)?, false),
    ];
    let mints = mints
        .into_iter()
        .map(|mint| pubkey("mint", mint))
        .collect::<Result<Vec<_>, _>>()?;
    for mint in &mints {
        accounts.push(AccountMeta::new(associated_token_account(wallet, mint)?, false));
    }
    for mint in &mints {
        accounts.push(AccountMeta::new_readonly(*mint, false));
    }
    accounts.push(AccountMeta::new_readonly(
        pubkey("token program", SPL_TOKEN_PROGRAM)?,
        false,
    ));
    Ok(accounts)
}

fn read_error(err: ClientError) -> ChainError {
    ChainError::Unreachable(err.to_string())
}

fn submit_error(err: ClientError) -> ChainError {
    match err.kind() {
        ClientErrorKind::RpcError(_) | ClientErrorKind::TransactionError(_) => {
            ChainError::Rejected(err.to_string())
        }
        _ => ChainError::Unreachable(err.to_string()),
    }
}

fn default_fee() -> FeeEstimate {
    lamport_fee(DEFAULT_LAMPORTS_PER_SIGNATURE, true)
}

fn lamport_fee(lamports: u64, is_default: bool) -> FeeEstimate {
    FeeEstimate {
        units: 1,
        unit_price: lamports as u128,
        total_native: from_base_units(lamports as u128, ChainId::Solana.native_decimals())
            .unwrap_or(Decimal::ZERO),
        is_default,
    }
}

pub struct SolanaAdapter {
    client: RpcClient,
    signer: Arc<dyn SigningService>,
    read_timeout: Duration,
}

impl SolanaAdapter {
    pub fn new(rpc_url: &str, signer: Arc<dyn SigningService>, read_timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout(rpc_url.to_string(), read_timeout),
            signer,
            read_timeout,
        }
    }

    async fn read<T, F>(&self, fut: F) -> Result<T, ChainError>
    where
        F: std::future::Future<Output = Result<T, ChainError>>,
    {
        with_read_timeout(self.read_timeout, fut).await
    }

    async fn instruction(
        &self,
        wallet: &Pubkey,
        program: &str,
        payload: &CallPayload,
    ) -> Result<Instruction, ChainError> {
        let mut decimals = HashMap::new();
        for mint in mints_needing_decimals(&payload.call) {
            if !decimals.contains_key(mint) {
                let value = self.token_decimals(mint).await?;
                decimals.insert(mint.to_string(), value);
            }
        }

        let data = instruction_data(payload.protocol, &payload.call, &decimals)?;
        let accounts = instruction_accounts(wallet, &payload.call)?;
        Ok(Instruction::new_with_bytes(
            pubkey("program", program)?,
            &data,
            accounts,
        ))
    }

    async fn message(
        &self,
        from: &str,
        program: &str,
        payload: &CallPayload,
    ) -> Result<Message, ChainError> {
        let payer = pubkey("from", from)?;
        let instruction = self.instruction(&payer, program, payload).await?;
        let blockhash = self
            .read(async { self.client.get_latest_blockhash().await.map_err(read_error) })
            .await?;
        Ok(Message::new_with_blockhash(&[instruction], Some(&payer), &blockhash))
    }

    async fn token_amount(&self, account: &Pubkey) -> Result<Decimal, ChainError> {
        let balance = self
            .read(async {
                self.client
                    .get_token_account_balance(account)
                    .await
                    .map_err(read_error)
            })
            .await?;
        Ok(from_base_units_str(&balance.amount, balance.decimals)?)
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> ChainId {
        ChainId::Solana
    }

    async fn get_native_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        let owner = pubkey("address", address)?;
        let lamports = self
            .read(async { self.client.get_balance(&owner).await.map_err(read_error) })
            .await?;
        Ok(from_base_units(lamports as u128, ChainId::Solana.native_decimals())?)
    }

    async fn get_token_balance(&self, address: &str, token: &str) -> Result<Decimal, ChainError> {
        let owner = pubkey("address", address)?;
        let mint = pubkey("token", token)?;

        let accounts = self
            .read(async {
                self.client
                    .get_token_accounts_by_owner(&owner, TokenAccountsFilter::Mint(mint))
                    .await
                    .map_err(read_error)
            })
            .await?;

        // No token account means the wallet has never held the mint
        let mut total = Decimal::ZERO;
        for keyed in accounts {
            let account = pubkey("token account", &keyed.pubkey)?;
            total += self.token_amount(&account).await?;
        }
        Ok(total)
    }

    async fn token_decimals(&self, token: &str) -> Result<u8, ChainError> {
        let mint = pubkey("token", token)?;
        let supply = self
            .read(async {
                self.client.get_token_supply(&mint).await.map_err(|e| match e.kind() {
                    ClientErrorKind::RpcError(_) => {
                        ChainError::TokenMetadata(format!("{} is not a token mint: {}", token, e))
                    }
                    _ => read_error(e),
                })
            })
            .await?;
        Ok(supply.decimals)
    }

    async fn estimate_fee(&self, from: &str, target: &str, payload: &CallPayload) -> FeeEstimate {
        let estimate = async {
            let message = self.message(from, target, payload).await?;
            self.read(async {
                self.client
                    .get_fee_for_message(&message)
                    .await
                    .map_err(read_error)
            })
            .await
        };

        match estimate.await {
            Ok(lamports) => lamport_fee(lamports, false),
            Err(e) => {
                tracing::debug!(
                    chain = "solana",
                    call = payload.call.name(),
                    error = %e,
                    "Fee estimation failed, using default"
                );
                default_fee()
            }
        }
    }

    async fn build_and_submit(
        &self,
        from: &str,
        target: &str,
        payload: &CallPayload,
        value: Decimal,
        _fee_hint: Option<&FeeEstimate>,
    ) -> Result<TxReference, ChainError> {
        if !value.is_zero() {
            return Err(ChainError::UnsupportedCall(
                "native value transfer alongside an AMM instruction".into(),
            ));
        }
        if !self.signer.has_signer(ChainId::Solana, from) {
            return Err(ChainError::Signing(from.to_string()));
        }

        let message = self.message(from, target, payload).await?;
        let raw = self
            .signer
            .sign(ChainId::Solana, from, &message.serialize())
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let signature = Signature::try_from(raw.as_slice())
            .map_err(|e| ChainError::Signing(format!("malformed signature: {}", e)))?;

        let transaction = Transaction {
            signatures: vec![signature],
            message,
        };
        let signature = self
            .read(async {
                self.client
                    .send_transaction(&transaction)
                    .await
                    .map_err(submit_error)
            })
            .await?;

        let reference = TxReference::new_unchecked(signature.to_string());
        tracing::info!(
            chain = "solana",
            call = payload.call.name(),
            tx = %reference,
            "Submitted transaction"
        );
        Ok(reference)
    }

    async fn pool_reserves(
        &self,
        protocol: ProtocolId,
        pool: &str,
        lp_token: &str,
        token_a: &str,
        token_b: &str,
    ) -> Result<PoolReserves, ChainError> {
        let pool_key = pubkey("pool", pool)?;
        let lp_mint = pubkey("lp_token", lp_token)?;
        let (mint_a, mint_b) = (pubkey("token_a", token_a)?, pubkey("token_b", token_b)?);

        let data = self
            .read(async {
                self.client
                    .get_account_data(&pool_key)
                    .await
                    .map_err(read_error)
            })
            .await?;
        let layout = pool_layout(protocol, &data)?;
        layout.require_order(&mint_a, &mint_b)?;

        let reserve_a = self.token_amount(&layout.vault_a).await?;
        let reserve_b = self.token_amount(&layout.vault_b).await?;
        let supply = self
            .read(async { self.client.get_token_supply(&lp_mint).await.map_err(read_error) })
            .await?;

        Ok(PoolReserves {
            reserve_a,
            reserve_b,
            lp_supply: from_base_units_str(&supply.amount, supply.decimals)?,
        })
    }

    async fn poll_status(&self, reference: &TxReference) -> Result<TransactionStatus, ChainError> {
        let signature = Signature::from_str(reference.as_str())
            .map_err(|e| ChainError::InvalidAddress(format!("signature {}: {}", reference, e)))?;

        let response = self
            .read(async {
                self.client
                    .get_signature_statuses_with_history(&[signature])
                    .await
                    .map_err(read_error)
            })
            .await?;

        let Some(found) = response.value.into_iter().next().flatten() else {
            return Ok(TransactionStatus::new(reference, ChainId::Solana, TxState::NotFound));
        };

        let state = if found.err.is_some() {
            TxState::Failed
        } else {
            match found.confirmation_status {
                Some(TransactionConfirmationStatus::Processed) => TxState::Pending,
                Some(TransactionConfirmationStatus::Confirmed)
                | Some(TransactionConfirmationStatus::Finalized) => TxState::Confirmed,
                // Older nodes omit the level; no confirmation count means rooted
                None if found.confirmations.is_none() => TxState::Confirmed,
                None => TxState::Pending,
            }
        };

        let mut status = TransactionStatus::new(reference, ChainId::Solana, state);
        status.slot = Some(found.slot);
        status.confirmations = found.confirmations.map(|c| c as u64);
        status.error = found.err.map(|e| e.to_string());
        Ok(status)
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        self.read(async { self.client.get_slot().await.map_err(read_error) })
            .await
    }
}
