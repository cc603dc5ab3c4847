//! EVM chain adapter (Ethereum, Polygon)
//!
//! Reads go through `eth_call` against the ERC20 interface. Writes are
//! legacy transactions: the adapter fills nonce and gas, asks the signing
//! service to sign the transaction hash, and submits the raw envelope.
//! Router and pool calls that spend tokens are preceded by an `approve`
//! when the current allowance is short.

use super::{
    with_read_timeout, ChainAdapter, ChainError, FeeEstimate, PoolReserves, TransactionStatus,
    TxReference, TxState,
};
use crate::config::{ChainId, ProtocolId};
use crate::protocols::{CallPayload, ContractCall, WithdrawAmount};
use crate::units::{from_base_units, to_base_units, to_base_units_floor};
use crate::wallet::SigningService;
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::hex;
use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, Bytes, Signature, TxKind, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Gas limit used when estimation fails
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;
/// Gas price used when the node cannot be asked (20 gwei)
pub const DEFAULT_GAS_PRICE: u128 = 20_000_000_000;
/// Gas limit for ERC20 approvals
const APPROVE_GAS_LIMIT: u64 = 60_000;
/// Headroom added on top of a node gas estimate
const GAS_MARGIN_PERCENT: u64 = 20;
/// Aave referral code
const NO_REFERRAL: u16 = 0;

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface IUniswapV2Router02 {
        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] path,
            address to,
            uint256 deadline
        ) external returns (uint256[] amounts);

        function addLiquidity(
            address tokenA,
            address tokenB,
            uint256 amountADesired,
            uint256 amountBDesired,
            uint256 amountAMin,
            uint256 amountBMin,
            address to,
            uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB, uint256 liquidity);

        function removeLiquidity(
            address tokenA,
            address tokenB,
            uint256 liquidity,
            uint256 amountAMin,
            uint256 amountBMin,
            address to,
            uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB);
    }

    interface ILendingPool {
        function deposit(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function withdraw(address asset, uint256 amount, address to) external returns (uint256);
    }

    interface ICToken {
        function mint(uint256 mintAmount) external returns (uint256);
        function redeemUnderlying(uint256 redeemAmount) external returns (uint256);
    }
}

/// Calldata plus the token allowance it spends, if any
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCall {
    pub data: Bytes,
    /// `(token, amount)` the target contract pulls from the sender
    pub spends: Vec<(Address, U256)>,
}

fn parse_address(field: &str, value: &str) -> Result<Address, ChainError> {
    Address::from_str(value).map_err(|e| ChainError::InvalidAddress(format!("{} {}: {}", field, value, e)))
}

fn scaled(amount: Decimal, decimals: u8) -> Result<U256, ChainError> {
    Ok(U256::from(to_base_units(amount, decimals)?))
}

fn scaled_min(amount: Decimal, decimals: u8) -> Result<U256, ChainError> {
    Ok(U256::from(to_base_units_floor(amount, decimals)?))
}

/// Token addresses whose decimals an encoding needs
pub fn tokens_needing_decimals(call: &ContractCall) -> Vec<&str> {
    match call {
        ContractCall::Swap { token_in, token_out, .. } => vec![token_in, token_out],
        ContractCall::LendingDeposit { asset, .. }
        | ContractCall::LendingWithdraw { asset, .. }
        | ContractCall::MarketMint { asset, .. }
        | ContractCall::MarketRedeem { asset, .. } => vec![asset],
        ContractCall::AddLiquidity { token_a, token_b, .. } => vec![token_a, token_b],
        ContractCall::RemoveLiquidity { lp_token, token_a, token_b, .. } => {
            vec![lp_token, token_a, token_b]
        }
    }
}

/// ABI-encode a call given each token's decimals (keys are lowercase addresses)
pub fn encode_call(
    call: &ContractCall,
    decimals: &HashMap<String, u8>,
) -> Result<EncodedCall, ChainError> {
    let dec = |token: &str| -> Result<u8, ChainError> {
        decimals
            .get(&token.to_lowercase())
            .copied()
            .ok_or_else(|| ChainError::TokenMetadata(format!("decimals of {} not loaded", token)))
    };

    let encoded = match call {
        ContractCall::Swap {
            token_in,
            token_out,
            amount_in,
            min_amount_out,
            recipient,
            deadline,
            ..
        } => {
            let input = parse_address("token_in", token_in)?;
            let amount = scaled(*amount_in, dec(token_in)?)?;
            let data = IUniswapV2Router02::swapExactTokensForTokensCall {
                amountIn: amount,
                amountOutMin: scaled_min(*min_amount_out, dec(token_out)?)?,
                path: vec![input, parse_address("token_out", token_out)?],
                to: parse_address("recipient", recipient)?,
                deadline: U256::from(*deadline),
            }
            .abi_encode();
            EncodedCall {
                data: data.into(),
                spends: vec![(input, amount)],
            }
        }
        ContractCall::LendingDeposit {
            asset,
            amount,
            on_behalf_of,
        } => {
            let token = parse_address("asset", asset)?;
            let amount = scaled(*amount, dec(asset)?)?;
            let data = ILendingPool::depositCall {
                asset: token,
                amount,
                onBehalfOf: parse_address("on_behalf_of", on_behalf_of)?,
                referralCode: NO_REFERRAL,
            }
            .abi_encode();
            EncodedCall {
                data: data.into(),
                spends: vec![(token, amount)],
            }
        }
        ContractCall::LendingWithdraw { asset, amount, to } => {
            let amount = match amount {
                WithdrawAmount::Exact(value) => scaled(*value, dec(asset)?)?,
                WithdrawAmount::Max => U256::MAX,
            };
            let data = ILendingPool::withdrawCall {
                asset: parse_address("asset", asset)?,
                amount,
                to: parse_address("to", to)?,
            }
            .abi_encode();
            EncodedCall {
                data: data.into(),
                spends: vec![],
            }
        }
        ContractCall::MarketMint { asset, amount } => {
            let token = parse_address("asset", asset)?;
            let amount = scaled(*amount, dec(asset)?)?;
            let data = ICToken::mintCall { mintAmount: amount }.abi_encode();
            EncodedCall {
                data: data.into(),
                spends: vec![(token, amount)],
            }
        }
        ContractCall::MarketRedeem { asset, amount } => {
            let data = ICToken::redeemUnderlyingCall {
                redeemAmount: scaled(*amount, dec(asset)?)?,
            }
            .abi_encode();
            EncodedCall {
                data: data.into(),
                spends: vec![],
            }
        }
        ContractCall::AddLiquidity {
            token_a,
            token_b,
            amount_a,
            amount_b,
            min_a,
            min_b,
            recipient,
            deadline,
            ..
        } => {
            let (a, b) = (parse_address("token_a", token_a)?, parse_address("token_b", token_b)?);
            let (dec_a, dec_b) = (dec(token_a)?, dec(token_b)?);
            let (desired_a, desired_b) = (scaled(*amount_a, dec_a)?, scaled(*amount_b, dec_b)?);
            let data = IUniswapV2Router02::addLiquidityCall {
                tokenA: a,
                tokenB: b,
                amountADesired: desired_a,
                amountBDesired: desired_b,
                amountAMin: scaled_min(*min_a, dec_a)?,
                amountBMin: scaled_min(*min_b, dec_b)?,
                to: parse_address("recipient", recipient)?,
                deadline: U256::from(*deadline),
            }
            .abi_encode();
            EncodedCall {
                data: data.into(),
                spends: vec![(a, desired_a), (b, desired_b)],
            }
        }
        ContractCall::RemoveLiquidity {
            lp_token,
            token_a,
            token_b,
            liquidity,
            min_a,
            min_b,
            recipient,
            deadline,
            ..
        } => {
            let lp = parse_address("lp_token", lp_token)?;
            let liquidity = scaled(*liquidity, dec(lp_token)?)?;
            let data = IUniswapV2Router02::removeLiquidityCall {
                tokenA: parse_address("token_a", token_a)?,
                tokenB: parse_address("token_b", token_b)?,
                liquidity,
                amountAMin: scaled_min(*min_a, dec(token_a)?)?,
                amountBMin: scaled_min(*min_b, dec(token_b)?)?,
                to: parse_address("recipient", recipient)?,
                deadline: U256::from(*deadline),
            }
            .abi_encode();
            EncodedCall {
                data: data.into(),
                spends: vec![(lp, liquidity)],
            }
        }
    };

    Ok(encoded)
}

/// Pull a readable revert reason out of a node error message
pub fn revert_reason(error: &str) -> String {
    if !error.contains("execution reverted") {
        return error.to_string();
    }
    if let Some(start) = error.find("revert: ") {
        let reason = &error[start + 8..];
        return match reason.find('"') {
            Some(end) => reason[..end].to_string(),
            None => reason.to_string(),
        };
    }
    if let Some(start) = error.find("0x") {
        let data = &error[start..];
        let end = data
            .char_indices()
            .skip(2)
            .find(|(_, c)| !c.is_ascii_hexdigit())
            .map(|(i, _)| i)
            .unwrap_or(data.len());
        let data = &data[..end];
        // Error(string): selector, offset word, length word, then the bytes
        if data.starts_with("0x08c379a0") && data.len() > 138 {
            if let Ok(decoded) = hex::decode(&data[138..]) {
                let text: Vec<u8> = decoded.into_iter().filter(|&b| b != 0).collect();
                if let Ok(s) = String::from_utf8(text) {
                    return s;
                }
            }
        }
        return format!("reverted with data: {}", data);
    }
    "execution reverted".to_string()
}

fn read_error(err: RpcError<TransportErrorKind>) -> ChainError {
    ChainError::Unreachable(err.to_string())
}

fn submit_error(err: RpcError<TransportErrorKind>) -> ChainError {
    match &err {
        RpcError::ErrorResp(payload) => ChainError::Rejected(revert_reason(&payload.message)),
        _ => ChainError::Unreachable(err.to_string()),
    }
}

/// Adapter for one EVM chain
pub struct EvmAdapter {
    chain: ChainId,
    chain_id: u64,
    provider: DynProvider,
    signer: Arc<dyn SigningService>,
    read_timeout: Duration,
}

impl EvmAdapter {
    pub fn new(
        chain: ChainId,
        rpc_url: Url,
        signer: Arc<dyn SigningService>,
        read_timeout: Duration,
    ) -> Result<Self, ChainError> {
        let chain_id = chain
            .evm_chain_id()
            .ok_or_else(|| ChainError::UnsupportedCall(format!("{} is not an EVM chain", chain)))?;
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();

        Ok(Self {
            chain,
            chain_id,
            provider,
            signer,
            read_timeout,
        })
    }

    async fn read<T, F>(&self, fut: F) -> Result<T, ChainError>
    where
        F: std::future::Future<Output = Result<T, ChainError>>,
    {
        with_read_timeout(self.read_timeout, fut).await
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Bytes, RpcError<TransportErrorKind>> {
        let tx = TransactionRequest::default()
            .to(to)
            .input(Bytes::from(data).into());
        self.provider.call(tx).await
    }

    async fn decimals_for(&self, call: &ContractCall) -> Result<HashMap<String, u8>, ChainError> {
        let mut decimals = HashMap::new();
        for token in tokens_needing_decimals(call) {
            let key = token.to_lowercase();
            if !decimals.contains_key(&key) {
                let value = self.token_decimals(token).await?;
                decimals.insert(key, value);
            }
        }
        Ok(decimals)
    }

    async fn encode(&self, payload: &CallPayload) -> Result<EncodedCall, ChainError> {
        let decimals = self.decimals_for(&payload.call).await?;
        encode_call(&payload.call, &decimals)
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, ChainError> {
        let data = IERC20::allowanceCall { owner, spender }.abi_encode();
        let result = self
            .read(async { self.eth_call(token, data).await.map_err(read_error) })
            .await?;
        Ok(if result.len() >= 32 {
            U256::from_be_slice(&result[..32])
        } else {
            U256::ZERO
        })
    }

    async fn token_supply(&self, token: &str) -> Result<Decimal, ChainError> {
        let token_addr = parse_address("token", token)?;
        let decimals = self.token_decimals(token).await?;

        let data = IERC20::totalSupplyCall {}.abi_encode();
        let result = self
            .read(async { self.eth_call(token_addr, data).await.map_err(read_error) })
            .await?;
        if result.len() < 32 {
            return Err(ChainError::TokenMetadata(format!("{} has no totalSupply()", token)));
        }

        let raw = U256::from_be_slice(&result[..32]);
        let raw = u128::try_from(raw).map_err(|_| ChainError::Amount(raw.to_string()))?;
        Ok(from_base_units(raw, decimals)?)
    }

    /// Sign and submit one legacy transaction
    #[allow(clippy::too_many_arguments)]
    async fn sign_and_send(
        &self,
        from: &str,
        to: Address,
        data: Bytes,
        value: U256,
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
    ) -> Result<B256, ChainError> {
        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value,
            input: data,
        };

        let hash = tx.signature_hash();
        let raw_signature = self
            .signer
            .sign(self.chain, from, hash.as_slice())
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let signature = Signature::from_raw(&raw_signature)
            .map_err(|e| ChainError::Signing(format!("malformed signature: {}", e)))?;

        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let encoded = envelope.encoded_2718();

        let pending = self
            .read(async {
                self.provider
                    .send_raw_transaction(&encoded)
                    .await
                    .map_err(submit_error)
            })
            .await?;
        Ok(*pending.tx_hash())
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn get_native_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        let owner = parse_address("address", address)?;
        let wei = self
            .read(async { self.provider.get_balance(owner).await.map_err(read_error) })
            .await?;
        let wei = u128::try_from(wei).map_err(|_| ChainError::Amount(wei.to_string()))?;
        Ok(from_base_units(wei, self.chain.native_decimals())?)
    }

    async fn get_token_balance(&self, address: &str, token: &str) -> Result<Decimal, ChainError> {
        let owner = parse_address("address", address)?;
        let token_addr = parse_address("token", token)?;
        let decimals = self.token_decimals(token).await?;

        let data = IERC20::balanceOfCall { owner }.abi_encode();
        let result = self
            .read(async { self.eth_call(token_addr, data).await.map_err(read_error) })
            .await?;
        if result.len() < 32 {
            return Err(ChainError::TokenMetadata(format!(
                "{} returned {} bytes for balanceOf",
                token,
                result.len()
            )));
        }

        let raw = U256::from_be_slice(&result[..32]);
        let raw = u128::try_from(raw).map_err(|_| ChainError::Amount(raw.to_string()))?;
        Ok(from_base_units(raw, decimals)?)
    }

    async fn token_decimals(&self, token: &str) -> Result<u8, ChainError> {
        let token_addr = parse_address("token", token)?;
        let data = IERC20::decimalsCall {}.abi_encode();
        let result = self
            .read(async {
                self.eth_call(token_addr, data).await.map_err(|e| match e {
                    RpcError::ErrorResp(payload) => ChainError::TokenMetadata(format!(
                        "decimals() on {}: {}",
                        token, payload.message
                    )),
                    other => read_error(other),
                })
            })
            .await?;

        if result.len() < 32 {
            return Err(ChainError::TokenMetadata(format!(
                "{} has no decimals()",
                token
            )));
        }
        let value = U256::from_be_slice(&result[..32]);
        u8::try_from(value)
            .map_err(|_| ChainError::TokenMetadata(format!("{} reports decimals {}", token, value)))
    }

    async fn estimate_fee(&self, from: &str, target: &str, payload: &CallPayload) -> FeeEstimate {
        let estimate = async {
            let from = parse_address("from", from)?;
            let to = parse_address("target", target)?;
            let encoded = self.encode(payload).await?;
            let tx = TransactionRequest::default()
                .from(from)
                .to(to)
                .input(encoded.data.into());

            let gas = self
                .read(async { self.provider.estimate_gas(tx).await.map_err(submit_error) })
                .await?;
            let price = self
                .read(async { self.provider.get_gas_price().await.map_err(read_error) })
                .await?;
            Ok::<_, ChainError>((gas, price))
        };

        match estimate.await {
            Ok((units, unit_price)) => fee(self.chain, units, unit_price, false),
            Err(e) => {
                tracing::debug!(
                    chain = %self.chain,
                    call = payload.call.name(),
                    error = %e,
                    "Fee estimation failed, using default"
                );
                fee(self.chain, DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE, true)
            }
        }
    }

    async fn build_and_submit(
        &self,
        from: &str,
        target: &str,
        payload: &CallPayload,
        value: Decimal,
        fee_hint: Option<&FeeEstimate>,
    ) -> Result<TxReference, ChainError> {
        let sender = parse_address("from", from)?;
        let to = parse_address("target", target)?;
        if !self.signer.has_signer(self.chain, from) {
            return Err(ChainError::Signing(from.to_string()));
        }

        let encoded = self.encode(payload).await?;
        let value = scaled(value, self.chain.native_decimals())?;

        let mut nonce = self
            .read(async {
                self.provider
                    .get_transaction_count(sender)
                    .pending()
                    .await
                    .map_err(read_error)
            })
            .await?;
        let gas_price = match self
            .read(async { self.provider.get_gas_price().await.map_err(read_error) })
            .await
        {
            Ok(price) => price,
            Err(e) => {
                let fallback = fee_hint.map(|f| f.unit_price).unwrap_or(DEFAULT_GAS_PRICE);
                tracing::warn!(chain = %self.chain, error = %e, "Gas price unavailable, using {}", fallback);
                fallback
            }
        };
        let gas_limit = match fee_hint {
            Some(f) if !f.is_default => with_margin(f.units, Decimal::from(GAS_MARGIN_PERCENT)),
            Some(f) => f.units,
            None => DEFAULT_GAS_LIMIT,
        };

        for (token, amount) in &encoded.spends {
            if self.allowance(*token, sender, to).await? >= *amount {
                continue;
            }
            let approve = IERC20::approveCall {
                spender: to,
                amount: *amount,
            }
            .abi_encode();
            let approval = self
                .sign_and_send(
                    from,
                    *token,
                    approve.into(),
                    U256::ZERO,
                    nonce,
                    gas_price,
                    APPROVE_GAS_LIMIT,
                )
                .await?;
            tracing::info!(chain = %self.chain, token = %token, tx = %approval, "Submitted approval");
            nonce += 1;
        }

        let hash = self
            .sign_and_send(from, to, encoded.data, value, nonce, gas_price, gas_limit)
            .await?;
        let reference = TxReference::new_unchecked(format!("{:#x}", hash));
        tracing::info!(
            chain = %self.chain,
            call = payload.call.name(),
            tx = %reference,
            "Submitted transaction"
        );
        Ok(reference)
    }

    async fn pool_reserves(
        &self,
        _protocol: ProtocolId,
        pool: &str,
        lp_token: &str,
        token_a: &str,
        token_b: &str,
    ) -> Result<PoolReserves, ChainError> {
        // A V2 pair holds its reserves as plain token balances
        let reserve_a = self.get_token_balance(pool, token_a).await?;
        let reserve_b = self.get_token_balance(pool, token_b).await?;
        let lp_supply = self.token_supply(lp_token).await?;
        Ok(PoolReserves {
            reserve_a,
            reserve_b,
            lp_supply,
        })
    }

    async fn poll_status(&self, reference: &TxReference) -> Result<TransactionStatus, ChainError> {
        let hash = B256::from_str(reference.as_str())
            .map_err(|e| ChainError::InvalidAddress(format!("tx hash {}: {}", reference, e)))?;

        let receipt = self
            .read(async {
                self.provider
                    .get_transaction_receipt(hash)
                    .await
                    .map_err(read_error)
            })
            .await?;

        if let Some(receipt) = receipt {
            let state = if receipt.status() {
                TxState::Confirmed
            } else {
                TxState::Failed
            };
            let mut status = TransactionStatus::new(reference, self.chain, state);
            status.block_number = receipt.block_number();
            status.gas_used = Some(receipt.gas_used());
            if state == TxState::Failed {
                status.error = Some("execution reverted".to_string());
            }
            if let Some(block) = receipt.block_number() {
                let head = self.block_height().await?;
                status.confirmations = Some(head.saturating_sub(block) + 1);
            }
            return Ok(status);
        }

        let known = self
            .read(async {
                self.provider
                    .get_transaction_by_hash(hash)
                    .await
                    .map_err(read_error)
            })
            .await?;
        let state = if known.is_some() {
            TxState::Pending
        } else {
            TxState::NotFound
        };
        Ok(TransactionStatus::new(reference, self.chain, state))
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        self.read(async { self.provider.get_block_number().await.map_err(read_error) })
            .await
    }
}

fn fee(chain: ChainId, units: u64, unit_price: u128, is_default: bool) -> FeeEstimate {
    let total = (units as u128).saturating_mul(unit_price);
    FeeEstimate {
        units,
        unit_price,
        total_native: from_base_units(total, chain.native_decimals()).unwrap_or(Decimal::ZERO),
        is_default,
    }
}

/// Gas limit raised by `percent`
pub fn with_margin(units: u64, percent: Decimal) -> u64 {
    (Decimal::from(units) * (Decimal::ONE + percent / Decimal::ONE_HUNDRED))
        .ceil()
        .to_u64()
        .unwrap_or(units)
}
