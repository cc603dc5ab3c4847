//! Signing service
//!
//! Chain adapters ask for signatures by wallet address and never see keys.
//! Nonce management and serialization of concurrent submissions for one
//! wallet are left to the signing side.

mod signer;

pub use signer::{EvmSigner, SolanaSigner};

use crate::config::{ChainFamily, ChainId};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Single EVM key, as used by most local setups
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
/// Prefix of per-address EVM keys: `PRIVATE_KEY_<ADDRESS>`
pub const PRIVATE_KEY_PREFIX: &str = "PRIVATE_KEY_";
/// Prefix of per-address Solana keypairs: `SOLANA_KEYPAIR_<ADDRESS>`
pub const SOLANA_KEYPAIR_PREFIX: &str = "SOLANA_KEYPAIR_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("no signer registered for {0}")]
    NoKey(String),

    #[error("{0}")]
    InvalidKey(String),

    #[error("key for {expected} derives {derived}")]
    AddressMismatch { expected: String, derived: String },

    #[error("bad signing payload: {0}")]
    Payload(String),

    #[error("signing failed: {0}")]
    Failed(String),
}

/// Signs payloads on behalf of wallet addresses
///
/// EVM payloads are 32-byte transaction hashes; Solana payloads are
/// serialized transaction messages.
#[async_trait]
pub trait SigningService: Send + Sync {
    async fn sign(
        &self,
        chain: ChainId,
        address: &str,
        payload: &[u8],
    ) -> Result<Vec<u8>, SigningError>;

    fn has_signer(&self, chain: ChainId, address: &str) -> bool;
}

/// Keys loaded from the environment, indexed by derived address
#[derive(Default)]
pub struct EnvKeyring {
    evm: HashMap<String, EvmSigner>,
    solana: HashMap<String, SolanaSigner>,
}

impl EnvKeyring {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scan the process environment for keys
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from `(name, value)` pairs; bad entries are logged and skipped
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut keyring = Self::empty();

        for (name, value) in vars {
            let loaded = if name == PRIVATE_KEY_ENV {
                keyring.add_evm_key(&value, None)
            } else if let Some(expected) = name.strip_prefix(PRIVATE_KEY_PREFIX) {
                keyring.add_evm_key(&value, Some(expected))
            } else if let Some(expected) = name.strip_prefix(SOLANA_KEYPAIR_PREFIX) {
                keyring.add_solana_keypair(&value, Some(expected))
            } else {
                continue;
            };

            match loaded {
                Ok(address) => tracing::info!(var = %name, address = %address, "Loaded signer"),
                Err(e) => tracing::warn!(var = %name, error = %e, "Skipping signer"),
            }
        }

        keyring
    }

    /// Register an EVM key, optionally checking it derives `expected`
    pub fn add_evm_key(
        &mut self,
        key_hex: &str,
        expected: Option<&str>,
    ) -> Result<String, SigningError> {
        let signer = EvmSigner::from_hex(key_hex)?;
        let derived = signer.address_key();

        if let Some(expected) = expected {
            let expected_key = if expected.to_lowercase().starts_with("0x") {
                expected.to_lowercase()
            } else {
                format!("0x{}", expected.to_lowercase())
            };
            if expected_key != derived {
                return Err(SigningError::AddressMismatch {
                    expected: expected.to_string(),
                    derived,
                });
            }
        }

        self.evm.insert(derived.clone(), signer);
        Ok(derived)
    }

    /// Register a Solana keypair, optionally checking it derives `expected`
    pub fn add_solana_keypair(
        &mut self,
        json: &str,
        expected: Option<&str>,
    ) -> Result<String, SigningError> {
        let signer = SolanaSigner::from_json_bytes(json)?;
        let derived = signer.address();

        if let Some(expected) = expected {
            if expected != derived {
                return Err(SigningError::AddressMismatch {
                    expected: expected.to_string(),
                    derived,
                });
            }
        }

        self.solana.insert(derived.clone(), signer);
        Ok(derived)
    }

    /// Every address with a key, EVM first
    pub fn addresses(&self) -> Vec<String> {
        let mut evm: Vec<String> = self.evm.keys().cloned().collect();
        let mut solana: Vec<String> = self.solana.keys().cloned().collect();
        evm.sort();
        solana.sort();
        evm.extend(solana);
        evm
    }

    pub fn is_empty(&self) -> bool {
        self.evm.is_empty() && self.solana.is_empty()
    }
}

#[async_trait]
impl SigningService for EnvKeyring {
    async fn sign(
        &self,
        chain: ChainId,
        address: &str,
        payload: &[u8],
    ) -> Result<Vec<u8>, SigningError> {
        match chain.family() {
            ChainFamily::Evm => self
                .evm
                .get(&address.to_lowercase())
                .ok_or_else(|| SigningError::NoKey(address.to_string()))?
                .sign_hash(payload),
            ChainFamily::Solana => Ok(self
                .solana
                .get(address)
                .ok_or_else(|| SigningError::NoKey(address.to_string()))?
                .sign_message(payload)),
        }
    }

    fn has_signer(&self, chain: ChainId, address: &str) -> bool {
        match chain.family() {
            ChainFamily::Evm => self.evm.contains_key(&address.to_lowercase()),
            ChainFamily::Solana => self.solana.contains_key(address),
        }
    }
}

impl std::fmt::Debug for EnvKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvKeyring")
            .field("addresses", &self.addresses())
            .finish()
    }
}
