//! In-process signers
//!
//! SECURITY: These are the only types that hold private keys.
//! - Keys are never serialized
//! - Keys are never logged; `Debug` prints the public address only
//! - Only signatures leave this module

use super::SigningError;
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

/// secp256k1 key for EVM chains
pub struct EvmSigner {
    signer: PrivateKeySigner,
    address: Address,
}

impl EvmSigner {
    /// Create a signer from a hex-encoded private key
    pub fn from_hex(key_hex: &str) -> Result<Self, SigningError> {
        let key_hex = key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| SigningError::InvalidKey(format!("invalid EVM private key: {}", e)))?;
        let address = signer.address();

        Ok(Self { signer, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Lowercase hex address, the keyring's lookup form
    pub fn address_key(&self) -> String {
        format!("{:?}", self.address).to_lowercase()
    }

    /// Sign a 32-byte transaction hash, returning `r || s || v`
    pub fn sign_hash(&self, hash: &[u8]) -> Result<Vec<u8>, SigningError> {
        let hash: [u8; 32] = hash.try_into().map_err(|_| {
            SigningError::Payload(format!("expected a 32-byte hash, got {} bytes", hash.len()))
        })?;

        let signature = self
            .signer
            .sign_hash_sync(&B256::from(hash))
            .map_err(|e| SigningError::Failed(e.to_string()))?;
        Ok(signature.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmSigner")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

/// ed25519 keypair for Solana
pub struct SolanaSigner {
    keypair: Keypair,
}

impl SolanaSigner {
    /// Create a signer from a keypair file's JSON byte array
    pub fn from_json_bytes(json: &str) -> Result<Self, SigningError> {
        let bytes: Vec<u8> = serde_json::from_str(json.trim()).map_err(|e| {
            SigningError::InvalidKey(format!("keypair is not a JSON byte array: {}", e))
        })?;

        #[allow(deprecated)]
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| SigningError::InvalidKey(format!("invalid Solana keypair: {}", e)))?;

        Ok(Self { keypair })
    }

    /// Base58 public key
    pub fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    /// Sign a serialized transaction message, returning the 64-byte signature
    pub fn sign_message(&self, message: &[u8]) -> Vec<u8> {
        self.keypair.sign_message(message).as_ref().to_vec()
    }
}

impl std::fmt::Debug for SolanaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaSigner")
            .field("address", &self.address())
            .field("keypair", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (DO NOT use in production!)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_evm_signer_from_hex() {
        let signer = EvmSigner::from_hex(TEST_KEY).unwrap();
        assert_eq!(signer.address_key(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");

        let bare = EvmSigner::from_hex(TEST_KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(bare.address(), signer.address());
    }

    #[test]
    fn test_evm_signature_shape() {
        let signer = EvmSigner::from_hex(TEST_KEY).unwrap();
        let signature = signer.sign_hash(&[7u8; 32]).unwrap();
        assert_eq!(signature.len(), 65);

        let err = signer.sign_hash(&[7u8; 31]).unwrap_err();
        assert!(matches!(err, SigningError::Payload(_)));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let signer = EvmSigner::from_hex(TEST_KEY).unwrap();
        let debug_str = format!("{:?}", signer);
        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("[REDACTED]"));

        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let solana = SolanaSigner::from_json_bytes(&json).unwrap();
        assert!(format!("{:?}", solana).contains("[REDACTED]"));
    }

    #[test]
    fn test_solana_signer_round_trip() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let signer = SolanaSigner::from_json_bytes(&json).unwrap();

        assert_eq!(signer.address(), keypair.pubkey().to_string());
        assert_eq!(signer.sign_message(b"message").len(), 64);
        assert!(SolanaSigner::from_json_bytes("[1,2,3]").is_err());
        assert!(SolanaSigner::from_json_bytes("not json").is_err());
    }
}
