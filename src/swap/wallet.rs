//! Follower wallet: key material and transaction signing.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use thiserror::Error;

const FOLLOWER_KEY_VAR: &str = "MIRROR_FOLLOWER_KEY";

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("{FOLLOWER_KEY_VAR} is not set")]
    MissingKey,

    #[error("secret key is not valid base58: {0}")]
    Encoding(#[from] bs58::decode::Error),

    #[error("secret key must be a 32-byte seed or 64-byte keypair, got {0} bytes")]
    Length(usize),

    #[error("secret key is not a valid ed25519 keypair")]
    Key(#[from] ed25519_dalek::SignatureError),

    #[error("transaction blob is not valid base64: {0}")]
    Blob(#[from] base64::DecodeError),

    #[error("transaction blob is malformed: {0}")]
    Malformed(&'static str),
}

/// The follower's signing identity.
pub struct Wallet {
    signing: SigningKey,
    pubkey: String,
}

impl Wallet {
    /// Load the wallet from the `MIRROR_FOLLOWER_KEY` environment variable.
    pub fn from_env() -> Result<Self, WalletError> {
        let secret = std::env::var(FOLLOWER_KEY_VAR).map_err(|_| WalletError::MissingKey)?;
        Self::from_base58(secret.trim())
    }

    /// Build a wallet from a base58-encoded secret. Accepts both the
    /// 64-byte keypair export format and a bare 32-byte seed.
    pub fn from_base58(secret: &str) -> Result<Self, WalletError> {
        let bytes = bs58::decode(secret).into_vec()?;
        let signing = match bytes.len() {
            64 => {
                let mut keypair = [0u8; 64];
                keypair.copy_from_slice(&bytes);
                SigningKey::from_keypair_bytes(&keypair)?
            }
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                SigningKey::from_bytes(&seed)
            }
            other => return Err(WalletError::Length(other)),
        };
        let pubkey = bs58::encode(signing.verifying_key().as_bytes()).into_string();
        Ok(Self { signing, pubkey })
    }

    /// The wallet's public key, base58 encoded.
    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }

    /// Sign a base64-encoded unsigned transaction from the aggregator.
    ///
    /// The blob starts with a shortvec signature count followed by the
    /// signature slots and then the message bytes. The wallet is the fee
    /// payer, so its signature goes into slot zero; the rest of the blob
    /// is untouched.
    pub fn sign_transaction(&self, tx_base64: &str) -> Result<String, WalletError> {
        let mut blob = BASE64.decode(tx_base64)?;
        let (count, offset) =
            decode_shortvec(&blob).ok_or(WalletError::Malformed("unreadable signature count"))?;
        if count == 0 {
            return Err(WalletError::Malformed("no signature slots"));
        }
        let sigs_end = offset + count * 64;
        if blob.len() <= sigs_end {
            return Err(WalletError::Malformed("truncated signature table"));
        }

        let signature = self.signing.sign(&blob[sigs_end..]);
        blob[offset..offset + 64].copy_from_slice(&signature.to_bytes());
        Ok(BASE64.encode(blob))
    }
}

/// Decode a shortvec length prefix: 7 bits per byte, high bit continues,
/// at most three bytes. Returns the value and the bytes consumed.
fn decode_shortvec(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0usize;
    for (index, byte) in bytes.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as usize) << (7 * index);
        if byte & 0x80 == 0 {
            return Some((value, index + 1));
        }
    }
    None
}
