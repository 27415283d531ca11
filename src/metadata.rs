use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::CallerInfo;
use crate::types::SealedMetadata;

const NONCE_LEN: usize = 24;

/// Plaintext sealed into every outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerMetadata {
    pub token_adler32: u32,
    pub caller_addr: String,
    pub caller_addrs: Vec<String>,
}

impl CallerMetadata {
    pub fn from_caller(caller: &CallerInfo) -> Self {
        Self {
            token_adler32: token_checksum(&caller.token),
            caller_addr: caller.primary_addr.clone(),
            caller_addrs: caller.addr_chain.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("metadata serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("metadata encryption failure")]
    Encrypt,
    #[error("metadata decryption failure")]
    Decrypt,
    #[error("sealed metadata is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("sealed metadata too short")]
    Truncated,
}

/// Adler-32 of the token. Good enough to correlate callers in logs; it is not
/// a secret-preserving digest.
pub fn token_checksum(token: &str) -> u32 {
    let mut adler = adler2::Adler32::new();
    adler.write_slice(token.as_bytes());
    adler.checksum()
}

/// Seals caller provenance with XChaCha20-Poly1305 under a key derived from
/// an operator-supplied secret.
#[derive(Clone)]
pub struct MetadataSealer {
    cipher: XChaCha20Poly1305,
}

impl MetadataSealer {
    pub fn new(secret: &str) -> Self {
        let key: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }

    /// Returns `base64(nonce || ciphertext)` wrapped for the message extension.
    pub fn seal(&self, caller: &CallerInfo) -> Result<SealedMetadata, SealError> {
        let plaintext = serde_json::to_vec(&CallerMetadata::from_caller(caller))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| SealError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(SealedMetadata {
            encrypted_caller_info: STANDARD.encode(out),
        })
    }

    pub fn open(&self, sealed: &SealedMetadata) -> Result<CallerMetadata, SealError> {
        let raw = STANDARD.decode(&sealed.encrypted_caller_info)?;
        if raw.len() <= NONCE_LEN {
            return Err(SealError::Truncated);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::Decrypt)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}
