use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::StoreError;

pub const BLOB_MAGIC: u8 = 0xF1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMeta {
    pub valid: u8,
    pub salt: [u8; 16],
    /// AEAD nonce, little-endian u96. Strictly increases over the lifetime of
    /// the device, including across resets (the pre-reset value is carried).
    pub nonce_counter: [u8; 12],
    pub pin_retries: u8,
}

/// The on-device record handed to `Platform::store`. Everything sensitive
/// lives inside `ciphertext`; the meta fields are authenticated only by the
/// fact that a wrong key or tampered ciphertext fails the AEAD tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicBlob {
    pub meta: BlobMeta,
    pub tag: [u8; 16],
    pub ciphertext: Vec<u8>,
    #[serde(default)]
    pub force_pin_change: Option<bool>,
}

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SecretBlob {
    pub master_secret: [u8; 32],
    /// Left half of SHA-256 of the current PIN.
    pub pin_hash: [u8; 16],
    pub pin_length: u8,
    pub sign_counter: u32,
}

/// Increment the little-endian nonce counter. All-0xFF refuses rather than
/// wrapping: a reused nonce under the same key breaks AES-GCM entirely.
pub(crate) fn bump_nonce(nonce: &mut [u8; 12]) -> Result<(), StoreError> {
    if nonce.iter().all(|&b| b == 0xFF) {
        return Err(StoreError::NonceExhausted);
    }
    for b in nonce.iter_mut() {
        let (v, carry) = b.overflowing_add(1);
        *b = v;
        if !carry {
            break;
        }
    }
    Ok(())
}
