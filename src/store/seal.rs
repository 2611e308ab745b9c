use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::blob::{bump_nonce, BlobMeta, PublicBlob, SecretBlob, BLOB_MAGIC};
use super::StoreError;
use crate::config;
use crate::platform::Platform;

const TAG_LEN: usize = 16;

/// AEAD key for the secret blob: HKDF-extract(salt, pin_hash).
/// Never stored; rederived from the PIN on every unlock.
pub fn blob_key(salt: &[u8; 16], pin_hash: &[u8; 16]) -> [u8; 32] {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), pin_hash);
    prk.into()
}

/// Left half of SHA-256 over the PIN bytes.
pub fn pin_hash(pin: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(pin);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Seal `secret` into `blob` under `key`, using the current nonce counter.
pub fn encrypt_secret(
    blob: &mut PublicBlob,
    secret: &SecretBlob,
    key: &[u8; 32],
) -> Result<(), StoreError> {
    let mut plain = Vec::new();
    ciborium::into_writer(secret, &mut plain)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| StoreError::Encryption(e.to_string()))?;
    let mut ct = cipher
        .encrypt(Nonce::from_slice(&blob.meta.nonce_counter), plain.as_slice())
        .map_err(|e| StoreError::Encryption(e.to_string()))?;
    plain.zeroize();

    let tag_off = ct.len() - TAG_LEN;
    blob.tag.copy_from_slice(&ct[tag_off..]);
    ct.truncate(tag_off);
    blob.ciphertext = ct;
    Ok(())
}

pub fn decrypt_secret(blob: &PublicBlob, key: &[u8; 32]) -> Result<SecretBlob, StoreError> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| StoreError::Encryption(e.to_string()))?;
    let mut buf = Vec::with_capacity(blob.ciphertext.len() + TAG_LEN);
    buf.extend_from_slice(&blob.ciphertext);
    buf.extend_from_slice(&blob.tag);

    let mut plain = cipher
        .decrypt(Nonce::from_slice(&blob.meta.nonce_counter), buf.as_slice())
        .map_err(|_| StoreError::Decryption)?;
    let secret = ciborium::from_reader(plain.as_slice())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    plain.zeroize();
    Ok(secret)
}

/// Fetch the stored public blob, or factory-reset on first boot.
pub fn load<P: Platform>(platform: &mut P) -> Result<PublicBlob, StoreError> {
    match platform.load() {
        Some(bytes) => {
            let blob: PublicBlob = ciborium::from_reader(bytes.as_slice())
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            if blob.meta.valid != BLOB_MAGIC {
                return Err(StoreError::Corrupt(format!(
                    "bad magic {:#04x}",
                    blob.meta.valid
                )));
            }
            Ok(blob)
        }
        None => {
            tracing::info!("no stored state, performing first-boot reset");
            reset(platform, [0u8; 12])
        }
    }
}

pub fn write<P: Platform>(platform: &mut P, blob: &PublicBlob) -> Result<(), StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(blob, &mut bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
    platform.store(&bytes);
    Ok(())
}

/// Bump the nonce, re-seal, persist. The single write a command performs.
/// Nonce moves after decryption and before re-encryption; a failed bump
/// leaves the stored state untouched.
pub fn commit<P: Platform>(
    platform: &mut P,
    blob: &mut PublicBlob,
    secret: &SecretBlob,
    key: &[u8; 32],
) -> Result<(), StoreError> {
    bump_nonce(&mut blob.meta.nonce_counter)?;
    encrypt_secret(blob, secret, key)?;
    write(platform, blob)
}

/// Factory state: fresh master secret and salt, the default PIN, full retry
/// budget, zero sign counter. `carry_nonce` is the pre-reset counter so the
/// nonce keeps growing even though the salt (and thus the key) is re-rolled.
pub fn reset<P: Platform>(
    platform: &mut P,
    carry_nonce: [u8; 12],
) -> Result<PublicBlob, StoreError> {
    let mut ikm = [0u8; 32];
    let mut extract_salt = [0u8; 32];
    platform.rand_bytes(&mut ikm);
    platform.rand_bytes(&mut extract_salt);
    let (master, _) = Hkdf::<Sha256>::extract(Some(&extract_salt), &ikm);
    ikm.zeroize();

    let mut salt = [0u8; 16];
    platform.rand_bytes(&mut salt);

    let secret = SecretBlob {
        master_secret: master.into(),
        pin_hash: pin_hash(config::DEFAULT_PIN.as_bytes()),
        pin_length: config::DEFAULT_PIN.len() as u8,
        sign_counter: 0,
    };

    let mut blob = PublicBlob {
        meta: BlobMeta {
            valid: BLOB_MAGIC,
            salt,
            nonce_counter: carry_nonce,
            pin_retries: config::PIN_RETRY_LIMIT,
        },
        tag: [0u8; 16],
        ciphertext: Vec::new(),
        force_pin_change: None,
    };

    let key = blob_key(&salt, &secret.pin_hash);
    commit(platform, &mut blob, &secret, &key)?;
    tracing::info!("factory reset complete");
    Ok(blob)
}
