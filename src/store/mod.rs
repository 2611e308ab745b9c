pub mod blob;
pub mod seal;

pub use blob::{BlobMeta, PublicBlob, SecretBlob};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Encrypt: {0}")]
    Encryption(String),
    #[error("Decrypt failed")]
    Decryption,
    #[error("Corrupt: {0}")]
    Corrupt(String),
    #[error("Nonce counter exhausted")]
    NonceExhausted,
}
