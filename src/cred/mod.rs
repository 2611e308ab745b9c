pub mod id;
pub mod keys;

pub use id::{make_cred_id, verify_cred_id, CREDENTIAL_ID_LEN};
pub use keys::{cose_public_key, derive_keypair, is_valid_algorithm, sign, CredentialKeypair};

use crate::platform::Platform;

#[derive(Debug, thiserror::Error)]
pub enum CredError {
    #[error("key derivation failed")]
    Derivation,
}

/// Fresh 32-byte per-credential context. Doubles as the key-derivation input
/// and as the first half of the credential ID.
pub fn new_context<P: Platform>(platform: &mut P) -> [u8; 32] {
    let mut context = [0u8; 32];
    platform.rand_bytes(&mut context);
    context
}
