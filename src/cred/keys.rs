use ciborium::value::Value;
use hkdf::Hkdf;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::bigint::U256;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{FieldBytes, NonZeroScalar, Scalar, SecretKey};
use sha2::Sha256;
use zeroize::Zeroize;

use super::CredError;
use crate::up::UserPresenceProof;

pub const COSE_ALG_ES256: i64 = -7;

pub fn is_valid_algorithm(alg: i64) -> bool {
    alg == COSE_ALG_ES256
}

/// A per-credential P-256 signing key. Recomputed from the master secret and
/// the credential context for every operation; never persisted.
pub struct CredentialKeypair {
    signing: SigningKey,
}

impl CredentialKeypair {
    pub fn public_coords(&self) -> ([u8; 32], [u8; 32]) {
        let point = self.signing.verifying_key().to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(point.x().expect("uncompressed point has x"));
        y.copy_from_slice(point.y().expect("uncompressed point has y"));
        (x, y)
    }
}

/// Deterministic keypair: scalar = HKDF-expand(master, "CRED" ‖ context, 32)
/// reduced into the curve's scalar field. A zero scalar (negligible odds) is
/// reported as a derivation failure, not worked around.
pub fn derive_keypair(
    master: &[u8; 32],
    context: &[u8; 32],
) -> Result<CredentialKeypair, CredError> {
    let hk = Hkdf::<Sha256>::from_prk(master).map_err(|_| CredError::Derivation)?;
    let mut info = [0u8; 36];
    info[..4].copy_from_slice(b"CRED");
    info[4..].copy_from_slice(context);

    let mut okm = [0u8; 32];
    hk.expand(&info, &mut okm).map_err(|_| CredError::Derivation)?;

    let reduced = <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(okm));
    okm.zeroize();
    let scalar =
        Option::<NonZeroScalar>::from(NonZeroScalar::new(reduced)).ok_or(CredError::Derivation)?;
    let secret = SecretKey::from(scalar);

    Ok(CredentialKeypair {
        signing: SigningKey::from(&secret),
    })
}

/// Encode the credential public key as a COSE_Key map (kty=2, alg=ES256,
/// crv=P-256, x, y).
pub fn cose_public_key(kp: &CredentialKeypair) -> Vec<u8> {
    let (x, y) = kp.public_coords();
    let map = Value::Map(vec![
        (Value::Integer(1i64.into()), Value::Integer(2i64.into())),
        (
            Value::Integer(3i64.into()),
            Value::Integer(COSE_ALG_ES256.into()),
        ),
        (Value::Integer((-1i64).into()), Value::Integer(1i64.into())),
        (Value::Integer((-2i64).into()), Value::Bytes(x.to_vec())),
        (Value::Integer((-3i64).into()), Value::Bytes(y.to_vec())),
    ]);
    let mut buf = Vec::new();
    ciborium::into_writer(&map, &mut buf).expect("COSE key encoding is infallible");
    buf
}

/// ECDSA-P256-SHA256 over authData ‖ clientDataHash, DER-encoded. Takes the
/// user-presence proof so a signature cannot exist without a UP decision.
pub fn sign(
    kp: &CredentialKeypair,
    auth_data: &[u8],
    client_data_hash: &[u8],
    _proof: &UserPresenceProof,
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    msg.extend_from_slice(auth_data);
    msg.extend_from_slice(client_data_hash);
    let signature: Signature = kp.signing.sign(&msg);
    signature.to_der().as_bytes().to_vec()
}
