//! pinUvAuthProtocol version 2 primitives: ECDH key agreement with HKDF
//! key derivation, AES-256-CBC with an explicit IV, and 16-byte HMAC tags.
//! Version 1 is intentionally not implemented.

use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ciborium::value::Value;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::bigint::U256;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, FieldBytes, NonZeroScalar, PublicKey, Scalar, SecretKey};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::platform::Platform;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

pub const COSE_ALG_ECDH_ES_HKDF_256: i64 = -25;

const AES_BLOCK: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid peer key")]
    InvalidPeerKey,
    #[error("bad ciphertext length")]
    BadLength,
}

/// 64 bytes derived from the ECDH output: AES-256-CBC key ‖ HMAC key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; 64],
}

impl SharedSecret {
    pub fn aes_key(&self) -> &[u8] {
        &self.bytes[..32]
    }

    pub fn hmac_key(&self) -> &[u8] {
        &self.bytes[32..]
    }
}

/// Fresh P-256 key from platform randomness. Rejection-free: the 32 random
/// bytes are reduced into the scalar field, retrying only on the negligible
/// zero outcome.
pub(crate) fn random_key<P: Platform>(platform: &mut P) -> SecretKey {
    loop {
        let mut buf = [0u8; 32];
        platform.rand_bytes(&mut buf);
        let reduced = <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(buf));
        buf.zeroize();
        if let Some(scalar) = Option::<NonZeroScalar>::from(NonZeroScalar::new(reduced)) {
            return SecretKey::from(scalar);
        }
    }
}

/// Key agreement per protocol v2: Z = ECDH x-coordinate, then
/// shared[0..32] = HKDF-extract(zero salt, Z) and
/// shared[32..64] = HKDF-expand(prk, "CTAP2 HMAC key", 32).
pub fn ecdh(
    private: &SecretKey,
    peer_x: &[u8; 32],
    peer_y: &[u8; 32],
) -> Result<SharedSecret, ProtocolError> {
    let point = EncodedPoint::from_affine_coordinates(
        FieldBytes::from_slice(peer_x),
        FieldBytes::from_slice(peer_y),
        false,
    );
    let peer = Option::<PublicKey>::from(PublicKey::from_encoded_point(&point))
        .ok_or(ProtocolError::InvalidPeerKey)?;

    let z = diffie_hellman(private.to_nonzero_scalar(), peer.as_affine());
    let (prk, hk) = Hkdf::<Sha256>::extract(Some(&[0u8; 32]), z.raw_secret_bytes());

    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&prk);
    hk.expand(b"CTAP2 HMAC key", &mut bytes[32..])
        .expect("32 bytes is a valid HKDF-SHA-256 output length");
    Ok(SharedSecret { bytes })
}

/// AES-256-CBC with the supplied IV; output is IV ‖ ciphertext. Plaintext
/// must be a whole number of blocks (protocol v2 never pads).
pub fn encrypt(key: &[u8], iv: &[u8; AES_BLOCK], plaintext: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if plaintext.is_empty() || plaintext.len() % AES_BLOCK != 0 {
        return Err(ProtocolError::BadLength);
    }
    let enc = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| ProtocolError::BadLength)?;
    let mut out = Vec::with_capacity(AES_BLOCK + plaintext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&enc.encrypt_padded_vec_mut::<NoPadding>(plaintext));
    Ok(out)
}

/// Split IV(16) ‖ body and decrypt the body with the shared AES key.
pub fn decrypt(shared: &SharedSecret, ciphertext: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if ciphertext.len() < 2 * AES_BLOCK || (ciphertext.len() - AES_BLOCK) % AES_BLOCK != 0 {
        return Err(ProtocolError::BadLength);
    }
    let (iv, body) = ciphertext.split_at(AES_BLOCK);
    let dec =
        Aes256CbcDec::new_from_slices(shared.aes_key(), iv).map_err(|_| ProtocolError::BadLength)?;
    dec.decrypt_padded_vec_mut::<NoPadding>(body)
        .map_err(|_| ProtocolError::BadLength)
}

/// First 16 bytes of HMAC-SHA256(key, message).
pub fn authenticate(key: &[u8], message: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(message);
    let digest = mac.finalize().into_bytes();
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&digest[..TAG_LEN]);
    tag
}

/// Constant-time tag check. Tags of any length other than 16 fail outright.
pub fn verify(key: &[u8], message: &[u8], tag: &[u8]) -> bool {
    if tag.len() != TAG_LEN {
        return false;
    }
    authenticate(key, message).ct_eq(tag).into()
}

/// COSE_Key map for the platform key-agreement key (kty=2, alg=-25, crv=P-256).
pub fn cose_key_agreement(public: &PublicKey) -> Value {
    let point = public.to_encoded_point(false);
    let x = point.x().expect("uncompressed point has x").to_vec();
    let y = point.y().expect("uncompressed point has y").to_vec();
    Value::Map(vec![
        (Value::Integer(1i64.into()), Value::Integer(2i64.into())),
        (
            Value::Integer(3i64.into()),
            Value::Integer(COSE_ALG_ECDH_ES_HKDF_256.into()),
        ),
        (Value::Integer((-1i64).into()), Value::Integer(1i64.into())),
        (Value::Integer((-2i64).into()), Value::Bytes(x)),
        (Value::Integer((-3i64).into()), Value::Bytes(y)),
    ])
}

/// Pull the affine coordinates out of a peer COSE_Key map. Requires an EC2
/// key with 32-byte coordinates; the alg field is not policed here.
pub fn parse_cose_key(value: &Value) -> Option<([u8; 32], [u8; 32])> {
    let Value::Map(map) = value else { return None };
    let get = |key: i64| {
        map.iter()
            .find(|(k, _)| k == &Value::Integer(key.into()))
            .map(|(_, v)| v)
    };
    match get(1) {
        Some(Value::Integer(kty)) if i128::from(*kty) == 2 => {}
        _ => return None,
    }
    let coord = |key: i64| -> Option<[u8; 32]> {
        match get(key) {
            Some(Value::Bytes(b)) if b.len() == 32 => {
                let mut out = [0u8; 32];
                out.copy_from_slice(b);
                Some(out)
            }
            _ => None,
        }
    };
    Some((coord(-2)?, coord(-3)?))
}
