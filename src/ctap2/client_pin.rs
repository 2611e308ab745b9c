use ciborium::value::Value;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::types::{encode_response, ClientPinRequest, Ctap2Error};
use super::Request;
use crate::pin::{protocol, SharedSecret, SUPPORTED_PERMISSIONS};
use crate::platform::Platform;
use crate::store::seal;
use crate::{config, Authenticator};

const SUB_GET_PIN_RETRIES: i64 = 0x01;
const SUB_GET_KEY_AGREEMENT: i64 = 0x02;
const SUB_CHANGE_PIN: i64 = 0x04;
const SUB_GET_PIN_UV_AUTH_TOKEN_USING_PIN: i64 = 0x09;

const PIN_HASH_LEN: usize = 16;
const PIN_PADDED_LEN: usize = 64;
const MAX_BOUND_RP_ID_LEN: usize = 64;

pub(crate) fn handle<P: Platform>(
    auth: &mut Authenticator<P>,
    req: &mut Request,
    params: &[u8],
) -> Result<Vec<u8>, Ctap2Error> {
    let cp = ClientPinRequest::try_from(params)?;

    match cp.sub_command {
        SUB_GET_PIN_RETRIES => get_pin_retries(req),
        SUB_GET_KEY_AGREEMENT => get_key_agreement(auth, &cp),
        SUB_CHANGE_PIN => change_pin(auth, req, &cp),
        SUB_GET_PIN_UV_AUTH_TOKEN_USING_PIN => get_token_using_pin(auth, req, &cp),
        // setPIN among them: the device ships with a PIN, so the initial-set
        // flow is a changePIN from the factory default.
        other => {
            tracing::warn!(sub_command = other, "unimplemented clientPIN sub-command");
            Err(Ctap2Error::InvalidCommand)
        }
    }
}

fn require_protocol_v2(protocol: Option<i64>) -> Result<(), Ctap2Error> {
    match protocol {
        None => Err(Ctap2Error::MissingParameter),
        Some(2) => Ok(()),
        Some(_) => Err(Ctap2Error::InvalidParameter),
    }
}

fn get_pin_retries(req: &Request) -> Result<Vec<u8>, Ctap2Error> {
    encode_response(Value::Map(vec![
        (
            Value::Integer(3i64.into()),
            Value::Integer(i64::from(req.public.meta.pin_retries).into()),
        ),
        (Value::Integer(4i64.into()), Value::Bool(false)),
    ]))
}

fn get_key_agreement<P: Platform>(
    auth: &Authenticator<P>,
    cp: &ClientPinRequest,
) -> Result<Vec<u8>, Ctap2Error> {
    require_protocol_v2(cp.protocol)?;
    encode_response(Value::Map(vec![(
        Value::Integer(1i64.into()),
        auth.token.key_agreement_cose(),
    )]))
}

/// Decrement the retry counter, decrypt the submitted PIN hash, and try to
/// unseal the secret blob with the key it derives. On success the retry
/// budget is restored, the key cached as the token's pin key, and the
/// unsealed secret placed on the request. On mismatch the key-agreement key
/// is rolled.
fn unlock_with_pin_hash<P: Platform>(
    auth: &mut Authenticator<P>,
    req: &mut Request,
    shared: &SharedSecret,
    pin_hash_enc: &[u8],
) -> Result<(), Ctap2Error> {
    // Burn the attempt before looking at anything the platform sent.
    req.public.meta.pin_retries -= 1;
    req.meta_dirty = true;

    let mut decrypted = match protocol::decrypt(shared, pin_hash_enc) {
        Ok(d) if d.len() == PIN_HASH_LEN => d,
        _ => return Err(mismatch(auth, req)),
    };
    let mut pin_hash = [0u8; PIN_HASH_LEN];
    pin_hash.copy_from_slice(&decrypted);
    decrypted.zeroize();

    let key = seal::blob_key(&req.public.meta.salt, &pin_hash);
    let secret = match seal::decrypt_secret(&req.public, &key) {
        Ok(secret) => secret,
        Err(_) => return Err(mismatch(auth, req)),
    };
    if !bool::from(secret.pin_hash.ct_eq(&pin_hash)) {
        return Err(mismatch(auth, req));
    }

    req.public.meta.pin_retries = config::PIN_RETRY_LIMIT;
    auth.token.pin_key = Some(key);
    req.secret = Some(secret);
    Ok(())
}

/// Failed PIN check: roll the key-agreement key and report against the
/// already-decremented retry counter.
fn mismatch<P: Platform>(auth: &mut Authenticator<P>, req: &Request) -> Ctap2Error {
    tracing::warn!(retries = req.public.meta.pin_retries, "PIN mismatch");
    auth.token.regenerate(&mut auth.platform);
    if req.public.meta.pin_retries == 0 {
        Ctap2Error::PinBlocked
    } else {
        Ctap2Error::PinInvalid
    }
}

/// PIN = the zero-free prefix of the 64-byte padded plaintext, bounded at 63.
fn parse_padded_pin(plain: &[u8]) -> Result<&[u8], Ctap2Error> {
    if plain.len() != PIN_PADDED_LEN {
        return Err(Ctap2Error::InvalidParameter);
    }
    let len = plain.iter().take_while(|&&b| b != 0).count();
    if !(config::MIN_PIN_LENGTH..=config::MAX_PIN_LENGTH).contains(&len) {
        return Err(Ctap2Error::PinPolicyViolation);
    }
    Ok(&plain[..len])
}

fn change_pin<P: Platform>(
    auth: &mut Authenticator<P>,
    req: &mut Request,
    cp: &ClientPinRequest,
) -> Result<Vec<u8>, Ctap2Error> {
    require_protocol_v2(cp.protocol)?;
    let key_agreement = cp.key_agreement.as_ref().ok_or(Ctap2Error::MissingParameter)?;
    let new_pin_enc = cp.new_pin_enc.as_deref().ok_or(Ctap2Error::MissingParameter)?;
    let pin_hash_enc = cp.pin_hash_enc.as_deref().ok_or(Ctap2Error::MissingParameter)?;
    let pin_uv_auth_param = cp
        .pin_uv_auth_param
        .as_deref()
        .ok_or(Ctap2Error::MissingParameter)?;

    if req.public.meta.pin_retries == 0 {
        return Err(Ctap2Error::PinBlocked);
    }

    let (peer_x, peer_y) =
        protocol::parse_cose_key(key_agreement).ok_or(Ctap2Error::InvalidParameter)?;
    let shared = auth
        .token
        .ecdh(&peer_x, &peer_y)
        .map_err(|_| Ctap2Error::InvalidParameter)?;

    let mut message = Vec::with_capacity(new_pin_enc.len() + pin_hash_enc.len());
    message.extend_from_slice(new_pin_enc);
    message.extend_from_slice(pin_hash_enc);
    if !protocol::verify(shared.hmac_key(), &message, pin_uv_auth_param) {
        return Err(Ctap2Error::PinAuthInvalid);
    }

    unlock_with_pin_hash(auth, req, &shared, pin_hash_enc)?;

    let mut padded = protocol::decrypt(&shared, new_pin_enc)
        .map_err(|_| Ctap2Error::InvalidParameter)?;
    let (new_hash, new_len) = match parse_padded_pin(&padded) {
        Ok(pin) => (seal::pin_hash(pin), pin.len() as u8),
        Err(e) => {
            padded.zeroize();
            return Err(e);
        }
    };
    padded.zeroize();

    let secret = req
        .secret
        .as_mut()
        .ok_or_else(|| Ctap2Error::Internal("state not unsealed".into()))?;
    secret.pin_hash = new_hash;
    secret.pin_length = new_len;
    req.secret_dirty = true;
    req.public.force_pin_change = Some(false);

    // Reseal under the new PIN's key; outstanding tokens stop verifying.
    auth.token.pin_key = Some(seal::blob_key(&req.public.meta.salt, &new_hash));
    auth.token.reset_token(&mut auth.platform);
    tracing::info!(pin_length = new_len, "PIN changed");
    Ok(Vec::new())
}

fn get_token_using_pin<P: Platform>(
    auth: &mut Authenticator<P>,
    req: &mut Request,
    cp: &ClientPinRequest,
) -> Result<Vec<u8>, Ctap2Error> {
    require_protocol_v2(cp.protocol)?;
    let key_agreement = cp.key_agreement.as_ref().ok_or(Ctap2Error::MissingParameter)?;
    let pin_hash_enc = cp.pin_hash_enc.as_deref().ok_or(Ctap2Error::MissingParameter)?;
    let permissions = cp.permissions.ok_or(Ctap2Error::MissingParameter)?;

    if permissions == 0 {
        return Err(Ctap2Error::InvalidParameter);
    }
    if permissions & !u64::from(SUPPORTED_PERMISSIONS) != 0 {
        return Err(Ctap2Error::UnauthorizedPermission);
    }
    if let Some(rp_id) = &cp.rp_id {
        if rp_id.len() > MAX_BOUND_RP_ID_LEN {
            return Err(Ctap2Error::InvalidParameter);
        }
    }

    if req.public.meta.pin_retries == 0 {
        return Err(Ctap2Error::PinBlocked);
    }

    let (peer_x, peer_y) =
        protocol::parse_cose_key(key_agreement).ok_or(Ctap2Error::InvalidParameter)?;
    let shared = auth
        .token
        .ecdh(&peer_x, &peer_y)
        .map_err(|_| Ctap2Error::InvalidParameter)?;

    unlock_with_pin_hash(auth, req, &shared, pin_hash_enc)?;

    if req.public.force_pin_change.unwrap_or(false) {
        return Err(Ctap2Error::PinPolicyViolation);
    }

    auth.token.reset_token(&mut auth.platform);
    let now = auth.platform.millis();
    auth.token.begin_using(false, now);
    auth.token.permissions = permissions as u8;
    auth.token.rp_id = cp.rp_id.clone();

    let mut iv = [0u8; 16];
    auth.platform.rand_bytes(&mut iv);
    let token_enc = auth
        .token
        .encrypt_token(&shared, &iv)
        .map_err(|_| Ctap2Error::Internal("token encryption failed".into()))?;

    tracing::info!(
        permissions = format!("{permissions:#04x}"),
        rp = cp.rp_id.as_deref().unwrap_or("-"),
        "pinUvAuthToken issued"
    );
    encode_response(Value::Map(vec![(
        Value::Integer(2i64.into()),
        Value::Bytes(token_enc),
    )]))
}
