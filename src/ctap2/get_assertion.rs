use ciborium::value::Value;
use sha2::{Digest, Sha256};

use super::authenticator_data::build_get_assertion_auth_data;
use super::types::{encode_response, Ctap2Error, GetAssertionRequest};
use super::Request;
use crate::platform::Platform;
use crate::{cred, pin, up, Authenticator};

/// First allowList entry whose MAC verifies against this device's master
/// secret and the submitted rpId. Entries shorter than a credential ID are
/// skipped outright.
fn select_credential(
    master: &[u8; 32],
    rp_id: &str,
    allow_list: &[Vec<u8>],
) -> Option<[u8; cred::CREDENTIAL_ID_LEN]> {
    for entry in allow_list {
        if entry.len() < cred::CREDENTIAL_ID_LEN {
            tracing::warn!(len = entry.len(), "skipping short allowList entry");
            continue;
        }
        if cred::verify_cred_id(master, entry, rp_id) {
            let mut id = [0u8; cred::CREDENTIAL_ID_LEN];
            id.copy_from_slice(entry);
            return Some(id);
        }
    }
    None
}

pub(crate) fn handle<P: Platform>(
    auth: &mut Authenticator<P>,
    req: &mut Request,
    params: &[u8],
) -> Result<Vec<u8>, Ctap2Error> {
    let ga = GetAssertionRequest::try_from(params)?;

    // Same opening dance as makeCredential: a missing pinUvAuthParam costs
    // the platform a prompt and reveals nothing.
    let Some(pin_uv_auth_param) = ga.pin_uv_auth_param.as_deref() else {
        let prompt = up::get_assertion_prompt(&ga.rp_id);
        up::require_user_presence(&mut auth.platform, &prompt)?;
        return Err(Ctap2Error::PinInvalid);
    };

    match ga.pin_uv_auth_protocol {
        None => return Err(Ctap2Error::MissingParameter),
        Some(2) => {}
        Some(_) => return Err(Ctap2Error::InvalidParameter),
    }

    if ga.uv_option {
        return Err(Ctap2Error::UnsupportedOption);
    }

    if !auth.token.in_use {
        return Err(Ctap2Error::PuatExpired);
    }
    if !auth.token.verify_token(&ga.client_data_hash, pin_uv_auth_param) {
        return Err(Ctap2Error::PinAuthInvalid);
    }
    if auth.token.permissions & pin::PERM_GET_ASSERTION == 0 {
        return Err(Ctap2Error::PinAuthInvalid);
    }
    match &auth.token.rp_id {
        Some(bound) if bound != &ga.rp_id => return Err(Ctap2Error::PinAuthInvalid),
        Some(_) => {}
        None => auth.token.rp_id = Some(ga.rp_id.clone()),
    }
    if !auth.token.user_verified_flag() {
        return Err(Ctap2Error::PinAuthInvalid);
    }

    let secret = req
        .secret
        .as_mut()
        .ok_or_else(|| Ctap2Error::Internal("state not unsealed".into()))?;

    let Some(cred_id) = select_credential(&secret.master_secret, &ga.rp_id, &ga.allow_list) else {
        return Err(Ctap2Error::NoCredentials);
    };

    let mut context = [0u8; 32];
    context.copy_from_slice(&cred_id[..32]);
    let keypair = cred::derive_keypair(&secret.master_secret, &context)?;

    let proof = match auth.token.cached_presence() {
        Some(proof) => proof,
        None => {
            let prompt = up::get_assertion_prompt(&ga.rp_id);
            let proof = up::require_user_presence(&mut auth.platform, &prompt)?;
            let now = auth.platform.millis();
            auth.token.grant_presence(now);
            proof
        }
    };
    tracing::info!(rp = %ga.rp_id, "user presence confirmed");

    secret.sign_counter += 1;
    req.secret_dirty = true;

    let rp_id_hash: [u8; 32] = Sha256::digest(ga.rp_id.as_bytes()).into();
    let auth_data = build_get_assertion_auth_data(&rp_id_hash, secret.sign_counter);
    let der_sig = cred::sign(&keypair, &auth_data, &ga.client_data_hash, &proof);
    tracing::info!(rp = %ga.rp_id, sign_counter = secret.sign_counter, "assertion signed");

    // The token is spent: presence and verification are cleared and the
    // permission mask is parked on a bit this device never grants.
    auth.token.consume();

    encode_response(Value::Map(vec![
        (
            Value::Integer(1i64.into()),
            Value::Map(vec![
                (
                    Value::Text("type".to_string()),
                    Value::Text("public-key".to_string()),
                ),
                (Value::Text("id".to_string()), Value::Bytes(cred_id.to_vec())),
            ]),
        ),
        (Value::Integer(2i64.into()), Value::Bytes(auth_data)),
        (Value::Integer(3i64.into()), Value::Bytes(der_sig)),
    ]))
}
