use sha2::{Digest, Sha256};

use super::attestation::build_attestation_object;
use super::authenticator_data::build_make_cred_auth_data;
use super::types::{Ctap2Error, MakeCredentialRequest};
use super::Request;
use crate::platform::Platform;
use crate::{cred, pin, up, Authenticator};

pub(crate) fn handle<P: Platform>(
    auth: &mut Authenticator<P>,
    req: &mut Request,
    params: &[u8],
) -> Result<Vec<u8>, Ctap2Error> {
    let mc = MakeCredentialRequest::try_from(params)?;

    // 1. No pinUvAuthParam: burn a user-presence prompt, then refuse in a
    // way that does not reveal whether a PIN is set.
    let Some(pin_uv_auth_param) = mc.pin_uv_auth_param.as_deref() else {
        let prompt =
            up::make_credential_prompt(&mc.rp_id, mc.rp_name.as_deref(), mc.user_display.as_deref());
        up::require_user_presence(&mut auth.platform, &prompt)?;
        return Err(Ctap2Error::PinInvalid);
    };

    // 2. Only pinUvAuthProtocol 2 is spoken.
    match mc.pin_uv_auth_protocol {
        None => return Err(Ctap2Error::MissingParameter),
        Some(2) => {}
        Some(_) => return Err(Ctap2Error::InvalidParameter),
    }

    // 3. ES256 must be acceptable to the relying party.
    if !mc.alg_ok {
        return Err(Ctap2Error::UnsupportedAlgorithm);
    }

    // 4. No resident keys, no built-in user verification.
    if mc.resident_key || mc.uv_option {
        return Err(Ctap2Error::UnsupportedOption);
    }

    // 5.-9. Token checks: liveness, MAC over clientDataHash, permission,
    // RP binding (bound on first use), user verification.
    if !auth.token.in_use {
        return Err(Ctap2Error::PuatExpired);
    }
    if !auth.token.verify_token(&mc.client_data_hash, pin_uv_auth_param) {
        return Err(Ctap2Error::PinAuthInvalid);
    }
    if auth.token.permissions & pin::PERM_MAKE_CREDENTIAL == 0 {
        return Err(Ctap2Error::PinAuthInvalid);
    }
    match &auth.token.rp_id {
        Some(bound) if bound != &mc.rp_id => return Err(Ctap2Error::PinAuthInvalid),
        Some(_) => {}
        None => auth.token.rp_id = Some(mc.rp_id.clone()),
    }
    if !auth.token.user_verified_flag() {
        return Err(Ctap2Error::PinAuthInvalid);
    }

    let secret = req
        .secret
        .as_mut()
        .ok_or_else(|| Ctap2Error::Internal("state not unsealed".into()))?;

    // An excluded credential minted by this device for this RP denies
    // creation, but only after the user has been shown a prompt.
    for entry in &mc.exclude_list {
        if cred::verify_cred_id(&secret.master_secret, entry, &mc.rp_id) {
            let prompt = up::make_credential_prompt(
                &mc.rp_id,
                mc.rp_name.as_deref(),
                mc.user_display.as_deref(),
            );
            up::require_user_presence(&mut auth.platform, &prompt)?;
            return Err(Ctap2Error::CredentialExcluded);
        }
    }

    // 10. User presence, fresh or cached on the token.
    let proof = match auth.token.cached_presence() {
        Some(proof) => proof,
        None => {
            let prompt = up::make_credential_prompt(
                &mc.rp_id,
                mc.rp_name.as_deref(),
                mc.user_display.as_deref(),
            );
            let proof = up::require_user_presence(&mut auth.platform, &prompt)?;
            let now = auth.platform.millis();
            auth.token.grant_presence(now);
            proof
        }
    };
    tracing::info!(rp = %mc.rp_id, "user presence confirmed");

    // 11. Mint the credential: fresh context, derived keypair,
    // self-authenticating ID.
    let context = cred::new_context(&mut auth.platform);
    let keypair = cred::derive_keypair(&secret.master_secret, &context)?;
    let cred_id = cred::make_cred_id(&secret.master_secret, &context, &mc.rp_id);

    secret.sign_counter += 1;
    req.secret_dirty = true;

    let rp_id_hash: [u8; 32] = Sha256::digest(mc.rp_id.as_bytes()).into();
    let cose_key = cred::cose_public_key(&keypair);
    let auth_data =
        build_make_cred_auth_data(&rp_id_hash, secret.sign_counter, &cred_id, &cose_key);

    // 12.-13. Self-attestation over authData ‖ clientDataHash.
    let der_sig = cred::sign(&keypair, &auth_data, &mc.client_data_hash, &proof);
    tracing::info!(rp = %mc.rp_id, sign_counter = secret.sign_counter, "credential created");

    build_attestation_object(&auth_data, &der_sig)
}
