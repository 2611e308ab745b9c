// authenticatorData flag bits: UP=0, UV=2, AT=6, ED=7.
pub(crate) const FLAG_UP: u8 = 0x01;
pub(crate) const FLAG_UV: u8 = 0x04;
pub(crate) const FLAG_AT: u8 = 0x40;

/// Build authenticatorData for MakeCredential (AT=1, includes attested
/// credential data: AAGUID ‖ credIdLen ‖ credId ‖ COSE key).
pub(crate) fn build_make_cred_auth_data(
    rp_id_hash: &[u8; 32],
    sign_count: u32,
    credential_id: &[u8],
    cose_key: &[u8],
) -> Vec<u8> {
    let cred_id_len = credential_id.len() as u16;
    let mut data = Vec::new();
    data.extend_from_slice(rp_id_hash);
    data.push(FLAG_UP | FLAG_UV | FLAG_AT);
    data.extend_from_slice(&sign_count.to_be_bytes());
    data.extend_from_slice(&crate::config::AAGUID);
    data.extend_from_slice(&cred_id_len.to_be_bytes());
    data.extend_from_slice(credential_id);
    data.extend_from_slice(cose_key);
    data
}

/// Build authenticatorData for GetAssertion (no AT flag).
pub(crate) fn build_get_assertion_auth_data(rp_id_hash: &[u8; 32], sign_count: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(rp_id_hash);
    data.push(FLAG_UP | FLAG_UV);
    data.extend_from_slice(&sign_count.to_be_bytes());
    data
}
