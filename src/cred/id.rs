use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// context(32) ‖ HMAC-SHA256(master, context ‖ rp_id)(32).
pub const CREDENTIAL_ID_LEN: usize = 64;

fn credential_mac(master: &[u8; 32], context: &[u8; 32], rp_id: &str) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(master).expect("HMAC accepts any key size");
    mac.update(context);
    mac.update(rp_id.as_bytes());
    mac.finalize().into_bytes().into()
}

/// Package a self-authenticating credential ID. The authenticator stores
/// nothing per credential; the MAC binds the context to the relying party.
pub fn make_cred_id(master: &[u8; 32], context: &[u8; 32], rp_id: &str) -> [u8; CREDENTIAL_ID_LEN] {
    let mut id = [0u8; CREDENTIAL_ID_LEN];
    id[..32].copy_from_slice(context);
    id[32..].copy_from_slice(&credential_mac(master, context, rp_id));
    id
}

/// Recompute the MAC over the claimed context and the submitted rp_id and
/// compare in constant time. Anything but exactly 64 bytes fails.
pub fn verify_cred_id(master: &[u8; 32], cred_id: &[u8], rp_id: &str) -> bool {
    if cred_id.len() != CREDENTIAL_ID_LEN {
        return false;
    }
    let mut context = [0u8; 32];
    context.copy_from_slice(&cred_id[..32]);
    let expected = credential_mac(master, &context, rp_id);
    expected.ct_eq(&cred_id[32..]).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cred_id_roundtrip() {
        let master = [0x42u8; 32];
        let context = [0x07u8; 32];
        let id = make_cred_id(&master, &context, "example.com");
        assert_eq!(&id[..32], &context);
        assert!(verify_cred_id(&master, &id, "example.com"));
    }

    #[test]
    fn test_cred_id_rejects_other_rp() {
        let master = [0x42u8; 32];
        let context = [0x07u8; 32];
        let id = make_cred_id(&master, &context, "example.com");
        assert!(!verify_cred_id(&master, &id, "example.org"));
    }

    #[test]
    fn test_cred_id_rejects_other_master() {
        let context = [0x07u8; 32];
        let id = make_cred_id(&[0x42u8; 32], &context, "example.com");
        assert!(!verify_cred_id(&[0x43u8; 32], &id, "example.com"));
    }

    #[test]
    fn test_cred_id_rejects_wrong_length() {
        let master = [0x42u8; 32];
        let id = make_cred_id(&master, &[0u8; 32], "example.com");
        assert!(!verify_cred_id(&master, &id[..63], "example.com"));
        let mut long = id.to_vec();
        long.push(0);
        assert!(!verify_cred_id(&master, &long, "example.com"));
    }

    #[test]
    fn test_cred_id_rejects_forged_mac() {
        let master = [0x42u8; 32];
        let mut id = make_cred_id(&master, &[0x07u8; 32], "example.com");
        id[63] ^= 0x01;
        assert!(!verify_cred_id(&master, &id, "example.com"));
    }
}
