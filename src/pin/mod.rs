pub mod protocol;

pub use protocol::{ProtocolError, SharedSecret};

use ciborium::value::Value;
use p256::SecretKey;
use zeroize::Zeroize;

use crate::config;
use crate::platform::Platform;
use crate::up::UserPresenceProof;

pub const PERM_MAKE_CREDENTIAL: u8 = 0x01;
pub const PERM_GET_ASSERTION: u8 = 0x02;
pub const PERM_CREDENTIAL_MANAGEMENT: u8 = 0x04;
pub const PERM_BIO_ENROLLMENT: u8 = 0x08;
pub const PERM_LARGE_BLOB_WRITE: u8 = 0x10;
pub const PERM_AUTHENTICATOR_CONFIG: u8 = 0x20;

/// Permissions this device can grant. Credential management, bio enrollment,
/// large blobs and authenticator config have no backing implementation.
pub const SUPPORTED_PERMISSIONS: u8 = PERM_MAKE_CREDENTIAL | PERM_GET_ASSERTION;

/// Process-wide PIN/UV auth token state. RAM only; guarded by the
/// single-threaded command loop rather than a lock.
pub struct PinUvAuthToken {
    key_agreement: SecretKey,
    pin_token: [u8; 32],
    /// Key currently able to unseal the secret blob; set on successful PIN
    /// entry, never persisted.
    pub(crate) pin_key: Option<[u8; 32]>,
    pub(crate) permissions: u8,
    pub(crate) rp_id: Option<String>,
    pub(crate) in_use: bool,
    pub(crate) user_present: bool,
    user_verified: bool,
    initial_usage_time: u32,
    rolling_timer: u32,
}

impl PinUvAuthToken {
    pub fn initialize<P: Platform>(platform: &mut P) -> Self {
        let mut token = Self {
            key_agreement: protocol::random_key(platform),
            pin_token: [0u8; 32],
            pin_key: None,
            permissions: 0,
            rp_id: None,
            in_use: false,
            user_present: false,
            user_verified: false,
            initial_usage_time: 0,
            rolling_timer: 0,
        };
        token.reset_token(platform);
        token
    }

    /// Roll the ephemeral key-agreement key. Called on every PIN mismatch.
    pub fn regenerate<P: Platform>(&mut self, platform: &mut P) {
        self.key_agreement = protocol::random_key(platform);
    }

    /// Roll the 32-byte pinUvAuthToken; outstanding tokens stop verifying.
    pub fn reset_token<P: Platform>(&mut self, platform: &mut P) {
        platform.rand_bytes(&mut self.pin_token);
    }

    pub fn key_agreement_cose(&self) -> Value {
        protocol::cose_key_agreement(&self.key_agreement.public_key())
    }

    pub fn ecdh(&self, peer_x: &[u8; 32], peer_y: &[u8; 32]) -> Result<SharedSecret, ProtocolError> {
        protocol::ecdh(&self.key_agreement, peer_x, peer_y)
    }

    pub fn begin_using(&mut self, user_present: bool, now: u32) {
        self.in_use = true;
        self.user_present = user_present;
        self.user_verified = true;
        self.initial_usage_time = now;
        self.rolling_timer = now;
    }

    /// Polled once per command before dispatch. Decays cached user presence
    /// after 30 s and the whole token after the max usage period.
    pub fn timer_observer(&mut self, now: u32) {
        if !self.in_use {
            return;
        }
        if now.wrapping_sub(self.rolling_timer) > config::USER_PRESENT_TIME_LIMIT_MS {
            self.user_present = false;
        }
        if now.wrapping_sub(self.initial_usage_time) > config::MAX_USAGE_PERIOD_MS {
            tracing::info!("pinUvAuthToken usage period elapsed, invalidating");
            self.in_use = false;
            self.permissions = 0;
            self.rp_id = None;
        }
    }

    pub fn user_verified_flag(&self) -> bool {
        self.in_use && self.user_verified
    }

    /// Check a pinUvAuthParam against the current token.
    pub fn verify_token(&self, message: &[u8], tag: &[u8]) -> bool {
        protocol::verify(&self.pin_token, message, tag)
    }

    /// Token ciphertext handed back by getPinUvAuthTokenUsingPin:
    /// IV(16) ‖ AES-CBC(pin_token) = 48 bytes.
    pub fn encrypt_token(
        &self,
        shared: &SharedSecret,
        iv: &[u8; 16],
    ) -> Result<Vec<u8>, ProtocolError> {
        protocol::encrypt(shared.aes_key(), iv, &self.pin_token)
    }

    /// Record a granted user-presence prompt against this token.
    pub(crate) fn grant_presence(&mut self, now: u32) {
        self.user_present = true;
        self.rolling_timer = now;
    }

    /// Presence proof backed by the (still valid) cached flag, if any.
    pub(crate) fn cached_presence(&self) -> Option<UserPresenceProof> {
        if self.in_use && self.user_present {
            Some(UserPresenceProof::cached())
        } else {
            None
        }
    }

    /// Post-assertion consumption: presence and verification are spent, and
    /// the permission mask becomes a bit this device never grants, so every
    /// later permission check fails.
    pub(crate) fn consume(&mut self) {
        self.user_present = false;
        self.user_verified = false;
        self.permissions = PERM_LARGE_BLOB_WRITE;
    }
}

impl Drop for PinUvAuthToken {
    fn drop(&mut self) {
        self.pin_token.zeroize();
        self.pin_key.zeroize();
    }
}
