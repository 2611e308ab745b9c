//! Software FIDO2 / CTAP2.1 authenticator core.
//!
//! The crate is a single request/response processor: one CBOR-framed CTAP2
//! command in, one status-byte-prefixed CBOR response out. Credentials are
//! stateless (the 64-byte credential ID authenticates itself against the
//! device master secret), persistent state is one AES-256-GCM sealed blob
//! keyed from the PIN, and user verification is pinUvAuthProtocol 2 only.
//!
//! All I/O (randomness, clock, blob persistence, the user-presence prompt)
//! is injected through [`platform::Platform`]. Transports (CTAPHID, NFC),
//! CLIs and on-disk container formats live in the embedding binary.

pub mod config;
pub mod cred;
pub mod pin;
pub mod platform;
pub mod store;
pub mod up;

pub(crate) mod ctap2;

use pin::PinUvAuthToken;
use platform::Platform;

/// The authenticator: injected platform plus the process-wide PIN/UV auth
/// token state. Everything else is loaded from (and written back to) the
/// platform per command.
pub struct Authenticator<P: Platform> {
    pub(crate) platform: P,
    pub(crate) token: PinUvAuthToken,
}

impl<P: Platform> Authenticator<P> {
    pub fn new(mut platform: P) -> Self {
        let token = PinUvAuthToken::initialize(&mut platform);
        Self { platform, token }
    }

    /// Process one CTAP2 command. Byte 0 is the command code, the remainder
    /// CBOR parameters. The response carries the CTAP status at byte 0 and
    /// the CBOR body, if any, after it. Never panics on hostile input.
    pub fn handle_command(&mut self, command: &[u8]) -> Vec<u8> {
        ctap2::dispatch(self, command)
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }
}
