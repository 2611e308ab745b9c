pub(crate) mod prompt;

pub use prompt::UpPrompt;
pub(crate) use prompt::{get_assertion_prompt, make_credential_prompt, reset_prompt, selection_prompt};

use crate::ctap2::types::Ctap2Error;
use crate::platform::{Platform, UpDecision};

/// Evidence that a user-presence decision was obtained for this request.
/// The signing path demands one, so a signature cannot be produced without
/// either a fresh prompt or a still-valid cached presence flag.
pub struct UserPresenceProof {
    pub(crate) _private: (),
}

impl UserPresenceProof {
    /// Proof backed by the token's cached `user_present` flag.
    pub(crate) fn cached() -> Self {
        Self { _private: () }
    }

    /// Construct a proof for use in tests only.
    /// Do not use in production code — this bypasses user presence verification.
    #[doc(hidden)]
    pub fn test_only() -> Self {
        Self { _private: () }
    }
}

pub(crate) fn require_user_presence<P: Platform>(
    platform: &mut P,
    prompt: &UpPrompt,
) -> Result<UserPresenceProof, Ctap2Error> {
    match platform.request_user_presence(prompt) {
        UpDecision::Accepted => Ok(UserPresenceProof { _private: () }),
        UpDecision::Denied | UpDecision::Timeout => Err(Ctap2Error::OperationDenied),
    }
}
