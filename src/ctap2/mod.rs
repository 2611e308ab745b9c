pub(crate) mod types;
pub(crate) mod make_credential;
pub(crate) mod get_assertion;
pub(crate) mod get_info;
pub(crate) mod client_pin;
pub(crate) mod authenticator_data;
pub(crate) mod attestation;

use crate::pin::PinUvAuthToken;
use crate::platform::Platform;
use crate::store::{seal, PublicBlob, SecretBlob};
use crate::{up, Authenticator};
use types::Ctap2Error;

pub(crate) const CTAP2_CMD_MAKE_CREDENTIAL: u8 = 0x01;
pub(crate) const CTAP2_CMD_GET_ASSERTION:   u8 = 0x02;
pub(crate) const CTAP2_CMD_GET_INFO:        u8 = 0x04;
pub(crate) const CTAP2_CMD_CLIENT_PIN:      u8 = 0x06;
pub(crate) const CTAP2_CMD_RESET:           u8 = 0x07;
pub(crate) const CTAP2_CMD_SELECTION:       u8 = 0x0B;

pub(crate) const CTAP2_OK: u8 = 0x00;
pub(crate) const CTAP1_ERR_OTHER: u8 = 0x7F;

/// Per-command view of the persistent state plus write-back bookkeeping.
/// Handlers mutate this in place; the dispatcher owns persistence.
pub(crate) struct Request {
    pub public: PublicBlob,
    pub secret: Option<SecretBlob>,
    /// The sealed payload changed; write-back must bump the nonce and
    /// re-encrypt under the current pin key.
    pub secret_dirty: bool,
    /// Only plaintext meta (retry counter) changed; write-back rewrites the
    /// blob without touching nonce or ciphertext.
    pub meta_dirty: bool,
    /// Cleared by authenticatorReset, which performs its own store.
    pub write_back: bool,
}

/// Process one command: byte 0 is the command code, the rest CBOR
/// parameters. Returns status byte ‖ optional CBOR response.
pub(crate) fn dispatch<P: Platform>(auth: &mut Authenticator<P>, command: &[u8]) -> Vec<u8> {
    let Some((&cmd, params)) = command.split_first() else {
        return vec![Ctap2Error::InvalidCommand.status_byte()];
    };

    let now = auth.platform.millis();
    auth.token.timer_observer(now);

    let public = match seal::load(&mut auth.platform) {
        Ok(blob) => blob,
        Err(e) => {
            tracing::warn!(error = %e, "cannot load persistent state");
            return vec![CTAP1_ERR_OTHER];
        }
    };
    let secret = match auth.token.pin_key {
        Some(key) => match seal::decrypt_secret(&public, &key) {
            Ok(secret) => Some(secret),
            Err(e) => {
                tracing::warn!(error = %e, "cached key no longer unseals the state");
                return vec![CTAP1_ERR_OTHER];
            }
        },
        None => None,
    };

    let mut req = Request {
        public,
        secret,
        secret_dirty: false,
        meta_dirty: false,
        write_back: true,
    };

    let mut result = match cmd {
        CTAP2_CMD_MAKE_CREDENTIAL => make_credential::handle(auth, &mut req, params),
        CTAP2_CMD_GET_ASSERTION => get_assertion::handle(auth, &mut req, params),
        CTAP2_CMD_GET_INFO => get_info::handle(&req),
        CTAP2_CMD_CLIENT_PIN => client_pin::handle(auth, &mut req, params),
        CTAP2_CMD_RESET => handle_reset(auth, &mut req),
        CTAP2_CMD_SELECTION => handle_selection(auth),
        other => {
            tracing::warn!(cmd = format!("{other:#04x}"), "unknown CTAP2 command");
            Err(Ctap2Error::InvalidCommand)
        }
    };

    // Deferred write-back, on success and on error alike, so retry-counter
    // movement always lands.
    if req.write_back {
        if req.secret_dirty {
            match (req.secret.as_ref(), auth.token.pin_key) {
                (Some(secret), Some(key)) => {
                    if let Err(e) = seal::commit(&mut auth.platform, &mut req.public, secret, &key)
                    {
                        tracing::error!(error = %e, "state write-back failed");
                        if result.is_ok() {
                            result = Err(e.into());
                        }
                    }
                }
                _ => {
                    tracing::error!("dirty secret without an unseal key");
                    if result.is_ok() {
                        result = Err(Ctap2Error::Internal("missing unseal key".into()));
                    }
                }
            }
        } else if req.meta_dirty {
            if let Err(e) = seal::write(&mut auth.platform, &req.public) {
                tracing::error!(error = %e, "state write-back failed");
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
    }

    match result {
        Ok(body) => {
            let mut out = vec![CTAP2_OK];
            out.extend_from_slice(&body);
            out
        }
        Err(e) => vec![e.status_byte()],
    }
}

fn handle_reset<P: Platform>(
    auth: &mut Authenticator<P>,
    req: &mut Request,
) -> Result<Vec<u8>, Ctap2Error> {
    up::require_user_presence(&mut auth.platform, &up::reset_prompt())?;

    // The pre-reset nonce counter is carried so the counter keeps growing
    // even though the salt (and key) change underneath it.
    seal::reset(&mut auth.platform, req.public.meta.nonce_counter)?;
    auth.token = PinUvAuthToken::initialize(&mut auth.platform);
    req.write_back = false;
    tracing::info!("authenticator reset");
    Ok(Vec::new())
}

fn handle_selection<P: Platform>(auth: &mut Authenticator<P>) -> Result<Vec<u8>, Ctap2Error> {
    up::require_user_presence(&mut auth.platform, &up::selection_prompt())?;
    Ok(Vec::new())
}
