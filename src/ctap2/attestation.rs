use ciborium::value::Value;

use super::types::{encode_response, Ctap2Error};
use crate::config::{self, AttestationFormat};
use crate::cred::keys::COSE_ALG_ES256;

/// Build the attestation object: "packed" self-attestation with an ES256
/// signature, or the empty "none" statement when so configured.
pub(crate) fn build_attestation_object(
    auth_data: &[u8],
    der_sig: &[u8],
) -> Result<Vec<u8>, Ctap2Error> {
    let (fmt, att_stmt) = match config::ATTESTATION_FORMAT {
        AttestationFormat::Packed => (
            "packed",
            Value::Map(vec![
                (
                    Value::Text("alg".to_string()),
                    Value::Integer(COSE_ALG_ES256.into()),
                ),
                (
                    Value::Text("sig".to_string()),
                    Value::Bytes(der_sig.to_vec()),
                ),
            ]),
        ),
        AttestationFormat::None => ("none", Value::Map(vec![])),
    };

    encode_response(Value::Map(vec![
        (Value::Integer(1i64.into()), Value::Text(fmt.to_string())),
        (
            Value::Integer(2i64.into()),
            Value::Bytes(auth_data.to_vec()),
        ),
        (Value::Integer(3i64.into()), att_stmt),
    ]))
}
