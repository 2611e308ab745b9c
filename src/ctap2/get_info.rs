use ciborium::value::Value;

use super::types::{encode_response, Ctap2Error};
use super::Request;
use crate::config;

/// Static device capabilities, with forcePINChange overlaid from the stored
/// public blob.
pub(crate) fn handle(req: &Request) -> Result<Vec<u8>, Ctap2Error> {
    let force_pin_change = req.public.force_pin_change.unwrap_or(false);

    encode_response(Value::Map(vec![
        (
            Value::Integer(0x01i64.into()),
            Value::Array(vec![Value::Text("FIDO_2_1".to_string())]),
        ),
        (Value::Integer(0x02i64.into()), Value::Array(vec![])),
        (
            Value::Integer(0x03i64.into()),
            Value::Bytes(config::AAGUID.to_vec()),
        ),
        (
            Value::Integer(0x04i64.into()),
            Value::Map(vec![
                (Value::Text("rk".to_string()), Value::Bool(false)),
                (Value::Text("up".to_string()), Value::Bool(true)),
                (Value::Text("uv".to_string()), Value::Bool(false)),
                (Value::Text("plat".to_string()), Value::Bool(false)),
                (Value::Text("clientPin".to_string()), Value::Bool(true)),
                (Value::Text("pinUvAuthToken".to_string()), Value::Bool(true)),
            ]),
        ),
        (
            Value::Integer(0x05i64.into()),
            Value::Integer((config::MAX_MSG_SIZE as i64).into()),
        ),
        (
            Value::Integer(0x06i64.into()),
            Value::Array(vec![Value::Integer(2i64.into())]),
        ),
        (
            Value::Integer(0x0Ci64.into()),
            Value::Bool(force_pin_change),
        ),
        (
            Value::Integer(0x0Di64.into()),
            Value::Integer((config::MIN_PIN_LENGTH as i64).into()),
        ),
    ]))
}
