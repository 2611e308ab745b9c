mod common;

use ciborium::value::Value;
use common::*;
use fidelium::platform::UpDecision;

#[test]
fn test_get_info_status_ok() {
    let (mut auth, _state) = new_authenticator();
    let resp = auth.handle_command(&cmd(CMD_GET_INFO, None));
    assert_eq!(resp[0], 0x00, "GetInfo must return CTAP2_OK (0x00)");
}

#[test]
fn test_first_boot_initializes_state() {
    let (mut auth, state) = new_authenticator();
    assert!(state.borrow().stored.is_none());

    let resp = auth.handle_command(&cmd(CMD_GET_INFO, None));
    assert_eq!(resp[0], 0x00);
    assert!(
        state.borrow().stored.is_some(),
        "first command must trigger the first-boot reset"
    );
    assert_eq!(get_pin_retries(&mut auth), 8);
}

#[test]
fn test_get_info_versions_and_aaguid() {
    let (mut auth, _state) = new_authenticator();
    let resp = auth.handle_command(&cmd(CMD_GET_INFO, None));
    assert_eq!(resp[0], 0x00);
    let map = parse_body(&resp[1..]);

    let versions = map_get(&map, 0x01).expect("key 0x01 (versions) missing");
    let Value::Array(arr) = versions else {
        panic!("versions is not an array")
    };
    assert!(
        arr.iter().any(|v| matches!(v, Value::Text(s) if s == "FIDO_2_1")),
        "versions must contain FIDO_2_1"
    );

    let aaguid = map_get(&map, 0x03).expect("key 0x03 (aaguid) missing");
    let Value::Bytes(aaguid) = aaguid else {
        panic!("aaguid is not bytes")
    };
    assert_eq!(aaguid.as_slice(), &fidelium::config::AAGUID);
}

#[test]
fn test_get_info_options_and_pin_protocols() {
    let (mut auth, _state) = new_authenticator();
    let resp = auth.handle_command(&cmd(CMD_GET_INFO, None));
    assert_eq!(resp[0], 0x00);
    let map = parse_body(&resp[1..]);

    let opts = map_get(&map, 0x04).expect("key 0x04 (options) missing");
    let Value::Map(opts) = opts else {
        panic!("options is not a map")
    };
    let get_bool = |key: &str| {
        map_get_text(opts, key).and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })
    };
    assert_eq!(get_bool("clientPin"), Some(true), "clientPin must be true");
    assert_eq!(get_bool("pinUvAuthToken"), Some(true));
    assert_eq!(get_bool("rk"), Some(false), "no resident keys");
    assert_eq!(get_bool("uv"), Some(false), "no built-in UV");
    assert_eq!(get_bool("up"), Some(true));

    let protocols = map_get(&map, 0x06).expect("key 0x06 (pinUvAuthProtocols) missing");
    let Value::Array(protocols) = protocols else {
        panic!("pinUvAuthProtocols is not an array")
    };
    assert_eq!(protocols.len(), 1);
    assert_eq!(protocols[0], Value::Integer(2i64.into()), "protocol v2 only");

    let force = map_get(&map, 0x0C).expect("key 0x0C (forcePINChange) missing");
    assert_eq!(force, &Value::Bool(false));
}

#[test]
fn test_get_pin_retries_reports_power_cycle_false() {
    let (mut auth, _state) = new_authenticator();
    let resp = auth.handle_command(&cmd(
        CMD_CLIENT_PIN,
        Some(int_map(vec![(2, Value::Integer(1i64.into()))])),
    ));
    assert_eq!(resp[0], 0x00);
    let map = parse_body(&resp[1..]);
    assert_eq!(map_get(&map, 3), Some(&Value::Integer(8i64.into())));
    assert_eq!(map_get(&map, 4), Some(&Value::Bool(false)));
}

#[test]
fn test_unknown_command_rejected() {
    let (mut auth, _state) = new_authenticator();
    let resp = auth.handle_command(&[0x3F]);
    assert_eq!(resp, vec![0x01], "unknown command must be invalid_command");
}

#[test]
fn test_empty_command_rejected() {
    let (mut auth, _state) = new_authenticator();
    let resp = auth.handle_command(&[]);
    assert_eq!(resp, vec![0x01]);
}

#[test]
fn test_selection_requires_user_presence() {
    let (mut auth, state) = new_authenticator();

    let resp = auth.handle_command(&cmd(CMD_SELECTION, None));
    assert_eq!(resp, vec![0x00], "accepted selection has an empty body");
    assert_eq!(state.borrow().up_prompt_count, 1);

    state.borrow_mut().up_script.push(UpDecision::Denied);
    let resp = auth.handle_command(&cmd(CMD_SELECTION, None));
    assert_eq!(resp, vec![0x30]);

    state.borrow_mut().up_script.push(UpDecision::Timeout);
    let resp = auth.handle_command(&cmd(CMD_SELECTION, None));
    assert_eq!(resp, vec![0x30], "timeout counts as denial");
}

#[test]
fn test_get_info_does_not_touch_nonce() {
    let (mut auth, state) = new_authenticator();
    auth.handle_command(&cmd(CMD_GET_INFO, None));
    let nonce_before = stored_blob(&state).meta.nonce_counter;
    auth.handle_command(&cmd(CMD_GET_INFO, None));
    let nonce_after = stored_blob(&state).meta.nonce_counter;
    assert_eq!(
        nonce_before, nonce_after,
        "a read-only command must not advance the nonce"
    );
}
