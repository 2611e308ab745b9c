#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use ciborium::value::Value;
use fidelium::pin::protocol;
use fidelium::platform::{Platform, UpDecision};
use fidelium::up::UpPrompt;
use fidelium::Authenticator;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const CMD_MAKE_CREDENTIAL: u8 = 0x01;
pub const CMD_GET_ASSERTION: u8 = 0x02;
pub const CMD_GET_INFO: u8 = 0x04;
pub const CMD_CLIENT_PIN: u8 = 0x06;
pub const CMD_RESET: u8 = 0x07;
pub const CMD_SELECTION: u8 = 0x0B;

pub struct SharedState {
    pub now_ms: u32,
    pub stored: Option<Vec<u8>>,
    /// Scripted UP decisions, consumed front-first; empty means accept.
    pub up_script: Vec<UpDecision>,
    pub up_prompt_count: usize,
}

#[derive(Clone)]
pub struct TestPlatform {
    pub state: Rc<RefCell<SharedState>>,
}

impl TestPlatform {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SharedState {
                now_ms: 1_000,
                stored: None,
                up_script: Vec::new(),
                up_prompt_count: 0,
            })),
        }
    }
}

impl Platform for TestPlatform {
    fn rand_bytes(&mut self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf);
    }

    fn millis(&mut self) -> u32 {
        self.state.borrow().now_ms
    }

    fn load(&mut self) -> Option<Vec<u8>> {
        self.state.borrow().stored.clone()
    }

    fn store(&mut self, blob: &[u8]) {
        self.state.borrow_mut().stored = Some(blob.to_vec());
    }

    fn request_user_presence(&mut self, _prompt: &UpPrompt) -> UpDecision {
        let mut state = self.state.borrow_mut();
        state.up_prompt_count += 1;
        if state.up_script.is_empty() {
            UpDecision::Accepted
        } else {
            state.up_script.remove(0)
        }
    }
}

pub fn new_authenticator() -> (Authenticator<TestPlatform>, Rc<RefCell<SharedState>>) {
    let platform = TestPlatform::new();
    let state = platform.state.clone();
    (Authenticator::new(platform), state)
}

// CBOR plumbing

pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).unwrap();
    buf
}

pub fn cmd(cmd_byte: u8, params: Option<Value>) -> Vec<u8> {
    let mut out = vec![cmd_byte];
    if let Some(params) = params {
        out.extend_from_slice(&encode(&params));
    }
    out
}

pub fn int_map(entries: Vec<(i64, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::Integer(k.into()), v))
            .collect(),
    )
}

pub fn parse_body(body: &[u8]) -> Vec<(Value, Value)> {
    let value: Value = ciborium::from_reader(body).expect("response body is CBOR");
    match value {
        Value::Map(map) => map,
        other => panic!("response body is not a map: {other:?}"),
    }
}

pub fn map_get<'a>(map: &'a [(Value, Value)], key: i64) -> Option<&'a Value> {
    map.iter().find_map(|(k, v)| {
        if let Value::Integer(i) = k {
            if i128::from(*i) == i128::from(key) {
                return Some(v);
            }
        }
        None
    })
}

pub fn map_get_text<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Text(s) if s == key))
        .map(|(_, v)| v)
}

pub fn as_bytes(v: &Value) -> Vec<u8> {
    match v {
        Value::Bytes(b) => b.clone(),
        other => panic!("expected bytes, got {other:?}"),
    }
}

// Platform side of pinUvAuthProtocol 2

/// Fetch the authenticator's key-agreement key and run ECDH against a fresh
/// platform key. Returns the shared secret plus the platform COSE key to put
/// in follow-up requests.
pub fn platform_session(auth: &mut Authenticator<TestPlatform>) -> (protocol::SharedSecret, Value) {
    let resp = auth.handle_command(&cmd(
        CMD_CLIENT_PIN,
        Some(int_map(vec![
            (1, Value::Integer(2i64.into())),
            (2, Value::Integer(2i64.into())),
        ])),
    ));
    assert_eq!(resp[0], 0x00, "getKeyAgreement failed: {:#04x}", resp[0]);
    let body = parse_body(&resp[1..]);
    let cose = map_get(&body, 1).expect("keyAgreement in response");
    let (ax, ay) = protocol::parse_cose_key(cose).expect("authenticator COSE key parses");

    let platform_key = p256::SecretKey::random(&mut rand::rngs::OsRng);
    let shared = protocol::ecdh(&platform_key, &ax, &ay).expect("ECDH succeeds");
    let platform_cose = protocol::cose_key_agreement(&platform_key.public_key());
    (shared, platform_cose)
}

pub fn pin_hash(pin: &str) -> [u8; 16] {
    let digest = Sha256::digest(pin.as_bytes());
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

fn random_iv() -> [u8; 16] {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

pub fn encrypt_pin_hash(shared: &protocol::SharedSecret, pin: &str) -> Vec<u8> {
    protocol::encrypt(shared.aes_key(), &random_iv(), &pin_hash(pin)).unwrap()
}

pub fn encrypt_padded_pin(shared: &protocol::SharedSecret, pin: &str) -> Vec<u8> {
    assert!(pin.len() < 64, "padded slot holds at most 63 bytes");
    let mut slot = [0u8; 64];
    slot[..pin.len()].copy_from_slice(pin.as_bytes());
    protocol::encrypt(shared.aes_key(), &random_iv(), &slot).unwrap()
}

/// changePIN with `current`; returns the CTAP status byte.
pub fn change_pin(auth: &mut Authenticator<TestPlatform>, current: &str, new: &str) -> u8 {
    let (shared, platform_cose) = platform_session(auth);
    let pin_hash_enc = encrypt_pin_hash(&shared, current);
    let new_pin_enc = encrypt_padded_pin(&shared, new);

    let mut message = new_pin_enc.clone();
    message.extend_from_slice(&pin_hash_enc);
    let param = protocol::authenticate(shared.hmac_key(), &message);

    let resp = auth.handle_command(&cmd(
        CMD_CLIENT_PIN,
        Some(int_map(vec![
            (1, Value::Integer(2i64.into())),
            (2, Value::Integer(4i64.into())),
            (3, platform_cose),
            (4, Value::Bytes(param.to_vec())),
            (5, Value::Bytes(new_pin_enc)),
            (6, Value::Bytes(pin_hash_enc)),
        ])),
    ));
    resp[0]
}

/// getPinUvAuthTokenUsingPin; on success returns the decrypted 32-byte token.
pub fn get_token(
    auth: &mut Authenticator<TestPlatform>,
    pin: &str,
    permissions: u64,
    rp_id: Option<&str>,
) -> Result<Vec<u8>, u8> {
    let (shared, platform_cose) = platform_session(auth);
    let pin_hash_enc = encrypt_pin_hash(&shared, pin);

    let mut entries = vec![
        (1, Value::Integer(2i64.into())),
        (2, Value::Integer(9i64.into())),
        (3, platform_cose),
        (6, Value::Bytes(pin_hash_enc)),
        (9, Value::Integer((permissions as i64).into())),
    ];
    if let Some(rp_id) = rp_id {
        entries.push((10, Value::Text(rp_id.to_string())));
    }

    let resp = auth.handle_command(&cmd(CMD_CLIENT_PIN, Some(int_map(entries))));
    if resp[0] != 0x00 {
        return Err(resp[0]);
    }
    let body = parse_body(&resp[1..]);
    let token_enc = as_bytes(map_get(&body, 2).expect("pinUvAuthToken in response"));
    assert_eq!(token_enc.len(), 48, "token must be IV(16) + AES-CBC(32)");
    let token = protocol::decrypt(&shared, &token_enc).expect("token decrypts");
    assert_eq!(token.len(), 32);
    Ok(token)
}

pub fn get_pin_retries(auth: &mut Authenticator<TestPlatform>) -> u8 {
    let resp = auth.handle_command(&cmd(
        CMD_CLIENT_PIN,
        Some(int_map(vec![(2, Value::Integer(1i64.into()))])),
    ));
    assert_eq!(resp[0], 0x00, "getPINRetries failed: {:#04x}", resp[0]);
    let body = parse_body(&resp[1..]);
    match map_get(&body, 3) {
        Some(Value::Integer(i)) => u8::try_from(i128::from(*i)).unwrap(),
        other => panic!("pinRetries missing or wrong type: {other:?}"),
    }
}

// Command builders

pub fn make_credential_cmd(rp_id: &str, client_data_hash: &[u8; 32], token: &[u8]) -> Vec<u8> {
    let param = protocol::authenticate(token, client_data_hash);
    cmd(
        CMD_MAKE_CREDENTIAL,
        Some(int_map(vec![
            (1, Value::Bytes(client_data_hash.to_vec())),
            (
                2,
                Value::Map(vec![
                    (Value::Text("id".into()), Value::Text(rp_id.to_string())),
                    (Value::Text("name".into()), Value::Text("Example".into())),
                ]),
            ),
            (
                3,
                Value::Map(vec![
                    (Value::Text("id".into()), Value::Bytes(vec![1, 2, 3, 4])),
                    (Value::Text("name".into()), Value::Text("alice".into())),
                    (Value::Text("displayName".into()), Value::Text("Alice".into())),
                ]),
            ),
            (
                4,
                Value::Array(vec![Value::Map(vec![
                    (Value::Text("type".into()), Value::Text("public-key".into())),
                    (Value::Text("alg".into()), Value::Integer((-7i64).into())),
                ])]),
            ),
            (8, Value::Bytes(param.to_vec())),
            (9, Value::Integer(2i64.into())),
        ])),
    )
}

pub fn get_assertion_cmd(
    rp_id: &str,
    client_data_hash: &[u8; 32],
    allow_list: &[Vec<u8>],
    token: &[u8],
) -> Vec<u8> {
    let param = protocol::authenticate(token, client_data_hash);
    let descriptors = allow_list
        .iter()
        .map(|id| {
            Value::Map(vec![
                (Value::Text("type".into()), Value::Text("public-key".into())),
                (Value::Text("id".into()), Value::Bytes(id.clone())),
            ])
        })
        .collect();
    cmd(
        CMD_GET_ASSERTION,
        Some(int_map(vec![
            (1, Value::Text(rp_id.to_string())),
            (2, Value::Bytes(client_data_hash.to_vec())),
            (3, Value::Array(descriptors)),
            (6, Value::Bytes(param.to_vec())),
            (7, Value::Integer(2i64.into())),
        ])),
    )
}

/// Stored public blob, deserialized (for nonce/retry assertions).
pub fn stored_blob(state: &Rc<RefCell<SharedState>>) -> fidelium::store::PublicBlob {
    let bytes = state.borrow().stored.clone().expect("blob stored");
    ciborium::from_reader(bytes.as_slice()).expect("stored blob parses")
}
