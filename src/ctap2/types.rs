use ciborium::value::Value;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Ctap2Error {
    #[error("invalid command")]        InvalidCommand,
    #[error("invalid parameter")]      InvalidParameter,
    #[error("missing parameter")]      MissingParameter,
    #[error("credential excluded")]    CredentialExcluded,
    #[error("unsupported algorithm")]  UnsupportedAlgorithm,
    #[error("unsupported option")]     UnsupportedOption,
    #[error("no credentials")]         NoCredentials,
    #[error("operation denied")]       OperationDenied,
    #[error("pin invalid")]            PinInvalid,
    #[error("pin blocked")]            PinBlocked,
    #[error("pin auth invalid")]       PinAuthInvalid,
    #[error("pin policy violation")]   PinPolicyViolation,
    #[error("pin token expired")]      PuatExpired,
    #[error("unauthorized permission")] UnauthorizedPermission,
    #[error("cbor: {0}")]              Cbor(String),
    #[error("store: {0}")]             Store(#[from] crate::store::StoreError),
    #[error("cred: {0}")]              Cred(#[from] crate::cred::CredError),
    #[error("{0}")]                    Internal(String),
}

impl Ctap2Error {
    pub fn status_byte(&self) -> u8 {
        match self {
            Self::InvalidCommand         => 0x01,
            Self::InvalidParameter       => 0x02,
            Self::Cbor(_)                => 0x11,
            Self::MissingParameter       => 0x14,
            Self::CredentialExcluded     => 0x19,
            Self::UnsupportedAlgorithm   => 0x26,
            Self::UnsupportedOption      => 0x2C,
            Self::NoCredentials          => 0x2E,
            Self::OperationDenied        => 0x30,
            Self::PinInvalid             => 0x31,
            Self::PinBlocked             => 0x32,
            Self::PinAuthInvalid         => 0x33,
            Self::PinPolicyViolation     => 0x37,
            Self::PuatExpired            => 0x38,
            Self::UnauthorizedPermission => 0x40,
            Self::Store(_) | Self::Cred(_) | Self::Internal(_) => 0x7F,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MakeCredentialRequest {
    pub client_data_hash: Vec<u8>,
    pub rp_id:            String,
    pub rp_name:          Option<String>,
    pub user_display:     Option<String>,
    pub resident_key:     bool,
    pub uv_option:        bool,
    pub exclude_list:     Vec<Vec<u8>>,
    pub alg_ok:           bool,  // true if -7 (ES256) is in pubKeyCredParams
    pub pin_uv_auth_param:    Option<Vec<u8>>,
    pub pin_uv_auth_protocol: Option<i64>,
}

#[derive(Debug)]
pub(crate) struct GetAssertionRequest {
    pub rp_id:            String,
    pub client_data_hash: Vec<u8>,
    pub allow_list:       Vec<Vec<u8>>,
    pub uv_option:        bool,
    pub pin_uv_auth_param:    Option<Vec<u8>>,
    pub pin_uv_auth_protocol: Option<i64>,
}

#[derive(Debug)]
pub(crate) struct ClientPinRequest {
    pub protocol:          Option<i64>,
    pub sub_command:       i64,
    pub key_agreement:     Option<Value>,
    pub pin_uv_auth_param: Option<Vec<u8>>,
    pub new_pin_enc:       Option<Vec<u8>>,
    pub pin_hash_enc:      Option<Vec<u8>>,
    pub permissions:       Option<u64>,
    pub rp_id:             Option<String>,
}

// CBOR parsing helpers

pub(crate) fn parse_cbor(data: &[u8]) -> Result<Vec<(Value, Value)>, Ctap2Error> {
    let value: Value = ciborium::from_reader(data)
        .map_err(|e| Ctap2Error::Cbor(e.to_string()))?;
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(Ctap2Error::Cbor("expected map".into())),
    }
}

pub(crate) fn cbor_get<'a>(map: &'a [(Value, Value)], key: i64) -> Option<&'a Value> {
    let target = Value::Integer(key.into());
    map.iter().find(|(k, _)| k == &target).map(|(_, v)| v)
}

pub(crate) fn cbor_get_str<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Text(s) if s == key))
        .map(|(_, v)| v)
}

pub(crate) fn cbor_bytes(v: &Value) -> Option<&[u8]> {
    match v { Value::Bytes(b) => Some(b), _ => None }
}

pub(crate) fn cbor_text(v: &Value) -> Option<&str> {
    match v { Value::Text(s) => Some(s), _ => None }
}

pub(crate) fn cbor_bool(v: &Value) -> Option<bool> {
    match v { Value::Bool(b) => Some(*b), _ => None }
}

pub(crate) fn cbor_int(v: &Value) -> Option<i64> {
    match v { Value::Integer(i) => i64::try_from(i128::from(*i)).ok(), _ => None }
}

pub(crate) fn cbor_map(v: &Value) -> Option<&[(Value, Value)]> {
    match v { Value::Map(m) => Some(m), _ => None }
}

pub(crate) fn cbor_array(v: &Value) -> Option<&[Value]> {
    match v { Value::Array(a) => Some(a), _ => None }
}

pub(crate) fn encode_response(map: Value) -> Result<Vec<u8>, Ctap2Error> {
    let mut buf = Vec::new();
    ciborium::into_writer(&map, &mut buf).map_err(|e| Ctap2Error::Cbor(e.to_string()))?;
    Ok(buf)
}

fn descriptor_ids(list: &Value) -> Vec<Vec<u8>> {
    cbor_array(list).map_or(vec![], |arr| {
        arr.iter()
            .filter_map(|item| {
                let m = cbor_map(item)?;
                let id = cbor_get_str(m, "id").and_then(cbor_bytes)?;
                Some(id.to_vec())
            })
            .collect()
    })
}

impl TryFrom<&[u8]> for MakeCredentialRequest {
    type Error = Ctap2Error;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let map = parse_cbor(data)?;

        // 1: clientDataHash
        let client_data_hash = cbor_bytes(
            cbor_get(&map, 1).ok_or(Ctap2Error::MissingParameter)?,
        )
        .ok_or(Ctap2Error::MissingParameter)?
        .to_vec();

        // 2: rp
        let rp_val = cbor_get(&map, 2).ok_or(Ctap2Error::MissingParameter)?;
        let rp_map = cbor_map(rp_val).ok_or(Ctap2Error::MissingParameter)?;
        let rp_id = cbor_text(
            cbor_get_str(rp_map, "id").ok_or(Ctap2Error::MissingParameter)?,
        )
        .ok_or(Ctap2Error::MissingParameter)?
        .to_string();
        let rp_name = cbor_get_str(rp_map, "name").and_then(cbor_text).map(|s| s.to_string());

        // 3: user. Only the display name is consumed (for the UP prompt),
        // but the entry itself is mandatory.
        let user_val = cbor_get(&map, 3).ok_or(Ctap2Error::MissingParameter)?;
        let user_map = cbor_map(user_val).ok_or(Ctap2Error::MissingParameter)?;
        cbor_bytes(cbor_get_str(user_map, "id").ok_or(Ctap2Error::MissingParameter)?)
            .ok_or(Ctap2Error::MissingParameter)?;
        let user_display = cbor_get_str(user_map, "displayName").and_then(cbor_text).map(|s| s.to_string());

        // 4: pubKeyCredParams, checked for alg=-7
        let params_val = cbor_get(&map, 4).ok_or(Ctap2Error::MissingParameter)?;
        let alg_ok = cbor_array(params_val).map_or(false, |arr| {
            arr.iter().any(|item| {
                cbor_map(item).map_or(false, |m| {
                    cbor_get_str(m, "alg")
                        .and_then(cbor_int)
                        .map_or(false, crate::cred::is_valid_algorithm)
                })
            })
        });

        // 5: excludeList
        let exclude_list = cbor_get(&map, 5).map_or(vec![], descriptor_ids);

        // 7: options
        let options = cbor_get(&map, 7).and_then(cbor_map);
        let opt = |name: &str| options.and_then(|m| cbor_get_str(m, name)).and_then(cbor_bool);
        let resident_key = opt("rk").unwrap_or(false);
        let uv_option = opt("uv").unwrap_or(false);

        // 8: pinUvAuthParam, 9: pinUvAuthProtocol
        let pin_uv_auth_param = cbor_get(&map, 8).and_then(cbor_bytes).map(|b| b.to_vec());
        let pin_uv_auth_protocol = cbor_get(&map, 9).and_then(cbor_int);

        Ok(MakeCredentialRequest {
            client_data_hash,
            rp_id,
            rp_name,
            user_display,
            resident_key,
            uv_option,
            exclude_list,
            alg_ok,
            pin_uv_auth_param,
            pin_uv_auth_protocol,
        })
    }
}

impl TryFrom<&[u8]> for GetAssertionRequest {
    type Error = Ctap2Error;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let map = parse_cbor(data)?;

        // 1: rpId
        let rp_id = cbor_text(
            cbor_get(&map, 1).ok_or(Ctap2Error::MissingParameter)?,
        )
        .ok_or(Ctap2Error::MissingParameter)?
        .to_string();

        // 2: clientDataHash
        let client_data_hash = cbor_bytes(
            cbor_get(&map, 2).ok_or(Ctap2Error::MissingParameter)?,
        )
        .ok_or(Ctap2Error::MissingParameter)?
        .to_vec();

        // 3: allowList (optional)
        let allow_list = cbor_get(&map, 3).map_or(vec![], descriptor_ids);

        // 5: options
        let uv_option = cbor_get(&map, 5)
            .and_then(cbor_map)
            .and_then(|m| cbor_get_str(m, "uv"))
            .and_then(cbor_bool)
            .unwrap_or(false);

        // 6: pinUvAuthParam, 7: pinUvAuthProtocol
        let pin_uv_auth_param = cbor_get(&map, 6).and_then(cbor_bytes).map(|b| b.to_vec());
        let pin_uv_auth_protocol = cbor_get(&map, 7).and_then(cbor_int);

        Ok(GetAssertionRequest {
            rp_id,
            client_data_hash,
            allow_list,
            uv_option,
            pin_uv_auth_param,
            pin_uv_auth_protocol,
        })
    }
}

impl TryFrom<&[u8]> for ClientPinRequest {
    type Error = Ctap2Error;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let map = parse_cbor(data)?;

        // 2: subCommand is the only universally required field; each
        // sub-command checks its own parameter set.
        let sub_command = cbor_int(
            cbor_get(&map, 2).ok_or(Ctap2Error::MissingParameter)?,
        )
        .ok_or(Ctap2Error::MissingParameter)?;

        let permissions = cbor_get(&map, 9)
            .and_then(cbor_int)
            .and_then(|p| u64::try_from(p).ok());

        Ok(ClientPinRequest {
            protocol: cbor_get(&map, 1).and_then(cbor_int),
            sub_command,
            key_agreement: cbor_get(&map, 3).cloned(),
            pin_uv_auth_param: cbor_get(&map, 4).and_then(cbor_bytes).map(|b| b.to_vec()),
            new_pin_enc: cbor_get(&map, 5).and_then(cbor_bytes).map(|b| b.to_vec()),
            pin_hash_enc: cbor_get(&map, 6).and_then(cbor_bytes).map(|b| b.to_vec()),
            permissions,
            rp_id: cbor_get(&map, 10).and_then(cbor_text).map(|s| s.to_string()),
        })
    }
}
