pub const AAGUID: [u8; 16] = [
    0xf1, 0xd0, 0x6b, 0x4e, 0x3a, 0x17, 0x4c, 0x80, 0xb1, 0xd2, 0x9e, 0x3f, 0x00, 0x00, 0x00, 0x02,
];

/// PIN installed by a factory reset; rotated via authenticatorClientPIN/changePIN.
pub const DEFAULT_PIN: &str = "candystick";

pub const PIN_RETRY_LIMIT: u8 = 8;
pub const MIN_PIN_LENGTH: usize = 4;
/// Longest PIN that fits the zero-terminated 64-byte padded slot.
pub const MAX_PIN_LENGTH: usize = 63;

/// A pinUvAuthToken older than this is invalidated by the usage-timer observer.
pub const MAX_USAGE_PERIOD_MS: u32 = 600_000;
/// Cached user presence decays this long after it was granted.
pub const USER_PRESENT_TIME_LIMIT_MS: u32 = 30_000;

pub const MAX_MSG_SIZE: u64 = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationFormat {
    /// Packed self-attestation signed by the new credential key.
    Packed,
    /// Empty attestation statement.
    None,
}

pub const ATTESTATION_FORMAT: AttestationFormat = AttestationFormat::Packed;
