/// Pin type requested from the attestation client.
pub const PIN_TYPE: &str = "public-key-sha256";

/// User property reported to the attestation service to identify this
/// integration layer.
pub const USER_PROPERTY: &str = "attest-tls";

/// File name used for the persisted dynamic configuration.
pub const DYNAMIC_CONFIG_FILE: &str = "attest-dynamic.config";

// Fixed DER prefixes for SubjectPublicKeyInfo reconstruction, keyed by
// (algorithm, bit length). Appending the raw exported key bytes to the
// matching prefix yields the full SPKI encoding that pins are computed over.

pub const RSA_2048_SPKI_PREFIX: [u8; 24] = [
    0x30, 0x82, 0x01, 0x22, 0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01,
    0x01, 0x01, 0x05, 0x00, 0x03, 0x82, 0x01, 0x0f, 0x00,
];

pub const RSA_4096_SPKI_PREFIX: [u8; 24] = [
    0x30, 0x82, 0x02, 0x22, 0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01,
    0x01, 0x01, 0x05, 0x00, 0x03, 0x82, 0x02, 0x0f, 0x00,
];

pub const EC_P256_SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

pub const EC_P384_SPKI_PREFIX: [u8; 23] = [
    0x30, 0x76, 0x30, 0x10, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x05,
    0x2b, 0x81, 0x04, 0x00, 0x22, 0x03, 0x62, 0x00,
];
