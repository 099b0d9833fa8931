use crate::attestation::{AttestationClient, PinMap};
use crate::constants;
use crate::error::Error;
use crate::policy::Policy;
use openssl::base64;
use openssl::bn::BigNumContext;
use openssl::ec::PointConversionForm;
use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{Id, PKey, PKeyRef, Public};
use std::sync::Arc;
use tracing::debug;

/// Per-handshake pin evaluator. Holds no mutable state of its own; the pin
/// table is fetched from the attestation client as a read-only snapshot on
/// every evaluation.
pub struct PinVerifier {
    client: Arc<dyn AttestationClient>,
    policy: Arc<Policy>,
}

impl PinVerifier {
    pub fn new(client: Arc<dyn AttestationClient>, policy: Arc<Policy>) -> Self {
        PinVerifier { client, policy }
    }

    /// Checks the server-presented public keys against the pins for `host`.
    ///
    /// Fails closed: a missing pin table, an unsupported key shape, or a
    /// non-empty effective pin set with no matching key all reject the
    /// handshake. A host with no pin entry, or an effectively empty set, is
    /// explicitly unpinned and passes without comparison.
    pub fn evaluate(&self, server_keys: &[PKey<Public>], host: &str) -> Result<(), Error> {
        let pins = self
            .client
            .get_pins(constants::PIN_TYPE)
            .ok_or_else(|| Error::PinMismatch {
                host: host.to_owned(),
            })?;

        let effective = match effective_pins(&pins, host, self.policy.wildcard_fallback()) {
            Some(set) => set,
            None => {
                debug!(host, "host not pinned, accepting");
                return Ok(());
            }
        };

        for key in server_keys {
            let fingerprint = key_fingerprint(key)?;
            if effective.iter().any(|pin| pin == &fingerprint) {
                debug!(host, "pinned key matched");
                return Ok(());
            }
        }
        Err(Error::PinMismatch {
            host: host.to_owned(),
        })
    }
}

/// Resolves the pin set to compare against, applying the empty-set wildcard
/// fallback rule. `None` means the host is effectively unpinned.
fn effective_pins<'a>(pins: &'a PinMap, host: &str, wildcard_fallback: bool) -> Option<&'a Vec<String>> {
    let entry = pins.get(host)?;
    if !entry.is_empty() {
        return Some(entry);
    }
    if wildcard_fallback {
        if let Some(wildcard) = pins.get("*") {
            if !wildcard.is_empty() {
                return Some(wildcard);
            }
        }
    }
    None
}

/// Base64-encoded SHA-256 over the key's reconstructed SPKI encoding.
pub fn key_fingerprint(key: &PKeyRef<Public>) -> Result<String, Error> {
    let spki = spki_encoding(key)?;
    let digest = hash(MessageDigest::sha256(), &spki)?;
    Ok(base64::encode_block(&digest))
}

/// Reconstructs the SubjectPublicKeyInfo encoding by prepending the fixed DER
/// prefix for the key's (algorithm, bit length) to the raw exported key
/// bytes. Unlisted pairs are a hard failure, never silently skipped.
pub fn spki_encoding(key: &PKeyRef<Public>) -> Result<Vec<u8>, Error> {
    let id = key.id();
    let bits = key.bits();
    let prefix: &[u8] = if id == Id::RSA && bits == 2048 {
        &constants::RSA_2048_SPKI_PREFIX
    } else if id == Id::RSA && bits == 4096 {
        &constants::RSA_4096_SPKI_PREFIX
    } else if id == Id::EC && bits == 256 {
        &constants::EC_P256_SPKI_PREFIX
    } else if id == Id::EC && bits == 384 {
        &constants::EC_P384_SPKI_PREFIX
    } else {
        return Err(Error::UnsupportedKey {
            algorithm: algorithm_name(id).to_owned(),
            bits,
        });
    };

    let raw = if id == Id::RSA {
        key.rsa()?.public_key_to_der_pkcs1()?
    } else {
        let ec = key.ec_key()?;
        let mut ctx = BigNumContext::new()?;
        ec.public_key()
            .to_bytes(ec.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)?
    };

    let mut spki = Vec::with_capacity(prefix.len() + raw.len());
    spki.extend_from_slice(prefix);
    spki.extend_from_slice(&raw);
    Ok(spki)
}

fn algorithm_name(id: Id) -> &'static str {
    if id == Id::RSA {
        "RSA"
    } else if id == Id::EC {
        "EC"
    } else {
        "unknown"
    }
}
