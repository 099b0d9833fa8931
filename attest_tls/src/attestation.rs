use crate::error::Error;
use std::collections::HashMap;

/// Pins as returned by the attestation service: hostname to a list of
/// base64-encoded SHA-256 SPKI fingerprints. The `"*"` entry, when present,
/// holds the managed trust fallback pins.
pub type PinMap = HashMap<String, Vec<String>>;

/// Outcome of a single attestation fetch. Produced once per client call and
/// never retried internally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttestationOutcome {
    /// The fetch succeeded. Carries the fetched artifact (token, secure
    /// string or JWT depending on the operation); a secure string lookup may
    /// legitimately yield no value.
    Success { value: Option<String> },
    NoNetwork,
    PoorNetwork,
    MitmDetected,
    UnprotectedUrl,
    UnknownUrl,
    NoService,
    /// The attestation service actively rejected the app. The ARC is an
    /// opaque reference code for diagnostics, not for policy branching.
    Rejected { arc: String, reasons: Vec<String> },
    UnknownKey,
    Disabled,
    BadKey,
    BadPayload,
    Other { code: i32 },
}

impl AttestationOutcome {
    /// Transient network-class outcomes; the caller may retry the whole
    /// request later.
    pub fn is_network_issue(&self) -> bool {
        matches!(
            self,
            AttestationOutcome::NoNetwork
                | AttestationOutcome::PoorNetwork
                | AttestationOutcome::MitmDetected
        )
    }

    /// Loggable status name. Never includes the fetched value.
    pub fn description(&self) -> String {
        match self {
            AttestationOutcome::Success { .. } => "success".to_owned(),
            AttestationOutcome::NoNetwork => "no network".to_owned(),
            AttestationOutcome::PoorNetwork => "poor network".to_owned(),
            AttestationOutcome::MitmDetected => "MitM detected".to_owned(),
            AttestationOutcome::UnprotectedUrl => "unprotected URL".to_owned(),
            AttestationOutcome::UnknownUrl => "unknown URL".to_owned(),
            AttestationOutcome::NoService => "no attestation service".to_owned(),
            AttestationOutcome::Rejected { .. } => "rejected".to_owned(),
            AttestationOutcome::UnknownKey => "unknown key".to_owned(),
            AttestationOutcome::Disabled => "feature disabled".to_owned(),
            AttestationOutcome::BadKey => "bad key".to_owned(),
            AttestationOutcome::BadPayload => "bad payload".to_owned(),
            AttestationOutcome::Other { code } => format!("failure code {code}"),
        }
    }
}

/// Result of a token fetch, which additionally reports whether the dynamic
/// configuration changed and should be re-persisted.
#[derive(Clone, Debug)]
pub struct TokenFetch {
    pub outcome: AttestationOutcome,
    pub config_changed: bool,
}

/// Boundary to the attestation SDK. All fetch operations block for the
/// duration of a network round trip; do not call them from a
/// latency-sensitive thread.
///
/// The production implementation is the vendor SDK binding; tests and the
/// example binary use [`crate::sdk_fake::FakeAttestationClient`].
pub trait AttestationClient: Send + Sync {
    fn initialize(&self, config: &str, update_config: Option<&str>) -> Result<(), Error>;

    fn fetch_token_and_wait(&self, url: &str) -> TokenFetch;

    fn fetch_config(&self) -> Option<String>;

    fn get_pins(&self, pin_type: &str) -> Option<PinMap>;

    /// Looks up a secure string by key. A non-`None` `new_def` defines a new
    /// value for this app instance; an empty string removes the entry.
    fn fetch_secure_string_and_wait(&self, key: &str, new_def: Option<&str>) -> AttestationOutcome;

    fn fetch_custom_jwt_and_wait(&self, payload: &str) -> AttestationOutcome;

    /// Binds the hash of the given value into the next fetched token.
    fn set_data_hash_in_token(&self, value: &str);

    fn set_user_property(&self, value: &str);
}
