use openssl::error::ErrorStack;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("attestation subsystem could not be initialized: {0}")]
    Initialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("public key for host {host} does not match any pinned keys")]
    PinMismatch { host: String },

    #[error("unsupported public key algorithm or size: {algorithm} {bits} bits")]
    UnsupportedKey { algorithm: String, bits: u32 },

    #[error("network error, retry needed: {0}")]
    Networking(String),

    #[error("attestation rejected: {message} (ARC {arc}, reasons: {reasons:?})")]
    Rejection {
        message: String,
        arc: String,
        reasons: Vec<String>,
    },

    #[error("permanent attestation failure: {0}")]
    Permanent(String),

    #[error("OpenSsl ErrorStack: {0}")]
    Ssl(#[from] ErrorStack),

    #[error("config storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl Error {
    /// True for failures that are worth retrying at the transport layer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Networking(_))
    }
}
