//! App attestation for outgoing API requests: a per-request token fetch
//! decision engine, just-in-time secure string substitution into request
//! headers, and TLS certificate pinning against the attestation service's
//! pin set.
//!
//! The attestation SDK itself is a black box behind the
//! [`attestation::AttestationClient`] trait; this crate turns its outcomes
//! into proceed/retry/fail decisions and wires pin evaluation into an
//! openssl-backed hyper client.

pub mod attestation;
pub mod client;
pub mod config;
pub mod error;
pub mod policy;
pub mod request;
pub mod sdk_fake;
pub mod service;
pub mod verifier;

mod constants;
