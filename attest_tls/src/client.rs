use crate::error::Error;
use crate::verifier::PinVerifier;
use hyper::client::HttpConnector;
use hyper::Client;
use hyper_openssl::HttpsConnector;
use openssl::pkey::{PKey, Public};
use openssl::ssl::{NameType, SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode};
use openssl::x509::{X509StoreContext, X509StoreContextRef};
use std::sync::Arc;
use tracing::warn;

pub trait ConnectorBuilder {
    fn ssl_connector_builder(&self) -> Result<SslConnectorBuilder, Error>;
    fn http_client(
        &self,
    ) -> Result<hyper::Client<HttpsConnector<HttpConnector>, hyper::body::Body>, Error>;
}

/// Builds HTTPS connectors whose handshakes are pinned through a
/// [`PinVerifier`]. Normal certificate validation still applies; pinning is
/// evaluated on top of it and can only reject, never accept.
pub struct PinnedBuilder {
    verifier: Arc<PinVerifier>,
}

impl PinnedBuilder {
    pub fn new(verifier: Arc<PinVerifier>) -> Self {
        PinnedBuilder { verifier }
    }
}

impl ConnectorBuilder for PinnedBuilder {
    fn http_client(
        &self,
    ) -> Result<hyper::Client<HttpsConnector<HttpConnector>, hyper::body::Body>, Error> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let https = HttpsConnector::with_connector(http, self.ssl_connector_builder()?)?;
        Ok(Client::builder().build::<_, hyper::Body>(https))
    }

    fn ssl_connector_builder(&self) -> Result<SslConnectorBuilder, Error> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;

        let cert_cb_verifier = self.verifier.clone();
        let cert_cb = move |result: bool, chain: &mut X509StoreContextRef| -> bool {
            verify_server_pins(&cert_cb_verifier, result, chain)
        };
        builder.set_verify_callback(SslVerifyMode::PEER, cert_cb);

        Ok(builder)
    }
}

fn verify_server_pins(
    verifier: &Arc<PinVerifier>,
    result: bool,
    chain: &mut X509StoreContextRef,
) -> bool {
    let depth = chain.error_depth();
    if depth != 0 {
        return result;
    }
    // Pinning is additional to the normal chain validation, never a
    // replacement for it.
    if !result {
        return false;
    }

    let ssl_idx = X509StoreContext::ssl_idx().expect("ssl_idx invalid");
    let ssl = match chain.ex_data(ssl_idx) {
        Some(ssl) => ssl,
        None => return false,
    };
    let host = match ssl.servername(NameType::HOST_NAME) {
        Some(host) => host,
        None => {
            warn!("no SNI hostname available for pin evaluation");
            return false;
        }
    };

    let server_keys: Vec<PKey<Public>> = match chain.chain() {
        Some(certs) => certs.iter().filter_map(|cert| cert.public_key().ok()).collect(),
        None => Vec::new(),
    };

    match verifier.evaluate(&server_keys, host) {
        Ok(()) => true,
        Err(err) => {
            warn!(host, error = %err, "rejecting TLS handshake");
            false
        }
    }
}
