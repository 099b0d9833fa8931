use attest_tls::client::{ConnectorBuilder, PinnedBuilder};
use attest_tls::config::MemoryConfigStore;
use attest_tls::request::{Decision, OutgoingRequest};
use attest_tls::sdk_fake::FakeAttestationClient;
use attest_tls::service::AttestService;
use clap::Parser;
use hyper::body::HttpBody as _;
use std::sync::Arc;
use tokio::io::{stdout, AsyncWriteExt as _};
use tracing::info;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Attestation SDK configuration string.
    #[arg(long, default_value = "demo-config")]
    config: String,

    /// Header to mark for secure string substitution, as `name=prefix`.
    #[arg(long)]
    substitute: Option<String>,

    fetch_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();
    openssl_probe::init_ssl_cert_env_vars();

    let args = CliArgs::parse();

    // Scripted SDK with no pinned hosts; a real deployment provides the
    // vendor SDK binding here instead.
    let sdk = Arc::new(FakeAttestationClient::new());
    sdk.set_pins(Default::default());

    let service = Arc::new(AttestService::new(sdk, Arc::new(MemoryConfigStore::default())));
    service.initialize(&args.config)?;
    if let Some(rule) = &args.substitute {
        let (header, prefix) = rule.split_once('=').unwrap_or((rule.as_str(), ""));
        service.add_substitution_header(header, Some(prefix));
    }

    let uri: http::Uri = args.fetch_url.parse()?;
    let request = OutgoingRequest::new(uri);

    // Token fetches block for a network round trip; keep them off the
    // async executor.
    let attest = service.clone();
    let decision = tokio::task::spawn_blocking(move || attest.update_request(request)).await?;
    let attested = match decision {
        Decision::Proceed(request) => request,
        Decision::Retry(err) | Decision::Fail(err) => return Err(err.into()),
    };

    let builder = PinnedBuilder::new(Arc::new(service.pin_verifier()));
    let client = builder.http_client()?;

    let (uri, headers) = attested.into_parts();
    info!("Requesting page from: {}", uri);
    let mut http_request = hyper::Request::get(uri).body(hyper::Body::empty())?;
    *http_request.headers_mut() = headers;

    let mut resp = client.request(http_request).await?;
    info!("Response: {}", resp.status());
    while let Some(chunk) = resp.body_mut().data().await {
        stdout().write_all(&chunk?).await?;
    }

    Ok(())
}
