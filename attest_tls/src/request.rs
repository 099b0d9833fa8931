use crate::error::Error;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Uri;

/// An outgoing request as seen by the decision and substitution engines: the
/// target URL plus a mutable header map. The engines take it by value and
/// hand back the (possibly modified) request inside [`Decision::Proceed`].
#[derive(Clone, Debug)]
pub struct OutgoingRequest {
    uri: Uri,
    headers: HeaderMap,
}

impl OutgoingRequest {
    pub fn new(uri: Uri) -> Self {
        OutgoingRequest {
            uri,
            headers: HeaderMap::new(),
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or_default()
    }

    /// Header value by name, or None if absent or not valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Configuration(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Configuration(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_parts(self) -> (Uri, HeaderMap) {
        (self.uri, self.headers)
    }
}

/// Terminal verdict for one request lifecycle.
#[derive(Debug)]
pub enum Decision {
    /// Hand the (possibly modified) request to the transport.
    Proceed(OutgoingRequest),
    /// Do not send; the whole request may be retried later.
    Retry(Error),
    /// Do not send; retrying will not help.
    Fail(Error),
}

impl Decision {
    pub fn into_result(self) -> Result<OutgoingRequest, Error> {
        match self {
            Decision::Proceed(request) => Ok(request),
            Decision::Retry(err) | Decision::Fail(err) => Err(err),
        }
    }
}
