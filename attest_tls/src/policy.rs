use std::collections::HashMap;
use std::sync::RwLock;

const DEFAULT_TOKEN_HEADER: &str = "Attestation-Token";

/// Point-in-time copy of the request-facing policy settings. Taken once per
/// request so a concurrent writer can never expose a half-updated view.
#[derive(Clone, Debug)]
pub struct PolicySnapshot {
    pub token_header: String,
    pub token_prefix: String,
    pub bind_header: Option<String>,
    pub strict_binding: bool,
}

/// Concurrency-guarded mutable policy settings shared by all request threads.
/// Reads take small snapshots; writes take the exclusive lock.
#[derive(Debug)]
pub struct Policy {
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    token_header: String,
    token_prefix: String,
    bind_header: Option<String>,
    substitution_headers: HashMap<String, String>,
    strict_binding: bool,
    wildcard_fallback: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            inner: RwLock::new(Inner {
                token_header: DEFAULT_TOKEN_HEADER.to_owned(),
                token_prefix: String::new(),
                bind_header: None,
                substitution_headers: HashMap::new(),
                strict_binding: false,
                wildcard_fallback: true,
            }),
        }
    }
}

impl Policy {
    pub fn snapshot(&self) -> PolicySnapshot {
        let inner = self.inner.read().expect("policy lock poisoned");
        PolicySnapshot {
            token_header: inner.token_header.clone(),
            token_prefix: inner.token_prefix.clone(),
            bind_header: inner.bind_header.clone(),
            strict_binding: inner.strict_binding,
        }
    }

    /// Copy of the substitution rules (header name to required value prefix).
    pub fn substitution_rules(&self) -> HashMap<String, String> {
        let inner = self.inner.read().expect("policy lock poisoned");
        inner.substitution_headers.clone()
    }

    pub fn wildcard_fallback(&self) -> bool {
        self.inner.read().expect("policy lock poisoned").wildcard_fallback
    }

    pub fn set_token_header(&self, header: &str, prefix: &str) {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        inner.token_header = header.to_owned();
        inner.token_prefix = prefix.to_owned();
    }

    pub fn set_bind_header(&self, header: Option<&str>) {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        inner.bind_header = header.map(str::to_owned);
    }

    /// When strict, a configured bind header missing from a request fails the
    /// request; otherwise binding is skipped for that request.
    pub fn set_strict_binding(&self, strict: bool) {
        self.inner.write().expect("policy lock poisoned").strict_binding = strict;
    }

    /// When enabled, a host pinned with an empty set falls back to the
    /// wildcard `"*"` managed trust pins; when disabled such a host is open.
    pub fn set_wildcard_fallback(&self, enabled: bool) {
        self.inner.write().expect("policy lock poisoned").wildcard_fallback = enabled;
    }

    pub fn add_substitution_header(&self, header: &str, prefix: Option<&str>) {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        inner
            .substitution_headers
            .insert(header.to_owned(), prefix.unwrap_or_default().to_owned());
    }

    pub fn remove_substitution_header(&self, header: &str) {
        let mut inner = self.inner.write().expect("policy lock poisoned");
        inner.substitution_headers.remove(header);
    }
}
