use crate::attestation::{AttestationClient, AttestationOutcome};
use crate::config::ConfigStore;
use crate::constants;
use crate::error::Error;
use crate::policy::Policy;
use crate::request::{Decision, OutgoingRequest};
use crate::verifier::PinVerifier;
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

/// Attestation service context: the token fetch decision engine and the
/// secure string substitution engine, plus the one-time SDK initialization.
///
/// One instance is shared by all request threads. All fetch operations block
/// for a network round trip; callers on a cooperative scheduler must run them
/// off the main loop (e.g. `spawn_blocking`).
pub struct AttestService {
    client: Arc<dyn AttestationClient>,
    store: Arc<dyn ConfigStore>,
    policy: Arc<Policy>,
    // Config string the SDK was initialized with, None until first success.
    init: Mutex<Option<String>>,
}

impl AttestService {
    pub fn new(client: Arc<dyn AttestationClient>, store: Arc<dyn ConfigStore>) -> Self {
        AttestService {
            client,
            store,
            policy: Arc::new(Policy::default()),
            init: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Pin evaluator sharing this service's attestation client and policy.
    pub fn pin_verifier(&self) -> PinVerifier {
        PinVerifier::new(self.client.clone(), self.policy.clone())
    }

    /// Initializes the attestation SDK exactly once per process lifetime.
    ///
    /// Idempotent for the same config string; initializing again with a
    /// different one is an error. Concurrent callers block until the first
    /// completes and then observe its result. On the first-ever launch (no
    /// persisted dynamic configuration) the SDK's current configuration is
    /// fetched and persisted for the next start.
    pub fn initialize(&self, config: &str) -> Result<(), Error> {
        let mut initialized = self.init.lock().expect("initializer lock poisoned");
        if let Some(previous) = initialized.as_deref() {
            if previous != config {
                return Err(Error::Initialization(
                    "already initialized with a different config".to_owned(),
                ));
            }
            return Ok(());
        }

        let dynamic = self.store.load();
        self.client.initialize(config, dynamic.as_deref())?;
        self.client.set_user_property(constants::USER_PROPERTY);
        if dynamic.is_none() {
            if let Some(new_config) = self.client.fetch_config() {
                self.store.save(&new_config)?;
            }
        }
        *initialized = Some(config.to_owned());
        info!("attestation SDK initialized");
        Ok(())
    }

    /// Interceptor entry point: decides on a token for the request and, when
    /// it may proceed, applies any configured header substitutions.
    pub fn update_request(&self, request: OutgoingRequest) -> Decision {
        let (decision, outcome) = self.fetch_and_decide(request);
        match (decision, outcome) {
            (Decision::Proceed(request), Some(outcome)) => self.substitute(request, &outcome),
            (decision, _) => decision,
        }
    }

    /// Token fetch decision engine: one fetch, one terminal decision.
    pub fn decide(&self, request: OutgoingRequest) -> Decision {
        self.fetch_and_decide(request).0
    }

    fn fetch_and_decide(
        &self,
        mut request: OutgoingRequest,
    ) -> (Decision, Option<AttestationOutcome>) {
        let snapshot = self.policy.snapshot();

        if let Some(bind_header) = &snapshot.bind_header {
            match request.header(bind_header) {
                Some(value) if !value.is_empty() => self.client.set_data_hash_in_token(value),
                _ if snapshot.strict_binding => {
                    let err = Error::Configuration(format!(
                        "missing token binding header {bind_header}"
                    ));
                    return (Decision::Fail(err), None);
                }
                _ => {}
            }
        }

        let fetched = self.client.fetch_token_and_wait(&request.uri().to_string());
        info!(
            host = request.host(),
            status = %fetched.outcome.description(),
            "token fetch"
        );

        if fetched.config_changed {
            if let Some(new_config) = self.client.fetch_config() {
                if let Err(err) = self.store.save(&new_config) {
                    warn!(error = %err, "failed to persist changed configuration");
                }
            }
        }

        let decision = match &fetched.outcome {
            AttestationOutcome::Success { value: Some(token) } => {
                let header_value = format!("{}{}", snapshot.token_prefix, token);
                match request.set_header(&snapshot.token_header, &header_value) {
                    Ok(()) => Decision::Proceed(request),
                    Err(err) => Decision::Fail(err),
                }
            }
            AttestationOutcome::Success { value: None } => Decision::Fail(Error::Permanent(
                "token fetch succeeded without a token".to_owned(),
            )),
            AttestationOutcome::NoNetwork
            | AttestationOutcome::PoorNetwork
            | AttestationOutcome::MitmDetected => {
                Decision::Retry(Error::Networking(fetched.outcome.description()))
            }
            // Proceed without a token header: the URL is not protected or not
            // known to the attestation service.
            AttestationOutcome::UnprotectedUrl
            | AttestationOutcome::UnknownUrl
            | AttestationOutcome::NoService => Decision::Proceed(request),
            AttestationOutcome::Rejected { arc, reasons } => Decision::Fail(Error::Rejection {
                message: "token fetch rejected".to_owned(),
                arc: arc.clone(),
                reasons: reasons.clone(),
            }),
            AttestationOutcome::UnknownKey
            | AttestationOutcome::Disabled
            | AttestationOutcome::BadKey
            | AttestationOutcome::BadPayload
            | AttestationOutcome::Other { .. } => {
                Decision::Fail(Error::Permanent(fetched.outcome.description()))
            }
        };
        (decision, Some(fetched.outcome))
    }

    /// Secure string substitution engine. Rewrites every configured header
    /// whose value carries the rule's required prefix, using the suffix as
    /// the lookup key. The first failing rule aborts the pass; the request is
    /// then unusable regardless of earlier substitutions.
    pub fn substitute(
        &self,
        mut request: OutgoingRequest,
        token_outcome: &AttestationOutcome,
    ) -> Decision {
        // Secrets must never be released to a request whose domain is not
        // registered with the attestation service.
        let unknown_domain = matches!(token_outcome, AttestationOutcome::UnknownUrl);

        for (header, prefix) in self.policy.substitution_rules() {
            let Some(value) = request.header(&header).map(str::to_owned) else {
                continue;
            };
            if !value.starts_with(&prefix) || value.len() <= prefix.len() {
                continue;
            }
            let key = &value[prefix.len()..];
            let outcome = self.client.fetch_secure_string_and_wait(key, None);
            debug!(header = %header, status = %outcome.description(), "substituting header");
            match outcome {
                AttestationOutcome::Success { value: Some(secret) } => {
                    if unknown_domain {
                        return Decision::Fail(Error::Configuration(
                            "header substitution: API domain unknown".to_owned(),
                        ));
                    }
                    let replacement = format!("{prefix}{secret}");
                    if let Err(err) = request.set_header(&header, &replacement) {
                        return Decision::Fail(err);
                    }
                }
                AttestationOutcome::Success { value: None } => {
                    return Decision::Fail(Error::Permanent(
                        "header substitution: key lookup error".to_owned(),
                    ));
                }
                AttestationOutcome::Rejected { arc, reasons } => {
                    return Decision::Fail(Error::Rejection {
                        message: "header substitution: rejected".to_owned(),
                        arc,
                        reasons,
                    });
                }
                outcome if outcome.is_network_issue() => {
                    return Decision::Retry(Error::Networking(
                        "header substitution: network issue, retry needed".to_owned(),
                    ));
                }
                // The rule simply does not apply to this value.
                AttestationOutcome::UnknownKey => {}
                outcome => {
                    return Decision::Fail(Error::Permanent(format!(
                        "header substitution: {}",
                        outcome.description()
                    )));
                }
            }
        }
        Decision::Proceed(request)
    }

    /// Marks a header for secure string substitution, with an optional
    /// required value prefix (such as `"Bearer "`).
    pub fn add_substitution_header(&self, header: &str, prefix: Option<&str>) {
        self.policy.add_substitution_header(header, prefix);
    }

    pub fn remove_substitution_header(&self, header: &str) {
        self.policy.remove_substitution_header(header);
    }

    /// Fetches a secure string by key, defining a new value when `new_def` is
    /// given. The returned value should never be cached by the application.
    pub fn fetch_secure_string(
        &self,
        key: &str,
        new_def: Option<&str>,
    ) -> Result<Option<String>, Error> {
        let kind = if new_def.is_none() { "lookup" } else { "definition" };
        let outcome = self.client.fetch_secure_string_and_wait(key, new_def);
        info!(kind, status = %outcome.description(), "fetch secure string");
        match outcome {
            AttestationOutcome::Success { value } => Ok(value),
            AttestationOutcome::UnknownKey => Ok(None),
            AttestationOutcome::Disabled => Err(Error::Configuration(
                "fetch secure string: feature disabled".to_owned(),
            )),
            AttestationOutcome::BadKey => Err(Error::Permanent(
                "fetch secure string: bad key".to_owned(),
            )),
            AttestationOutcome::Rejected { arc, reasons } => Err(Error::Rejection {
                message: "fetch secure string: rejected".to_owned(),
                arc,
                reasons,
            }),
            outcome if outcome.is_network_issue() => Err(Error::Networking(
                "fetch secure string: network issue, retry needed".to_owned(),
            )),
            outcome => Err(Error::Permanent(format!(
                "fetch secure string: {}",
                outcome.description()
            ))),
        }
    }

    /// Fetches a custom JWT for the given marshaled JSON payload.
    pub fn fetch_custom_jwt(&self, payload: &str) -> Result<String, Error> {
        let outcome = self.client.fetch_custom_jwt_and_wait(payload);
        info!(status = %outcome.description(), "fetch custom JWT");
        match outcome {
            AttestationOutcome::Success { value: Some(token) } => Ok(token),
            AttestationOutcome::Success { value: None } => Err(Error::Permanent(
                "fetch custom JWT: no token returned".to_owned(),
            )),
            AttestationOutcome::BadPayload => Err(Error::Permanent(
                "fetch custom JWT: malformed JSON payload".to_owned(),
            )),
            AttestationOutcome::Disabled => Err(Error::Configuration(
                "fetch custom JWT: feature not enabled".to_owned(),
            )),
            AttestationOutcome::Rejected { arc, reasons } => Err(Error::Rejection {
                message: "fetch custom JWT: rejected".to_owned(),
                arc,
                reasons,
            }),
            outcome if outcome.is_network_issue() => Err(Error::Networking(
                "fetch custom JWT: network issue, retry needed".to_owned(),
            )),
            outcome => Err(Error::Permanent(format!(
                "fetch custom JWT: {}",
                outcome.description()
            ))),
        }
    }

    /// Checks whether the app would currently pass attestation by fetching a
    /// non-existent secure string and surfacing any rejection.
    pub fn precheck(&self) -> Result<(), Error> {
        let outcome = self
            .client
            .fetch_secure_string_and_wait("precheck-dummy-key", None);
        info!(status = %outcome.description(), "precheck");
        match outcome {
            AttestationOutcome::Success { .. } | AttestationOutcome::UnknownKey => Ok(()),
            AttestationOutcome::Rejected { arc, reasons } => Err(Error::Rejection {
                message: "precheck: rejected".to_owned(),
                arc,
                reasons,
            }),
            outcome if outcome.is_network_issue() => Err(Error::Networking(
                "precheck: network issue, retry needed".to_owned(),
            )),
            outcome => Err(Error::Permanent(format!(
                "precheck: {}",
                outcome.description()
            ))),
        }
    }

    /// Warms the token cache on a background thread so a token is likely
    /// available by the time the first real request goes out. The initial
    /// fetch is the expensive one.
    pub fn prefetch(&self, url: &str) {
        let client = self.client.clone();
        let url = url.to_owned();
        thread::spawn(move || {
            let fetched = client.fetch_token_and_wait(&url);
            debug!(status = %fetched.outcome.description(), "token prefetch complete");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::AttestService;
    use crate::attestation::AttestationOutcome;
    use crate::config::{ConfigStore, MemoryConfigStore};
    use crate::error::Error;
    use crate::request::{Decision, OutgoingRequest};
    use crate::sdk_fake::FakeAttestationClient;
    use std::sync::Arc;
    use std::thread;

    fn request() -> OutgoingRequest {
        OutgoingRequest::new("https://api.example.com/v1/data".parse().unwrap())
    }

    fn service() -> (Arc<FakeAttestationClient>, Arc<MemoryConfigStore>, AttestService) {
        let client = Arc::new(FakeAttestationClient::new());
        let store = Arc::new(MemoryConfigStore::default());
        let service = AttestService::new(client.clone(), store.clone());
        (client, store, service)
    }

    fn decide_with(outcome: AttestationOutcome) -> Decision {
        let (client, _, service) = service();
        client.script_token(outcome, false);
        service.decide(request())
    }

    #[test]
    fn success_proceeds_with_token_header() {
        let (client, _, service) = service();
        service.policy().set_token_header("Attestation-Token", "Bearer ");
        client.script_token(
            AttestationOutcome::Success {
                value: Some("tok123".to_owned()),
            },
            false,
        );
        match service.decide(request()) {
            Decision::Proceed(req) => {
                assert_eq!(req.header("Attestation-Token"), Some("Bearer tok123"));
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[test]
    fn decide_maps_every_outcome() {
        // Network-class outcomes: retry, no request mutation.
        for outcome in [
            AttestationOutcome::NoNetwork,
            AttestationOutcome::PoorNetwork,
            AttestationOutcome::MitmDetected,
        ] {
            assert!(
                matches!(decide_with(outcome.clone()), Decision::Retry(Error::Networking(_))),
                "expected Retry for {outcome:?}"
            );
        }

        // Unprotected-class outcomes: proceed without a token header.
        for outcome in [
            AttestationOutcome::UnprotectedUrl,
            AttestationOutcome::UnknownUrl,
            AttestationOutcome::NoService,
        ] {
            match decide_with(outcome.clone()) {
                Decision::Proceed(req) => {
                    assert_eq!(req.header("Attestation-Token"), None, "for {outcome:?}")
                }
                other => panic!("expected Proceed for {outcome:?}, got {other:?}"),
            }
        }

        // Everything else fails.
        assert!(matches!(
            decide_with(AttestationOutcome::Rejected {
                arc: "ARC-1".to_owned(),
                reasons: vec!["debugger".to_owned()],
            }),
            Decision::Fail(Error::Rejection { arc, .. }) if arc == "ARC-1"
        ));
        for outcome in [
            AttestationOutcome::UnknownKey,
            AttestationOutcome::Disabled,
            AttestationOutcome::BadKey,
            AttestationOutcome::BadPayload,
            AttestationOutcome::Other { code: 42 },
            AttestationOutcome::Success { value: None },
        ] {
            assert!(
                matches!(decide_with(outcome.clone()), Decision::Fail(Error::Permanent(_))),
                "expected Fail for {outcome:?}"
            );
        }
    }

    #[test]
    fn bind_header_value_is_hashed_into_token() {
        let (client, _, service) = service();
        service.policy().set_bind_header(Some("Authorization"));
        let mut req = request();
        req.set_header("Authorization", "Bearer user-jwt").unwrap();
        let decision = service.decide(req);
        assert!(matches!(decision, Decision::Proceed(_)));
        assert_eq!(client.data_hashes(), vec!["Bearer user-jwt".to_owned()]);
    }

    #[test]
    fn missing_bind_header_fails_when_strict() {
        let (client, _, service) = service();
        service.policy().set_bind_header(Some("Authorization"));
        service.policy().set_strict_binding(true);
        assert!(matches!(
            service.decide(request()),
            Decision::Fail(Error::Configuration(_))
        ));
        assert!(client.data_hashes().is_empty());
    }

    #[test]
    fn missing_bind_header_skipped_when_lenient() {
        let (client, _, service) = service();
        service.policy().set_bind_header(Some("Authorization"));
        assert!(matches!(service.decide(request()), Decision::Proceed(_)));
        assert!(client.data_hashes().is_empty());
    }

    #[test]
    fn changed_configuration_is_persisted() {
        let (client, store, service) = service();
        client.set_config("updated-dynamic-config");
        client.script_token(
            AttestationOutcome::Success {
                value: Some("tok".to_owned()),
            },
            true,
        );
        service.decide(request());
        assert_eq!(store.load().as_deref(), Some("updated-dynamic-config"));
    }

    #[test]
    fn substitution_replaces_header_value() {
        let (client, _, service) = service();
        service.add_substitution_header("Api-Key", Some("Bearer "));
        client.script_secure_string(
            "abc123",
            AttestationOutcome::Success {
                value: Some("secretXYZ".to_owned()),
            },
        );
        let mut req = request();
        req.set_header("Api-Key", "Bearer abc123").unwrap();
        match service.substitute(req, &AttestationOutcome::Success { value: None }) {
            Decision::Proceed(req) => {
                assert_eq!(req.header("Api-Key"), Some("Bearer secretXYZ"));
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[test]
    fn substitution_refused_for_unknown_domain() {
        let (client, _, service) = service();
        service.add_substitution_header("Api-Key", Some("Bearer "));
        client.script_secure_string(
            "abc123",
            AttestationOutcome::Success {
                value: Some("secretXYZ".to_owned()),
            },
        );
        let mut req = request();
        req.set_header("Api-Key", "Bearer abc123").unwrap();
        assert!(matches!(
            service.substitute(req, &AttestationOutcome::UnknownUrl),
            Decision::Fail(Error::Configuration(_))
        ));
    }

    #[test]
    fn substitution_skips_values_without_prefix_or_suffix() {
        let (_, _, service) = service();
        service.add_substitution_header("Api-Key", Some("Bearer "));
        let mut req = request();
        // No suffix after the prefix: rule does not apply.
        req.set_header("Api-Key", "Bearer ").unwrap();
        match service.substitute(req, &AttestationOutcome::Success { value: None }) {
            Decision::Proceed(req) => assert_eq!(req.header("Api-Key"), Some("Bearer ")),
            other => panic!("expected Proceed, got {other:?}"),
        }

        let mut req = request();
        req.set_header("Api-Key", "Basic abc123").unwrap();
        match service.substitute(req, &AttestationOutcome::Success { value: None }) {
            Decision::Proceed(req) => assert_eq!(req.header("Api-Key"), Some("Basic abc123")),
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[test]
    fn substitution_unknown_key_leaves_header_untouched() {
        let (_, _, service) = service();
        service.add_substitution_header("Api-Key", Some("Bearer "));
        // Nothing scripted: the fake answers UnknownKey.
        let mut req = request();
        req.set_header("Api-Key", "Bearer abc123").unwrap();
        match service.substitute(req, &AttestationOutcome::Success { value: None }) {
            Decision::Proceed(req) => assert_eq!(req.header("Api-Key"), Some("Bearer abc123")),
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[test]
    fn substitution_failure_taxonomy() {
        let cases: Vec<(AttestationOutcome, fn(&Decision) -> bool)> = vec![
            (
                AttestationOutcome::Rejected {
                    arc: "ARC-2".to_owned(),
                    reasons: vec!["root".to_owned(), "hook".to_owned()],
                },
                |d| matches!(d, Decision::Fail(Error::Rejection { arc, reasons, .. })
                    if arc == "ARC-2" && reasons.len() == 2),
            ),
            (AttestationOutcome::NoNetwork, |d| {
                matches!(d, Decision::Retry(Error::Networking(_)))
            }),
            (AttestationOutcome::PoorNetwork, |d| {
                matches!(d, Decision::Retry(Error::Networking(_)))
            }),
            (AttestationOutcome::MitmDetected, |d| {
                matches!(d, Decision::Retry(Error::Networking(_)))
            }),
            (AttestationOutcome::Disabled, |d| {
                matches!(d, Decision::Fail(Error::Permanent(_)))
            }),
            (AttestationOutcome::Success { value: None }, |d| {
                matches!(d, Decision::Fail(Error::Permanent(_)))
            }),
        ];
        for (outcome, check) in cases {
            let (client, _, service) = service();
            service.add_substitution_header("Api-Key", Some("Bearer "));
            client.script_secure_string("abc123", outcome.clone());
            let mut req = request();
            req.set_header("Api-Key", "Bearer abc123").unwrap();
            let decision = service.substitute(req, &AttestationOutcome::Success { value: None });
            assert!(check(&decision), "unexpected decision {decision:?} for {outcome:?}");
        }
    }

    #[test]
    fn substitution_applies_all_matching_rules() {
        let (client, _, service) = service();
        service.add_substitution_header("Api-Key", Some("Bearer "));
        service.add_substitution_header("Client-Id", None);
        client.script_secure_string(
            "abc123",
            AttestationOutcome::Success {
                value: Some("secretXYZ".to_owned()),
            },
        );
        client.script_secure_string(
            "client-42",
            AttestationOutcome::Success {
                value: Some("secretID".to_owned()),
            },
        );
        let mut req = request();
        req.set_header("Api-Key", "Bearer abc123").unwrap();
        req.set_header("Client-Id", "client-42").unwrap();
        match service.substitute(req, &AttestationOutcome::Success { value: None }) {
            Decision::Proceed(req) => {
                assert_eq!(req.header("Api-Key"), Some("Bearer secretXYZ"));
                assert_eq!(req.header("Client-Id"), Some("secretID"));
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[test]
    fn substitution_aborts_pass_on_first_failing_rule() {
        // One rule is scripted to succeed and the other to be rejected.
        // Whichever order the rules are visited in, the failing one must
        // surface and the request must be withheld, even if the succeeding
        // rule already rewrote its header.
        let (client, _, service) = service();
        service.add_substitution_header("Api-Key", Some("Bearer "));
        service.add_substitution_header("Client-Id", None);
        client.script_secure_string(
            "abc123",
            AttestationOutcome::Success {
                value: Some("secretXYZ".to_owned()),
            },
        );
        client.script_secure_string(
            "client-42",
            AttestationOutcome::Rejected {
                arc: "ARC-3".to_owned(),
                reasons: vec!["emulator".to_owned()],
            },
        );
        let mut req = request();
        req.set_header("Api-Key", "Bearer abc123").unwrap();
        req.set_header("Client-Id", "client-42").unwrap();
        assert!(matches!(
            service.substitute(req, &AttestationOutcome::Success { value: None }),
            Decision::Fail(Error::Rejection { arc, .. }) if arc == "ARC-3"
        ));
    }

    #[test]
    fn update_request_substitutes_after_proceed() {
        let (client, _, service) = service();
        service.add_substitution_header("Api-Key", Some("Bearer "));
        client.script_token(
            AttestationOutcome::Success {
                value: Some("tok".to_owned()),
            },
            false,
        );
        client.script_secure_string(
            "abc123",
            AttestationOutcome::Success {
                value: Some("secretXYZ".to_owned()),
            },
        );
        let mut req = request();
        req.set_header("Api-Key", "Bearer abc123").unwrap();
        match service.update_request(req) {
            Decision::Proceed(req) => {
                assert_eq!(req.header("Attestation-Token"), Some("tok"));
                assert_eq!(req.header("Api-Key"), Some("Bearer secretXYZ"));
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[test]
    fn update_request_does_not_substitute_on_retry() {
        let (client, _, service) = service();
        service.add_substitution_header("Api-Key", Some("Bearer "));
        client.script_token(AttestationOutcome::NoNetwork, false);
        let mut req = request();
        req.set_header("Api-Key", "Bearer abc123").unwrap();
        assert!(matches!(service.update_request(req), Decision::Retry(_)));
    }

    #[test]
    fn initialize_is_idempotent_for_same_config() {
        let (client, _, service) = service();
        service.initialize("config-X").unwrap();
        service.initialize("config-X").unwrap();
        assert_eq!(client.initializations().len(), 1);
    }

    #[test]
    fn initialize_rejects_different_config() {
        let (_, _, service) = service();
        service.initialize("config-X").unwrap();
        assert!(matches!(
            service.initialize("config-Y"),
            Err(Error::Initialization(_))
        ));
    }

    #[test]
    fn initialize_propagates_sdk_failure() {
        let (client, _, failing) = service();
        client.fail_initialize("bad config");
        assert!(matches!(
            failing.initialize("config-X"),
            Err(Error::Initialization(_))
        ));
        // A later attempt against a healthy SDK still succeeds, nothing was
        // latched.
        let (_, _, fresh) = service();
        fresh.initialize("config-X").unwrap();
    }

    #[test]
    fn first_launch_bootstraps_dynamic_config() {
        let (client, store, service) = service();
        client.set_config("initial-dynamic");
        service.initialize("config-X").unwrap();
        assert_eq!(store.load().as_deref(), Some("initial-dynamic"));
        // The SDK saw no prior dynamic config.
        assert_eq!(
            client.initializations(),
            vec![("config-X".to_owned(), None)]
        );
    }

    #[test]
    fn stored_dynamic_config_is_passed_to_sdk() {
        let (client, store, service) = service();
        store.save("persisted-dynamic").unwrap();
        service.initialize("config-X").unwrap();
        assert_eq!(
            client.initializations(),
            vec![("config-X".to_owned(), Some("persisted-dynamic".to_owned()))]
        );
    }

    #[test]
    fn concurrent_initialization_is_exactly_once() {
        let (client, _, service) = service();
        let service = Arc::new(service);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                thread::spawn(move || service.initialize("config-X"))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(client.initializations().len(), 1);
    }

    #[test]
    fn concurrent_decisions_with_rule_churn() {
        let (_, _, service) = service();
        let service = Arc::new(service);

        let writer = {
            let service = service.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    service.add_substitution_header("Api-Key", Some("Bearer "));
                    service.remove_substitution_header("Api-Key");
                }
            })
        };

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        // The fake defaults to a successful token fetch; the
                        // request has no substitutable header, so every pass
                        // must proceed no matter how the rules churn.
                        assert!(matches!(
                            service.update_request(request()),
                            Decision::Proceed(_)
                        ));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for worker in workers {
            worker.join().unwrap();
        }
    }
}
