use crate::attestation::{AttestationClient, AttestationOutcome, PinMap, TokenFetch};
use crate::error::Error;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// Scripted stand-in for the vendor attestation SDK.
///
/// Fetch operations pop pre-loaded outcomes (token fetches default to a fixed
/// fake token, secure string lookups to `UnknownKey` when nothing is
/// scripted), and every mutating call is recorded so tests can assert on what
/// the engines did.
#[derive(Default)]
pub struct FakeAttestationClient {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    token_results: VecDeque<TokenFetch>,
    secure_strings: HashMap<String, VecDeque<AttestationOutcome>>,
    jwt_results: VecDeque<AttestationOutcome>,
    pins: Option<PinMap>,
    config: Option<String>,
    init_error: Option<String>,
    initializations: Vec<(String, Option<String>)>,
    data_hashes: Vec<String>,
    user_properties: Vec<String>,
}

impl FakeAttestationClient {
    pub fn new() -> Self {
        FakeAttestationClient::default()
    }

    pub fn script_token(&self, outcome: AttestationOutcome, config_changed: bool) {
        self.state
            .lock()
            .expect("fake state lock poisoned")
            .token_results
            .push_back(TokenFetch {
                outcome,
                config_changed,
            });
    }

    pub fn script_secure_string(&self, key: &str, outcome: AttestationOutcome) {
        self.state
            .lock()
            .expect("fake state lock poisoned")
            .secure_strings
            .entry(key.to_owned())
            .or_default()
            .push_back(outcome);
    }

    pub fn script_jwt(&self, outcome: AttestationOutcome) {
        self.state
            .lock()
            .expect("fake state lock poisoned")
            .jwt_results
            .push_back(outcome);
    }

    pub fn set_pins(&self, pins: PinMap) {
        self.state.lock().expect("fake state lock poisoned").pins = Some(pins);
    }

    pub fn set_config(&self, config: &str) {
        self.state.lock().expect("fake state lock poisoned").config = Some(config.to_owned());
    }

    pub fn fail_initialize(&self, message: &str) {
        self.state.lock().expect("fake state lock poisoned").init_error =
            Some(message.to_owned());
    }

    pub fn initializations(&self) -> Vec<(String, Option<String>)> {
        self.state
            .lock()
            .expect("fake state lock poisoned")
            .initializations
            .clone()
    }

    pub fn data_hashes(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("fake state lock poisoned")
            .data_hashes
            .clone()
    }

    pub fn user_properties(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("fake state lock poisoned")
            .user_properties
            .clone()
    }
}

impl AttestationClient for FakeAttestationClient {
    fn initialize(&self, config: &str, update_config: Option<&str>) -> Result<(), Error> {
        let mut state = self.state.lock().expect("fake state lock poisoned");
        if let Some(message) = &state.init_error {
            return Err(Error::Initialization(message.clone()));
        }
        state
            .initializations
            .push((config.to_owned(), update_config.map(str::to_owned)));
        Ok(())
    }

    fn fetch_token_and_wait(&self, url: &str) -> TokenFetch {
        debug!(url, "FAKE token fetch");
        let mut state = self.state.lock().expect("fake state lock poisoned");
        state.token_results.pop_front().unwrap_or(TokenFetch {
            outcome: AttestationOutcome::Success {
                value: Some("fake-token".to_owned()),
            },
            config_changed: false,
        })
    }

    fn fetch_config(&self) -> Option<String> {
        self.state.lock().expect("fake state lock poisoned").config.clone()
    }

    fn get_pins(&self, pin_type: &str) -> Option<PinMap> {
        debug!(pin_type, "FAKE pin fetch");
        self.state.lock().expect("fake state lock poisoned").pins.clone()
    }

    fn fetch_secure_string_and_wait(&self, key: &str, _new_def: Option<&str>) -> AttestationOutcome {
        let mut state = self.state.lock().expect("fake state lock poisoned");
        state
            .secure_strings
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(AttestationOutcome::UnknownKey)
    }

    fn fetch_custom_jwt_and_wait(&self, _payload: &str) -> AttestationOutcome {
        let mut state = self.state.lock().expect("fake state lock poisoned");
        state.jwt_results.pop_front().unwrap_or(AttestationOutcome::Success {
            value: Some("fake.jwt.token".to_owned()),
        })
    }

    fn set_data_hash_in_token(&self, value: &str) {
        self.state
            .lock()
            .expect("fake state lock poisoned")
            .data_hashes
            .push(value.to_owned());
    }

    fn set_user_property(&self, value: &str) {
        self.state
            .lock()
            .expect("fake state lock poisoned")
            .user_properties
            .push(value.to_owned());
    }
}
