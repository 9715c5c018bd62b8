//! Session-aware request dispatcher for the Erply API.
//!
//! # Design
//! `ApiClient::send` is the single entry point. It stamps every call with
//! `request` and `clientCode`, attaches a session key unless the call is
//! exempt or the caller brought its own key, posts the form through the
//! configured `Transport`, and decodes the body as JSON. The JSON is
//! returned as-is: the API reports validation and permission errors inside
//! the document with HTTP 200, and interpreting them is the caller's job.
//!
//! The session key comes from `SessionManager::ensure_key`, whose bootstrap
//! closure re-enters `send` with `verifyUser`. `verifyUser` is exempt from
//! key injection, so the re-entry is exactly one level deep.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ApiError, TransportError};
use crate::http::{HttpRequest, Transport, TransportOutcome};
use crate::params::Params;
use crate::session::{Clock, KeyOutcome, SessionManager, SessionState, SystemClock};
use crate::types::ApiResult;

/// Call that exchanges credentials for a session key.
pub const BOOTSTRAP_CALL: &str = "verifyUser";

/// Calls that never carry a session key.
pub const UNAUTHENTICATED_CALLS: [&str; 2] = [BOOTSTRAP_CALL, "createInstallation"];

/// Parameters that, when supplied by the caller, authenticate the call.
pub const AUTH_FIELDS: [&str; 3] = ["sessionKey", "serviceKey", "applicationKey"];

/// Blocking client for one Erply account.
///
/// Safe to share between threads when the transport and clock are: the
/// session cache is the only shared state and is locked across key refresh.
#[derive(Debug)]
pub struct ApiClient<T, C = SystemClock> {
    config: ClientConfig,
    transport: T,
    clock: C,
    session: SessionManager,
    last_exchange: Mutex<Option<LastExchange>>,
}

/// Transport-level facts about the most recent exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LastExchange {
    status: u16,
    failure: Option<TransportError>,
}

#[cfg(feature = "ureq")]
impl ApiClient<crate::transport::UreqTransport> {
    /// Client over ureq, honoring the configured timeouts.
    pub fn from_config(config: ClientConfig) -> Self {
        let transport = crate::transport::UreqTransport::from_config(&config);
        Self::new(config, transport)
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self::with_clock(config, transport, SystemClock)
    }
}

impl<T: Transport, C: Clock> ApiClient<T, C> {
    pub fn with_clock(config: ClientConfig, transport: T, clock: C) -> Self {
        Self {
            config,
            transport,
            clock,
            session: SessionManager::new(),
            last_exchange: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send API call `call` with `params`.
    ///
    /// Returns `ApiResult::AuthFailure` without sending `call` when a session
    /// key was needed and `verifyUser` did not produce one.
    pub fn send(&self, call: &str, mut params: Params) -> Result<ApiResult, ApiError> {
        let url = self
            .config
            .url()
            .ok_or_else(|| ApiError::Configuration("API URL has not been defined".to_string()))?;

        params.insert("request", call);
        params.insert("clientCode", self.config.client_code().unwrap_or_default());

        if needs_session_key(call, &params) {
            match self.session.ensure_key(&self.clock, || self.verify_user())? {
                KeyOutcome::Key(key) => params.insert("sessionKey", key),
                KeyOutcome::Rejected(response) => return Ok(ApiResult::AuthFailure(response)),
            }
        }

        tracing::debug!(call, "sending API call");
        let request = HttpRequest::form_post(url, &params)?;
        let outcome = self.transport.post(&request);
        let value = self.decode(call, &outcome)?;
        Ok(ApiResult::Response(value))
    }

    fn verify_user(&self) -> Result<Value, ApiError> {
        let credentials = Params::new()
            .with("username", self.config.username().unwrap_or_default())
            .with("password", self.config.password().unwrap_or_default());
        self.send(BOOTSTRAP_CALL, credentials).map(ApiResult::into_value)
    }

    fn decode(&self, call: &str, outcome: &TransportOutcome) -> Result<Value, ApiError> {
        let checked = outcome.check();
        *self.lock_last_exchange() = Some(LastExchange {
            status: outcome.status,
            failure: checked.as_ref().err().cloned(),
        });

        let body = checked.inspect_err(|e| tracing::warn!(call, error = %e, "API call failed"))?;
        serde_json::from_slice(body).map_err(|e| {
            tracing::warn!(call, error = %e, "API response is not valid JSON");
            ApiError::Decode(e.to_string())
        })
    }

    // -- session overrides ----------------------------------------------------

    pub fn session_key(&self) -> Option<String> {
        self.session.snapshot().key
    }

    /// Expiry of the cached key, in unix seconds.
    pub fn expiry_timestamp(&self) -> Option<i64> {
        self.session.snapshot().expires_at
    }

    pub fn session_state(&self) -> SessionState {
        self.session.snapshot()
    }

    /// Use a previously obtained key. It is only used while an expiry in the
    /// future is also set.
    pub fn set_session_key(&self, key: impl Into<String>) {
        self.session.set_key(Some(key.into()));
    }

    pub fn set_expiry_timestamp(&self, expires_at: i64) {
        self.session.set_expires_at(Some(expires_at));
    }

    /// Seed key and expiry at once, skipping `verifyUser` until `expires_at`.
    pub fn seed_session(&self, key: impl Into<String>, expires_at: i64) {
        self.session.seed(key.into(), expires_at);
    }

    pub fn clear_session(&self) {
        self.session.clear();
    }

    // -- last exchange ----------------------------------------------------------

    /// Code and text of the last transport failure, if the last exchange
    /// could not be completed.
    pub fn last_transport_error(&self) -> Option<(i32, String)> {
        match self.lock_last_exchange().as_ref()?.failure.as_ref()? {
            TransportError::Exchange { code, message } => Some((*code, message.clone())),
            TransportError::Status(_) => None,
        }
    }

    /// Status of the last exchange; 0 if it could not be completed.
    pub fn last_status(&self) -> Option<u16> {
        self.lock_last_exchange().as_ref().map(|last| last.status)
    }

    /// True when the last exchange failed at the transport or HTTP level.
    pub fn has_failed(&self) -> bool {
        self.lock_last_exchange()
            .as_ref()
            .is_some_and(|last| last.failure.is_some())
    }

    /// Human-readable failure of the last exchange, empty if it succeeded.
    pub fn error_message(&self) -> String {
        self.lock_last_exchange()
            .as_ref()
            .and_then(|last| last.failure.as_ref())
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    fn lock_last_exchange(&self) -> MutexGuard<'_, Option<LastExchange>> {
        self.last_exchange.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn needs_session_key(call: &str, params: &Params) -> bool {
    !UNAUTHENTICATED_CALLS.contains(&call)
        && !AUTH_FIELDS.iter().any(|field| params.is_supplied(field))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    const URL: &str = "https://123456.erply.com/api/";
    const T: i64 = 1_700_000_000;

    /// Replays canned outcomes and records every request it sees.
    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<TransportOutcome>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: impl IntoIterator<Item = TransportOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                requests: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|req| form(req)["request"].clone())
                .collect()
        }

        fn request(&self, index: usize) -> std::collections::HashMap<String, String> {
            form(&self.requests.lock().unwrap()[index])
        }
    }

    impl Transport for ScriptedTransport {
        fn post(&self, request: &HttpRequest) -> TransportOutcome {
            self.requests.lock().unwrap().push(request.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected request")
        }
    }

    fn form(request: &HttpRequest) -> std::collections::HashMap<String, String> {
        serde_urlencoded::from_str(&request.body).unwrap()
    }

    struct TestClock(AtomicI64);

    impl Clock for TestClock {
        fn now(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::builder()
            .url(URL)
            .client_code("123456")
            .username("demo")
            .password("secret")
            .build()
    }

    fn client(
        transport: &Arc<ScriptedTransport>,
    ) -> ApiClient<Arc<ScriptedTransport>, Arc<TestClock>> {
        let clock = Arc::new(TestClock(AtomicI64::new(T)));
        ApiClient::with_clock(config(), Arc::clone(transport), clock)
    }

    fn ok(body: Value) -> TransportOutcome {
        TransportOutcome::completed(200, body.to_string())
    }

    fn session_response(key: &str, length: i64) -> TransportOutcome {
        ok(json!({
            "status": {"request": "verifyUser", "responseStatus": "ok", "errorCode": 0},
            "records": [{"userID": "1", "sessionKey": key, "sessionLength": length}]
        }))
    }

    fn server_time() -> TransportOutcome {
        ok(json!({
            "status": {"request": "getServerTime", "responseStatus": "ok", "errorCode": 0},
            "records": [{"unixTime": T}]
        }))
    }

    #[test]
    fn missing_url_fails_before_any_io() {
        let transport = ScriptedTransport::new([]);
        let client = ApiClient::new(ClientConfig::default(), Arc::clone(&transport));
        let err = client.send("getServerTime", Params::new()).unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
        assert!(transport.calls().is_empty());
        assert_eq!(client.last_status(), None);
    }

    #[test]
    fn first_call_verifies_user_then_reuses_key() {
        let transport = ScriptedTransport::new([
            session_response("abc", 3600),
            server_time(),
            server_time(),
        ]);
        let client = client(&transport);

        let result = client.send("getServerTime", Params::new()).unwrap();
        assert_eq!(result.error_code(), Some(0));
        assert_eq!(client.session_key().as_deref(), Some("abc"));
        assert_eq!(client.expiry_timestamp(), Some(T + 3600 - 30));

        client.send("getServerTime", Params::new()).unwrap();
        assert_eq!(
            transport.calls(),
            vec!["verifyUser", "getServerTime", "getServerTime"]
        );

        let verify = transport.request(0);
        assert_eq!(verify["username"], "demo");
        assert_eq!(verify["password"], "secret");
        assert_eq!(verify["clientCode"], "123456");
        assert!(!verify.contains_key("sessionKey"));

        let call = transport.request(2);
        assert_eq!(call["sessionKey"], "abc");
        assert_eq!(call["clientCode"], "123456");
    }

    #[test]
    fn expired_key_is_refreshed_once() {
        let transport = ScriptedTransport::new([
            session_response("fresh", 600),
            server_time(),
        ]);
        let client = client(&transport);
        client.seed_session("stale", T);

        client.send("getServerTime", Params::new()).unwrap();
        assert_eq!(transport.calls(), vec!["verifyUser", "getServerTime"]);
        assert_eq!(transport.request(1)["sessionKey"], "fresh");
    }

    #[test]
    fn seeded_session_skips_verification() {
        let transport = ScriptedTransport::new([server_time()]);
        let client = client(&transport);
        client.set_session_key("seeded");
        client.set_expiry_timestamp(T + 1);

        client.send("getServerTime", Params::new()).unwrap();
        assert_eq!(transport.calls(), vec!["getServerTime"]);
        assert_eq!(transport.request(0)["sessionKey"], "seeded");
    }

    #[test]
    fn caller_supplied_keys_skip_verification() {
        for field in AUTH_FIELDS {
            let transport = ScriptedTransport::new([server_time()]);
            let client = client(&transport);

            client
                .send("getServerTime", Params::new().with(field, "explicit"))
                .unwrap();
            assert_eq!(transport.calls(), vec!["getServerTime"], "{field}");
            assert_eq!(transport.request(0)[field], "explicit");
            assert_eq!(client.session_key(), None);
        }
    }

    #[test]
    fn empty_caller_key_does_not_count() {
        let transport = ScriptedTransport::new([session_response("abc", 3600), server_time()]);
        let client = client(&transport);

        client
            .send("getServerTime", Params::new().with("sessionKey", ""))
            .unwrap();
        assert_eq!(transport.calls(), vec!["verifyUser", "getServerTime"]);
        assert_eq!(transport.request(1)["sessionKey"], "abc");
    }

    #[test]
    fn create_installation_is_sent_without_key() {
        let transport = ScriptedTransport::new([ok(json!({"status": {"errorCode": 0}}))]);
        let client = client(&transport);

        client.send("createInstallation", Params::new()).unwrap();
        assert_eq!(transport.calls(), vec!["createInstallation"]);
        assert!(!transport.request(0).contains_key("sessionKey"));
    }

    #[test]
    fn rejected_credentials_return_verify_response() {
        let rejection = json!({
            "status": {"request": "verifyUser", "responseStatus": "error", "errorCode": 1051},
            "records": []
        });
        let transport = ScriptedTransport::new([ok(rejection.clone())]);
        let client = client(&transport);
        client.seed_session("stale", T - 5);

        let result = client.send("getServerTime", Params::new()).unwrap();
        assert_eq!(result, ApiResult::AuthFailure(rejection));
        assert_eq!(result.error_code(), Some(1051));
        assert_eq!(transport.calls(), vec!["verifyUser"]);
        assert_eq!(client.session_key(), None);
    }

    #[test]
    fn zero_session_key_is_not_accepted() {
        let transport = ScriptedTransport::new([session_response("0", 3600)]);
        let client = client(&transport);

        let result = client.send("getServerTime", Params::new()).unwrap();
        assert!(result.is_auth_failure());
        assert_eq!(transport.calls(), vec!["verifyUser"]);
        assert_eq!(client.session_key(), None);
    }

    #[test]
    fn transport_failure_is_raised() {
        let transport = ScriptedTransport::new([TransportOutcome::failed(7, "connection refused")]);
        let client = client(&transport);

        let err = client
            .send("getServerTime", Params::new().with("sessionKey", "k"))
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Transport(TransportError::Exchange { code: 7, .. })
        ));
        assert!(err.to_string().contains('7'));
        assert!(client.has_failed());
        assert_eq!(client.last_transport_error(), Some((7, "connection refused".to_string())));
        assert_eq!(client.last_status(), Some(0));
        assert_eq!(client.error_message(), "transport error 7: connection refused");
    }

    #[test]
    fn error_status_is_raised_without_decoding() {
        let transport = ScriptedTransport::new([TransportOutcome::completed(
            500,
            r#"{"status":{"errorCode":1000}}"#,
        )]);
        let client = client(&transport);

        let err = client
            .send("getServerTime", Params::new().with("sessionKey", "k"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(TransportError::Status(500))));
        assert_eq!(client.error_message(), "HTTP status code 500");
        assert_eq!(client.last_transport_error(), None);
    }

    #[test]
    fn failed_verification_exchange_is_raised() {
        let transport = ScriptedTransport::new([TransportOutcome::completed(503, "")]);
        let client = client(&transport);

        let err = client.send("getServerTime", Params::new()).unwrap_err();
        assert!(matches!(err, ApiError::Transport(TransportError::Status(503))));
        assert_eq!(transport.calls(), vec!["verifyUser"]);
    }

    #[test]
    fn invalid_json_is_a_decode_error_and_keeps_session() {
        let transport = ScriptedTransport::new([TransportOutcome::completed(200, "<html>")]);
        let client = client(&transport);
        client.seed_session("abc", T + 100);

        let err = client.send("getServerTime", Params::new()).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert_eq!(
            client.session_state(),
            SessionState {
                key: Some("abc".to_string()),
                expires_at: Some(T + 100),
            }
        );
        assert!(!client.has_failed());
        assert_eq!(client.last_status(), Some(200));
    }

    #[test]
    fn application_errors_are_returned_as_data() {
        let body = json!({"status": {"responseStatus": "error", "errorCode": 1011}});
        let transport = ScriptedTransport::new([ok(body.clone())]);
        let client = client(&transport);

        let result = client
            .send("getUnknown", Params::new().with("sessionKey", "k"))
            .unwrap();
        assert_eq!(result, ApiResult::Response(body));
    }

    #[test]
    fn request_and_client_code_override_caller_values() {
        let transport = ScriptedTransport::new([server_time()]);
        let client = client(&transport);

        client
            .send(
                "getServerTime",
                Params::new()
                    .with("request", "somethingElse")
                    .with("clientCode", "999")
                    .with("sessionKey", "k"),
            )
            .unwrap();
        let sent = transport.request(0);
        assert_eq!(sent["request"], "getServerTime");
        assert_eq!(sent["clientCode"], "123456");
    }
}
