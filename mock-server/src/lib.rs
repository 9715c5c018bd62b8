use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{extract::State, http::StatusCode, routing::post, Form, Json, Router};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const ERR_UNKNOWN_ACCOUNT: i64 = 1003;
pub const ERR_UNKNOWN_CALL: i64 = 1005;
pub const ERR_MISSING_PARAMETER: i64 = 1010;
pub const ERR_MISSING_CREDENTIALS: i64 = 1050;
pub const ERR_LOGIN_FAILED: i64 = 1051;
pub const ERR_SESSION_EXPIRED: i64 = 1054;
pub const ERR_SESSION_NOT_FOUND: i64 = 1055;

pub const DEFAULT_SESSION_LENGTH: i64 = 3600;

#[derive(Clone, Debug)]
pub struct Account {
    pub client_code: String,
    pub username: String,
    pub password: String,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            client_code: "123456".to_string(),
            username: "demo".to_string(),
            password: "secret".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Session {
    created_at: i64,
    expires_at: i64,
}

struct Inner {
    account: Account,
    session_length: i64,
    sessions: RwLock<HashMap<String, Session>>,
    verify_calls: AtomicUsize,
    calls: AtomicUsize,
}

/// Shared server state. Cloning shares the same sessions and counters, so
/// tests can keep a handle and inspect it while the server runs.
#[derive(Clone)]
pub struct MockState {
    inner: Arc<Inner>,
}

impl MockState {
    pub fn new(account: Account, session_length: i64) -> Self {
        Self {
            inner: Arc::new(Inner {
                account,
                session_length,
                sessions: RwLock::new(HashMap::new()),
                verify_calls: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn account(&self) -> &Account {
        &self.inner.account
    }

    /// Number of `verifyUser` calls received, successful or not.
    pub fn verify_calls(&self) -> usize {
        self.inner.verify_calls.load(Ordering::SeqCst)
    }

    /// Number of calls received on `/api/`.
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Forget every issued session key.
    pub async fn revoke_sessions(&self) {
        self.inner.sessions.write().await.clear();
    }
}

impl Default for MockState {
    fn default() -> Self {
        Self::new(Account::default(), DEFAULT_SESSION_LENGTH)
    }
}

pub fn app() -> Router {
    app_with_state(MockState::default())
}

pub fn app_with_state(state: MockState) -> Router {
    Router::new()
        .route("/api/", post(api_call))
        .route("/broken/", post(broken))
        .route("/garbage/", post(garbage))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, MockState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state).layer(TraceLayer::new_for_http())).await
}

type Params = HashMap<String, String>;

async fn api_call(State(state): State<MockState>, Form(params): Form<Params>) -> Json<Value> {
    state.inner.calls.fetch_add(1, Ordering::SeqCst);
    let request = params.get("request").cloned().unwrap_or_default();
    tracing::debug!(request = %request, "api call");

    if param(&params, "clientCode") != Some(state.inner.account.client_code.as_str()) {
        return Json(failure(&request, ERR_UNKNOWN_ACCOUNT, None));
    }

    let body = match request.as_str() {
        "verifyUser" => verify_user(&state, &params).await,
        "createInstallation" => create_installation(&state, &params),
        _ => match authenticate(&state, &params).await {
            Err(code) => failure(&request, code, Some("sessionKey")),
            Ok(session) => match request.as_str() {
                "getServerTime" => success(&request, vec![json!({ "unixTime": now() })]),
                "getSessionKeyInfo" => success(
                    &request,
                    vec![json!({
                        "creationUnixTime": session.created_at.to_string(),
                        "expireUnixTime": session.expires_at.to_string(),
                    })],
                ),
                _ => failure(&request, ERR_UNKNOWN_CALL, Some("request")),
            },
        },
    };
    Json(body)
}

async fn verify_user(state: &MockState, params: &Params) -> Value {
    state.inner.verify_calls.fetch_add(1, Ordering::SeqCst);
    let (Some(username), Some(password)) = (param(params, "username"), param(params, "password"))
    else {
        return failure("verifyUser", ERR_MISSING_CREDENTIALS, Some("username"));
    };

    let account = &state.inner.account;
    if username != account.username || password != account.password {
        tracing::info!(username, "login failed");
        return failure("verifyUser", ERR_LOGIN_FAILED, None);
    }

    let key = Uuid::new_v4().simple().to_string();
    let created_at = now();
    let session = Session {
        created_at,
        expires_at: created_at + state.inner.session_length,
    };
    state.inner.sessions.write().await.insert(key.clone(), session);

    success(
        "verifyUser",
        vec![json!({
            "userID": "1",
            "userName": username,
            "employeeID": "1",
            "sessionKey": key,
            "sessionLength": state.inner.session_length,
        })],
    )
}

fn create_installation(state: &MockState, params: &Params) -> Value {
    if param(params, "email").is_none() {
        return failure("createInstallation", ERR_MISSING_PARAMETER, Some("email"));
    }
    success(
        "createInstallation",
        vec![json!({
            "clientCode": state.inner.account.client_code,
            "username": state.inner.account.username,
        })],
    )
}

async fn authenticate(state: &MockState, params: &Params) -> Result<Session, i64> {
    let key = param(params, "sessionKey").ok_or(ERR_SESSION_NOT_FOUND)?;
    let session = *state
        .inner
        .sessions
        .read()
        .await
        .get(key)
        .ok_or(ERR_SESSION_NOT_FOUND)?;
    if session.expires_at <= now() {
        return Err(ERR_SESSION_EXPIRED);
    }
    Ok(session)
}

/// Simulates a service outage; the body must never reach the client.
async fn broken() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(failure("unknown", 1000, None)),
    )
}

async fn garbage() -> &'static str {
    "<html><body>Service temporarily unavailable</body></html>"
}

fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

fn success(request: &str, records: Vec<Value>) -> Value {
    json!({
        "status": status(request, 0, None, records.len()),
        "records": records,
    })
}

fn failure(request: &str, error_code: i64, error_field: Option<&str>) -> Value {
    json!({
        "status": status(request, error_code, error_field, 0),
        "records": null,
    })
}

fn status(request: &str, error_code: i64, error_field: Option<&str>, records: usize) -> Value {
    json!({
        "request": request,
        "requestUnixTime": now(),
        "responseStatus": if error_code == 0 { "ok" } else { "error" },
        "errorCode": error_code,
        "errorField": error_field,
        "generationTime": 0.0,
        "recordsTotal": records,
        "recordsInResponse": records,
    })
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
