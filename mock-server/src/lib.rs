//! In-memory stand-in for the OpenAM REST endpoints the client consumes.
//!
//! Routes are served under `/openam`, like a default OpenAM deployment.
//! Realm `mfa` answers a correct username/password callback submission with
//! a second challenge instead of a token.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const BASE_PATH: &str = "/openam";
pub const COOKIE_NAME: &str = "iPlanetDirectoryPro";
pub const LB_COOKIE_NAME: &str = "amlbcookie";
pub const COOKIE_DOMAIN: &str = ".example.com";
pub const ADMIN_USER: &str = "amadmin";
pub const ADMIN_PASSWORD: &str = "cangetinam";
pub const MFA_REALM: &str = "mfa";

#[derive(Clone, Debug)]
pub struct MockUser {
    pub username: String,
    pub password: String,
    pub mail: String,
}

impl MockUser {
    pub fn new(username: &str, password: &str, mail: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            mail: mail.to_string(),
        }
    }

    fn identity(&self) -> Value {
        json!({
            "username": self.username,
            "realm": "/",
            "uid": [self.username],
            "mail": [self.mail],
            "universalid": [format!("id={},ou=user,dc=openam,dc=example,dc=com", self.username)],
            "inetUserStatus": ["Active"],
        })
    }
}

#[derive(Default)]
struct Directory {
    users: HashMap<String, MockUser>,
    /// token id -> username
    sessions: HashMap<String, String>,
}

/// Shared server state. Clones share the same directory and hit counters.
#[derive(Clone)]
pub struct MockState {
    directory: Arc<RwLock<Directory>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self::new([MockUser::new(ADMIN_USER, ADMIN_PASSWORD, "admin@example.com")])
    }
}

impl MockState {
    pub fn new(users: impl IntoIterator<Item = MockUser>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect();
        Self {
            directory: Arc::new(RwLock::new(Directory {
                users,
                sessions: HashMap::new(),
            })),
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Requests received for `path` (without `/openam` and query string).
    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .map(|hits| hits.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn record_hit(&self, path: &str) {
        let path = path.strip_prefix(BASE_PATH).unwrap_or(path);
        if let Ok(mut hits) = self.hits.lock() {
            *hits.entry(path.to_string()).or_insert(0) += 1;
        }
    }
}

pub fn app() -> Router {
    app_with_state(MockState::default())
}

pub fn app_with_state(state: MockState) -> Router {
    let api = Router::new()
        .route("/json/authenticate", post(authenticate))
        .route("/json/sessions/", post(session_action))
        .route("/json/sessions/{token}", post(validate_session))
        .route("/json/users/", post(create_user))
        .route(
            "/json/users/{username}",
            get(get_user).delete(delete_user).post(user_action),
        )
        .route("/json/serverinfo/{item}", get(server_info))
        .route("/identity/getCookieNameForToken", get(cookie_name_for_token))
        .route("/identity/getCookieNamesToForward", get(cookie_names_to_forward))
        .with_state(state.clone());

    Router::new()
        .nest(BASE_PATH, api)
        .layer(middleware::from_fn_with_state(state, count_hits))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, MockState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn count_hits(State(state): State<MockState>, request: Request, next: Next) -> Response {
    state.record_hit(request.uri().path());
    next.run(request).await
}

/// OpenAM-shaped JSON error: `{"code", "reason", "message"}`.
struct Failure {
    status: StatusCode,
    message: String,
}

impl Failure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication Failed")
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.status.as_u16(),
            "reason": self.status.canonical_reason().unwrap_or_default(),
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, Failure>;

#[derive(Deserialize)]
pub struct AuthQuery {
    pub realm: Option<String>,
}

#[derive(Deserialize)]
pub struct ActionQuery {
    #[serde(rename = "_action")]
    pub action: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Username owning the session named by the cookie header.
async fn session_user(state: &MockState, headers: &HeaderMap) -> Result<String, Failure> {
    let token = header_str(headers, COOKIE_NAME).ok_or_else(|| {
        Failure::new(StatusCode::UNAUTHORIZED, "Access Denied")
    })?;
    state
        .directory
        .read()
        .await
        .sessions
        .get(token)
        .cloned()
        .ok_or_else(|| Failure::new(StatusCode::UNAUTHORIZED, "Access Denied"))
}

fn initial_challenge() -> Value {
    json!({
        "authId": Uuid::new_v4().to_string(),
        "template": "",
        "stage": "DataStore1",
        "header": "Sign in to OpenAM",
        "callbacks": [
            {
                "type": "NameCallback",
                "output": [{"name": "prompt", "value": "User Name:"}],
                "input": [{"name": "IDToken1", "value": ""}]
            },
            {
                "type": "PasswordCallback",
                "output": [{"name": "prompt", "value": "Password:"}],
                "input": [{"name": "IDToken2", "value": ""}]
            }
        ]
    })
}

fn second_challenge() -> Value {
    json!({
        "authId": Uuid::new_v4().to_string(),
        "template": "",
        "stage": "OATH2",
        "header": "Enter your one-time password",
        "callbacks": [
            {
                "type": "TextInputCallback",
                "output": [{"name": "prompt", "value": "One-time password:"}],
                "input": [{"name": "IDToken1", "value": ""}]
            }
        ]
    })
}

/// First input value of the first callback of type `kind`.
fn callback_value<'a>(challenge: &'a Value, kind: &str) -> Option<&'a str> {
    challenge["callbacks"]
        .as_array()?
        .iter()
        .find(|callback| callback["type"] == kind)?["input"][0]["value"]
        .as_str()
}

async fn issue_token(state: &MockState, username: &str) -> Value {
    let token_id = format!("AQIC5w{}.*AAJTSQACMDE.*", Uuid::new_v4().simple());
    state
        .directory
        .write()
        .await
        .sessions
        .insert(token_id.clone(), username.to_string());
    json!({"tokenId": token_id, "successUrl": "/openam/console", "realm": "/"})
}

async fn check_password(state: &MockState, username: &str, password: &str) -> Result<(), Failure> {
    let directory = state.directory.read().await;
    match directory.users.get(username) {
        Some(user) if user.password == password => Ok(()),
        _ => Err(Failure::unauthorized()),
    }
}

async fn authenticate(
    State(state): State<MockState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    body: String,
) -> ApiResult {
    if let (Some(username), Some(password)) = (
        header_str(&headers, "X-OpenAM-Username"),
        header_str(&headers, "X-OpenAM-Password"),
    ) {
        check_password(&state, username, password).await?;
        return Ok(Json(issue_token(&state, username).await));
    }

    let submitted: Value = if body.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&body)
            .map_err(|_| Failure::new(StatusCode::BAD_REQUEST, "Invalid JSON"))?
    };
    if submitted.get("callbacks").is_none() {
        return Ok(Json(initial_challenge()));
    }

    let username = callback_value(&submitted, "NameCallback").unwrap_or_default();
    let password = callback_value(&submitted, "PasswordCallback").unwrap_or_default();
    check_password(&state, username, password).await?;
    if query.realm.as_deref() == Some(MFA_REALM) {
        return Ok(Json(second_challenge()));
    }
    Ok(Json(issue_token(&state, username).await))
}

async fn session_action(
    State(state): State<MockState>,
    Query(query): Query<ActionQuery>,
    headers: HeaderMap,
) -> ApiResult {
    match query.action.as_deref() {
        Some("logout") => {
            let token = header_str(&headers, COOKIE_NAME).unwrap_or_default();
            let removed = state.directory.write().await.sessions.remove(token);
            match removed {
                Some(_) => Ok(Json(json!({"result": "Successfully logged out"}))),
                None => Err(Failure::unauthorized()),
            }
        }
        _ => Err(Failure::new(StatusCode::BAD_REQUEST, "Unsupported action")),
    }
}

async fn validate_session(
    State(state): State<MockState>,
    Path(token): Path<String>,
    Query(query): Query<ActionQuery>,
) -> ApiResult {
    if query.action.as_deref() != Some("validate") {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Unsupported action"));
    }
    let directory = state.directory.read().await;
    Ok(Json(match directory.sessions.get(&token) {
        Some(username) => json!({"valid": true, "uid": username, "realm": "/"}),
        None => json!({"valid": false}),
    }))
}

#[derive(Deserialize)]
pub struct NewUser {
    pub username: String,
    pub userpassword: String,
    #[serde(default)]
    pub mail: String,
}

async fn create_user(
    State(state): State<MockState>,
    Query(query): Query<ActionQuery>,
    headers: HeaderMap,
    Json(input): Json<NewUser>,
) -> Result<(StatusCode, Json<Value>), Failure> {
    if query.action.as_deref() != Some("create") {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Unsupported action"));
    }
    let caller = session_user(&state, &headers).await?;
    if caller != ADMIN_USER {
        return Err(Failure::new(StatusCode::FORBIDDEN, "Permission denied"));
    }
    let mut directory = state.directory.write().await;
    if directory.users.contains_key(&input.username) {
        return Err(Failure::new(StatusCode::CONFLICT, "Resource already exists"));
    }
    let user = MockUser::new(&input.username, &input.userpassword, &input.mail);
    let identity = user.identity();
    directory.users.insert(input.username, user);
    Ok((StatusCode::CREATED, Json(identity)))
}

async fn get_user(
    State(state): State<MockState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let caller = session_user(&state, &headers).await?;
    if caller != username && caller != ADMIN_USER {
        return Err(Failure::new(StatusCode::FORBIDDEN, "Permission denied"));
    }
    let directory = state.directory.read().await;
    directory
        .users
        .get(&username)
        .map(|user| Json(user.identity()))
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "Resource not found"))
}

async fn delete_user(
    State(state): State<MockState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let caller = session_user(&state, &headers).await?;
    if caller != ADMIN_USER {
        return Err(Failure::new(StatusCode::FORBIDDEN, "Permission denied"));
    }
    let mut directory = state.directory.write().await;
    match directory.users.remove(&username) {
        Some(_) => {
            directory.sessions.retain(|_, owner| *owner != username);
            Ok(Json(json!({"success": "true"})))
        }
        None => Err(Failure::new(StatusCode::NOT_FOUND, "Resource not found")),
    }
}

#[derive(Deserialize)]
pub struct PasswordChange {
    pub currentpassword: Option<String>,
    pub userpassword: String,
}

async fn user_action(
    State(state): State<MockState>,
    Path(username): Path<String>,
    Query(query): Query<ActionQuery>,
    headers: HeaderMap,
    Json(input): Json<PasswordChange>,
) -> ApiResult {
    if query.action.as_deref() != Some("changePassword") {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Unsupported action"));
    }
    let caller = session_user(&state, &headers).await?;
    if caller != username {
        return Err(Failure::new(StatusCode::FORBIDDEN, "Permission denied"));
    }
    let mut directory = state.directory.write().await;
    let user = directory
        .users
        .get_mut(&username)
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "Resource not found"))?;
    if input.currentpassword.as_deref() != Some(user.password.as_str()) {
        return Err(Failure::new(StatusCode::UNAUTHORIZED, "Invalid Password"));
    }
    user.password = input.userpassword;
    Ok(Json(json!({})))
}

async fn server_info(Path(item): Path<String>) -> ApiResult {
    match item.as_str() {
        "*" => Ok(Json(json!({
            "domains": [COOKIE_DOMAIN],
            "protectedUserAttributes": [],
            "cookieName": COOKIE_NAME,
            "secureCookie": false,
            "forgotPassword": "false",
            "selfRegistration": "false",
            "lang": "en",
            "successfulUserRegistrationDestination": "default",
            "socialImplementations": [],
            "referralsEnabled": "false",
            "realm": "/",
            "FQDN": "openam.example.com"
        }))),
        "cookieDomains" => Ok(Json(json!({"domains": [COOKIE_DOMAIN]}))),
        _ => Err(Failure::new(StatusCode::NOT_FOUND, "Resource not found")),
    }
}

async fn cookie_name_for_token() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
        format!("string={COOKIE_NAME}\n"),
    )
}

async fn cookie_names_to_forward() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
        format!("string={COOKIE_NAME}\nstring={LB_COOKIE_NAME}\n"),
    )
}
