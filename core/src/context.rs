//! Connection to one OpenAM deployment.
//!
//! # Design
//! `ServerContext` owns the transport, the lazily-filled metadata caches and
//! the list of sessions that logged in through it. Caches are filled on
//! first successful access and never expire; build a new context to pick up
//! server-side changes.
//!
//! The caches use `once_cell::unsync::OnceCell` and the session list a
//! `RefCell`, so a context is `!Sync`. Callers that need one from several
//! threads must wrap it in their own lock.

use std::cell::RefCell;
use std::fmt;
use std::time::Duration;

use once_cell::unsync::OnceCell;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::{ContextConfig, TlsPolicy};
use crate::error::{ErrorResponse, OpenAmError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::types::{Identity, NewIdentity, ServerInfo};

pub(crate) const PATH_AUTHENTICATE: &str = "/json/authenticate";
pub(crate) const PATH_LOGOUT: &str = "/json/sessions/?_action=logout";
pub(crate) const PATH_SESSIONS: &str = "/json/sessions/";
pub(crate) const PATH_USERS: &str = "/json/users/";
const PATH_COOKIE_NAME_FOR_TOKEN: &str = "/identity/getCookieNameForToken";
const PATH_COOKIE_NAMES_TO_FORWARD: &str = "/identity/getCookieNamesToForward";
const PATH_COOKIE_DOMAINS: &str = "/json/serverinfo/cookieDomains";
const PATH_SERVER_INFO: &str = "/json/serverinfo/*";

/// Prefix the legacy `/identity` endpoints put in front of every value.
const LEGACY_VALUE_PREFIX: &str = "string=";

/// Server connection parameters plus cached server metadata.
pub struct ServerContext {
    config: ContextConfig,
    base_url: String,
    transport: Box<dyn Transport>,
    server_info: OnceCell<ServerInfo>,
    cookie_name: OnceCell<String>,
    cookie_domains: OnceCell<Vec<String>>,
    cookie_names_to_forward: OnceCell<Vec<String>>,
    active_sessions: RefCell<Vec<String>>,
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("base_url", &self.base_url)
            .field("realm", &self.config.realm)
            .field("timeout_secs", &self.config.timeout_secs)
            .field("tls", &self.config.tls)
            .field("active_sessions", &self.active_sessions.borrow().len())
            .finish_non_exhaustive()
    }
}

impl ServerContext {
    /// Validate `config` and connect through a `ureq` transport.
    pub fn new(config: ContextConfig) -> Result<Self> {
        let transport = UreqTransport::new(config.timeout(), config.tls);
        Self::with_transport(config, transport)
    }

    /// Use a caller-supplied transport instead of `ureq`.
    pub fn with_transport(config: ContextConfig, transport: impl Transport + 'static) -> Result<Self> {
        config.validate()?;
        let base_url = normalize_base_url(&config.base_url);
        Ok(Self {
            config,
            base_url,
            transport: Box::new(transport),
            server_info: OnceCell::new(),
            cookie_name: OnceCell::new(),
            cookie_domains: OnceCell::new(),
            cookie_names_to_forward: OnceCell::new(),
            active_sessions: RefCell::new(Vec::new()),
        })
    }

    /// Base URL, always ending in `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn realm(&self) -> Option<&str> {
        self.config.effective_realm()
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    pub fn tls_policy(&self) -> TlsPolicy {
        self.config.tls
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Authentication endpoint, with `?realm=` when a realm is configured.
    pub fn login_path(&self) -> String {
        match self.realm() {
            Some(realm) => format!("{PATH_AUTHENTICATE}?realm={}", urlencoding::encode(realm)),
            None => PATH_AUTHENTICATE.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Cached server metadata
    // -----------------------------------------------------------------------

    pub fn server_info(&self) -> Result<&ServerInfo> {
        self.server_info.get_or_try_init(|| -> Result<ServerInfo> {
            let body = self.request(PATH_SERVER_INFO, None, &[], None)?;
            parse_json_or_default("server info", &body)
        })
    }

    /// Name of the cookie (and header) that carries the session token,
    /// typically `iPlanetDirectoryPro`.
    pub fn cookie_name(&self) -> Result<&str> {
        self.cookie_name
            .get_or_try_init(|| -> Result<String> {
                let body = self.request(PATH_COOKIE_NAME_FOR_TOKEN, None, &[], None)?;
                Ok(parse_legacy_value(&body))
            })
            .map(String::as_str)
    }

    pub fn cookie_domains(&self) -> Result<&[String]> {
        self.cookie_domains
            .get_or_try_init(|| -> Result<Vec<String>> {
                let body = self.request(PATH_COOKIE_DOMAINS, None, &[], None)?;
                let document: Value = parse_json_or_default("cookie domains", &body)?;
                Ok(document
                    .get("domains")
                    .and_then(Value::as_array)
                    .map(|domains| {
                        domains
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default())
            })
            .map(Vec::as_slice)
    }

    pub fn cookie_names_to_forward(&self) -> Result<&[String]> {
        self.cookie_names_to_forward
            .get_or_try_init(|| -> Result<Vec<String>> {
                let body = self.request(PATH_COOKIE_NAMES_TO_FORWARD, None, &[], None)?;
                Ok(parse_legacy_list(&body))
            })
            .map(Vec::as_slice)
    }

    // -----------------------------------------------------------------------
    // Identities
    // -----------------------------------------------------------------------

    /// Fetch `username`'s directory entry using `token_id` as credentials.
    pub fn get_identity(&self, token_id: &str, username: &str) -> Result<Identity> {
        let cookie = self.cookie_name()?;
        let path = format!("{PATH_USERS}{}", urlencoding::encode(username));
        let body = self.request(&path, None, &[(cookie, token_id)], None)?;
        parse_json_or_default("identity", &body)
    }

    pub fn create_identity(
        &self,
        token_id: &str,
        username: &str,
        password: &str,
        mail: &str,
    ) -> Result<Identity> {
        let cookie = self.cookie_name()?;
        let payload = to_json(&NewIdentity {
            username: username.to_string(),
            userpassword: password.to_string(),
            mail: mail.to_string(),
        })?;
        let path = format!("{PATH_USERS}?_action=create");
        let body = self.request(&path, Some(&payload), &[(cookie, token_id)], None)?;
        parse_json_or_default("created identity", &body)
    }

    /// Delete `username`. True only when the server answers
    /// `{"success": "true"}`, with the value as a string.
    pub fn delete_identity(&self, token_id: &str, username: &str) -> Result<bool> {
        let cookie = self.cookie_name()?;
        let path = format!("{PATH_USERS}{}", urlencoding::encode(username));
        let body = self.request(&path, None, &[(cookie, token_id)], Some(HttpMethod::Delete))?;
        let document: Value = parse_json_or_default("delete result", &body)?;
        Ok(matches!(document.get("success"), Some(Value::String(s)) if s == "true"))
    }

    // -----------------------------------------------------------------------
    // Generic requests
    // -----------------------------------------------------------------------

    /// Send a request to `path` (relative to the base URL) and return the
    /// decoded response body. Non-2xx statuses become errors.
    pub fn request(
        &self,
        path: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
        method: Option<HttpMethod>,
    ) -> Result<String> {
        self.request_with_content_type(path, body, headers, method)
            .map(|response| response.body)
    }

    /// Like `request`, keeping the status and content type.
    pub fn request_with_content_type(
        &self,
        path: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
        method: Option<HttpMethod>,
    ) -> Result<HttpResponse> {
        let request = self.build_request(path, body, headers, method)?;
        debug!(method = request.method.as_str(), url = %request.url, "OpenAM request");
        let response = self.transport.execute(&request)?;
        check_status(&request.url, response)
    }

    pub(crate) fn build_request(
        &self,
        path: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
        method: Option<HttpMethod>,
    ) -> Result<HttpRequest> {
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| OpenAmError::InvalidRequest(err.to_string()))?;

        let mut header_list: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let has_content_type = header_list
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if body.is_some() && !has_content_type {
            header_list.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        Ok(HttpRequest {
            method: method.unwrap_or_else(|| HttpMethod::default_for(body.is_some())),
            url: join_url(&self.base_url, path),
            headers: header_list,
            body,
        })
    }

    // -----------------------------------------------------------------------
    // Active sessions
    // -----------------------------------------------------------------------

    /// Token ids of sessions that logged in through this context and have
    /// not logged out.
    pub fn active_sessions(&self) -> Vec<String> {
        self.active_sessions.borrow().clone()
    }

    pub fn is_active(&self, token_id: &str) -> bool {
        self.active_sessions.borrow().iter().any(|t| t == token_id)
    }

    pub(crate) fn track_session(&self, token_id: &str) {
        let mut sessions = self.active_sessions.borrow_mut();
        if !sessions.iter().any(|t| t == token_id) {
            sessions.push(token_id.to_string());
        }
    }

    pub(crate) fn untrack_session(&self, token_id: &str) {
        self.active_sessions.borrow_mut().retain(|t| t != token_id);
    }
}

/// Map non-success status codes to the matching `OpenAmError` variant.
fn check_status(url: &str, response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }
    let HttpResponse {
        status,
        content_type,
        body,
    } = response;
    Err(OpenAmError::from_status(
        url,
        ErrorResponse::new(status, body, content_type),
    ))
}

fn normalize_base_url(base_url: &str) -> String {
    let base_url = base_url.trim();
    if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    }
}

/// Join `path` onto `base_url` with exactly one `/` at the boundary.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    let base = normalize_base_url(base_url);
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{base}{path}")
}

/// `string=iPlanetDirectoryPro\n` -> `iPlanetDirectoryPro`.
fn parse_legacy_value(body: &str) -> String {
    body.replace(LEGACY_VALUE_PREFIX, "").trim_matches('\n').to_string()
}

/// `string=a\nstring=b\n` -> `[a, b]`. The element after the last newline
/// is always dropped.
fn parse_legacy_list(body: &str) -> Vec<String> {
    let stripped = body.replace(LEGACY_VALUE_PREFIX, "");
    let mut names: Vec<String> = stripped.split('\n').map(str::to_string).collect();
    names.pop();
    names
}

/// Decode a JSON body, treating an empty body as the type's default.
pub(crate) fn parse_json_or_default<T: DeserializeOwned + Default>(what: &str, body: &str) -> Result<T> {
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(body).map_err(|err| OpenAmError::invalid_json(what, err))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| OpenAmError::InvalidRequest(err.to_string()))
}
