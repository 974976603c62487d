//! One authenticated principal and the lifecycle of its session token.
//!
//! # Design
//! A `Session` borrows the `ServerContext` it was created against and issues
//! every request through it. The context, not the session, owns the list of
//! active sessions; a session adds its token id on login and removes it on
//! logout.
//!
//! ```text
//! Unauthenticated ──login──────────────────────────┐
//!        │                                         v
//!        └─callback──> AwaitingChallenge ──> Authenticated ──logout──> LoggedOut
//! ```
//!
//! `logout` untracks the session locally even when the server call fails, so
//! an empty active list does not prove that every token was revoked
//! server-side.

use std::fmt;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::context::{parse_json_or_default, to_json, ServerContext, PATH_LOGOUT, PATH_SESSIONS, PATH_USERS};
use crate::error::{OpenAmError, Result};
use crate::types::{is_truthy, AuthChallenge, Identity, SessionToken, NAME_CALLBACK, PASSWORD_CALLBACK};

pub const HEADER_USERNAME: &str = "X-OpenAM-Username";
pub const HEADER_PASSWORD: &str = "X-OpenAM-Password";

/// Where a `Session` is in the login handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// A challenge has been fetched and awaits `callback_login`.
    AwaitingChallenge,
    Authenticated,
    /// Terminal. Create a new `Session` to log in again.
    LoggedOut,
}

pub struct Session<'ctx> {
    context: &'ctx ServerContext,
    username: Option<String>,
    password: Option<String>,
    token: Option<SessionToken>,
    identity: Option<Identity>,
    challenge: Option<AuthChallenge>,
    state: SessionState,
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("authenticated", &self.token.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'ctx> Session<'ctx> {
    /// An unauthenticated session. Makes no request.
    pub fn new(context: &'ctx ServerContext) -> Self {
        Self {
            context,
            username: None,
            password: None,
            token: None,
            identity: None,
            challenge: None,
            state: SessionState::Unauthenticated,
        }
    }

    /// Log in immediately with a username and password.
    pub fn authenticate(context: &'ctx ServerContext, username: &str, password: &str) -> Result<Self> {
        let mut session = Self::new(context);
        session.login(username, password)?;
        Ok(session)
    }

    /// Start a callback login by fetching the server's first challenge.
    pub fn begin_challenge(context: &'ctx ServerContext) -> Result<Self> {
        let mut session = Self::new(context);
        session.callback()?;
        Ok(session)
    }

    pub fn context(&self) -> &'ctx ServerContext {
        self.context
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn token_id(&self) -> Option<&str> {
        self.token.as_ref().map(|token| token.token_id.as_str())
    }

    /// The challenge awaiting `callback_login`, if one has been fetched.
    pub fn pending_challenge(&self) -> Option<&AuthChallenge> {
        self.challenge.as_ref()
    }

    /// Authenticate with `X-OpenAM-Username` / `X-OpenAM-Password` headers.
    pub fn login(&mut self, username: &str, password: &str) -> Result<&SessionToken> {
        self.ensure_open()?;
        let headers = [(HEADER_USERNAME, username), (HEADER_PASSWORD, password)];
        let body = self
            .context
            .request(&self.context.login_path(), Some(&json!({})), &headers, None)
            .map_err(|err| err.into_authentication_failure(Some(username)))?;
        let token: SessionToken = serde_json::from_str(&body)
            .map_err(|err| OpenAmError::invalid_json("authentication token", err))?;

        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        info!(username, "OpenAM login succeeded");
        Ok(self.establish(token))
    }

    /// The current challenge, fetched from the server on first use.
    pub fn callback(&mut self) -> Result<&AuthChallenge> {
        self.ensure_open()?;
        let challenge = match self.challenge.take() {
            Some(challenge) => challenge,
            None => self.fetch_challenge()?,
        };
        if self.token.is_none() {
            self.state = SessionState::AwaitingChallenge;
        }
        Ok(self.challenge.insert(challenge))
    }

    /// Answer the pending challenge and submit it.
    ///
    /// `responses` maps callback types (`NameCallback`, `PasswordCallback`,
    /// ...) to values. Each value goes into the first input slot of the first
    /// callback of that type; callbacks without a response keep the value the
    /// server sent. A `NameCallback` value also becomes the session's
    /// username, a `PasswordCallback` value its password.
    ///
    /// Only one round is supported: if the server answers with another
    /// challenge this returns `MultiRoundChallenge` and the new challenge
    /// becomes pending.
    pub fn callback_login<I, K, V>(&mut self, responses: I) -> Result<&SessionToken>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.ensure_open()?;
        let mut challenge = match self.challenge.take() {
            Some(challenge) => challenge,
            None => self.fetch_challenge()?,
        };

        for (kind, value) in responses {
            let kind = kind.as_ref();
            let value = value.into();
            if let Some(text) = value.as_str() {
                match kind {
                    NAME_CALLBACK => self.username = Some(text.to_string()),
                    PASSWORD_CALLBACK => self.password = Some(text.to_string()),
                    _ => {}
                }
            }
            if !challenge.fill(kind, value) {
                debug!(callback = kind, "challenge has no callback of this type");
            }
        }

        let payload = to_json(&challenge)?;
        let submitted = self
            .context
            .request(&self.context.login_path(), Some(&payload), &[], None)
            .map_err(|err| err.into_authentication_failure(self.username.as_deref()));
        let body = match submitted {
            Ok(body) => body,
            Err(err) => {
                // the server discards a challenge once it has been answered
                self.reset_challenge();
                return Err(err);
            }
        };

        let reply: Value = match serde_json::from_str(&body) {
            Ok(reply) => reply,
            Err(err) => {
                self.reset_challenge();
                return Err(OpenAmError::invalid_json("authentication reply", err));
            }
        };
        if reply.get("tokenId").is_some() {
            let token: SessionToken = serde_json::from_value(reply)
                .map_err(|err| OpenAmError::invalid_json("authentication token", err))?;
            info!(username = self.username.as_deref(), "OpenAM callback login succeeded");
            return Ok(self.establish(token));
        }
        if reply.get("callbacks").is_some() {
            let next: AuthChallenge = serde_json::from_value(reply)
                .map_err(|err| OpenAmError::invalid_json("authentication challenge", err))?;
            let stage = next.stage.clone();
            self.challenge = Some(next);
            self.state = SessionState::AwaitingChallenge;
            return Err(OpenAmError::MultiRoundChallenge { stage });
        }
        self.reset_challenge();
        Err(OpenAmError::InvalidResponse {
            what: "authentication reply has neither a token nor callbacks".to_string(),
            source: None,
        })
    }

    /// Ask the server whether the token is still valid. A session without a
    /// token is invalid and makes no request.
    pub fn is_valid(&self) -> Result<bool> {
        let Some(token) = &self.token else {
            return Ok(false);
        };
        let path = format!(
            "{PATH_SESSIONS}{}?_action=validate",
            urlencoding::encode(&token.token_id)
        );
        let body = self.context.request(&path, Some(&json!({})), &[], None)?;
        let reply: Value = parse_json_or_default("session validation", &body)?;
        Ok(reply.get("valid").is_some_and(is_truthy))
    }

    /// This user's directory entry, fetched once and then cached.
    pub fn identity(&mut self) -> Result<&Identity> {
        let identity = match self.identity.take() {
            Some(identity) => identity,
            None => {
                let token_id = self.require_token("identity lookup")?;
                let username = self.username.as_deref().ok_or_else(|| {
                    OpenAmError::InvalidRequest("identity lookup needs a username".to_string())
                })?;
                self.context.get_identity(token_id, username)?
            }
        };
        Ok(self.identity.insert(identity))
    }

    /// Revoke the token and untrack the session. The session is untracked
    /// and moves to `LoggedOut` even when the server call fails; that error
    /// is still returned.
    pub fn logout(&mut self) -> Result<()> {
        self.ensure_open()?;
        let token = self
            .token
            .take()
            .ok_or(OpenAmError::NotAuthenticated { operation: "logout" })?;

        let outcome = self.send_logout(&token.token_id);
        self.context.untrack_session(&token.token_id);
        self.challenge = None;
        self.state = SessionState::LoggedOut;

        match &outcome {
            Ok(()) => info!(username = self.username.as_deref(), "OpenAM logout succeeded"),
            Err(err) => warn!(error = %err, "OpenAM logout failed; session untracked locally"),
        }
        outcome
    }

    pub fn change_password(&mut self, new_password: &str) -> Result<()> {
        let token_id = self.require_token("password change")?.to_string();
        let username = self.username.clone().ok_or_else(|| {
            OpenAmError::InvalidRequest("password change needs a username".to_string())
        })?;
        let cookie = self.context.cookie_name()?;

        let payload = json!({
            "currentpassword": self.password,
            "userpassword": new_password,
        });
        let path = format!(
            "{PATH_USERS}{}?_action=changePassword",
            urlencoding::encode(&username)
        );
        self.context
            .request(&path, Some(&payload), &[(cookie, &token_id)], None)
            .map_err(|err| err.into_authentication_failure(Some(&username)))?;

        self.password = Some(new_password.to_string());
        info!(username = %username, "OpenAM password changed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::LoggedOut {
            return Err(OpenAmError::SessionClosed);
        }
        Ok(())
    }

    fn require_token(&self, operation: &'static str) -> Result<&str> {
        self.token_id()
            .ok_or(OpenAmError::NotAuthenticated { operation })
    }

    fn fetch_challenge(&self) -> Result<AuthChallenge> {
        let body = self
            .context
            .request(&self.context.login_path(), Some(&json!({})), &[], None)?;
        serde_json::from_str(&body)
            .map_err(|err| OpenAmError::invalid_json("authentication challenge", err))
    }

    fn reset_challenge(&mut self) {
        self.challenge = None;
        if self.token.is_none() {
            self.state = SessionState::Unauthenticated;
        }
    }

    fn establish(&mut self, token: SessionToken) -> &SessionToken {
        if let Some(previous) = self.token.take() {
            self.context.untrack_session(&previous.token_id);
        }
        self.context.track_session(&token.token_id);
        self.challenge = None;
        self.state = SessionState::Authenticated;
        self.token.insert(token)
    }

    fn send_logout(&self, token_id: &str) -> Result<()> {
        let cookie = self.context.cookie_name()?;
        self.context
            .request(PATH_LOGOUT, Some(&json!({})), &[(cookie, token_id)], None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextConfig;
    use crate::http::HttpMethod;
    use crate::testing::{FakeTransport, BASE_URL};

    const AUTH: &str = "/json/authenticate";
    const TOKEN: &str = "AQIC5wM2LY4SfczTOKEN.*";

    fn context(fake: &FakeTransport) -> ServerContext {
        ServerContext::with_transport(ContextConfig::new(BASE_URL), fake.clone()).unwrap()
    }

    fn token_body() -> Value {
        json!({"tokenId": TOKEN, "successUrl": "/openam/console", "realm": "/"})
    }

    fn challenge_body() -> Value {
        json!({
            "authId": "auth-1",
            "stage": "DataStore1",
            "callbacks": [
                {"type": "NameCallback", "output": [{"name": "prompt", "value": "User Name:"}],
                 "input": [{"name": "IDToken1", "value": ""}]},
                {"type": "PasswordCallback", "output": [{"name": "prompt", "value": "Password:"}],
                 "input": [{"name": "IDToken2", "value": ""}]},
                {"type": "ConfirmationCallback", "input": [{"name": "IDToken3", "value": 0}]}
            ]
        })
    }

    fn unauthorized() -> Value {
        json!({"code": 401, "reason": "Unauthorized", "message": "Authentication Failed"})
    }

    fn validate_path() -> String {
        format!("/json/sessions/{}?_action=validate", urlencoding::encode(TOKEN))
    }

    fn logged_in(fake: &FakeTransport) -> ServerContext {
        fake.respond_json(HttpMethod::Post, AUTH, 200, token_body());
        context(fake)
    }

    #[test]
    fn is_valid_without_token_makes_no_request() {
        let fake = FakeTransport::default();
        let ctx = context(&fake);
        let session = Session::new(&ctx);

        assert!(!session.is_valid().unwrap());
        assert!(fake.requests().is_empty());
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn login_sends_credential_headers_and_tracks_session() {
        let fake = FakeTransport::default();
        let ctx = logged_in(&fake);

        let session = Session::authenticate(&ctx, "amadmin", "secret").unwrap();
        assert_eq!(session.token_id(), Some(TOKEN));
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(session.username(), Some("amadmin"));
        assert_eq!(ctx.active_sessions(), [TOKEN]);

        let sent = fake.last_request().unwrap();
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.header(HEADER_USERNAME), Some("amadmin"));
        assert_eq!(sent.header(HEADER_PASSWORD), Some("secret"));
        assert_eq!(sent.body.as_deref(), Some("{}"));
    }

    #[test]
    fn login_uses_configured_realm() {
        let fake = FakeTransport::default();
        fake.respond_json(HttpMethod::Post, "/json/authenticate?realm=staff", 200, token_body());
        let config = ContextConfig::new(BASE_URL).with_realm("staff");
        let ctx = ServerContext::with_transport(config, fake.clone()).unwrap();

        Session::authenticate(&ctx, "demo", "changeit").unwrap();
        assert_eq!(fake.count("/json/authenticate?realm=staff"), 1);
    }

    #[test]
    fn login_unauthorized_is_authentication_failure() {
        let fake = FakeTransport::default();
        fake.respond_json(HttpMethod::Post, AUTH, 401, unauthorized());
        let ctx = context(&fake);

        let err = Session::authenticate(&ctx, "demo", "wrong").unwrap_err();
        assert!(err.is_authentication_failure());
        assert!(err.to_string().contains("\"demo\""));
        assert_eq!(err.body().unwrap().as_json().unwrap()["message"], "Authentication Failed");
        assert!(ctx.active_sessions().is_empty());
    }

    #[test]
    fn login_server_error_propagates_unchanged() {
        let fake = FakeTransport::default();
        fake.respond_text(HttpMethod::Post, AUTH, 500, "Internal Server Error");
        let ctx = context(&fake);

        let err = Session::authenticate(&ctx, "demo", "changeit").unwrap_err();
        assert!(matches!(err, OpenAmError::ServerError { .. }));
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn callback_is_fetched_once() {
        let fake = FakeTransport::default();
        fake.respond_json(HttpMethod::Post, AUTH, 200, challenge_body());
        let ctx = context(&fake);

        let mut session = Session::begin_challenge(&ctx).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingChallenge);
        let kinds: Vec<String> = session.callback().unwrap().kinds().map(str::to_string).collect();
        assert_eq!(kinds, ["NameCallback", "PasswordCallback", "ConfirmationCallback"]);
        assert_eq!(fake.count(AUTH), 1);
        assert_eq!(fake.last_request().unwrap().body.as_deref(), Some("{}"));
    }

    #[test]
    fn callback_login_fills_matching_slots_and_resubmits() {
        let fake = FakeTransport::default();
        fake.respond_once_json(HttpMethod::Post, AUTH, 200, challenge_body());
        fake.respond_once_json(HttpMethod::Post, AUTH, 200, token_body());
        let ctx = context(&fake);

        let mut session = Session::new(&ctx);
        session
            .callback_login([("NameCallback", "alice"), ("PasswordCallback", "secret")])
            .unwrap();

        assert_eq!(session.token_id(), Some(TOKEN));
        assert_eq!(session.username(), Some("alice"));
        assert_eq!(session.state(), SessionState::Authenticated);
        assert!(session.pending_challenge().is_none());
        assert!(ctx.is_active(TOKEN));

        let sent = fake.last_request().unwrap();
        let body: Value = serde_json::from_str(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["authId"], "auth-1");
        assert_eq!(body["callbacks"][0]["input"][0]["value"], "alice");
        assert_eq!(body["callbacks"][1]["input"][0]["value"], "secret");
        assert_eq!(body["callbacks"][2]["input"][0]["value"], 0);
        assert_eq!(body["callbacks"][0]["output"][0]["value"], "User Name:");
    }

    #[test]
    fn callback_login_unauthorized_is_authentication_failure() {
        let fake = FakeTransport::default();
        fake.respond_once_json(HttpMethod::Post, AUTH, 200, challenge_body());
        fake.respond_once_json(HttpMethod::Post, AUTH, 401, unauthorized());
        let ctx = context(&fake);

        let mut session = Session::new(&ctx);
        let err = session
            .callback_login([("NameCallback", "alice"), ("PasswordCallback", "nope")])
            .unwrap_err();

        assert!(err.is_authentication_failure());
        assert!(err.to_string().contains("\"alice\""));
        assert!(session.pending_challenge().is_none());
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn callback_login_garbled_reply_resets_challenge() {
        let fake = FakeTransport::default();
        fake.respond_once_json(HttpMethod::Post, AUTH, 200, challenge_body());
        fake.respond_text(HttpMethod::Post, AUTH, 200, "<html>maintenance</html>");
        let ctx = context(&fake);

        let mut session = Session::begin_challenge(&ctx).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingChallenge);
        let err = session
            .callback_login([("NameCallback", "alice"), ("PasswordCallback", "secret")])
            .unwrap_err();

        assert!(matches!(err, OpenAmError::InvalidResponse { .. }), "{err}");
        assert!(session.pending_challenge().is_none());
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn second_challenge_is_reported_and_kept() {
        let fake = FakeTransport::default();
        fake.respond_once_json(HttpMethod::Post, AUTH, 200, challenge_body());
        fake.respond_once_json(
            HttpMethod::Post,
            AUTH,
            200,
            json!({
                "authId": "auth-2",
                "stage": "OATH2",
                "callbacks": [{"type": "TextInputCallback", "input": [{"name": "IDToken1", "value": ""}]}]
            }),
        );
        let ctx = context(&fake);

        let mut session = Session::new(&ctx);
        let err = session
            .callback_login([("NameCallback", "alice"), ("PasswordCallback", "secret")])
            .unwrap_err();

        assert!(matches!(err, OpenAmError::MultiRoundChallenge { stage: Some(ref s) } if s == "OATH2"));
        assert!(session.token().is_none());
        assert_eq!(session.state(), SessionState::AwaitingChallenge);
        assert_eq!(session.pending_challenge().unwrap().auth_id.as_deref(), Some("auth-2"));
        assert!(ctx.active_sessions().is_empty());
    }

    #[test]
    fn is_valid_follows_server_verdict() {
        let cases = [
            (json!({"valid": true, "uid": "demo"}), true),
            (json!({"valid": false}), false),
            (json!({"uid": "demo"}), false),
        ];
        for (reply, expected) in cases {
            let fake = FakeTransport::default();
            let ctx = logged_in(&fake);
            fake.respond_json(HttpMethod::Post, &validate_path(), 200, reply.clone());

            let session = Session::authenticate(&ctx, "demo", "changeit").unwrap();
            assert_eq!(session.is_valid().unwrap(), expected, "{reply}");
        }
    }

    #[test]
    fn logout_revokes_and_untracks() {
        let fake = FakeTransport::with_cookie_name();
        let ctx = logged_in(&fake);
        fake.respond_json(HttpMethod::Post, PATH_LOGOUT, 200, json!({"result": "Successfully logged out"}));

        let mut session = Session::authenticate(&ctx, "demo", "changeit").unwrap();
        session.logout().unwrap();

        let sent = fake.last_request().unwrap();
        assert_eq!(sent.header("iPlanetDirectoryPro"), Some(TOKEN));
        assert_eq!(session.state(), SessionState::LoggedOut);
        assert!(ctx.active_sessions().is_empty());

        let before = fake.requests().len();
        assert!(!session.is_valid().unwrap());
        assert_eq!(fake.requests().len(), before);
    }

    #[test]
    fn failed_logout_still_untracks() {
        let fake = FakeTransport::with_cookie_name();
        let ctx = logged_in(&fake);
        fake.respond_text(HttpMethod::Post, PATH_LOGOUT, 503, "unavailable");

        let mut session = Session::authenticate(&ctx, "demo", "changeit").unwrap();
        let err = session.logout().unwrap_err();

        assert!(matches!(err, OpenAmError::ServerError { .. }));
        assert!(!ctx.is_active(TOKEN));
        assert_eq!(session.state(), SessionState::LoggedOut);
    }

    #[test]
    fn logged_out_session_cannot_log_in_again() {
        let fake = FakeTransport::with_cookie_name();
        let ctx = logged_in(&fake);
        fake.respond_json(HttpMethod::Post, PATH_LOGOUT, 200, json!({}));

        let mut session = Session::authenticate(&ctx, "demo", "changeit").unwrap();
        session.logout().unwrap();

        assert!(matches!(session.login("demo", "changeit"), Err(OpenAmError::SessionClosed)));
        assert!(matches!(session.logout(), Err(OpenAmError::SessionClosed)));
    }

    #[test]
    fn logout_without_token_is_rejected() {
        let fake = FakeTransport::default();
        let ctx = context(&fake);
        let mut session = Session::new(&ctx);

        let err = session.logout().unwrap_err();
        assert!(matches!(err, OpenAmError::NotAuthenticated { operation: "logout" }));
        assert!(fake.requests().is_empty());
    }

    #[test]
    fn identity_is_fetched_once() {
        let fake = FakeTransport::with_cookie_name();
        let ctx = logged_in(&fake);
        fake.respond_json(
            HttpMethod::Get,
            "/json/users/demo",
            200,
            json!({"username": "demo", "mail": ["demo@example.com"]}),
        );

        let mut session = Session::authenticate(&ctx, "demo", "changeit").unwrap();
        assert_eq!(session.identity().unwrap().mail(), Some("demo@example.com"));
        assert_eq!(session.identity().unwrap().username(), Some("demo"));
        assert_eq!(fake.count("/json/users/demo"), 1);
    }

    #[test]
    fn identity_requires_token() {
        let ctx = context(&FakeTransport::default());
        let mut session = Session::new(&ctx);
        let err = session.identity().unwrap_err();
        assert!(matches!(err, OpenAmError::NotAuthenticated { .. }));
    }

    #[test]
    fn change_password_sends_current_and_new() {
        let fake = FakeTransport::with_cookie_name();
        let ctx = logged_in(&fake);
        let path = "/json/users/demo?_action=changePassword";
        fake.respond_json(HttpMethod::Post, path, 200, json!({}));

        let mut session = Session::authenticate(&ctx, "demo", "changeit").unwrap();
        session.change_password("newpassword").unwrap();
        session.change_password("changeit").unwrap();

        let sent: Vec<Value> = fake
            .requests()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .map(|r| serde_json::from_str(r.body.as_deref().unwrap()).unwrap())
            .collect();
        assert_eq!(
            sent,
            [
                json!({"currentpassword": "changeit", "userpassword": "newpassword"}),
                json!({"currentpassword": "newpassword", "userpassword": "changeit"}),
            ]
        );
    }

    #[test]
    fn change_password_unauthorized_is_authentication_failure() {
        let fake = FakeTransport::with_cookie_name();
        let ctx = logged_in(&fake);
        fake.respond_json(HttpMethod::Post, "/json/users/demo?_action=changePassword", 401, unauthorized());

        let mut session = Session::authenticate(&ctx, "demo", "changeit").unwrap();
        let err = session.change_password("newpassword").unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn change_password_forbidden_stays_client_error() {
        let fake = FakeTransport::with_cookie_name();
        let ctx = logged_in(&fake);
        fake.respond_json(
            HttpMethod::Post,
            "/json/users/demo?_action=changePassword",
            403,
            json!({"code": 403, "reason": "Forbidden"}),
        );

        let mut session = Session::authenticate(&ctx, "demo", "changeit").unwrap();
        let err = session.change_password("newpassword").unwrap_err();
        assert!(matches!(err, OpenAmError::ClientError { .. }));
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn debug_output_redacts_password() {
        let fake = FakeTransport::default();
        let ctx = logged_in(&fake);
        let session = Session::authenticate(&ctx, "demo", "changeit").unwrap();
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("changeit"));
        assert!(rendered.contains("<redacted>"));
    }
}
