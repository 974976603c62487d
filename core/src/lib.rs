//! Blocking client for the OpenAM REST API.
//!
//! # Overview
//! Authenticates users (credential headers or callback challenges), validates
//! and revokes sessions, and reads, creates and deletes identities.
//!
//! ```no_run
//! use openam_core::{ContextConfig, ServerContext, Session};
//!
//! # fn main() -> openam_core::Result<()> {
//! let context = ServerContext::new(ContextConfig::new("https://sso.example.com/openam"))?;
//! let mut session = Session::authenticate(&context, "demo", "changeit")?;
//! assert!(session.is_valid()?);
//! println!("{:?}", session.identity()?.mail());
//! session.logout()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - `ServerContext` holds connection settings, caches server metadata and
//!   tracks active sessions. It is single-threaded (`!Sync`).
//! - `Session` borrows a context and drives one principal's login, use and
//!   logout.
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`);
//!   the `Transport` trait performs the round-trip, `ureq` by default.
//! - Non-2xx statuses map onto `OpenAmError` once, at the context; only the
//!   login and password-change paths re-key 401 as `AuthenticationFailure`.
//! - Nothing is retried.

pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{ContextConfig, TlsPolicy};
pub use context::ServerContext;
pub use error::{ErrorBody, ErrorResponse, OpenAmError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use session::{Session, SessionState};
pub use types::{AuthChallenge, Callback, CallbackSlot, Identity, NewIdentity, ServerInfo, SessionToken};
