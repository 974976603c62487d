//! HTTP transport: requests and responses as plain data, plus the blocking
//! round-trip that moves them over the network.
//!
//! # Design
//! `ServerContext` builds an `HttpRequest`, hands it to a `Transport`, and
//! classifies the returned `HttpResponse` itself. A transport only reports
//! what came back; any status code, 4xx and 5xx included, is an `Ok`
//! response. `Err` is reserved for "no response at all", which
//! `UreqTransport` reports as `OpenAmError::CommunicationError`.

use std::time::Duration;

use tracing::{debug, warn};
use ureq::http::header::CONTENT_TYPE;
use ureq::tls::TlsConfig;
use ureq::Agent;

use crate::config::TlsPolicy;
use crate::error::{OpenAmError, Result};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// POST when a body is sent, GET otherwise.
    pub fn default_for(has_body: bool) -> Self {
        if has_body {
            HttpMethod::Post
        } else {
            HttpMethod::Get
        }
    }
}

/// An HTTP request described as plain data. `body` is already-serialized
/// JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// `content_type` is the bare MIME type with parameters stripped, `None` when
/// the server sent no `Content-Type`. `body` is decoded from the declared
/// charset; bytes that are not valid text become U+FFFD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One blocking HTTP round-trip.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Default transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration, tls: TlsPolicy) -> Self {
        let mut tls_config = TlsConfig::builder();
        if tls == TlsPolicy::Insecure {
            warn!("TLS certificate verification is disabled for this OpenAM context");
            tls_config = tls_config.disable_verification(true);
        }

        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .tls_config(tls_config.build())
            .build()
            .new_agent();

        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let sent = match request.body.as_deref() {
            Some(body) => builder.body(body).map(|req| self.agent.run(req)),
            None => builder.body(()).map(|req| self.agent.run(req)),
        };
        let mut response = sent
            .map_err(|err| OpenAmError::InvalidRequest(err.to_string()))?
            .map_err(|err| OpenAmError::communication(&request.url, err))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(mime_type);
        let body = match response.body_mut().with_config().lossy_utf8(true).read_to_string() {
            Ok(body) => body,
            Err(err) if (200..300).contains(&status) => {
                return Err(OpenAmError::communication(&request.url, err));
            }
            Err(err) => {
                // the status alone still classifies the failure
                warn!(url = %request.url, status, error = %err, "failed to read OpenAM error body");
                String::new()
            }
        };

        debug!(method = request.method.as_str(), url = %request.url, status, "OpenAM response");
        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// `text/plain; charset=UTF-8` -> `text/plain`.
pub(crate) fn mime_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
