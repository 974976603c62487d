//! In-memory transport for unit tests: canned responses keyed by method and
//! URL, plus a log of every request sent.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::context::join_url;
use crate::error::{OpenAmError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

pub(crate) const BASE_URL: &str = "http://openam.test/openam";

#[derive(Default)]
struct FakeState {
    routes: Vec<(HttpMethod, String, HttpResponse)>,
    queued: Vec<(HttpMethod, String, HttpResponse)>,
    requests: Vec<HttpRequest>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    state: Rc<RefCell<FakeState>>,
}

impl FakeTransport {
    /// A transport that already answers the cookie-name lookup.
    pub(crate) fn with_cookie_name() -> Self {
        let fake = Self::default();
        fake.respond_text(
            HttpMethod::Get,
            "/identity/getCookieNameForToken",
            200,
            "string=iPlanetDirectoryPro\n",
        );
        fake
    }

    /// Register a response. Later registrations for the same route win.
    pub(crate) fn respond(&self, method: HttpMethod, path: &str, response: HttpResponse) {
        self.state
            .borrow_mut()
            .routes
            .insert(0, (method, join_url(BASE_URL, path), response));
    }

    /// Register a response that is used once, ahead of any `respond` route.
    /// Queued responses for one route are served in registration order.
    pub(crate) fn respond_once_json(&self, method: HttpMethod, path: &str, status: u16, body: Value) {
        self.state.borrow_mut().queued.push((
            method,
            join_url(BASE_URL, path),
            HttpResponse {
                status,
                content_type: Some("application/json".to_string()),
                body: body.to_string(),
            },
        ));
    }

    pub(crate) fn respond_json(&self, method: HttpMethod, path: &str, status: u16, body: Value) {
        self.respond(
            method,
            path,
            HttpResponse {
                status,
                content_type: Some("application/json".to_string()),
                body: body.to_string(),
            },
        );
    }

    pub(crate) fn respond_text(&self, method: HttpMethod, path: &str, status: u16, body: &str) {
        self.respond(
            method,
            path,
            HttpResponse {
                status,
                content_type: Some("text/plain".to_string()),
                body: body.to_string(),
            },
        );
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.state.borrow().requests.clone()
    }

    pub(crate) fn last_request(&self) -> Option<HttpRequest> {
        self.state.borrow().requests.last().cloned()
    }

    /// Requests sent to `path`, any method.
    pub(crate) fn count(&self, path: &str) -> usize {
        let url = join_url(BASE_URL, path);
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|request| request.url == url)
            .count()
    }
}

impl Transport for FakeTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut state = self.state.borrow_mut();
        state.requests.push(request.clone());
        let matches = |(method, url, _): &(HttpMethod, String, HttpResponse)| {
            *method == request.method && *url == request.url
        };
        if let Some(index) = state.queued.iter().position(matches) {
            return Ok(state.queued.remove(index).2);
        }
        state
            .routes
            .iter()
            .find(|route| matches(*route))
            .map(|(_, _, response)| response.clone())
            .ok_or_else(|| OpenAmError::CommunicationError {
                message: format!("no canned response for {} {}", request.method.as_str(), request.url),
                source: None,
            })
    }
}
