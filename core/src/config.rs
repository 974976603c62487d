//! Connection settings for a `ServerContext`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OpenAmError, Result};

/// Seconds to wait for a response when no timeout is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

const ENV_URL: &str = "OPENAM_URL";
const ENV_REALM: &str = "OPENAM_REALM";
const ENV_TIMEOUT: &str = "OPENAM_TIMEOUT_SECS";
const ENV_TLS_INSECURE: &str = "OPENAM_TLS_INSECURE";

/// How server certificates are checked on `https` URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Full chain and hostname verification.
    #[default]
    Verify,
    /// Accept any certificate. Only for self-signed development servers.
    Insecure,
}

/// Settings for one target OpenAM deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Deployment URL, e.g. `https://sso.example.com/openam`.
    pub base_url: String,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub tls: TlsPolicy,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ContextConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            realm: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            tls: TlsPolicy::Verify,
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_tls(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The realm, treating an empty string as no realm.
    pub fn effective_realm(&self) -> Option<&str> {
        self.realm.as_deref().filter(|realm| !realm.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(OpenAmError::Configuration(
                "an OpenAM URL is required".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(OpenAmError::Configuration(
                "timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Read `OPENAM_URL`, `OPENAM_REALM`, `OPENAM_TIMEOUT_SECS` and
    /// `OPENAM_TLS_INSECURE` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup(ENV_URL)
            .ok_or_else(|| OpenAmError::Configuration(format!("{ENV_URL} is not set")))?;
        let mut config = Self::new(base_url);

        if let Some(realm) = lookup(ENV_REALM) {
            config.realm = Some(realm);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            config.timeout_secs = raw.trim().parse().map_err(|_| {
                OpenAmError::Configuration(format!("{ENV_TIMEOUT} must be an integer, got '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup(ENV_TLS_INSECURE) {
            config.tls = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => TlsPolicy::Insecure,
                "0" | "false" | "no" | "" => TlsPolicy::Verify,
                _ => {
                    return Err(OpenAmError::Configuration(format!(
                        "{ENV_TLS_INSECURE} must be a boolean, got '{raw}'"
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}
