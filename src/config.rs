//! SDK configuration.
//!
//! Configuration is usually loaded from TOML:
//!
//! ```toml
//! session_type = "machine"
//!
//! [auth]
//! client_id = "my-client"
//! client_secret = "s3cr3t"
//!
//! [audiences.auth]
//! host = "https://auth.example.com"
//! client_id = "auth-audience"
//!
//! [audiences.facilities]
//! host = "https://facilities.example.com"
//! client_id = "facilities-audience"
//! ```
//!
//! Secrets can be kept out of the file and supplied through
//! `TOKENBROKER_CLIENT_ID` / `TOKENBROKER_CLIENT_SECRET`.

use crate::auth::types::SdkError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const CLIENT_ID_ENV: &str = "TOKENBROKER_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "TOKENBROKER_CLIENT_SECRET";

/// Which session implementation the SDK runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Non-interactive client-credentials flow
    Machine,
    /// Interactive browser-redirect flow
    Web,
}

/// A backend service the SDK can call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Audience {
    /// Base URL of the service
    pub host: String,
    /// Client id identifying the service to the auth server
    #[serde(default)]
    pub client_id: Option<String>,
}

impl Audience {
    pub fn new(host: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            client_id: Some(client_id.into()),
        }
    }

    /// Client id if present and non-empty
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Credentials and endpoints for the session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    /// Required for the machine flow only
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Base URL of the identity provider (web flow: authorize and userinfo)
    #[serde(default)]
    pub identity_provider_url: Option<String>,
    /// Callback path the identity provider redirects back to (web flow)
    #[serde(default = "default_authorization_path")]
    pub authorization_path: String,
    /// Name of the audience that hosts the token endpoints
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            identity_provider_url: None,
            authorization_path: default_authorization_path(),
            auth_audience: default_auth_audience(),
        }
    }
}

fn default_authorization_path() -> String {
    "/callback".to_string()
}

fn default_auth_audience() -> String {
    "auth".to_string()
}

/// Top-level SDK configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SdkConfig {
    pub session_type: SessionType,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub audiences: BTreeMap<String, Audience>,
}

impl SdkConfig {
    pub fn new(session_type: SessionType) -> Self {
        Self {
            session_type,
            auth: AuthConfig::default(),
            audiences: BTreeMap::new(),
        }
    }

    /// Add an audience (builder pattern)
    pub fn with_audience(mut self, name: impl Into<String>, audience: Audience) -> Self {
        self.audiences.insert(name.into(), audience);
        self
    }

    /// Set client credentials (builder pattern)
    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        self.auth.client_id = Some(client_id.into());
        self.auth.client_secret = client_secret;
        self
    }

    /// Set the identity provider base URL (builder pattern)
    pub fn with_identity_provider_url(mut self, url: impl Into<String>) -> Self {
        self.auth.identity_provider_url = Some(url.into());
        self
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, SdkError> {
        toml::from_str(content)
            .map_err(|e| SdkError::Config(format!("Invalid SDK configuration: {}", e)))
    }

    /// Read and parse a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SdkError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SdkError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded SDK configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Override client credentials from the environment, when set
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(client_id) = std::env::var(CLIENT_ID_ENV) {
            tracing::debug!("Using client id from {}", CLIENT_ID_ENV);
            self.auth.client_id = Some(client_id);
        }
        if let Ok(client_secret) = std::env::var(CLIENT_SECRET_ENV) {
            tracing::debug!("Using client secret from {}", CLIENT_SECRET_ENV);
            self.auth.client_secret = Some(client_secret);
        }
        self
    }

    /// Configured audience by name
    pub fn audience(&self, name: &str) -> Option<&Audience> {
        self.audiences.get(name)
    }

    /// Audience hosting the token endpoints
    pub fn auth_audience(&self) -> Result<&Audience, SdkError> {
        self.audience(&self.auth.auth_audience).ok_or_else(|| {
            SdkError::Config(format!(
                "Auth audience '{}' is not configured",
                self.auth.auth_audience
            ))
        })
    }
}

/// Trimmed, non-empty configuration value
pub(crate) fn required(value: &Option<String>, name: &str) -> Result<String, SdkError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(SdkError::Config(format!("{} is required", name))),
    }
}

/// Join a base URL and an absolute path without doubling the slash
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
