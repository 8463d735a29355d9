use crate::auth::clock::{Clock, SystemClock};
use crate::auth::http::{read_json, send_error};
use crate::auth::token_store::{SessionInfo, TokenStore};
use crate::auth::types::{
    ApiError, ClientCredentialsRequest, ClientCredentialsResponse, SdkError,
};
use crate::config::{join_url, required, SdkConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Path of the client-credentials endpoint on the auth audience host
pub const CLIENT_CREDENTIALS_PATH: &str = "/v1/oauth/token";

/// Session for machine-to-machine callers (client-credentials grant)
///
/// Tokens are cached per audience and refreshed on demand once expired.
/// Concurrent callers that find the same audience missing or expired share a
/// single token request.
pub struct MachineSession {
    config: Arc<SdkConfig>,
    client_id: String,
    client_secret: String,
    tokens: TokenStore,
    refresh_guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
}

impl std::fmt::Debug for MachineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineSession")
            .field("client_id", &self.client_id)
            .field("cached_audiences", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

impl MachineSession {
    /// Create a machine session
    ///
    /// Fails with [`SdkError::Config`] when the client id or secret is missing.
    /// No network activity happens here.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tokenbroker_sdk::{Audience, MachineSession, SdkConfig, SessionType};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = SdkConfig::new(SessionType::Machine)
    ///     .with_client_credentials("my-client", Some("s3cr3t".to_string()))
    ///     .with_audience("auth", Audience::new("https://auth.example.com", "auth-aud"))
    ///     .with_audience("facilities", Audience::new("https://facilities.example.com", "fac-aud"));
    ///
    /// let session = MachineSession::new(&config)?;
    /// let token = session.get_current_api_token("facilities").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: &SdkConfig) -> Result<Self, SdkError> {
        let client_id = required(&config.auth.client_id, "Client id")?;
        let client_secret = required(&config.auth.client_secret, "Client secret")?;

        tracing::debug!("Creating MachineSession for client {}", client_id);

        Ok(Self {
            config: Arc::new(config.clone()),
            client_id,
            client_secret,
            tokens: TokenStore::new(),
            refresh_guards: Mutex::new(HashMap::new()),
            clock: Arc::new(SystemClock),
            client: reqwest::Client::new(),
        })
    }

    /// Use a different time source (builder pattern)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing HTTP client (builder pattern)
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// True iff a token is cached for `audience_name` and has not expired
    pub fn is_authenticated(&self, audience_name: &str) -> bool {
        self.tokens
            .get_valid(audience_name, self.clock.now())
            .is_some()
    }

    /// Cached entry for `audience_name`, expired or not
    pub fn session_info(&self, audience_name: &str) -> Option<SessionInfo> {
        self.tokens.get(audience_name)
    }

    /// Get a valid API token for `audience_name`
    ///
    /// Returns the cached token without any network I/O while it is valid;
    /// otherwise requests a new one from the auth server and caches it.
    pub async fn get_current_api_token(&self, audience_name: &str) -> Result<String, SdkError> {
        if let Some(info) = self.tokens.get_valid(audience_name, self.clock.now()) {
            tracing::debug!("Token cache hit for audience={}", audience_name);
            return Ok(info.api_token);
        }

        let audience_client_id = self
            .config
            .audience(audience_name)
            .and_then(|audience| audience.client_id())
            .ok_or_else(|| SdkError::NoValidAudience(audience_name.to_string()))?
            .to_string();

        let guard = self.refresh_guard(audience_name);
        let _refreshing = guard.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(info) = self.tokens.get_valid(audience_name, self.clock.now()) {
            tracing::debug!("Token refreshed by concurrent caller for audience={}", audience_name);
            return Ok(info.api_token);
        }

        let response = self.request_token(&audience_client_id).await?;

        let now = self.clock.now();
        let info = SessionInfo::from_lifetime(response.access_token, response.expires_in, now);
        if !info.is_valid(now) {
            tracing::error!(
                "Token endpoint returned an unusable token for audience={} (expires_in={})",
                audience_name,
                response.expires_in
            );
            return Err(SdkError::Api(ApiError::Parse(format!(
                "Token for audience {} is already expired (expires_in={})",
                audience_name, response.expires_in
            ))));
        }

        tracing::info!(
            "Obtained API token for audience={}, expires_at={}",
            audience_name,
            info.expires_at
        );

        let token = info.api_token.clone();
        self.tokens.insert(audience_name, info);
        Ok(token)
    }

    fn refresh_guard(&self, audience_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.refresh_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(audience_name.to_string())
            .or_default()
            .clone()
    }

    async fn request_token(
        &self,
        audience_client_id: &str,
    ) -> Result<ClientCredentialsResponse, SdkError> {
        let auth_host = &self.config.auth_audience()?.host;
        let url = join_url(auth_host, CLIENT_CREDENTIALS_PATH);

        let payload = ClientCredentialsRequest {
            audience: audience_client_id.to_string(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            grant_type: "client_credentials".to_string(),
        };

        tracing::debug!(
            "Requesting client-credentials token from {} for audience client {}",
            url,
            audience_client_id
        );

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(send_error("client credentials"))?;

        read_json(response, "client credentials").await
    }
}
