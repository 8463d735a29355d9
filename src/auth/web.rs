use crate::auth::clock::{Clock, SystemClock};
use crate::auth::http::{read_json, send_error};
use crate::auth::navigation::Navigator;
use crate::auth::session_store::{self, WebSessionInfo};
use crate::auth::token_store::expires_at_from_lifetime;
use crate::auth::types::{
    ApiError, SdkError, TokenExchangeRequest, TokenExchangeResponse, TokenKind, UserProfile,
};
use crate::config::{join_url, required, SdkConfig};
use crate::storage::PersistenceAdapter;
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

/// Path of the token-exchange endpoint on the auth audience host
pub const TOKEN_EXCHANGE_PATH: &str = "/v1/token";

/// Scopes requested from the identity provider
pub const LOGIN_SCOPE: &str = "profile openid";

/// Access token and lifetime carried in the identity-provider redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTokens {
    pub access_token: String,
    pub expires_in: i64,
}

/// Parse the fragment of the identity-provider callback URL
///
/// Expects `access_token` and a positive integer `expires_in`. An `error`
/// returned by the provider is reported with its description.
pub fn parse_redirect_fragment(url: &Url) -> Result<RedirectTokens, SdkError> {
    let fragment = url
        .fragment()
        .filter(|fragment| !fragment.is_empty())
        .ok_or_else(no_valid_tokens)?;

    let mut access_token = None;
    let mut expires_in = None;
    let mut error = None;
    let mut error_description = None;

    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "expires_in" => expires_in = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(SdkError::InvalidRedirect(match error_description {
            Some(description) => format!("No valid tokens returned: {} ({})", error, description),
            None => format!("No valid tokens returned: {}", error),
        }));
    }

    let access_token = access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(no_valid_tokens)?;
    let expires_in = expires_in
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|secs| *secs > 0)
        .ok_or_else(no_valid_tokens)?;

    Ok(RedirectTokens {
        access_token,
        expires_in,
    })
}

fn no_valid_tokens() -> SdkError {
    SdkError::InvalidRedirect("No valid tokens returned".to_string())
}

/// `scheme://host[:port]` of the hosting page
///
/// Custom schemes used by desktop webviews (`tauri://localhost`) have an
/// opaque origin, so their scheme and host are joined directly.
fn page_origin(url: &Url) -> Result<String, SdkError> {
    match url.origin() {
        origin @ url::Origin::Tuple(..) => Ok(origin.ascii_serialization()),
        url::Origin::Opaque(_) => {
            let host = url.host_str().filter(|host| !host.is_empty()).ok_or_else(|| {
                SdkError::Config(format!("Cannot derive a callback origin from {}", url))
            })?;
            Ok(match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            })
        }
    }
}

/// Session for human users (browser-redirect login)
///
/// Login happens in two phases separated by a full page load:
///
/// 1. [`WebSession::log_in`] sends the browser to the identity provider;
///    the current process ends there.
/// 2. The provider redirects back to the callback path. A fresh `WebSession`
///    is constructed, and [`WebSession::handle_authentication`] parses the
///    redirect, exchanges the access token for an API token, persists both and
///    navigates to the stored return path.
///
/// Every later page load rehydrates the session from durable storage.
pub struct WebSession {
    config: Arc<SdkConfig>,
    client_id: String,
    redirect_uri: String,
    session: RwLock<Option<WebSessionInfo>>,
    storage: Arc<dyn PersistenceAdapter>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
}

impl std::fmt::Debug for WebSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSession")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("has_session", &self.session_info().is_some())
            .finish_non_exhaustive()
    }
}

impl WebSession {
    /// Create a web session and rehydrate any persisted login
    ///
    /// Fails with [`SdkError::Config`] when the client id is missing. Storage
    /// problems while rehydrating are logged and yield a logged-out session.
    pub async fn new(
        config: &SdkConfig,
        storage: Arc<dyn PersistenceAdapter>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, SdkError> {
        let client_id = required(&config.auth.client_id, "Client id")?;

        let redirect_uri = format!(
            "{}{}",
            page_origin(&navigator.current_url())?,
            config.auth.authorization_path
        );

        let session = match session_store::load_session(storage.as_ref()).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Failed to load persisted web session: {}", e);
                None
            }
        };

        tracing::debug!(
            "Creating WebSession for client {} (redirect_uri={}, restored={})",
            client_id,
            redirect_uri,
            session.is_some()
        );

        Ok(Self {
            config: Arc::new(config.clone()),
            client_id,
            redirect_uri,
            session: RwLock::new(session),
            storage,
            navigator,
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

    /// Callback URL registered with the identity provider
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Snapshot of the in-memory session
    pub fn session_info(&self) -> Option<WebSessionInfo> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Identity-provider authorize URL for this client
    pub fn authorize_url(&self) -> Result<Url, SdkError> {
        let provider = self.config.auth.identity_provider_url.as_deref().ok_or_else(|| {
            SdkError::Config("Identity provider URL is required for web login".to_string())
        })?;
        let audience = self
            .config
            .auth_audience()?
            .client_id()
            .ok_or_else(|| SdkError::NoValidAudience(self.config.auth.auth_audience.clone()))?;

        let mut url = Url::parse(&join_url(provider, "/authorize")).map_err(ApiError::from)?;
        url.query_pairs_mut()
            .append_pair("audience", audience)
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "token")
            .append_pair("scope", LOGIN_SCOPE);

        Ok(url)
    }

    /// Send the user to the identity provider to log in
    ///
    /// Control leaves this page; the outcome is only observable through
    /// [`WebSession::handle_authentication`] after the provider redirects back.
    pub fn log_in(&self) -> Result<(), SdkError> {
        let url = self.authorize_url()?;
        tracing::info!("Redirecting to identity provider for login");
        self.navigator.redirect_to(url.as_str());
        Ok(())
    }

    /// Remember `pathname` as the post-login destination, then log in
    pub async fn log_in_returning_to(&self, pathname: &str) -> Result<(), SdkError> {
        // Validate before persisting anything
        let url = self.authorize_url()?;
        session_store::store_redirect_pathname(self.storage.as_ref(), pathname).await?;
        tracing::info!("Redirecting to identity provider for login (return to {})", pathname);
        self.navigator.redirect_to(url.as_str());
        Ok(())
    }

    /// Complete login after the identity provider redirects back
    ///
    /// On any failure the error is logged, the browser is sent to `/`, and the
    /// error is returned. Nothing is cached unless every step succeeded.
    pub async fn handle_authentication(&self) -> Result<WebSessionInfo, SdkError> {
        match self.complete_authentication().await {
            Ok(info) => Ok(info),
            Err(e) => {
                tracing::error!("Authentication failed: {}", e);
                self.navigator.redirect_to("/");
                Err(e)
            }
        }
    }

    async fn complete_authentication(&self) -> Result<WebSessionInfo, SdkError> {
        let tokens = parse_redirect_fragment(&self.navigator.current_url())?;

        let api_token = self.exchange_access_token(&tokens.access_token).await?;

        // The identity token's lifetime bounds the whole session
        let info = WebSessionInfo {
            access_token: tokens.access_token,
            api_token,
            expires_at: expires_at_from_lifetime(self.clock.now(), tokens.expires_in),
        };
        self.save_session(&info).await?;

        let pathname = session_store::take_redirect_pathname(self.storage.as_ref()).await;
        tracing::info!("Login complete, redirecting to {}", pathname);
        self.navigator.redirect_to(&pathname);

        Ok(info)
    }

    /// Client ids of every configured audience except the auth audience itself
    fn exchange_audiences(&self) -> Result<Vec<String>, SdkError> {
        let auth_audience = &self.config.auth.auth_audience;

        Ok(self
            .config
            .audiences
            .iter()
            .filter(|(name, _)| *name != auth_audience)
            .filter_map(|(_, audience)| audience.client_id())
            .map(str::to_string)
            .collect())
    }

    async fn exchange_access_token(&self, access_token: &str) -> Result<String, SdkError> {
        let url = join_url(&self.config.auth_audience()?.host, TOKEN_EXCHANGE_PATH);
        let payload = TokenExchangeRequest {
            audiences: self.exchange_audiences()?,
            nonce: uuid::Uuid::new_v4().to_string(),
        };

        tracing::debug!(
            "Exchanging access token at {} for {} audiences",
            url,
            payload.audiences.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(send_error("token exchange"))?;

        let exchanged: TokenExchangeResponse = read_json(response, "token exchange").await?;
        if exchanged.access_token.is_empty() {
            return Err(SdkError::Api(ApiError::Parse(
                "Token exchange returned an empty API token".to_string(),
            )));
        }

        Ok(exchanged.access_token)
    }

    /// Persist to storage first, then publish in memory
    ///
    /// A failed save rolls storage back to empty, so memory is emptied too.
    async fn save_session(&self, info: &WebSessionInfo) -> Result<(), SdkError> {
        let saved = session_store::save_session(self.storage.as_ref(), info).await;
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = match saved {
            Ok(()) => Some(info.clone()),
            Err(_) => None,
        };
        saved.map_err(SdkError::from)
    }

    /// The cached session if usable now, or the matching accessor error
    fn current_session(&self, kind: TokenKind) -> Result<WebSessionInfo, SdkError> {
        let info = self.session_info().ok_or(SdkError::TokenNotFound(kind))?;
        if info.is_valid(self.clock.now()) {
            Ok(info)
        } else {
            Err(SdkError::TokenExpired(kind))
        }
    }

    /// API token for backend calls; valid for every configured audience
    pub fn get_current_api_token(&self) -> Result<String, SdkError> {
        self.current_session(TokenKind::Api).map(|info| info.api_token)
    }

    /// Identity-provider access token
    pub fn get_current_access_token(&self) -> Result<String, SdkError> {
        self.current_session(TokenKind::Access)
            .map(|info| info.access_token)
    }

    /// Both tokens present and unexpired
    pub fn is_authenticated(&self) -> bool {
        self.session_info()
            .is_some_and(|info| info.is_valid(self.clock.now()))
    }

    /// Forget the session in storage and memory, then go to `/`
    ///
    /// Safe to call with no active session. A storage failure is returned
    /// after memory is cleared and the redirect has happened.
    pub async fn log_out(&self) -> Result<(), SdkError> {
        let cleared = session_store::clear_session(self.storage.as_ref()).await;
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;

        match &cleared {
            Ok(()) => tracing::info!("Logged out"),
            Err(e) => tracing::error!("Logged out with storage error: {}", e),
        }
        self.navigator.redirect_to("/");
        cleared.map_err(SdkError::from)
    }

    /// Fetch the user's profile from the identity provider
    pub async fn get_profile(&self) -> Result<UserProfile, SdkError> {
        let access_token = self.get_current_access_token().map_err(|e| match e {
            SdkError::TokenExpired(kind) => SdkError::TokenExpired(kind),
            _ => SdkError::TokenNotFound(TokenKind::Access),
        })?;
        let provider = self.config.auth.identity_provider_url.as_deref().ok_or_else(|| {
            SdkError::Config("Identity provider URL is required for profile lookup".to_string())
        })?;
        let url = join_url(provider, "/userinfo");

        tracing::debug!("Fetching user profile from {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(send_error("user profile"))?;

        read_json(response, "user profile").await
    }
}
