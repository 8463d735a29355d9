use crate::auth::machine::MachineSession;
use crate::auth::navigation::Navigator;
use crate::auth::types::SdkError;
use crate::auth::web::WebSession;
use crate::config::{SdkConfig, SessionType};
use crate::storage::PersistenceAdapter;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future resolving to a bearer token
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<String, SdkError>> + Send + 'a>>;

/// Anything that can produce a valid API token for an audience
///
/// This is the only auth surface the request gateway and resource modules
/// depend on.
pub trait ApiTokenProvider: Send + Sync {
    fn get_current_api_token<'a>(&'a self, audience_name: &'a str) -> TokenFuture<'a>;
}

impl ApiTokenProvider for MachineSession {
    fn get_current_api_token<'a>(&'a self, audience_name: &'a str) -> TokenFuture<'a> {
        Box::pin(MachineSession::get_current_api_token(self, audience_name))
    }
}

/// The web session holds one API token valid for every audience, so the
/// audience name is not consulted.
impl ApiTokenProvider for WebSession {
    fn get_current_api_token<'a>(&'a self, _audience_name: &'a str) -> TokenFuture<'a> {
        let token = WebSession::get_current_api_token(self);
        Box::pin(async move { token })
    }
}

/// Host facilities the web session needs
#[derive(Clone)]
pub struct BrowserContext {
    pub storage: Arc<dyn PersistenceAdapter>,
    pub navigator: Arc<dyn Navigator>,
}

impl BrowserContext {
    pub fn new(storage: Arc<dyn PersistenceAdapter>, navigator: Arc<dyn Navigator>) -> Self {
        Self { storage, navigator }
    }
}

/// The active session, selected once from configuration
#[derive(Debug)]
pub enum Session {
    Machine(MachineSession),
    Web(WebSession),
}

impl Session {
    /// Build the session named by `config.session_type`
    ///
    /// The web session requires a [`BrowserContext`]; the machine session
    /// ignores it.
    pub async fn from_config(
        config: &SdkConfig,
        browser: Option<BrowserContext>,
    ) -> Result<Self, SdkError> {
        match config.session_type {
            SessionType::Machine => {
                tracing::debug!("Selecting machine session");
                Ok(Session::Machine(MachineSession::new(config)?))
            }
            SessionType::Web => {
                tracing::debug!("Selecting web session");
                let browser = browser.ok_or_else(|| {
                    SdkError::Config(
                        "Web session requires storage and a navigator".to_string(),
                    )
                })?;
                Ok(Session::Web(
                    WebSession::new(config, browser.storage, browser.navigator).await?,
                ))
            }
        }
    }

    pub fn session_type(&self) -> SessionType {
        match self {
            Session::Machine(_) => SessionType::Machine,
            Session::Web(_) => SessionType::Web,
        }
    }

    pub fn as_machine(&self) -> Option<&MachineSession> {
        match self {
            Session::Machine(session) => Some(session),
            Session::Web(_) => None,
        }
    }

    pub fn as_web(&self) -> Option<&WebSession> {
        match self {
            Session::Web(session) => Some(session),
            Session::Machine(_) => None,
        }
    }

    /// Whether a usable token exists for `audience_name` right now
    pub fn is_authenticated(&self, audience_name: &str) -> bool {
        match self {
            Session::Machine(session) => session.is_authenticated(audience_name),
            Session::Web(session) => session.is_authenticated(),
        }
    }
}

impl ApiTokenProvider for Session {
    fn get_current_api_token<'a>(&'a self, audience_name: &'a str) -> TokenFuture<'a> {
        match self {
            Session::Machine(session) => {
                ApiTokenProvider::get_current_api_token(session, audience_name)
            }
            Session::Web(session) => ApiTokenProvider::get_current_api_token(session, audience_name),
        }
    }
}
