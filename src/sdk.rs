//! SDK root: one session, one HTTP client, gateways per audience.

use crate::auth::clock::Clock;
use crate::auth::gateway::RequestGateway;
use crate::auth::session::{ApiTokenProvider, BrowserContext, Session};
use crate::auth::types::SdkError;
use crate::config::SdkConfig;
use std::sync::Arc;

/// Entry point wiring the configured session into request gateways
///
/// Resource modules receive a [`RequestGateway`] for their audience and never
/// touch auth state directly.
#[derive(Debug, Clone)]
pub struct Sdk {
    config: Arc<SdkConfig>,
    session: Arc<Session>,
    client: reqwest::Client,
}

impl Sdk {
    /// Build an SDK with default clock and HTTP client
    pub async fn new(config: SdkConfig, browser: Option<BrowserContext>) -> Result<Self, SdkError> {
        let mut builder = SdkBuilder::new(config);
        if let Some(browser) = browser {
            builder = builder.with_browser(browser);
        }
        builder.build().await
    }

    pub fn builder(config: SdkConfig) -> SdkBuilder {
        SdkBuilder::new(config)
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The session as the token interface shared with gateways
    pub fn token_provider(&self) -> Arc<dyn ApiTokenProvider> {
        self.session.clone()
    }

    /// Gateway for `audience_name`, sending requests to that audience's host
    pub fn gateway(&self, audience_name: &str) -> Result<RequestGateway, SdkError> {
        let audience = self
            .config
            .audience(audience_name)
            .ok_or_else(|| SdkError::NoValidAudience(audience_name.to_string()))?;

        Ok(
            RequestGateway::new(self.token_provider(), audience_name, audience.host.clone())
                .with_client(self.client.clone()),
        )
    }
}

/// Builder for [`Sdk`]
pub struct SdkBuilder {
    config: SdkConfig,
    browser: Option<BrowserContext>,
    clock: Option<Arc<dyn Clock>>,
    client: Option<reqwest::Client>,
}

impl SdkBuilder {
    pub fn new(config: SdkConfig) -> Self {
        Self {
            config,
            browser: None,
            clock: None,
            client: None,
        }
    }

    /// Storage and navigation for the web session (builder pattern)
    pub fn with_browser(mut self, browser: BrowserContext) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Time source for every expiry decision (builder pattern)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// HTTP client shared by the session and all gateways (builder pattern)
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub async fn build(self) -> Result<Sdk, SdkError> {
        let client = self.client.unwrap_or_default();

        let session = match Session::from_config(&self.config, self.browser).await? {
            Session::Machine(session) => {
                let session = session.with_http_client(client.clone());
                Session::Machine(match self.clock {
                    Some(clock) => session.with_clock(clock),
                    None => session,
                })
            }
            Session::Web(session) => {
                let session = session.with_http_client(client.clone());
                Session::Web(match self.clock {
                    Some(clock) => session.with_clock(clock),
                    None => session,
                })
            }
        };

        tracing::info!(
            "SDK initialized with {:?} session and {} audiences",
            session.session_type(),
            self.config.audiences.len()
        );

        Ok(Sdk {
            config: Arc::new(self.config),
            session: Arc::new(session),
            client,
        })
    }
}
