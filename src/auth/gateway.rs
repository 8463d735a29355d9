use crate::auth::http::{ensure_success, read_json, send_error};
use crate::auth::session::ApiTokenProvider;
use crate::auth::types::SdkError;
use crate::config::join_url;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// HTTP client bound to one audience
///
/// Every request is stamped with `Authorization: Bearer <token>` obtained from
/// the session just before dispatch. If no token can be obtained the request
/// is never sent and the session's error is returned unchanged.
#[derive(Clone)]
pub struct RequestGateway {
    provider: Arc<dyn ApiTokenProvider>,
    audience_name: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("audience_name", &self.audience_name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RequestGateway {
    /// Create a gateway for `audience_name` whose requests go to `base_url`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use tokenbroker_sdk::{MachineSession, RequestGateway, SdkConfig};
    ///
    /// # async fn example(config: SdkConfig) -> Result<(), Box<dyn std::error::Error>> {
    /// let session = Arc::new(MachineSession::new(&config)?);
    /// let facilities = RequestGateway::new(session, "facilities", "https://facilities.example.com");
    ///
    /// let body: serde_json::Value = facilities.get("/v1/facilities").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        provider: Arc<dyn ApiTokenProvider>,
        audience_name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let audience_name = audience_name.into();
        let base_url = base_url.into();
        tracing::debug!(
            "Creating RequestGateway for audience {} with base URL: {}",
            audience_name,
            base_url
        );

        Self {
            provider,
            audience_name,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Share an existing HTTP client (builder pattern)
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn audience_name(&self) -> &str {
        &self.audience_name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attach the audience's bearer token to `builder`
    pub async fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder, SdkError> {
        let token = self
            .provider
            .get_current_api_token(&self.audience_name)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Not sending request for audience {}: {}",
                    self.audience_name,
                    e
                );
                e
            })?;

        Ok(builder.bearer_auth(token))
    }

    /// Send an authorized request and return the raw response after a status check
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, SdkError> {
        let url = join_url(&self.base_url, path);
        let context = format!("{} {}", method, path);

        let mut builder = self.client.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let builder = self.authorize(builder).await?;

        tracing::debug!("Sending {} to {}", context, url);
        let response = builder.send().await.map_err(send_error(&context))?;
        ensure_success(response, &context).await
    }

    /// Send an authorized request and decode its JSON body
    pub async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, SdkError> {
        let context = format!("{} {}", method, path);
        let response = self.send(method, path, body).await?;
        read_json(response, &context).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SdkError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SdkError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SdkError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// DELETE; any response body is discarded
    pub async fn delete(&self, path: &str) -> Result<(), SdkError> {
        self.send(Method::DELETE, path, None::<&()>).await?;
        Ok(())
    }
}
