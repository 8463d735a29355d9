use crate::auth::types::{ApiError, SdkError};
use serde::de::DeserializeOwned;

/// Check the status of `response` and decode its JSON body
///
/// `context` names the call in log lines ("token exchange", "GET /assets").
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
) -> Result<T, SdkError> {
    let response = ensure_success(response, context).await?;

    response.json().await.map_err(|e| {
        tracing::error!("Failed to parse {} response: {}", context, e);
        SdkError::Api(ApiError::Parse(format!("Failed to parse response JSON: {}", e)))
    })
}

/// Turn a non-2xx response into [`ApiError::Http`] carrying the body text
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, SdkError> {
    let status = response.status();
    tracing::debug!("Received {} response with status: {}", context, status);

    if status.is_success() {
        return Ok(response);
    }

    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    tracing::error!(
        "{} failed: HTTP {} - {}",
        context,
        status.as_u16(),
        error_body
    );

    Err(SdkError::Api(ApiError::Http {
        status: status.as_u16(),
        message: error_body,
    }))
}

/// Map a send failure, logging it under `context`
pub(crate) fn send_error(context: &str) -> impl FnOnce(reqwest::Error) -> SdkError + '_ {
    move |e| {
        tracing::error!("Failed to send {} request: {}", context, e);
        SdkError::Api(ApiError::from(e))
    }
}
