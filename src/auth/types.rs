use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which of the two web-session tokens an accessor was asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identity-provider access token (proof of the human user's identity)
    Access,
    /// Bearer credential for backend services
    Api,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access token"),
            TokenKind::Api => write!(f, "api token"),
        }
    }
}

/// SDK error type
///
/// Represents every failure a session, the request gateway or the SDK root
/// can surface to a caller.
#[derive(Debug)]
pub enum SdkError {
    /// Missing or invalid configuration (raised before any network activity)
    Config(String),
    /// Requested audience is not configured or has no client id
    NoValidAudience(String),
    /// No token of this kind is cached
    TokenNotFound(TokenKind),
    /// A token of this kind is cached but already expired
    TokenExpired(TokenKind),
    /// The identity-provider redirect carried no usable tokens
    InvalidRedirect(String),
    /// HTTP request failed (network, status, or response parsing)
    Api(ApiError),
    /// Durable storage operation failed
    Storage(crate::storage::StorageError),
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SdkError::NoValidAudience(name) => write!(f, "No valid audience found: {}", name),
            SdkError::TokenNotFound(kind) => write!(f, "No {} found", kind),
            SdkError::TokenExpired(kind) => write!(f, "The {} has expired", kind),
            SdkError::InvalidRedirect(msg) => write!(f, "{}", msg),
            SdkError::Api(err) => write!(f, "API error: {}", err),
            SdkError::Storage(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl std::error::Error for SdkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SdkError::Api(err) => Some(err),
            SdkError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ApiError> for SdkError {
    fn from(err: ApiError) -> Self {
        SdkError::Api(err)
    }
}

impl From<crate::storage::StorageError> for SdkError {
    fn from(err: crate::storage::StorageError) -> Self {
        SdkError::Storage(err)
    }
}

/// API-specific errors
#[derive(Debug)]
pub enum ApiError {
    /// Network error (connection, timeout, etc.)
    Network(String),
    /// HTTP error with status code
    Http { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Request building failed
    Request(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Http { status, message } => {
                write!(f, "HTTP {} error: {}", status, message)
            }
            ApiError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ApiError::Request(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timeout".to_string())
        } else if err.is_connect() {
            ApiError::Network(format!("Connection failed: {}", err))
        } else if let Some(status) = err.status() {
            ApiError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_builder() {
            ApiError::Request(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::Request(format!("Invalid URL: {}", err))
    }
}

/// Request body for the client-credentials grant
#[derive(Debug, Clone, Serialize)]
pub struct ClientCredentialsRequest {
    /// Client id of the audience the token is for
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
}

/// Response from the client-credentials endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ClientCredentialsResponse {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// Request body for exchanging an identity access token for an API token
#[derive(Debug, Clone, Serialize)]
pub struct TokenExchangeRequest {
    /// Client ids of every backend audience the API token must be valid for
    pub audiences: Vec<String>,
    pub nonce: String,
}

/// Response from the token-exchange endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
}

/// Identity-provider profile of the logged-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subject identifier
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Any claims the provider returns beyond the standard ones
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_messages_name_token_kind() {
        assert_eq!(
            SdkError::TokenNotFound(TokenKind::Api).to_string(),
            "No api token found"
        );
        assert_eq!(
            SdkError::TokenNotFound(TokenKind::Access).to_string(),
            "No access token found"
        );
        assert_eq!(
            SdkError::TokenExpired(TokenKind::Api).to_string(),
            "The api token has expired"
        );
    }

    #[test]
    fn test_client_credentials_request_wire_format() {
        let request = ClientCredentialsRequest {
            audience: "abc".to_string(),
            client_id: "machine".to_string(),
            client_secret: "secret".to_string(),
            grant_type: "client_credentials".to_string(),
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "audience": "abc",
                "client_id": "machine",
                "client_secret": "secret",
                "grant_type": "client_credentials"
            })
        );
    }

    #[test]
    fn test_user_profile_keeps_extra_claims() {
        let profile: UserProfile = serde_json::from_value(json!({
            "sub": "auth0|123",
            "name": "Ada",
            "email": "ada@example.com",
            "https://example.com/roles": ["admin"]
        }))
        .unwrap();

        assert_eq!(profile.sub, "auth0|123");
        assert_eq!(profile.name.as_deref(), Some("Ada"));
        assert_eq!(profile.picture, None);
        assert_eq!(
            profile.extra.get("https://example.com/roles"),
            Some(&json!(["admin"]))
        );
    }
}
