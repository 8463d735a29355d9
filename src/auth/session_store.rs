use crate::auth::token_store::is_unexpired;
use crate::storage::{PersistenceAdapter, StorageError};
use chrono::{DateTime, Utc};

/// Storage key for the identity-provider access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key for the backend API token
pub const API_TOKEN_KEY: &str = "api_token";
/// Storage key for the expiry, in Unix epoch milliseconds
pub const EXPIRES_AT_KEY: &str = "expires_at";
/// Storage key for the path to return to after login (read once)
pub const REDIRECT_PATHNAME_KEY: &str = "redirect_pathname";

/// Every key the web session owns in durable storage
pub const SESSION_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    API_TOKEN_KEY,
    EXPIRES_AT_KEY,
    REDIRECT_PATHNAME_KEY,
];

/// Interactive-session credentials
///
/// One instance covers every configured audience: the user logs in once and
/// the identity token is exchanged for a single API token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSessionInfo {
    pub access_token: String,
    pub api_token: String,
    pub expires_at: DateTime<Utc>,
}

impl WebSessionInfo {
    /// Both tokens present and `now` before `expires_at`
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty()
            && !self.api_token.is_empty()
            && is_unexpired(self.expires_at, now)
    }
}

/// Persist `info` under the session keys
///
/// All-or-nothing: if any write fails, the keys already written are removed
/// again before the error is returned.
pub async fn save_session(
    storage: &dyn PersistenceAdapter,
    info: &WebSessionInfo,
) -> Result<(), StorageError> {
    let expires_at = info.expires_at.timestamp_millis().to_string();
    let writes = [
        (ACCESS_TOKEN_KEY, info.access_token.as_str()),
        (API_TOKEN_KEY, info.api_token.as_str()),
        (EXPIRES_AT_KEY, expires_at.as_str()),
    ];

    for (key, value) in writes {
        if let Err(e) = storage.set(key, value).await {
            tracing::error!("Failed to persist session key {}: {}", key, e);
            for (written, _) in writes {
                if let Err(cleanup) = storage.remove(written).await {
                    tracing::warn!("Failed to roll back session key {}: {}", written, cleanup);
                }
            }
            return Err(e);
        }
    }

    tracing::info!(
        "Web session saved: expires_at={}, api_token_length={}",
        info.expires_at,
        info.api_token.len()
    );

    Ok(())
}

/// Load a persisted session
///
/// Returns `Ok(None)` when any of the three keys is missing or the expiry is
/// not a valid millisecond timestamp.
pub async fn load_session(
    storage: &dyn PersistenceAdapter,
) -> Result<Option<WebSessionInfo>, StorageError> {
    let access_token = storage.get(ACCESS_TOKEN_KEY).await?;
    let api_token = storage.get(API_TOKEN_KEY).await?;
    let expires_at = storage.get(EXPIRES_AT_KEY).await?;

    let (Some(access_token), Some(api_token), Some(expires_at)) =
        (access_token, api_token, expires_at)
    else {
        tracing::debug!("No complete web session found in storage");
        return Ok(None);
    };

    let Some(expires_at) = expires_at
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
    else {
        tracing::warn!("Ignoring stored session with invalid expires_at: {}", expires_at);
        return Ok(None);
    };

    Ok(Some(WebSessionInfo {
        access_token,
        api_token,
        expires_at,
    }))
}

/// Remove every session key
///
/// Succeeds when nothing is stored. All keys are attempted even if one fails;
/// the first failure is returned.
pub async fn clear_session(storage: &dyn PersistenceAdapter) -> Result<(), StorageError> {
    let mut first_error = None;

    for key in SESSION_KEYS {
        if let Err(e) = storage.remove(key).await {
            tracing::error!("Failed to remove session key {}: {}", key, e);
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            tracing::debug!("Web session cleared from storage");
            Ok(())
        }
    }
}

/// Remember where to send the user once login completes
pub async fn store_redirect_pathname(
    storage: &dyn PersistenceAdapter,
    pathname: &str,
) -> Result<(), StorageError> {
    storage.set(REDIRECT_PATHNAME_KEY, pathname).await
}

/// Read and forget the post-login path, defaulting to `/`
///
/// Only same-origin absolute paths are honoured. Storage failures fall back
/// to `/` so that a completed login is never undone by this lookup.
pub async fn take_redirect_pathname(storage: &dyn PersistenceAdapter) -> String {
    let stored = match storage.get(REDIRECT_PATHNAME_KEY).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Failed to read redirect pathname: {}", e);
            None
        }
    };

    if stored.is_some() {
        if let Err(e) = storage.remove(REDIRECT_PATHNAME_KEY).await {
            tracing::warn!("Failed to clear redirect pathname: {}", e);
        }
    }

    match stored {
        Some(path) if is_local_path(&path) => path,
        Some(path) => {
            tracing::warn!("Ignoring non-local redirect pathname: {}", path);
            "/".to_string()
        }
        None => "/".to_string(),
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
