use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Compute an expiry instant from a lifetime in seconds
///
/// The result is aligned to whole milliseconds so it survives the
/// epoch-millisecond string representation used in durable storage.
pub fn expires_at_from_lifetime(now: DateTime<Utc>, lifetime_secs: i64) -> DateTime<Utc> {
    let millis = now
        .timestamp_millis()
        .saturating_add(lifetime_secs.saturating_mul(1000));
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A token is usable only while `now` is strictly before its expiry
pub fn is_unexpired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at > now
}

/// Cached API token for one audience (machine flow)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub api_token: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionInfo {
    /// Build from a token-endpoint response received at `now`
    pub fn from_lifetime(api_token: String, lifetime_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            api_token,
            expires_at: expires_at_from_lifetime(now, lifetime_secs),
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.api_token.is_empty() && is_unexpired(self.expires_at, now)
    }
}

/// In-memory map from audience name to its cached token
///
/// Entries are replaced whole, never mutated in place, and are never
/// evicted; staleness is derived from `expires_at` at read time.
#[derive(Debug, Default)]
pub struct TokenStore {
    entries: RwLock<HashMap<String, SessionInfo>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw entry for `audience`, expired or not
    pub fn get(&self, audience: &str) -> Option<SessionInfo> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(audience)
            .cloned()
    }

    /// Entry for `audience` only if it is still usable at `now`
    pub fn get_valid(&self, audience: &str, now: DateTime<Utc>) -> Option<SessionInfo> {
        self.get(audience).filter(|info| info.is_valid(now))
    }

    /// Replace the entry for `audience`, leaving every other audience untouched
    pub fn insert(&self, audience: &str, info: SessionInfo) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(audience.to_string(), info);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
