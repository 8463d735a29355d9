//! Web Session Mock Tests
//!
//! Redirect-based login against wiremock auth and identity-provider servers:
//! - handling the callback and persisting the session
//! - rehydrating from storage on the next page load
//! - expiry, log-out and profile lookup

use chrono::Duration;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokenbroker_sdk::storage::{PersistenceAdapter, StorageError, StorageFuture};
use tokenbroker_sdk::{
    auth::session_store, Audience, ManualClock, MemoryStorage, RecordingNavigator, SdkConfig,
    SdkError, SessionType, TokenKind, WebSession,
};
use url::Url;
use wiremock::{
    matchers::{any, body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const START_MILLIS: i64 = 1_700_000_000_000;
const APP: &str = "https://app.example.com";

fn web_config(server: &str) -> SdkConfig {
    SdkConfig::new(SessionType::Web)
        .with_client_credentials("spa-client", None)
        .with_identity_provider_url(server)
        .with_audience("auth", Audience::new(server, "auth-aud"))
        .with_audience("facilities", Audience::new("https://fac.example.com", "fac-aud"))
        .with_audience("iot", Audience::new("https://iot.example.com", "iot-aud"))
}

fn callback_url(fragment: &str) -> Url {
    Url::parse(&format!("{}/callback#{}", APP, fragment)).unwrap()
}

struct Harness {
    storage: Arc<MemoryStorage>,
    navigator: Arc<RecordingNavigator>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            navigator: Arc::new(RecordingNavigator::parse(&format!("{}/", APP)).unwrap()),
            clock: Arc::new(ManualClock::at_millis(START_MILLIS)),
        }
    }

    /// A fresh session instance, as after a full page load
    async fn page_load(&self, server: &str) -> WebSession {
        WebSession::new(
            &web_config(server),
            self.storage.clone(),
            self.navigator.clone(),
        )
        .await
        .unwrap()
        .with_clock(self.clock.clone())
    }
}

async fn mount_exchange(server: &MockServer, access_token: &str, api_token: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .and(header("Authorization", format!("Bearer {}", access_token).as_str()))
        .and(body_partial_json(json!({ "audiences": ["fac-aud", "iot-aud"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": api_token
        })))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// handle_authentication
// ============================================================================

#[tokio::test]
async fn test_handle_authentication_persists_and_redirects_to_stored_path() {
    let mock_server = MockServer::start().await;
    mount_exchange(&mock_server, "AT1", "API1").await;
    let harness = Harness::new();

    // Phase 1: remember where to return, hand control to the provider
    let before = harness.page_load(&mock_server.uri()).await;
    before.log_in_returning_to("/facilities/42").await.unwrap();
    assert!(harness
        .navigator
        .last_redirect()
        .unwrap()
        .starts_with(&format!("{}/authorize?", mock_server.uri())));

    // Phase 2: the provider redirects back; a new page load handles it
    harness
        .navigator
        .set_current_url(callback_url("access_token=AT1&expires_in=3600&token_type=Bearer"));
    let session = harness.page_load(&mock_server.uri()).await;
    assert!(!session.is_authenticated());

    let info = session.handle_authentication().await.unwrap();

    assert_eq!(info.access_token, "AT1");
    assert_eq!(info.api_token, "API1");
    assert_eq!(info.expires_at.timestamp_millis(), START_MILLIS + 3_600_000);
    assert!(session.is_authenticated());
    assert_eq!(session.get_current_api_token().unwrap(), "API1");
    assert_eq!(session.get_current_access_token().unwrap(), "AT1");

    let storage = harness.storage.as_ref();
    assert_eq!(storage.get("access_token").await.unwrap().as_deref(), Some("AT1"));
    assert_eq!(storage.get("api_token").await.unwrap().as_deref(), Some("API1"));
    assert_eq!(
        storage.get("expires_at").await.unwrap(),
        Some((START_MILLIS + 3_600_000).to_string())
    );
    assert_eq!(storage.get("redirect_pathname").await.unwrap(), None);

    assert_eq!(
        harness.navigator.last_redirect().as_deref(),
        Some("/facilities/42")
    );
}

#[tokio::test]
async fn test_handle_authentication_defaults_to_root() {
    let mock_server = MockServer::start().await;
    mount_exchange(&mock_server, "AT1", "API1").await;
    let harness = Harness::new();

    harness
        .navigator
        .set_current_url(callback_url("access_token=AT1&expires_in=3600"));
    let session = harness.page_load(&mock_server.uri()).await;

    session.handle_authentication().await.unwrap();

    assert_eq!(harness.navigator.last_redirect().as_deref(), Some("/"));
}

#[tokio::test]
async fn test_handle_authentication_without_tokens_makes_no_exchange() {
    let mock_server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;
    let harness = Harness::new();

    harness
        .navigator
        .set_current_url(Url::parse(&format!("{}/callback", APP)).unwrap());
    let session = harness.page_load(&mock_server.uri()).await;

    let error = session.handle_authentication().await.unwrap_err();

    assert_eq!(error.to_string(), "No valid tokens returned");
    assert_eq!(harness.navigator.last_redirect().as_deref(), Some("/"));
    assert!(harness.storage.is_empty());
}

#[tokio::test]
async fn test_failed_exchange_leaves_nothing_cached() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&mock_server)
        .await;
    let harness = Harness::new();

    harness
        .navigator
        .set_current_url(callback_url("access_token=AT1&expires_in=3600"));
    let session = harness.page_load(&mock_server.uri()).await;

    let error = session.handle_authentication().await.unwrap_err();

    assert!(error.to_string().contains("403"));
    assert!(!session.is_authenticated());
    assert!(session.session_info().is_none());
    assert!(harness.storage.is_empty());
    assert_eq!(harness.navigator.last_redirect().as_deref(), Some("/"));
}

/// Storage that refuses to store the api token
struct ApiTokenRejectingStorage(MemoryStorage);

impl PersistenceAdapter for ApiTokenRejectingStorage {
    fn get(&self, key: &str) -> StorageFuture<'_, Option<String>> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageFuture<'_, ()> {
        if key == session_store::API_TOKEN_KEY {
            return Box::pin(async { Err(StorageError::Config("quota exceeded".to_string())) });
        }
        self.0.set(key, value)
    }

    fn remove(&self, key: &str) -> StorageFuture<'_, ()> {
        self.0.remove(key)
    }
}

#[tokio::test]
async fn test_failed_persist_leaves_memory_and_storage_empty() {
    let mock_server = MockServer::start().await;
    mount_exchange(&mock_server, "AT1", "API1").await;

    let storage = Arc::new(ApiTokenRejectingStorage(MemoryStorage::new()));
    let navigator = Arc::new(RecordingNavigator::new(callback_url(
        "access_token=AT1&expires_in=3600",
    )));
    let session = WebSession::new(&web_config(&mock_server.uri()), storage.clone(), navigator.clone())
        .await
        .unwrap();

    let result = session.handle_authentication().await;

    assert!(matches!(result, Err(SdkError::Storage(_))));
    assert!(session.session_info().is_none());
    assert!(storage.0.is_empty());
    assert_eq!(navigator.last_redirect().as_deref(), Some("/"));
}

// ============================================================================
// Persistence, expiry, log-out
// ============================================================================

#[tokio::test]
async fn test_session_survives_page_load() {
    let mock_server = MockServer::start().await;
    mount_exchange(&mock_server, "AT1", "API1").await;
    let harness = Harness::new();

    harness
        .navigator
        .set_current_url(callback_url("access_token=AT1&expires_in=3600"));
    let first = harness.page_load(&mock_server.uri()).await;
    let saved = first.handle_authentication().await.unwrap();
    drop(first);

    let reloaded = harness.page_load(&mock_server.uri()).await;

    assert_eq!(reloaded.session_info(), Some(saved));
    assert!(reloaded.is_authenticated());
    assert_eq!(reloaded.get_current_api_token().unwrap(), "API1");
}

#[tokio::test]
async fn test_expired_session_returns_no_tokens() {
    let mock_server = MockServer::start().await;
    mount_exchange(&mock_server, "AT1", "API1").await;
    let harness = Harness::new();

    harness
        .navigator
        .set_current_url(callback_url("access_token=AT1&expires_in=3600"));
    let session = harness.page_load(&mock_server.uri()).await;
    session.handle_authentication().await.unwrap();

    harness.clock.advance(Duration::seconds(3600));

    assert!(!session.is_authenticated());
    assert!(matches!(
        session.get_current_api_token(),
        Err(SdkError::TokenExpired(TokenKind::Api))
    ));
    assert!(matches!(
        session.get_current_access_token(),
        Err(SdkError::TokenExpired(TokenKind::Access))
    ));
}

#[tokio::test]
async fn test_log_out_is_idempotent() {
    let mock_server = MockServer::start().await;
    mount_exchange(&mock_server, "AT1", "API1").await;
    let harness = Harness::new();

    harness
        .navigator
        .set_current_url(callback_url("access_token=AT1&expires_in=3600"));
    let session = harness.page_load(&mock_server.uri()).await;
    session.handle_authentication().await.unwrap();
    session_store::store_redirect_pathname(harness.storage.as_ref(), "/later")
        .await
        .unwrap();

    session.log_out().await.unwrap();
    assert!(!session.is_authenticated());
    assert!(harness.storage.is_empty());
    assert_eq!(harness.navigator.last_redirect().as_deref(), Some("/"));

    session.log_out().await.unwrap();
    assert!(session.session_info().is_none());
    assert!(harness.storage.is_empty());

    let reloaded = harness.page_load(&mock_server.uri()).await;
    assert!(!reloaded.is_authenticated());
}

#[tokio::test]
async fn test_log_out_without_session() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new();
    let session = harness.page_load(&mock_server.uri()).await;

    session.log_out().await.unwrap();
    assert!(harness.storage.is_empty());
}

/// Storage whose writes or removals of one key can be made to fail mid-test
#[derive(Default)]
struct FlakyStorage {
    inner: MemoryStorage,
    failing_set: Mutex<Option<&'static str>>,
    failing_remove: Mutex<Option<&'static str>>,
}

impl FlakyStorage {
    fn fail_set(&self, key: &'static str) {
        *self.failing_set.lock().unwrap() = Some(key);
    }

    fn fail_remove(&self, key: &'static str) {
        *self.failing_remove.lock().unwrap() = Some(key);
    }
}

impl PersistenceAdapter for FlakyStorage {
    fn get(&self, key: &str) -> StorageFuture<'_, Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageFuture<'_, ()> {
        if self.failing_set.lock().unwrap().is_some_and(|failing| failing == key) {
            return Box::pin(async { Err(StorageError::Config("disk full".to_string())) });
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StorageFuture<'_, ()> {
        if self.failing_remove.lock().unwrap().is_some_and(|failing| failing == key) {
            return Box::pin(async { Err(StorageError::Config("locked".to_string())) });
        }
        self.inner.remove(key)
    }
}

async fn flaky_session(
    server: &str,
    storage: &Arc<FlakyStorage>,
) -> (WebSession, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::new(callback_url(
        "access_token=AT1&expires_in=3600",
    )));
    let session = WebSession::new(&web_config(server), storage.clone(), navigator.clone())
        .await
        .unwrap()
        .with_clock(Arc::new(ManualClock::at_millis(START_MILLIS)));
    (session, navigator)
}

#[tokio::test]
async fn test_failed_save_over_existing_session_logs_out_everywhere() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "API1"
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let storage = Arc::new(FlakyStorage::default());
    let (session, navigator) = flaky_session(&mock_server.uri(), &storage).await;
    session.handle_authentication().await.unwrap();
    assert!(session.is_authenticated());

    storage.fail_set(session_store::EXPIRES_AT_KEY);
    navigator.set_current_url(callback_url("access_token=AT1&expires_in=3600"));
    let result = session.handle_authentication().await;

    assert!(matches!(result, Err(SdkError::Storage(_))));
    assert!(!session.is_authenticated());
    assert!(session.session_info().is_none());
    assert!(storage.inner.is_empty());

    let (reloaded, _) = flaky_session(&mock_server.uri(), &storage).await;
    assert_eq!(reloaded.is_authenticated(), session.is_authenticated());
}

#[tokio::test]
async fn test_failed_log_out_still_clears_memory_and_redirects() {
    let mock_server = MockServer::start().await;
    mount_exchange(&mock_server, "AT1", "API1").await;

    let storage = Arc::new(FlakyStorage::default());
    let (session, navigator) = flaky_session(&mock_server.uri(), &storage).await;
    session.handle_authentication().await.unwrap();
    navigator.set_current_url(Url::parse(&format!("{}/dashboard", APP)).unwrap());

    storage.fail_remove(session_store::API_TOKEN_KEY);
    let result = session.log_out().await;

    assert!(matches!(result, Err(SdkError::Storage(_))));
    assert!(session.session_info().is_none());
    assert_eq!(navigator.last_redirect().as_deref(), Some("/"));

    // The surviving key alone is not a loadable session
    assert_eq!(storage.inner.len(), 1);
    let (reloaded, _) = flaky_session(&mock_server.uri(), &storage).await;
    assert!(!reloaded.is_authenticated());
}

// ============================================================================
// Profile
// ============================================================================

#[tokio::test]
async fn test_get_profile_uses_access_token() {
    let mock_server = MockServer::start().await;
    mount_exchange(&mock_server, "AT1", "API1").await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("Authorization", "Bearer AT1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "auth0|42",
            "name": "Grace Hopper",
            "email": "grace@example.com"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    let harness = Harness::new();

    harness
        .navigator
        .set_current_url(callback_url("access_token=AT1&expires_in=3600"));
    let session = harness.page_load(&mock_server.uri()).await;
    session.handle_authentication().await.unwrap();

    let profile = session.get_profile().await.unwrap();

    assert_eq!(profile.sub, "auth0|42");
    assert_eq!(profile.name.as_deref(), Some("Grace Hopper"));
    assert_eq!(profile.email.as_deref(), Some("grace@example.com"));
}

#[tokio::test]
async fn test_get_profile_requires_login() {
    let mock_server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;
    let harness = Harness::new();
    let session = harness.page_load(&mock_server.uri()).await;

    let error = session.get_profile().await.unwrap_err();
    assert_eq!(error.to_string(), "No access token found");
}
