//! Token broker SDK
//!
//! Client-side credential broker for API SDKs that talk to several backend
//! services ("audiences"). It obtains, caches and refreshes short-lived bearer
//! tokens and stamps them onto every outbound request.
//!
//! This SDK provides:
//! - A machine session (OAuth client-credentials grant) with a per-audience token cache
//! - A web session (browser-redirect login) that persists its tokens across page loads
//! - A request gateway that injects `Authorization: Bearer` headers just in time
//! - Pluggable durable storage (memory, filesystem, OS keychain, age-encrypted files)
//!
//! # Example
//!
//! ```no_run
//! use tokenbroker_sdk::{Sdk, SdkConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SdkConfig::from_file("sdk.toml")?.apply_env_overrides();
//! let sdk = Sdk::new(config, None).await?;
//!
//! // Every call through the gateway carries a valid token for `facilities`
//! let facilities = sdk.gateway("facilities")?;
//! let body: serde_json::Value = facilities.get("/v1/facilities").await?;
//! println!("{}", body);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod sdk;
pub mod storage;

// Re-export commonly used types and functions
pub use auth::{
    clock::{Clock, ManualClock, SystemClock},
    gateway::RequestGateway,
    machine::MachineSession,
    navigation::{Navigator, RecordingNavigator},
    session::{ApiTokenProvider, BrowserContext, Session},
    session_store::WebSessionInfo,
    token_store::SessionInfo,
    types::{ApiError, SdkError, TokenKind, UserProfile},
    web::WebSession,
};
pub use config::{Audience, AuthConfig, SdkConfig, SessionType};
pub use sdk::{Sdk, SdkBuilder};
pub use storage::{
    EncryptedFilesystemStorage, FilesystemStorage, KeyringStorage, MemoryStorage,
    PersistenceAdapter, StorageError,
};
