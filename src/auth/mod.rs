/// Session and token-brokering module
///
/// This module obtains, caches and refreshes the bearer tokens the SDK sends
/// to each backend audience.
///
/// ## Machine flow
///
/// 1. A resource gateway asks the session for a token for its audience
/// 2. A cached, unexpired token is returned immediately
/// 3. Otherwise the client-credentials grant runs against the auth audience
/// 4. The token is cached under that audience until `expires_at`
///
/// ## Web flow
///
/// 1. `log_in` sends the browser to the identity provider
/// 2. The provider redirects back with an access token in the URL fragment
/// 3. `handle_authentication` exchanges it for one API token covering every audience
/// 4. Both tokens are persisted so later page loads start authenticated
pub mod clock;
pub mod gateway;
pub(crate) mod http;
pub mod machine;
pub mod navigation;
pub mod session;
pub mod session_store;
pub mod token_store;
pub mod types;
pub mod web;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gateway::RequestGateway;
pub use machine::MachineSession;
pub use navigation::{Navigator, RecordingNavigator};
pub use session::{ApiTokenProvider, BrowserContext, Session};
pub use session_store::WebSessionInfo;
pub use token_store::{SessionInfo, TokenStore};
pub use types::{ApiError, SdkError, TokenKind, UserProfile};
pub use web::WebSession;
