//! Host navigation seam for the redirect-based login flow.
//!
//! A browser host navigates the page; a desktop host drives its webview; a
//! headless host can record the requested URL and open it however it likes.

use std::sync::{PoisonError, RwLock};
use url::Url;

/// Navigation over the page (or webview) hosting the web session
pub trait Navigator: Send + Sync {
    /// Hand control to `url`. Relative paths are resolved against the current page.
    fn redirect_to(&self, url: &str);

    /// The page currently loaded, including any fragment
    fn current_url(&self) -> Url;
}

/// Navigator that records every redirect instead of performing it
///
/// `redirect_to` also updates `current_url`, so a redirect to a path behaves
/// like a same-origin page load.
#[derive(Debug)]
pub struct RecordingNavigator {
    current: RwLock<Url>,
    history: RwLock<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new(current: Url) -> Self {
        Self {
            current: RwLock::new(current),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn parse(current: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(current)?))
    }

    /// Simulate the identity provider (or the user) loading `url`
    pub fn set_current_url(&self, url: Url) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = url;
    }

    /// Every redirect target requested so far, oldest first
    pub fn redirects(&self) -> Vec<String> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_redirect(&self) -> Option<String> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to(&self, url: &str) {
        tracing::debug!("Redirecting to {}", url);
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        match current.join(url) {
            Ok(next) => *current = next,
            Err(e) => tracing::warn!("Redirect target {} is not a valid URL: {}", url, e),
        }
    }

    fn current_url(&self) -> Url {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
