//! Navigation watching: in-page location changes drive a full reset.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use scriptcell_core::{PageLocator, Result};

use crate::handlers::HandlerRegistry;
use crate::matcher::ScriptMatcher;

/// Compares each reported location against the last seen one. An unchanged
/// locator is a no-op; a change clears every loaded script first, since
/// handler code bound to the superseded page is invalid, then re-matches.
pub struct NavigationWatcher {
    matcher: Arc<ScriptMatcher>,
    registry: Arc<HandlerRegistry>,
    last: Mutex<Option<PageLocator>>,
}

impl NavigationWatcher {
    pub fn new(matcher: Arc<ScriptMatcher>, registry: Arc<HandlerRegistry>) -> Self {
        Self { matcher, registry, last: Mutex::new(None) }
    }

    /// Returns whether the navigation actually triggered a refresh.
    ///
    /// The last-seen lock is held across the clear and refresh, so a
    /// clear always fully completes before the next refresh populates.
    pub async fn on_navigate(&self, locator: PageLocator) -> Result<bool> {
        let mut last = self.last.lock().await;
        if last.as_ref() == Some(&locator) {
            debug!(locator = %locator, "Locator unchanged, skipping refresh");
            return Ok(false);
        }
        *last = Some(locator.clone());

        self.registry.clear().await;
        self.matcher.refresh(&locator).await?;
        Ok(true)
    }
}
