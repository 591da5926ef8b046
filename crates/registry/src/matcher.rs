//! Matching and loading: which scripts belong on this page, and getting
//! them executed.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use scriptcell_bridge::SandboxBridge;
use scriptcell_core::{PageLocator, Result};

use crate::handlers::{HandlerRegistry, ScriptReadyInfo};
use crate::provider::ScriptProvider;

/// Emitted once per refresh, after every matched script settled one way
/// or the other.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScriptsReady {
    pub scripts: Vec<ScriptReadyInfo>,
}

pub struct ScriptMatcher {
    provider: Arc<dyn ScriptProvider>,
    bridge: Arc<SandboxBridge>,
    registry: Arc<HandlerRegistry>,
    events: mpsc::Sender<ScriptsReady>,
}

impl ScriptMatcher {
    pub fn new(
        provider: Arc<dyn ScriptProvider>,
        bridge: Arc<SandboxBridge>,
        registry: Arc<HandlerRegistry>,
    ) -> (Self, mpsc::Receiver<ScriptsReady>) {
        let (events, events_rx) = mpsc::channel(16);
        (
            Self { provider, bridge, registry, events },
            events_rx,
        )
    }

    /// Fetch candidates, filter by the locator, and execute every match
    /// independently. One script's failure is logged and never blocks the
    /// others. Emits a scripts-ready event once all loads settled.
    pub async fn refresh(&self, locator: &PageLocator) -> Result<()> {
        let candidates = self.provider.list_scripts_for_locator(locator).await?;
        let matched: Vec<_> = candidates
            .into_iter()
            .filter(|d| d.matches(locator))
            .collect();
        debug!(locator = %locator, count = matched.len(), "Refreshing matched scripts");

        let loads = matched.into_iter().map(|descriptor| {
            let bridge = self.bridge.clone();
            let registry = self.registry.clone();
            async move {
                let script_id = descriptor.id.clone();
                match bridge.execute(&descriptor).await {
                    Ok(handler_names) => {
                        registry.insert(descriptor, handler_names).await;
                    }
                    Err(e) => {
                        warn!(script = %script_id, error = %e, "Script load failed");
                    }
                }
            }
        });
        futures::future::join_all(loads).await;

        let ready = ScriptsReady { scripts: self.registry.list().await };
        if let Err(e) = self.events.try_send(ready) {
            debug!(error = %e, "Dropping scripts-ready event, no listener keeping up");
        }
        Ok(())
    }
}
