//! Loaded-script bookkeeping on the host side.
//!
//! An entry exists only after the sandbox finished executing the script
//! and reported its handlers. Invocations against anything else fail
//! before a single envelope is built.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use scriptcell_bridge::SandboxBridge;
use scriptcell_core::{Error, Result, ScriptDescriptor};

pub struct LoadedScript {
    pub descriptor: ScriptDescriptor,
    pub handler_names: HashSet<String>,
    pub loaded_at: DateTime<Utc>,
}

/// Handler metadata surfaced to UI collaborators in scripts-ready events.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptReadyInfo {
    pub script_id: String,
    pub name: String,
    pub actions: Vec<String>,
}

pub struct HandlerRegistry {
    bridge: Arc<SandboxBridge>,
    scripts: Mutex<HashMap<String, LoadedScript>>,
}

impl HandlerRegistry {
    pub fn new(bridge: Arc<SandboxBridge>) -> Self {
        Self { bridge, scripts: Mutex::new(HashMap::new()) }
    }

    pub async fn insert(&self, descriptor: ScriptDescriptor, handler_names: HashSet<String>) {
        debug!(script = %descriptor.id, handlers = handler_names.len(), "Registering loaded script");
        let entry = LoadedScript {
            handler_names,
            loaded_at: Utc::now(),
            descriptor,
        };
        self.scripts.lock().await.insert(entry.descriptor.id.clone(), entry);
    }

    pub async fn contains(&self, script_id: &str) -> bool {
        self.scripts.lock().await.contains_key(script_id)
    }

    pub async fn handler_names(&self, script_id: &str) -> Option<HashSet<String>> {
        self.scripts
            .lock()
            .await
            .get(script_id)
            .map(|s| s.handler_names.clone())
    }

    /// Ready metadata for every loaded script, sorted by id.
    pub async fn list(&self) -> Vec<ScriptReadyInfo> {
        let scripts = self.scripts.lock().await;
        let mut infos: Vec<ScriptReadyInfo> = scripts
            .values()
            .map(|s| {
                let mut actions: Vec<String> = s.handler_names.iter().cloned().collect();
                actions.sort();
                ScriptReadyInfo {
                    script_id: s.descriptor.id.clone(),
                    name: s.descriptor.name.clone(),
                    actions,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.script_id.cmp(&b.script_id));
        infos
    }

    /// Run a handler by name. Unknown script or handler fails immediately,
    /// without a transport round trip.
    pub async fn invoke(&self, script_id: &str, handler: &str) -> Result<Value> {
        {
            let scripts = self.scripts.lock().await;
            let entry = scripts
                .get(script_id)
                .ok_or_else(|| Error::Invocation(format!("unknown script: {}", script_id)))?;
            if !entry.handler_names.contains(handler) {
                return Err(Error::Invocation(format!(
                    "script '{}' has no handler '{}'",
                    script_id, handler
                )));
            }
        }
        self.bridge.invoke(script_id, handler).await
    }

    /// Empty the registry, then best-effort ask the sandbox to drop its
    /// side. A sandbox-side failure is tolerated; the next refresh
    /// re-executes scripts and replaces any stale entry over there.
    pub async fn clear(&self) {
        let count = {
            let mut scripts = self.scripts.lock().await;
            let count = scripts.len();
            scripts.clear();
            count
        };
        if count > 0 {
            debug!(count, "Cleared handler registry");
        }
        if let Err(e) = self.bridge.clear_all().await {
            warn!(error = %e, "Sandbox-side clear failed, proceeding with divergent state");
        }
    }
}
