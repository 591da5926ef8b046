//! Script sources. The engine only ever sees [`ScriptDescriptor`]s; where
//! they come from is the provider's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use scriptcell_core::{MatchType, PageLocator, Result, ScriptDescriptor};

#[async_trait]
pub trait ScriptProvider: Send + Sync {
    /// Candidate scripts for the given page locator.
    async fn list_scripts_for_locator(&self, locator: &PageLocator) -> Result<Vec<ScriptDescriptor>>;
}

/// Sidecar metadata next to a script file: `<name>.rhai` + `<name>.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SidecarMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    match_patterns: Vec<String>,
    #[serde(default)]
    match_type: MatchType,
    #[serde(default)]
    declared_actions: Vec<String>,
}

/// Loads scripts from a directory. A script without a sidecar gets no
/// match patterns and therefore never matches any page.
pub struct DirScriptProvider {
    dir: PathBuf,
}

impl DirScriptProvider {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn scan(&self) -> Result<Vec<ScriptDescriptor>> {
        let mut scripts = Vec::new();
        if !self.dir.is_dir() {
            return Ok(scripts);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(true, |e| e != "rhai") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load_script(stem, &path) {
                Ok(descriptor) => scripts.push(descriptor),
                Err(e) => {
                    warn!(script = stem, error = %e, "Skipping unloadable script");
                }
            }
        }
        scripts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(scripts)
    }

    fn load_script(&self, stem: &str, path: &std::path::Path) -> Result<ScriptDescriptor> {
        let source_code = std::fs::read_to_string(path)?;
        let meta = self.load_meta(stem)?;
        Ok(ScriptDescriptor {
            id: stem.to_string(),
            name: if meta.name.is_empty() { stem.to_string() } else { meta.name },
            source_code,
            match_patterns: meta.match_patterns,
            match_type: meta.match_type,
            declared_actions: meta.declared_actions,
        })
    }

    fn load_meta(&self, stem: &str) -> Result<SidecarMeta> {
        let yaml_path = self.dir.join(format!("{}.yaml", stem));
        if yaml_path.exists() {
            let content = std::fs::read_to_string(&yaml_path)?;
            return Ok(serde_yaml::from_str(&content)?);
        }
        debug!(script = stem, "No sidecar metadata, script will match nothing");
        Ok(SidecarMeta::default())
    }
}

#[async_trait]
impl ScriptProvider for DirScriptProvider {
    async fn list_scripts_for_locator(&self, locator: &PageLocator) -> Result<Vec<ScriptDescriptor>> {
        let scripts = self.scan()?;
        Ok(scripts.into_iter().filter(|d| d.matches(locator)).collect())
    }
}

/// Fixed in-memory provider, for embedders and tests.
pub struct StaticScriptProvider {
    scripts: Vec<ScriptDescriptor>,
}

impl StaticScriptProvider {
    pub fn new(scripts: Vec<ScriptDescriptor>) -> Self {
        Self { scripts }
    }
}

#[async_trait]
impl ScriptProvider for StaticScriptProvider {
    async fn list_scripts_for_locator(&self, locator: &PageLocator) -> Result<Vec<ScriptDescriptor>> {
        Ok(self
            .scripts
            .iter()
            .filter(|d| d.matches(locator))
            .cloned()
            .collect())
    }
}
