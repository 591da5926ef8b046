use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;
use crate::protocol::DEFAULT_CALL_TIMEOUT_MS;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Resource limits applied to the isolated script engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    #[serde(default = "default_eval_timeout_secs")]
    pub eval_timeout_secs: u64,
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,
    #[serde(default = "default_max_array_size")]
    pub max_array_size: usize,
    #[serde(default = "default_max_map_size")]
    pub max_map_size: usize,
    #[serde(default = "default_max_call_stack_depth")]
    pub max_call_stack_depth: usize,
}

fn default_max_operations() -> u64 {
    100_000
}

fn default_eval_timeout_secs() -> u64 {
    30
}

fn default_max_string_size() -> usize {
    1_000_000
}

fn default_max_array_size() -> usize {
    10_000
}

fn default_max_map_size() -> usize {
    10_000
}

fn default_max_call_stack_depth() -> usize {
    64
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            eval_timeout_secs: default_eval_timeout_secs(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_array_size(),
            max_map_size: default_max_map_size(),
            max_call_stack_depth: default_max_call_stack_depth(),
        }
    }
}

/// RPC transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Deadline for an outbound call before the pending request is rejected.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Deadline for a capability call issued from inside script code.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Poll interval for bounded wait-for-appearance.
    #[serde(default = "default_wait_poll_ms")]
    pub wait_poll_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_wait_poll_ms() -> u64 {
    100
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            wait_poll_ms: default_wait_poll_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            provider: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub model: ModelDefaults,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Override for the scripts directory; defaults to `~/.scriptcell/scripts`.
    #[serde(default)]
    pub scripts_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), ProviderConfig::default());
        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                api_key: "ollama".to_string(),
                api_base: Some("http://localhost:11434/v1".to_string()),
            },
        );
        Self {
            sandbox: SandboxConfig::default(),
            bridge: BridgeConfig::default(),
            model: ModelDefaults::default(),
            providers,
            scripts_dir: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.bridge.call_timeout_ms, 15_000);
        assert_eq!(cfg.sandbox.max_operations, 100_000);
        assert!(cfg.providers.contains_key("openai"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = r#"{ "bridge": { "callTimeoutMs": 500 } }"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.bridge.call_timeout_ms, 500);
        assert_eq!(cfg.bridge.wait_poll_ms, 100);
        assert_eq!(cfg.sandbox.eval_timeout_secs, 30);
    }
}
