pub mod openai;

use async_trait::async_trait;
use scriptcell_core::{Config, Error, Result};

pub use openai::OpenAiCompatProvider;

/// The external LLM collaborator. Scripts reach it only through the
/// capability gateway's model-query proxy.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<String>;
}

/// Infer a provider name from a model string prefix.
fn infer_provider_from_model(model: &str) -> Option<&'static str> {
    if model.starts_with("gpt-") || model.starts_with("openai/") || model.starts_with("o1") {
        Some("openai")
    } else if model.starts_with("deepseek") {
        Some("deepseek")
    } else if model.starts_with("ollama/") {
        Some("ollama")
    } else {
        None
    }
}

/// Build the configured model provider. Resolution order: explicit
/// `model.provider` in config, then model-string prefix, then the first
/// provider entry with an api key.
pub fn create_provider(config: &Config) -> Result<Box<dyn ModelProvider>> {
    let defaults = &config.model;
    let name = defaults
        .provider
        .as_deref()
        .or_else(|| infer_provider_from_model(&defaults.model))
        .or_else(|| {
            config
                .providers
                .iter()
                .find(|(_, p)| !p.api_key.is_empty())
                .map(|(name, _)| name.as_str())
        })
        .ok_or_else(|| Error::Config("No model provider configured".to_string()))?;

    let provider_cfg = config
        .get_provider(name)
        .ok_or_else(|| Error::Config(format!("Provider '{}' not present in config", name)))?;

    let model = defaults
        .model
        .split_once('/')
        .map(|(_, m)| m)
        .unwrap_or(&defaults.model);

    Ok(Box::new(OpenAiCompatProvider::new(
        &provider_cfg.api_key,
        provider_cfg.api_base.as_deref(),
        model,
        defaults.max_tokens,
        defaults.temperature,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptcell_core::config::ProviderConfig;

    #[test]
    fn test_infer_provider_from_model() {
        assert_eq!(infer_provider_from_model("gpt-4o-mini"), Some("openai"));
        assert_eq!(infer_provider_from_model("deepseek-chat"), Some("deepseek"));
        assert_eq!(infer_provider_from_model("ollama/llama3"), Some("ollama"));
        assert_eq!(infer_provider_from_model("mystery-model"), None);
    }

    #[test]
    fn test_create_provider_requires_config_entry() {
        let mut config = Config::default();
        config.model.provider = Some("deepseek".to_string());
        // deepseek is not in the default provider map.
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_create_provider_strips_prefix() {
        let mut config = Config::default();
        config.model.model = "ollama/llama3".to_string();
        config.providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                api_key: "ollama".to_string(),
                api_base: Some("http://localhost:11434/v1".to_string()),
            },
        );
        assert!(create_provider(&config).is_ok());
    }
}
