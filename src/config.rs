//! Environment-sourced configuration.

use crate::generation::{Generation, OpenAiGenerator};

/// Default OpenAI-compatible endpoint: a local server that usually does
/// not check the API key.
pub const DEFAULT_API_BASE: &str = "http://localhost:11434/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Consumed only by the generation adapter.
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub openai_model: String,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_api_base: DEFAULT_API_BASE.to_string(),
            openai_model: DEFAULT_MODEL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            openai_api_base: std::env::var("OPENAI_API_BASE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            openai_model: std::env::var("OPENAI_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            bind_addr: std::env::var("BIND_ADDR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        }
    }

    /// Build the generation front door against the configured endpoint.
    pub fn build_generation(&self) -> Generation {
        tracing::info!(
            api_base = %self.openai_api_base,
            model = %self.openai_model,
            has_key = self.openai_api_key.is_some(),
            "question generation configured"
        );
        let provider = OpenAiGenerator::new(
            self.openai_api_key.clone().unwrap_or_default(),
            self.openai_api_base.clone(),
            self.openai_model.clone(),
        );
        Generation::new(Box::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.openai_api_base, DEFAULT_API_BASE);
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
    }
}
