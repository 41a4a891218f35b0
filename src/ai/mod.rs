//! AI integration module.
//!
//! Hosted and local LLM providers plus [`LlmDrafter`], the drafting service
//! the workflow uses to analyse requests, ask questions and draft proposals.
//!
//! ## Providers
//!
//! - Claude (`ANTHROPIC_API_KEY`)
//! - OpenAI (`OPENAI_API_KEY`)
//! - Ollama (local, `OLLAMA_HOST`)

mod claude;
mod drafter;
mod ollama;
mod openai;

pub use claude::ClaudeProvider;
pub use drafter::LlmDrafter;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

use async_trait::async_trait;

use crate::core::AiConfig;

/// Trait for AI providers.
#[async_trait]
pub trait AIProvider: Send + Sync {
    /// Complete a prompt under the given system instructions.
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String>;

    /// Get the provider name.
    fn name(&self) -> &str;

    /// Check if the provider is available.
    async fn is_available(&self) -> bool;
}

/// AI error types.
#[derive(Debug, thiserror::Error)]
pub enum AIError {
    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("No response from AI")]
    NoResponse,
}

/// Map a non-success HTTP response to an [`AIError`].
async fn error_from_response(provider: &str, response: reqwest::Response) -> AIError {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        return AIError::RateLimited(retry_after);
    }

    let body = response.text().await.unwrap_or_default();
    AIError::ApiError(format!("{provider} ({status}): {body}"))
}

/// Providers tried in order until one answers.
pub struct ProviderChain {
    providers: Vec<Box<dyn AIProvider>>,
}

impl ProviderChain {
    /// Build the chain described by the configuration.
    ///
    /// With provider `auto` the order is Claude, OpenAI, then Ollama if it is
    /// running. Naming a provider restricts the chain to that provider.
    pub async fn from_config(config: &AiConfig) -> Self {
        let mut providers: Vec<Box<dyn AIProvider>> = Vec::new();
        let wants = |name: &str| config.provider == "auto" || config.provider == name;

        if wants("claude") {
            if let Ok(mut claude) = ClaudeProvider::new() {
                if let Some(model) = &config.model {
                    claude = claude.with_model(model.clone());
                }
                providers.push(Box::new(claude));
            }
        }

        if wants("openai") {
            if let Ok(mut openai) = OpenAIProvider::new() {
                if let Some(model) = &config.model {
                    openai = openai.with_model(model.clone());
                }
                providers.push(Box::new(openai));
            }
        }

        if wants("ollama") {
            let ollama = OllamaProvider::from_config(&config.ollama);
            if config.provider == "ollama" || ollama.is_available().await {
                providers.push(Box::new(ollama));
            }
        }

        tracing::debug!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "AI provider chain ready"
        );

        Self { providers }
    }

    /// Create a chain from explicit providers.
    pub fn with_providers(providers: Vec<Box<dyn AIProvider>>) -> Self {
        Self { providers }
    }

    /// Check if any AI provider is configured.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Get the active provider name.
    pub fn active_provider(&self) -> Option<&str> {
        self.providers.first().map(|p| p.name())
    }
}

#[async_trait]
impl AIProvider for ProviderChain {
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        for provider in &self.providers {
            match provider.complete(system, prompt).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Provider failed, trying next");
                }
            }
        }

        Err(AIError::ProviderNotAvailable("No AI provider available".to_string()).into())
    }

    fn name(&self) -> &str {
        self.active_provider().unwrap_or("none")
    }

    async fn is_available(&self) -> bool {
        self.has_providers()
    }
}
