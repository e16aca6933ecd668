//! LLM integration for mova-guard.
//!
//! Supports, in default failover order:
//! - **Groq**: OpenAI-compatible endpoint via reqwest
//! - **Gemini**: `generateContent` REST API via reqwest
//! - **Anthropic**: direct API access via rig-core
//! - **OpenAI**: direct API access via rig-core

mod gemini;
pub(crate) mod http;
mod openai_compat;
pub mod provider;
mod rig_adapter;

pub use gemini::{GEMINI_BASE_URL, GeminiProvider};
pub use openai_compat::{GROQ_BASE_URL, OpenAiCompatProvider};
pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Groq,
    Gemini,
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::Groq => Arc::new(OpenAiCompatProvider::groq(
            config.api_key.clone(),
            &config.model,
        )?),
        LlmBackend::Gemini => Arc::new(GeminiProvider::new(
            config.api_key.clone(),
            &config.model,
        )?),
        LlmBackend::Anthropic => create_anthropic_provider(config)?,
        LlmBackend::OpenAi => create_openai_provider(config)?,
    };
    tracing::info!(
        backend = config.backend.label(),
        model = %config.model,
        "Classifier provider ready"
    );
    Ok(provider)
}

/// Create providers for every configuration, preserving order.
pub fn create_providers(configs: &[LlmConfig]) -> Result<Vec<Arc<dyn LlmProvider>>, LlmError> {
    configs.iter().map(create_provider).collect()
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    Ok(Arc::new(RigAdapter::new(
        model,
        &config.model,
        config.backend.label(),
    )))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    Ok(Arc::new(RigAdapter::new(
        model,
        &config.model,
        config.backend.label(),
    )))
}
