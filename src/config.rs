//! Configuration types.
//!
//! Everything is read once at startup. A missing credential is a
//! [`ConfigError`] and the binary exits before it starts polling.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// System instruction sent with every classification request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Identify ONLY pure Russian. \
ALLOW Ukrainian, including dialects and Surzhyk: if a word looks like Russian with a mistake, \
check whether such a dialect or Surzhyk word exists in Ukrainian. \
Answer ONLY 'yes' or 'no'.";

/// Moderation pipeline configuration.
#[derive(Debug, Clone)]
pub struct ModeratorConfig {
    /// Newline-delimited whitelist file (one lowercase word per line).
    pub whitelist_path: PathBuf,
    /// Maximum number of classification calls in flight at once.
    pub max_concurrent_classifications: usize,
    /// Messages shorter than this (in characters) are never sent to a model.
    pub min_message_chars: usize,
    /// Shortest word that can be learned into the whitelist.
    pub min_word_chars: usize,
    /// Instruction given to every classification provider.
    pub system_prompt: String,
}

impl Default for ModeratorConfig {
    fn default() -> Self {
        Self {
            whitelist_path: PathBuf::from("./whitelist.txt"),
            max_concurrent_classifications: 2,
            min_message_chars: 4,
            min_word_chars: 4,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ModeratorConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = non_empty(lookup("MOVA_GUARD_WHITELIST")) {
            config.whitelist_path = PathBuf::from(path);
        }

        if let Some(raw) = non_empty(lookup("MOVA_GUARD_MAX_CONCURRENT")) {
            let permits: usize = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MOVA_GUARD_MAX_CONCURRENT".into(),
                message: format!("expected a positive integer, got {raw:?}"),
            })?;
            if permits == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "MOVA_GUARD_MAX_CONCURRENT".into(),
                    message: "must be at least 1".into(),
                });
            }
            config.max_concurrent_classifications = permits;
        }

        if let Some(prompt) = non_empty(lookup("MOVA_GUARD_SYSTEM_PROMPT")) {
            config.system_prompt = prompt;
        }

        Ok(config)
    }
}

/// Chat gateway credentials.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bot_token: SecretString,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = non_empty(lookup("TELEGRAM_BOT_TOKEN"))
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;
        Ok(Self {
            bot_token: SecretString::from(token),
        })
    }
}

/// Backends in failover priority order, with their key/model variables and default model.
const PROVIDER_ENV: &[(LlmBackend, &str, &str, &str)] = &[
    (LlmBackend::Groq, "GROQ_API_KEY", "GROQ_MODEL", "llama-3.3-70b-versatile"),
    (LlmBackend::Gemini, "GEMINI_API_KEY", "GEMINI_MODEL", "gemini-2.0-flash"),
    (
        LlmBackend::Anthropic,
        "ANTHROPIC_API_KEY",
        "ANTHROPIC_MODEL",
        "claude-3-5-haiku-latest",
    ),
    (LlmBackend::OpenAi, "OPENAI_API_KEY", "OPENAI_MODEL", "gpt-4o-mini"),
];

/// Provider configurations from the environment, in failover order.
pub fn providers_from_env() -> Result<Vec<LlmConfig>, ConfigError> {
    providers_from_lookup(|key| std::env::var(key).ok())
}

/// Collect every backend that has an API key. At least one is required.
pub fn providers_from_lookup<F>(lookup: F) -> Result<Vec<LlmConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let configs: Vec<LlmConfig> = PROVIDER_ENV
        .iter()
        .filter_map(|(backend, key_var, model_var, default_model)| {
            let api_key = non_empty(lookup(key_var))?;
            let model =
                non_empty(lookup(model_var)).unwrap_or_else(|| (*default_model).to_string());
            Some(LlmConfig {
                backend: *backend,
                api_key: SecretString::from(api_key),
                model,
            })
        })
        .collect();

    if configs.is_empty() {
        return Err(ConfigError::MissingRequired {
            key: "classification provider".into(),
            hint: "Set at least one of GROQ_API_KEY, GEMINI_API_KEY, ANTHROPIC_API_KEY, OPENAI_API_KEY"
                .into(),
        });
    }

    Ok(configs)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
