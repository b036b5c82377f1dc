//! Builds the completion provider from configuration.

use std::sync::Arc;
use std::time::Duration;
use voltwise_config::AppConfig;
use voltwise_core::error::ProviderError;
use voltwise_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::{RetryPolicy, RetryingProvider};

/// Providers that run locally and accept any key.
const KEYLESS: &[&str] = &["ollama", "vllm", "llamacpp"];

/// Build the configured default provider, wrapped in the completion
/// deadline and retry policy.
///
/// A `[providers.<name>]` table overrides the key and endpoint; otherwise
/// the well-known URL for the name and the top-level `api_key` are used.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.default_provider.as_str();
    let entry = config.providers.get(name);

    let api_key = entry
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone());
    let api_key = match api_key {
        Some(key) => key,
        None if KEYLESS.contains(&name) => String::new(),
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}' (set api_key or VOLTWISE_API_KEY)"
            )));
        }
    };

    let base_url = match entry.and_then(|p| p.api_url.clone()).or_else(|| default_base_url(name)) {
        Some(url) => url,
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{name}' has no api_url and no well-known endpoint"
            )));
        }
    };

    let inner: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::new(name, base_url, api_key));
    Ok(Arc::new(RetryingProvider::new(inner, retry_policy(config))))
}

pub fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(config.completion.timeout_secs),
        max_retries: config.completion.max_retries,
        backoff_base: Duration::from_millis(config.completion.backoff_base_ms),
        backoff_max: Duration::from_millis(config.completion.backoff_max_ms),
    }
}

/// The model a request should use: the provider table's override, then the
/// top-level default.
pub fn resolve_model(config: &AppConfig) -> String {
    config
        .providers
        .get(&config.default_provider)
        .and_then(|p| p.default_model.clone())
        .unwrap_or_else(|| config.default_model.clone())
}

fn default_base_url(provider_name: &str) -> Option<String> {
    let url = match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "openai" => "https://api.openai.com/v1",
        "ollama" => "http://localhost:11434/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "vllm" => "http://localhost:8000/v1",
        "llamacpp" => "http://localhost:8080/v1",
        _ => return None,
    };
    Some(url.to_string())
}
