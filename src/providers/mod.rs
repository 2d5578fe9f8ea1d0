mod openai;
pub mod sse;

pub use openai::OpenAiProvider;

use crate::core::config::AppConfig;
use crate::core::error::ProviderError;
use crate::core::provider::ChatProvider;
use std::sync::Arc;

/// Create the streaming client for the configured endpoint and model.
pub fn create_provider(config: &AppConfig) -> Result<Arc<dyn ChatProvider>, ProviderError> {
    let api_key = config
        .get_api_key()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ProviderError::MissingApiKey(
                "OPENROUTER_API_KEY not set. Set via env var or config file.".into(),
            )
        })?;

    Ok(Arc::new(OpenAiProvider::new(
        api_key.to_string(),
        config.model_id.clone(),
        config.endpoint_url.clone(),
        config.timeout(),
    )))
}
