use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::ConfigError;

/// OpenRouter chat-completions endpoint (OpenAI-compatible)
const DEFAULT_ENDPOINT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const DEFAULT_MODEL_ID: &str = "deepseek/deepseek-r1";

const DEFAULT_TIMEOUT_SECS: u64 = 120;

const CONFIG_DIR_NAME: &str = "aurora-chat";
const LOCAL_CONFIG_FILE: &str = "aurora-chat.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bearer token sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Applied as connect timeout and per-read timeout, not as a whole-stream deadline
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub debug: bool,
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.into()
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.into()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint_url: default_endpoint_url(),
            model_id: default_model_id(),
            timeout_secs: default_timeout_secs(),
            debug: false,
        }
    }
}

impl AppConfig {
    pub fn get_api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().map_or(false, |k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn load_config(working_dir: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let wd = working_dir.unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let mut config = AppConfig::default();

    // Try loading global config
    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join(CONFIG_DIR_NAME).join("config.json");
        if let Some(file_config) = read_config_file(&global_path)? {
            merge_config(&mut config, file_config);
        }
    }

    // Try loading local project config
    if let Some(file_config) = read_config_file(&wd.join(LOCAL_CONFIG_FILE))? {
        merge_config(&mut config, file_config);
    }

    detect_env(&mut config);

    Ok(config)
}

pub fn read_config_file(path: &Path) -> Result<Option<AppConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::File(format!("{}: {e}", path.display())))?;
    let file_config: AppConfig = serde_json::from_str(&content)
        .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
    if file_config.timeout_secs == 0 {
        return Err(ConfigError::Invalid(format!(
            "{}: timeout_secs must be greater than zero",
            path.display()
        )));
    }
    Ok(Some(file_config))
}

/// Overlay values replace base values only where they differ from the defaults.
pub fn merge_config(base: &mut AppConfig, overlay: AppConfig) {
    if overlay.api_key.is_some() {
        base.api_key = overlay.api_key;
    }
    if overlay.endpoint_url != default_endpoint_url() {
        base.endpoint_url = overlay.endpoint_url;
    }
    if overlay.model_id != default_model_id() {
        base.model_id = overlay.model_id;
    }
    if overlay.timeout_secs != default_timeout_secs() {
        base.timeout_secs = overlay.timeout_secs;
    }
    if overlay.debug {
        base.debug = true;
    }
}

fn detect_env(config: &mut AppConfig) {
    if !config.has_api_key() {
        for env_var in ["OPENROUTER_API_KEY", "OPENAI_API_KEY"] {
            if let Some(key) = non_empty_env(env_var) {
                config.api_key = Some(key);
                break;
            }
        }
    }

    if let Some(model) = non_empty_env("AURORA_MODEL") {
        config.model_id = model;
    }

    if let Some(url) = non_empty_env("AURORA_ENDPOINT_URL") {
        config.endpoint_url = url;
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
