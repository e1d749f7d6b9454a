use serde::{Deserialize, Serialize};

use super::defaults::*;

/// Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider")]
    pub default: String,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default: default_provider(),
            gemini: GeminiConfig::default(),
        }
    }
}

/// Which Gemini endpoint family to call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeminiApi {
    /// Vertex AI, addressed by project and region, bearer-token auth.
    #[default]
    Vertex,
    /// Generative Language API, API-key auth.
    Studio,
}

/// Gemini provider config.
///
/// `project`, `location`, `access_token` and `api_key` are normally supplied
/// through the environment rather than the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api: GeminiApi,
    #[serde(default)]
    pub project: String,
    #[serde(default = "default_location")]
    pub location: String,
    /// Fixed Vertex bearer token. Empty: application default credentials.
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// HTTP timeout for one generation call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api: GeminiApi::default(),
            project: String::new(),
            location: default_location(),
            access_token: String::new(),
            api_key: String::new(),
            model: default_gemini_model(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
