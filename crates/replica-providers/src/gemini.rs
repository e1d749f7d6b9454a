//! Google Gemini provider.
//!
//! Calls the `generateContent` endpoint either on Vertex AI (project + region,
//! bearer token) or on the Generative Language API (API key query param).
//!
//! Vertex tokens come from Application Default Credentials and are fetched on
//! every request, so a long-running responder survives token expiry. A fixed
//! `access_token` in config overrides the lookup.

use async_trait::async_trait;
use replica_core::{
    config::{GeminiApi, GeminiConfig},
    context::{Context, Role},
    error::ReplicaError,
    message::{ModelReply, ReplyMetadata},
    traits::Provider,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const STUDIO_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Source of OAuth bearer tokens for Vertex AI, asked once per request.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Short label for logs.
    fn kind(&self) -> &'static str;

    /// A token valid for at least the next request.
    async fn access_token(&self) -> Result<String, ReplicaError>;
}

/// A fixed token, typically `GOOGLE_ACCESS_TOKEN`. Never refreshed.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    fn kind(&self) -> &'static str {
        "static"
    }

    async fn access_token(&self) -> Result<String, ReplicaError> {
        Ok(self.0.clone())
    }
}

/// Application Default Credentials through `gcp_auth`.
///
/// Credentials are discovered on first use; `gcp_auth` caches the token and
/// refreshes it before it expires.
#[derive(Default)]
pub struct AdcTokens {
    provider: OnceCell<Arc<dyn gcp_auth::TokenProvider>>,
}

#[async_trait]
impl AccessTokenSource for AdcTokens {
    fn kind(&self) -> &'static str {
        "application-default"
    }

    async fn access_token(&self) -> Result<String, ReplicaError> {
        let provider = self
            .provider
            .get_or_try_init(gcp_auth::provider)
            .await
            .map_err(|e| {
                ReplicaError::Generation(format!(
                    "gemini: no application default credentials: {e}"
                ))
            })?;
        let token = provider
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| ReplicaError::Generation(format!("gemini: token refresh failed: {e}")))?;
        Ok(token.as_str().to_string())
    }
}

/// Google Gemini provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
    /// Vertex only.
    tokens: Option<Arc<dyn AccessTokenSource>>,
}

impl GeminiProvider {
    /// Create from config values.
    pub fn from_config(config: GeminiConfig) -> Result<Self, ReplicaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReplicaError::Config(format!("gemini: failed to build http client: {e}")))?;

        let tokens: Option<Arc<dyn AccessTokenSource>> = match config.api {
            GeminiApi::Vertex if config.access_token.is_empty() => {
                Some(Arc::new(AdcTokens::default()))
            }
            GeminiApi::Vertex => Some(Arc::new(StaticToken::new(config.access_token.clone()))),
            GeminiApi::Studio => None,
        };
        if let Some(source) = &tokens {
            info!("gemini: vertex auth via {} token", source.kind());
        }

        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    /// Replace the Vertex token source.
    pub fn with_token_source(mut self, source: Arc<dyn AccessTokenSource>) -> Self {
        self.tokens = Some(source);
        self
    }

    /// Model resource URL without the `:method` suffix.
    fn model_url(&self, model: &str) -> String {
        match self.config.api {
            GeminiApi::Vertex => format!(
                "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}/publishers/google/models/{model}",
                loc = self.config.location,
                project = self.config.project,
            ),
            GeminiApi::Studio => format!("{STUDIO_BASE_URL}/models/{model}"),
        }
    }

    async fn authorize(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ReplicaError> {
        match self.config.api {
            GeminiApi::Vertex => {
                let source = self.tokens.as_ref().ok_or_else(|| {
                    ReplicaError::Generation("gemini: no vertex token source".into())
                })?;
                Ok(req.bearer_auth(source.access_token().await?))
            }
            GeminiApi::Studio => Ok(req.query(&[("key", self.config.api_key.as_str())])),
        }
    }

    /// Which credentials are missing for the configured endpoint, if any.
    fn missing_credentials(&self) -> Option<&'static str> {
        match self.config.api {
            GeminiApi::Vertex if self.config.project.is_empty() => Some("project id"),
            GeminiApi::Studio if self.config.api_key.is_empty() => Some("API key"),
            _ => None,
        }
    }

    fn build_request(&self, context: &Context) -> GeminiRequest {
        let (system, api_messages) = context.to_api_messages();

        let system_instruction = if system.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system }],
            })
        };

        let contents = api_messages
            .into_iter()
            .map(|m| GeminiContent {
                role: Some(gemini_role(m.role).to_string()),
                parts: vec![GeminiPart { text: m.content }],
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_output_tokens,
                temperature: self.config.temperature,
                top_p: self.config.top_p,
            },
        }
    }
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    usage_metadata: Option<GeminiUsage>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    total_token_count: u64,
}

/// Pull the reply text out of a parsed response.
///
/// Fails when the prompt was blocked or the first candidate carries no text.
fn extract_text(parsed: &GeminiResponse) -> Result<String, ReplicaError> {
    if let Some(reason) = parsed
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(ReplicaError::Generation(format!(
            "gemini blocked the prompt: {reason}"
        )));
    }

    let candidate = parsed
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .ok_or_else(|| ReplicaError::Generation("gemini returned no candidates".into()))?;

    let text: String = candidate
        .content
        .as_ref()
        .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
        return Err(ReplicaError::Generation(format!(
            "gemini returned an empty candidate (finish reason: {reason})"
        )));
    }

    Ok(text)
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, context: &Context) -> Result<ModelReply, ReplicaError> {
        if let Some(missing) = self.missing_credentials() {
            return Err(ReplicaError::Generation(format!(
                "gemini: no {missing} configured"
            )));
        }

        let effective_model = self.config.model.as_str();
        let start = Instant::now();
        let body = self.build_request(context);

        let url = format!("{}:generateContent", self.model_url(effective_model));
        debug!("gemini: POST models/{effective_model}:generateContent");

        let resp = self
            .authorize(self.client.post(&url))
            .await?
            .json(&body)
            .send()
            .await
            .map_err(|e| ReplicaError::Generation(format!("gemini request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ReplicaError::Generation(format!(
                "gemini returned {status}: {text}"
            )));
        }

        let parsed: GeminiResponse = resp.json().await.map_err(|e| {
            ReplicaError::Generation(format!("gemini: failed to parse response: {e}"))
        })?;

        let text = extract_text(&parsed)?;
        let tokens = parsed.usage_metadata.as_ref().map(|u| u.total_token_count);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        Ok(ModelReply {
            text,
            metadata: ReplyMetadata {
                provider_used: "gemini".to_string(),
                tokens_used: tokens,
                processing_time_ms: elapsed_ms,
                model: Some(effective_model.to_string()),
            },
        })
    }

    async fn is_available(&self) -> bool {
        if let Some(missing) = self.missing_credentials() {
            warn!("gemini: no {missing} configured");
            return false;
        }
        let url = self.model_url(&self.config.model);
        let req = match self.authorize(self.client.get(&url)).await {
            Ok(req) => req,
            Err(e) => {
                warn!("gemini not available: {e}");
                return false;
            }
        };
        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("gemini not available: {e}");
                false
            }
        }
    }
}
