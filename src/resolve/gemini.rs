//! Gemini generateContent backend
//!
//! Posts the prompt to `{endpoint}/models/{model}:generateContent` and
//! returns the text of the first candidate. The blocking ureq call runs
//! on tokio's blocking pool so the pipeline task stays responsive.

use super::InferenceClient;
use crate::config::InferenceConfig;
use crate::error::{McqError, ResolutionError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote inference via the Gemini REST API
#[derive(Clone)]
pub struct GeminiClient {
    /// Base endpoint URL (e.g., "https://generativelanguage.googleapis.com/v1beta")
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiClient {
    /// Create a client from config; the API key must already be resolved
    pub fn new(config: &InferenceConfig, api_key: Option<String>) -> Result<Self, McqError> {
        let api_key = api_key.ok_or_else(|| {
            McqError::Config(
                "No API key for inference. Set MCQTAP_API_KEY or GEMINI_API_KEY, \
                 or api_key under [inference]"
                    .into(),
            )
        })?;

        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(McqError::Config(format!(
                "inference endpoint must start with http:// or https://, got: {}",
                endpoint
            )));
        }

        if endpoint.starts_with("http://")
            && !endpoint.contains("localhost")
            && !endpoint.contains("127.0.0.1")
        {
            tracing::warn!("Inference endpoint uses HTTP without TLS. The API key is sent unencrypted!");
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        tracing::info!(
            "Configured Gemini client: endpoint={}, model={}, timeout={}s",
            endpoint,
            config.model,
            timeout.as_secs()
        );

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout,
        })
    }

    /// URL without the key, safe to log
    fn base_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn request_body<'a>(&self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    /// Blocking request; call from a blocking-pool thread
    fn call_api(&self, prompt: &str) -> Result<String, ResolutionError> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let url = self.base_url();

        tracing::debug!("POST {}", url);

        let response = agent
            .post(&url)
            .query("key", &self.api_key)
            .set("Content-Type", "application/json")
            .send_json(&self.request_body(prompt))
            .map_err(|e| match e {
                ureq::Error::Status(status, response) => {
                    let body = response.into_string().unwrap_or_default();
                    ResolutionError::TransportFailure(format!(
                        "server returned HTTP {}: {}",
                        status,
                        body.chars().take(200).collect::<String>()
                    ))
                }
                ureq::Error::Transport(t) => ResolutionError::TransportFailure(t.to_string()),
            })?;

        let body = response
            .into_string()
            .map_err(|e| ResolutionError::TransportFailure(format!("failed to read body: {}", e)))?;

        extract_text(&body)
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body
fn extract_text(body: &str) -> Result<String, ResolutionError> {
    let malformed = || ResolutionError::InvalidResponse {
        response: body.chars().take(200).collect(),
        expected: "a generateContent reply with candidate text".to_string(),
    };

    let parsed: GenerateResponse = serde_json::from_str(body).map_err(|_| malformed())?;

    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(malformed)
}

#[async_trait::async_trait]
impl InferenceClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, ResolutionError> {
        let client = self.clone();
        let prompt = prompt.to_string();

        let text = tokio::task::spawn_blocking(move || client.call_api(&prompt))
            .await
            .map_err(|e| ResolutionError::TransportFailure(format!("request task failed: {}", e)))??;

        tracing::debug!("Gemini replied {:?}", text);
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
