//! Text generation backends.
//!
//! Everything model-specific sits behind [`Generator`], a single
//! `generate(prompt, system_instruction) -> text` operation, so the agents
//! never know which service answered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434/api/generate";

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("No API key configured for {0}")]
    MissingApiKey(&'static str),

    #[error("Could not decode {provider} response: {reason}")]
    Decode {
        provider: &'static str,
        reason: String,
    },

    #[error("{0} returned an empty response")]
    EmptyResponse(&'static str),
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, system_instruction: &str)
        -> Result<String, GenerateError>;
}

// ============================================================================
// Gemini Backend
// ============================================================================

#[derive(Serialize)]
struct GeminiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

/// Google Gemini `generateContent` backend.
pub struct GeminiBackend {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    /// An empty `api_key` yields a backend that fails every call with
    /// [`GenerateError::MissingApiKey`].
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: (!api_key.is_empty()).then(|| api_key.to_string()),
            model: model.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn build_body<'a>(prompt: &'a str, system_instruction: &'a str) -> GeminiRequest<'a> {
        GeminiRequest {
            system_instruction: (!system_instruction.is_empty()).then(|| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system_instruction,
                }],
            }),
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: prompt }],
            }],
        }
    }

    fn extract_text(response: GeminiResponse) -> Result<String, GenerateError> {
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(GenerateError::EmptyResponse("Gemini"));
        }
        Ok(text)
    }
}

#[async_trait]
impl Generator for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, GenerateError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(GenerateError::MissingApiKey("Gemini"))?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, prompt_len = prompt.len(), "calling Gemini");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&Self::build_body(prompt, system_instruction))
            .send()
            .await
            .map_err(|e| GenerateError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerateError::Status {
                provider: "Gemini",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GeminiResponse = resp.json().await.map_err(|e| GenerateError::Decode {
            provider: "Gemini",
            reason: e.to_string(),
        })?;
        Self::extract_text(parsed)
    }
}

// ============================================================================
// Ollama Backend
// ============================================================================

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Local Ollama `/api/generate` backend.
pub struct OllamaBackend {
    pub endpoint: String,
    pub model: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Generator for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, GenerateError> {
        debug!(model = %self.model, endpoint = %self.endpoint, "calling Ollama");
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            system: system_instruction,
            stream: false,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerateError::Status {
                provider: "Ollama",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaResponse = resp.json().await.map_err(|e| GenerateError::Decode {
            provider: "Ollama",
            reason: e.to_string(),
        })?;
        if parsed.response.trim().is_empty() {
            return Err(GenerateError::EmptyResponse("Ollama"));
        }
        Ok(parsed.response)
    }
}
