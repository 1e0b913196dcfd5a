//! Google Generative Language REST client for embeddings and text generation.

use anyhow::Context;
use domain::error::ServiceError;
use domain::ports::{ChatModel, EmbeddingModel};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::types::Result;
use std::sync::Arc;
use std::time::Duration;

const SERVICE: &str = "gemini";

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Finish reasons that mean the candidate text was withheld or cut off by policy.
const BLOCKING_FINISH_REASONS: [&str; 3] = ["SAFETY", "RECITATION", "LANGUAGE"];

impl GenerateContentResponse {
    /// Concatenated text of the first candidate. A blocked prompt, a candidate stopped
    /// for policy reasons, or a candidate without parts is a decode failure.
    fn text(self) -> std::result::Result<String, ServiceError> {
        let decode = |message: String| ServiceError::Decode {
            service: SERVICE,
            message,
        };
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(decode(format!("prompt blocked: {reason}")));
        };
        if let Some(reason) = candidate
            .finish_reason
            .as_deref()
            .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
        {
            return Err(decode(format!("candidate stopped: {reason}")));
        }
        match candidate.content {
            Some(content) if !content.parts.is_empty() => {
                Ok(content.parts.into_iter().map(|p| p.text).collect())
            }
            _ => Err(decode("candidate has no content".to_string())),
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Arc<Client>,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    max_output_tokens: u32,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(
        base_url: String,
        api_key: String,
        chat_model: String,
        embedding_model: String,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing GOOGLE_API_KEY");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model,
            embedding_model,
            max_output_tokens: 350,
            temperature: 0.2,
        })
    }

    pub fn with_generation(mut self, max_output_tokens: u32, temperature: f32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self.temperature = temperature;
        self
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        model: &str,
        method: &str,
        body: &B,
    ) -> std::result::Result<R, ServiceError> {
        let url = format!("{}/models/{}:{}", self.base_url, model, method);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map_err(|e| ServiceError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })
    }
}

impl EmbeddingModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ServiceError> {
        let request = EmbedContentRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
        };
        let response: EmbedContentResponse = self
            .post(&self.embedding_model, "embedContent", &request)
            .await?;
        Ok(response.embedding.values)
    }
}

impl ChatModel for GeminiClient {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, ServiceError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
                temperature: self.temperature,
            },
        };
        let response: GenerateContentResponse = self
            .post(&self.chat_model, "generateContent", &request)
            .await?;
        response.text()
    }
}

/// Maps a reqwest send failure onto the retry taxonomy.
pub(crate) fn transport_error(service: &'static str, err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout {
            service,
            message: err.to_string(),
        }
    } else if let Some(status) = err.status() {
        ServiceError::Status {
            service,
            status: status.as_u16(),
            body: err.to_string(),
        }
    } else {
        ServiceError::Transport {
            service,
            message: err.to_string(),
        }
    }
}
