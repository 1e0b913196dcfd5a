use crate::gemini_client::transport_error;
use anyhow::Context;
use domain::error::ServiceError;
use domain::ports::{ChatModel, EmbeddingModel};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::types::Result;
use shared::utils::truncate_chars;
use std::sync::Arc;
use std::time::Duration;

const SERVICE: &str = "ollama";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
    #[serde(default)]
    done: bool,
}

/// Local Ollama server used for both embeddings and chat.
#[derive(Clone)]
pub struct OllamaClient {
    client: Arc<Client>,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    num_predict: u32,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(
        base_url: String,
        chat_model: String,
        embedding_model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Ollama HTTP client")?;
        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model,
            embedding_model,
            num_predict: 350,
            temperature: 0.2,
        })
    }

    pub fn with_generation(mut self, num_predict: u32, temperature: f32) -> Self {
        self.num_predict = num_predict;
        self.temperature = temperature;
        self
    }

    async fn post_text<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<String, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

impl EmbeddingModel for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ServiceError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };
        let body = self.post_text("/api/embeddings", &request).await?;
        let response: EmbeddingResponse =
            serde_json::from_str(&body).map_err(|e| ServiceError::Decode {
                service: SERVICE,
                message: e.to_string(),
            })?;
        Ok(response.embedding)
    }
}

impl ChatModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, ServiceError> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: ChatOptions {
                num_predict: self.num_predict,
                temperature: self.temperature,
            },
        };
        let body = self.post_text("/api/chat", &request).await?;
        collect_chat_content(&body)
    }
}

/// Joins message content across newline-delimited chat responses, stopping at `done`.
/// A body in which no line is a chat response is a decode failure.
fn collect_chat_content(body: &str) -> std::result::Result<String, ServiceError> {
    let mut full_content = String::new();
    let mut parsed_any = false;
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(chat_resp) = serde_json::from_str::<ChatResponse>(line) {
            parsed_any = true;
            full_content.push_str(&chat_resp.message.content);
            if chat_resp.done {
                break;
            }
        }
    }
    if !parsed_any {
        return Err(ServiceError::Decode {
            service: SERVICE,
            message: format!("no chat message in response: {}", truncate_chars(body, 200)),
        });
    }
    Ok(full_content)
}
