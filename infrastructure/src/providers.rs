//! Backends selected from configuration at startup.

use crate::config::{Config, LlmProvider, VectorBackend};
use crate::gemini_client::GeminiClient;
use crate::ollama_client::OllamaClient;
use crate::pinecone_index::PineconeIndex;
use crate::sqlite_index::SqliteIndex;
use domain::error::ServiceError;
use domain::models::{IndexRecord, RetrievedChunk};
use domain::ports::{ChatModel, EmbeddingModel, VectorIndex};
use shared::types::Result;

#[derive(Clone)]
pub enum ModelBackend {
    Gemini(GeminiClient),
    Ollama(OllamaClient),
}

impl ModelBackend {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(match config.llm_provider {
            LlmProvider::Gemini => Self::Gemini(
                GeminiClient::new(
                    config.gemini_base_url.clone(),
                    config.google_api_key.clone(),
                    config.chat_model.clone(),
                    config.embedding_model.clone(),
                    config.http_timeout,
                )?
                .with_generation(config.chat_max_tokens, config.chat_temperature),
            ),
            LlmProvider::Ollama => Self::Ollama(
                OllamaClient::new(
                    config.ollama_base_url.clone(),
                    config.ollama_model.clone(),
                    config.ollama_embed_model.clone(),
                    config.http_timeout,
                )?
                .with_generation(config.chat_max_tokens, config.chat_temperature),
            ),
        })
    }
}

impl EmbeddingModel for ModelBackend {
    fn model_name(&self) -> &str {
        match self {
            Self::Gemini(client) => client.model_name(),
            Self::Ollama(client) => client.model_name(),
        }
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ServiceError> {
        match self {
            Self::Gemini(client) => client.embed(text).await,
            Self::Ollama(client) => client.embed(text).await,
        }
    }
}

impl ChatModel for ModelBackend {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, ServiceError> {
        match self {
            Self::Gemini(client) => client.complete(prompt).await,
            Self::Ollama(client) => client.complete(prompt).await,
        }
    }
}

pub enum IndexBackend {
    Pinecone(PineconeIndex),
    Sqlite(SqliteIndex),
}

impl IndexBackend {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(match config.vector_backend {
            VectorBackend::Pinecone => Self::Pinecone(PineconeIndex::new(
                config.pinecone_api_key.clone(),
                config.pinecone_index.clone(),
                config.pinecone_host.clone(),
                config.http_timeout,
            )?),
            VectorBackend::Sqlite => Self::Sqlite(SqliteIndex::open(&config.db_path)?),
        })
    }
}

impl VectorIndex for IndexBackend {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        match self {
            Self::Pinecone(index) => index.upsert(records).await,
            Self::Sqlite(index) => index.upsert(records).await,
        }
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        match self {
            Self::Pinecone(index) => index.query(vector, top_k).await,
            Self::Sqlite(index) => index.query(vector, top_k).await,
        }
    }
}
