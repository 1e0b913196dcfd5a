use anyhow::{bail, Context};
use dotenvy::dotenv;
use shared::types::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    Ollama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Pinecone,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm_provider: LlmProvider,
    pub google_api_key: String,
    pub gemini_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_embed_model: String,
    pub vector_backend: VectorBackend,
    pub pinecone_api_key: String,
    pub pinecone_index: String,
    pub pinecone_host: Option<String>,
    pub target_dimension: usize,
    pub db_path: String,
    pub max_chunks: Option<usize>,
    pub top_k: usize,
    pub chat_max_tokens: u32,
    pub chat_temperature: f32,
    pub http_timeout: Duration,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_provider = match var("LLM_PROVIDER", "gemini").to_lowercase().as_str() {
            "gemini" => LlmProvider::Gemini,
            "ollama" => LlmProvider::Ollama,
            other => bail!("LLM_PROVIDER must be `gemini` or `ollama`, got `{other}`"),
        };
        let vector_backend = match var("VECTOR_BACKEND", "pinecone").to_lowercase().as_str() {
            "pinecone" => VectorBackend::Pinecone,
            "sqlite" => VectorBackend::Sqlite,
            other => bail!("VECTOR_BACKEND must be `pinecone` or `sqlite`, got `{other}`"),
        };

        let target_dimension: usize = parse_var("PINECONE_DIM", &var("PINECONE_DIM", "1536"))?;
        if target_dimension == 0 {
            bail!("PINECONE_DIM must be greater than zero");
        }
        let top_k: usize = parse_var("TOP_K", &var("TOP_K", "4"))?;
        // Negative caps behave like zero: nothing is embedded.
        let max_chunks = optional("MAX_CHUNKS")
            .map(|raw| parse_var::<i64>("MAX_CHUNKS", &raw))
            .transpose()?
            .map(|n| n.max(0) as usize);

        Ok(Self {
            llm_provider,
            google_api_key: var("GOOGLE_API_KEY", ""),
            gemini_base_url: var(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            chat_model: var("GEMINI_MODEL", "gemini-1.5-flash"),
            embedding_model: var("EMBEDDING_MODEL", "text-embedding-004"),
            ollama_base_url: var("OLLAMA_BASE_URL", "http://localhost:11434"),
            ollama_model: var("OLLAMA_MODEL", "qwen2.5:7b-instruct"),
            ollama_embed_model: var("OLLAMA_EMBED_MODEL", "nomic-embed-text"),
            vector_backend,
            pinecone_api_key: var("PINECONE_API_KEY", ""),
            pinecone_index: var("PINECONE_INDEX", "bajaj2"),
            pinecone_host: optional("PINECONE_HOST"),
            target_dimension,
            db_path: var("DB_PATH", "embeddings.db"),
            max_chunks,
            top_k,
            chat_max_tokens: parse_var("CHAT_MAX_TOKENS", &var("CHAT_MAX_TOKENS", "350"))?,
            chat_temperature: parse_var("CHAT_TEMPERATURE", &var("CHAT_TEMPERATURE", "0.2"))?,
            http_timeout: Duration::from_secs(parse_var(
                "HTTP_TIMEOUT_SECS",
                &var("HTTP_TIMEOUT_SECS", "60"),
            )?),
        })
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: `{raw}`"))
}
