use crate::retry::RetryPolicy;
use domain::error::{EmbedError, ServiceError};
use domain::models::{Chunk, IndexRecord};
use domain::ports::{EmbeddingModel, VectorIndex};
use shared::utils::truncate_chars;

/// Texts per batch, kept small to stay under the model's rate limits.
pub const EMBED_BATCH_SIZE: usize = 8;

/// Characters of each text sent to the model; the rest is dropped.
pub const MAX_EMBED_CHARS: usize = 2000;

pub struct Embedder<E> {
    model: E,
    retry: RetryPolicy,
    dimension: usize,
}

impl<E: EmbeddingModel> Embedder<E> {
    /// `dimension` is the fixed vector size the similarity index was provisioned with.
    pub fn new(model: E, dimension: usize) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
            dimension,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Embeds `texts` in order, one call per text, batch after batch.
    /// Vectors keep the model's native dimension.
    pub async fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());
        let model = &self.model;

        for (batch_no, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            tracing::debug!(batch = batch_no, size = batch.len(), "embedding batch");
            for text in batch {
                let input = truncate_chars(text, MAX_EMBED_CHARS);
                let vector = self.retry.run("embed", move || model.embed(input)).await?;
                vectors.push(vector);
            }
        }
        Ok(vectors)
    }

    /// Embeds a question and adapts it to the index dimension.
    pub async fn embed_query(&self, question: &str) -> Result<Vec<f32>, ServiceError> {
        let native = self
            .embed_text(&[question])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::Decode {
                service: "embedding",
                message: "no vector returned for query".to_string(),
            })?;
        Ok(adapt_dimension(native, self.dimension))
    }

    /// Embeds every chunk and upserts it under `<doc_name>_<chunk_id>`.
    /// Returns the number of records written.
    pub async fn embed<V: VectorIndex>(
        &self,
        chunks: &[Chunk],
        index: &V,
    ) -> Result<usize, EmbedError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embed_text(&texts).await?;

        let records: Vec<IndexRecord> = chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRecord::new(chunk, adapt_dimension(vector, self.dimension)))
            .collect();

        index.upsert(&records).await.map_err(EmbedError::Index)?;
        tracing::info!(
            records = records.len(),
            model = self.model_name(),
            dimension = self.dimension,
            "chunks embedded and upserted"
        );
        Ok(records.len())
    }
}

/// Forces a native vector to the index dimension `target`:
/// unchanged when equal, tiled when `target` is a multiple of its length,
/// truncated when longer, zero-padded otherwise.
pub fn adapt_dimension(vector: Vec<f32>, target: usize) -> Vec<f32> {
    let native = vector.len();
    if native == target {
        return vector;
    }
    if native > 0 && target % native == 0 {
        return vector.repeat(target / native);
    }
    if native > target {
        let mut vector = vector;
        vector.truncate(target);
        return vector;
    }
    let mut vector = vector;
    vector.resize(target, 0.0);
    vector
}
