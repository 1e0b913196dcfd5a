//! Seams to the external collaborators. Clients are built from configuration and
//! handed to the services that need them.

use crate::error::ServiceError;
use crate::models::{IndexRecord, RetrievedChunk};
use shared::types::Result;
use std::future::Future;

/// Resolves a document reference to its raw bytes.
pub trait DocumentFetcher {
    fn fetch(&self, reference: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// One text in, one native-dimension vector out.
pub trait EmbeddingModel {
    fn model_name(&self) -> &str;

    fn embed(
        &self,
        text: &str,
    ) -> impl Future<Output = std::result::Result<Vec<f32>, ServiceError>> + Send;
}

/// Single-turn text completion.
pub trait ChatModel {
    fn complete(
        &self,
        prompt: &str,
    ) -> impl Future<Output = std::result::Result<String, ServiceError>> + Send;
}

/// Similarity index keyed by `<doc_name>_<chunk_id>`. Upserts overwrite existing ids.
pub trait VectorIndex {
    fn upsert(&self, records: &[IndexRecord]) -> impl Future<Output = Result<()>> + Send;

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<RetrievedChunk>>> + Send;
}
