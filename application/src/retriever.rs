use domain::models::{Chunk, RetrievedChunk};
use domain::ports::{EmbeddingModel, VectorIndex};
use infrastructure::embedder::Embedder;
use shared::types::Result;
use std::collections::HashSet;

pub const DEFAULT_TOP_K: usize = 4;

/// How chunks are selected for a question. Chosen once per request: vector search when
/// the request's chunks were embedded and indexed, keyword overlap otherwise.
pub enum Retriever<'a, E, V> {
    Vector {
        embedder: &'a Embedder<E>,
        index: &'a V,
    },
    Keyword {
        chunks: &'a [Chunk],
    },
}

impl<'a, E: EmbeddingModel, V: VectorIndex> Retriever<'a, E, V> {
    pub fn is_keyword(&self) -> bool {
        matches!(self, Self::Keyword { .. })
    }

    /// Up to `top_k` chunks, most relevant first.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        match self {
            Self::Vector { embedder, index } => {
                let vector = embedder.embed_query(question).await?;
                index.query(&vector, top_k).await
            }
            Self::Keyword { chunks } => Ok(keyword_search(question, chunks, top_k)),
        }
    }
}

/// Distinct lower-cased terms of `question`, split on runs of non-word characters.
pub fn query_terms(question: &str) -> Vec<String> {
    let lower = question.to_lowercase();
    let mut seen = HashSet::new();
    lower
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|term| !term.is_empty())
        .filter(|term| seen.insert(*term))
        .map(str::to_string)
        .collect()
}

/// Scores each chunk by how many distinct question terms occur anywhere in its
/// lower-cased text and keeps the best `top_k`. Equal scores keep chunk order.
pub fn keyword_search(question: &str, chunks: &[Chunk], top_k: usize) -> Vec<RetrievedChunk> {
    let terms = query_terms(question);
    let mut scored: Vec<(usize, &Chunk)> = chunks
        .iter()
        .map(|chunk| {
            let text = chunk.text.to_lowercase();
            let score = terms.iter().filter(|term| text.contains(term.as_str())).count();
            (score, chunk)
        })
        .collect();
    // Stable: ties stay in load order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(top_k)
        .map(|(score, chunk)| RetrievedChunk {
            chunk: chunk.clone(),
            score: Some(score as f32),
        })
        .collect()
}
