use domain::error::ServiceError;
use domain::models::{Citation, RetrievedChunk, StructuredAnswer};
use domain::ports::ChatModel;
use infrastructure::retry::RetryPolicy;
use std::collections::HashSet;

pub const UNKNOWN_ANSWER: &str = "I don't know";

/// Citations attached when the model's reply cannot be parsed.
const FALLBACK_CITATIONS: usize = 2;

pub struct AnswerService<C> {
    model: C,
    retry: RetryPolicy,
}

impl<C: ChatModel> AnswerService<C> {
    pub fn new(model: C) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Asks the model to answer `question` from `top_chunks` only.
    pub async fn answer(
        &self,
        question: &str,
        top_chunks: &[RetrievedChunk],
    ) -> Result<StructuredAnswer, ServiceError> {
        let prompt = build_prompt(question, top_chunks);
        let model = &self.model;
        let prompt = prompt.as_str();
        let raw = self.retry.run("chat", move || model.complete(prompt)).await?;
        if strip_code_fences(&raw).is_empty() {
            return Err(ServiceError::Decode {
                service: "chat",
                message: "model returned an empty reply".to_string(),
            });
        }
        Ok(parse_answer(&raw, top_chunks))
    }
}

pub fn build_prompt(question: &str, top_chunks: &[RetrievedChunk]) -> String {
    let context = top_chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "Chunk {} (doc: {}, id: {}):\n{}",
                i + 1,
                c.chunk.doc_name,
                c.chunk.chunk_id,
                c.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a highly accurate insurance policy clause evaluator. \
         Answer strictly from the given context. Always cite sources.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Respond ONLY with a JSON object with keys: answer (string), citations (array of {{doc_name, chunk_id}}). \
         If the context does not cover the question, set answer to \"{UNKNOWN_ANSWER}\" and citations to []."
    )
}

/// Removes a leading ```` ```json ```` or ```` ``` ```` fence and a trailing ```` ``` ````.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim_start();
    if text
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("```json"))
    {
        text = text[7..].trim_start();
    }
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim_start();
    }
    let trimmed_end = text.trim_end();
    if let Some(rest) = trimmed_end.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Reads the model's reply as a [`StructuredAnswer`]. A reply that does not hold a
/// parseable JSON object still yields an answer: the cleaned text, citing the first
/// two supplied chunks.
pub fn parse_answer(raw: &str, supplied: &[RetrievedChunk]) -> StructuredAnswer {
    let cleaned = strip_code_fences(raw);
    let candidate = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned,
    };

    match serde_json::from_str::<StructuredAnswer>(candidate) {
        Ok(mut parsed) => {
            let allowed: HashSet<Citation> = supplied.iter().map(|c| c.chunk.citation()).collect();
            let before = parsed.citations.len();
            parsed.citations.retain(|c| allowed.contains(c));
            if parsed.citations.len() < before {
                tracing::debug!(
                    dropped = before - parsed.citations.len(),
                    "dropped citations outside the supplied context"
                );
            }
            parsed
        }
        Err(err) => {
            tracing::warn!(error = %err, "model reply was not valid JSON; using raw text");
            StructuredAnswer {
                answer: cleaned.to_string(),
                citations: supplied
                    .iter()
                    .take(FALLBACK_CITATIONS)
                    .map(|c| c.chunk.citation())
                    .collect(),
            }
        }
    }
}
