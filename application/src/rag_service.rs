use crate::answer_service::AnswerService;
use crate::retriever::{Retriever, DEFAULT_TOP_K};
use domain::error::RunError;
use domain::models::{AnswerSlot, Chunk, Diagnostics, StructuredAnswer};
use domain::ports::{ChatModel, DocumentFetcher, EmbeddingModel, VectorIndex};
use domain::request::{RunRequest, RunResponse};
use infrastructure::document_loader::DocumentLoader;
use infrastructure::embedder::Embedder;
use shared::telemetry::Telemetry;
use shared::types::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub top_k: usize,
    /// Only the first `max_chunks` chunks are embedded; the rest stay keyword-searchable.
    pub max_chunks: Option<usize>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_chunks: None,
        }
    }
}

/// Answers a batch of questions about a batch of documents.
pub struct RagService<F, E, V, C> {
    loader: DocumentLoader<F>,
    embedder: Embedder<E>,
    index: V,
    answerer: AnswerService<C>,
    settings: PipelineSettings,
}

impl<F, E, V, C> RagService<F, E, V, C>
where
    F: DocumentFetcher,
    E: EmbeddingModel,
    V: VectorIndex,
    C: ChatModel,
{
    pub fn new(
        loader: DocumentLoader<F>,
        embedder: Embedder<E>,
        index: V,
        answerer: AnswerService<C>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            loader,
            embedder,
            index,
            answerer,
            settings,
        }
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    /// Loads the documents, prepares retrieval and answers each question in order.
    /// Only a document failure fails the whole run; embedding failures switch to keyword
    /// retrieval and question failures are reported in that question's slot.
    pub async fn run(&self, request: &RunRequest) -> std::result::Result<RunResponse, RunError> {
        let timer = Telemetry::start("load_documents");
        let chunks = self.loader.load(request.documents()).await?;
        timer.finish();

        let to_embed = match self.settings.max_chunks {
            Some(cap) => &chunks[..cap.min(chunks.len())],
            None => &chunks[..],
        };

        let timer = Telemetry::start("embed_chunks");
        let retriever = self.prepare_retriever(&chunks, to_embed).await;
        timer.finish();
        let fallback_used = retriever.is_keyword();

        let timer = Telemetry::start("answer_questions");
        let mut answers = Vec::with_capacity(request.questions().len());
        for question in request.questions() {
            answers.push(self.answer_slot(&retriever, question).await);
        }
        timer.finish();

        Ok(RunResponse {
            answers,
            diagnostics: Diagnostics {
                total_chunks: chunks.len(),
                embedded_chunks: to_embed.len(),
                max_chunks: self.settings.max_chunks,
                embedding_model: self.embedder.model_name().to_string(),
                fallback_used,
            },
        })
    }

    async fn prepare_retriever<'a>(
        &'a self,
        chunks: &'a [Chunk],
        to_embed: &[Chunk],
    ) -> Retriever<'a, E, V> {
        if to_embed.is_empty() {
            tracing::warn!(total = chunks.len(), "no chunks to embed; using keyword retrieval");
            return Retriever::Keyword { chunks };
        }
        match self.embedder.embed(to_embed, &self.index).await {
            Ok(_) => Retriever::Vector {
                embedder: &self.embedder,
                index: &self.index,
            },
            Err(err) => {
                tracing::warn!(error = %err, "embedding failed; falling back to keyword retrieval");
                Retriever::Keyword { chunks }
            }
        }
    }

    async fn answer_slot(&self, retriever: &Retriever<'_, E, V>, question: &str) -> AnswerSlot {
        match self.answer_question(retriever, question).await {
            Ok(answer) => AnswerSlot::Answered(answer),
            Err(err) => {
                tracing::warn!(question, error = %format!("{err:#}"), "question failed");
                AnswerSlot::Failed {
                    question: question.to_string(),
                    error: format!("{err:#}"),
                }
            }
        }
    }

    async fn answer_question(
        &self,
        retriever: &Retriever<'_, E, V>,
        question: &str,
    ) -> Result<StructuredAnswer> {
        let top_chunks = retriever.retrieve(question, self.settings.top_k).await?;
        tracing::debug!(question, retrieved = top_chunks.len(), "context selected");
        Ok(self.answerer.answer(question, &top_chunks).await?)
    }
}
