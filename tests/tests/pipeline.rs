use application::answer_service::AnswerService;
use application::rag_service::{PipelineSettings, RagService};
use domain::error::{LoadError, RunError};
use domain::models::{AnswerSlot, Citation, Chunk, StructuredAnswer};
use domain::request::RunRequest;
use infrastructure::document_loader::DocumentLoader;
use infrastructure::embedder::{Embedder, MAX_EMBED_CHARS};
use infrastructure::sqlite_index::SqliteIndex;
use std::sync::Arc;
use tests::{
    instant_retry, words, CannedChat, FailingIndex, GroundedChat, HashEmbedder,
    RateLimitedChat, RecordingSleeper, StaticFetcher,
};

const POLICY_URL: &str = "https://docs.example.com/files/policy.txt?sig=abc";
const NOTES_URL: &str = "https://docs.example.com/files/notes.md";

const POLICY: &str = "A grace period of thirty days is allowed for premium payment. \
                      Pre-existing diseases are covered after a waiting period of 36 months.";
const NOTES: &str = "Room rent is capped at one percent of the sum insured per day.";

fn fetcher() -> StaticFetcher {
    StaticFetcher::default()
        .with(POLICY_URL, POLICY)
        .with(NOTES_URL, NOTES)
}

fn grounded_chat() -> GroundedChat {
    GroundedChat::default()
        .fact("grace", "Thirty days.")
        .fact("room rent", "One percent of the sum insured per day.")
}

fn service<E, C>(
    fetcher: StaticFetcher,
    embedder: Embedder<E>,
    chat: C,
    settings: PipelineSettings,
) -> RagService<StaticFetcher, E, SqliteIndex, C>
where
    E: domain::ports::EmbeddingModel,
    C: domain::ports::ChatModel,
{
    RagService::new(
        DocumentLoader::new(fetcher),
        embedder,
        SqliteIndex::in_memory().unwrap(),
        AnswerService::new(chat),
        settings,
    )
}

fn request(documents: &[&str], questions: &[&str]) -> RunRequest {
    RunRequest::new(
        documents.iter().map(|d| d.to_string()).collect(),
        questions.iter().map(|q| q.to_string()).collect(),
    )
    .unwrap()
}

fn answered(slot: &AnswerSlot) -> &StructuredAnswer {
    match slot {
        AnswerSlot::Answered(answer) => answer,
        AnswerSlot::Failed { question, error } => panic!("{question} failed: {error}"),
    }
}

#[tokio::test]
async fn answers_from_the_documents_and_admits_ignorance_otherwise() {
    let service = service(
        fetcher(),
        Embedder::new(HashEmbedder::new(16), 32),
        grounded_chat(),
        PipelineSettings::default(),
    );
    let response = service
        .run(&request(
            &[POLICY_URL, NOTES_URL],
            &["What is the grace period?", "Is dental treatment covered?"],
        ))
        .await
        .unwrap();

    assert_eq!(response.answers.len(), 2);
    let grace = answered(&response.answers[0]);
    assert_eq!(grace.answer, "Thirty days.");
    assert_eq!(
        grace.citations,
        vec![Citation {
            doc_name: "policy.txt".into(),
            chunk_id: 0,
        }]
    );
    let dental = answered(&response.answers[1]);
    assert_eq!(dental.answer, "I don't know");
    assert!(dental.citations.is_empty());

    let d = &response.diagnostics;
    assert_eq!(d.total_chunks, 2);
    assert_eq!(d.embedded_chunks, 2);
    assert_eq!(d.max_chunks, None);
    assert_eq!(d.embedding_model, "hash-embed");
    assert!(!d.fallback_used);
}

#[tokio::test]
async fn response_serializes_with_camel_case_diagnostics() {
    let service = service(
        fetcher(),
        Embedder::new(HashEmbedder::new(8), 8),
        grounded_chat(),
        PipelineSettings::default(),
    );
    let response = service
        .run(&request(&[POLICY_URL], &["What is the grace period?"]))
        .await
        .unwrap();
    let body = serde_json::to_value(&response).unwrap();

    assert_eq!(body["answers"][0]["answer"], "Thirty days.");
    assert_eq!(body["answers"][0]["citations"][0]["doc_name"], "policy.txt");
    assert_eq!(body["diagnostics"]["totalChunks"], 1);
    assert_eq!(body["diagnostics"]["embeddingModel"], "hash-embed");
    assert_eq!(body["diagnostics"]["fallbackUsed"], false);
}

#[tokio::test]
async fn first_failing_document_aborts_the_run() {
    let fetcher = fetcher();
    let service = service(
        fetcher.clone(),
        Embedder::new(HashEmbedder::new(8), 8),
        grounded_chat(),
        PipelineSettings::default(),
    );
    let missing = "https://docs.example.com/files/missing.pdf";
    let err = service
        .run(&request(&[POLICY_URL, missing, NOTES_URL], &["What is the grace period?"]))
        .await
        .unwrap_err();

    assert_eq!(err.step(), "load_documents");
    assert!(matches!(
        err,
        RunError::Load(LoadError::Fetch { ref reference, .. }) if reference == missing
    ));
    assert_eq!(fetcher.requested(), vec![POLICY_URL.to_string(), missing.to_string()]);
}

#[tokio::test]
async fn unsupported_format_is_rejected_before_fetching() {
    let spreadsheet = "https://docs.example.com/files/rates.xlsx";
    let fetcher = fetcher().with(spreadsheet, "binary");
    let service = service(
        fetcher.clone(),
        Embedder::new(HashEmbedder::new(8), 8),
        grounded_chat(),
        PipelineSettings::default(),
    );
    let err = service
        .run(&request(&[spreadsheet], &["What are the rates?"]))
        .await
        .unwrap_err();

    match err {
        RunError::Load(LoadError::UnsupportedFormat { name, extension, .. }) => {
            assert_eq!(name, "rates.xlsx");
            assert_eq!(extension, "xlsx");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(fetcher.requested().is_empty());
}

#[tokio::test]
async fn embedding_outage_falls_back_to_keyword_retrieval() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let model = HashEmbedder::failing(503);
    let chat = grounded_chat();
    let service = service(
        fetcher(),
        Embedder::new(model.clone(), 8).with_retry(instant_retry(&sleeper)),
        chat.clone(),
        PipelineSettings::default(),
    );
    let response = service
        .run(&request(&[POLICY_URL, NOTES_URL], &["How is room rent limited?"]))
        .await
        .unwrap();

    assert!(response.diagnostics.fallback_used);
    assert_eq!(response.diagnostics.embedded_chunks, 2);
    let answer = answered(&response.answers[0]);
    assert_eq!(answer.answer, "One percent of the sum insured per day.");
    assert_eq!(answer.citations[0].doc_name, "notes.md");

    // The first chunk exhausted the retry budget; nothing after it was attempted.
    assert_eq!(model.inputs().len(), 5);
    assert_eq!(sleeper.delays_ms(), vec![1000, 2000, 4000, 8000]);
    // Keyword retrieval puts the matching chunk first.
    let prompt = &chat.prompts()[0];
    assert!(prompt.find("doc: notes.md").unwrap() < prompt.find("doc: policy.txt").unwrap());
}

#[tokio::test]
async fn failed_question_gets_an_error_slot_and_order_is_kept() {
    let service = service(
        fetcher(),
        Embedder::new(HashEmbedder::new(8), 8),
        grounded_chat().fail_on("boom"),
        PipelineSettings::default(),
    );
    let response = service
        .run(&request(
            &[POLICY_URL, NOTES_URL],
            &["What is the grace period?", "What does boom mean?", "How is room rent limited?"],
        ))
        .await
        .unwrap();

    assert_eq!(response.answers.len(), 3);
    assert_eq!(answered(&response.answers[0]).answer, "Thirty days.");
    match &response.answers[1] {
        AnswerSlot::Failed { question, error } => {
            assert_eq!(question, "What does boom mean?");
            assert!(error.contains("400"), "{error}");
        }
        other => panic!("expected a failure slot, got {other:?}"),
    }
    assert_eq!(
        answered(&response.answers[2]).answer,
        "One percent of the sum insured per day."
    );

    let body = serde_json::to_value(&response.answers[1]).unwrap();
    assert_eq!(body["question"], "What does boom mean?");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn chunk_cap_limits_what_is_embedded() {
    let long_url = "https://docs.example.com/files/long.txt";
    let fetcher = StaticFetcher::default().with(long_url, words(1200));
    let model = HashEmbedder::new(8);
    let service = service(
        fetcher,
        Embedder::new(model.clone(), 8),
        grounded_chat(),
        PipelineSettings {
            max_chunks: Some(1),
            ..PipelineSettings::default()
        },
    );
    let response = service
        .run(&request(&[long_url], &["What is w700?"]))
        .await
        .unwrap();

    let d = &response.diagnostics;
    assert_eq!(d.total_chunks, 3);
    assert_eq!(d.embedded_chunks, 1);
    assert_eq!(d.max_chunks, Some(1));
    assert!(!d.fallback_used);
    assert_eq!(service.index().len().unwrap(), 1);
    // one chunk plus one query
    assert_eq!(model.inputs().len(), 2);
}

#[tokio::test]
async fn zero_cap_skips_embedding_entirely() {
    let model = HashEmbedder::new(8);
    let service = service(
        fetcher(),
        Embedder::new(model.clone(), 8),
        grounded_chat(),
        PipelineSettings {
            max_chunks: Some(0),
            ..PipelineSettings::default()
        },
    );
    let response = service
        .run(&request(&[POLICY_URL], &["What is the grace period?"]))
        .await
        .unwrap();

    assert!(response.diagnostics.fallback_used);
    assert_eq!(response.diagnostics.embedded_chunks, 0);
    assert!(model.inputs().is_empty());
    assert_eq!(answered(&response.answers[0]).answer, "Thirty days.");
}

#[tokio::test]
async fn embedder_truncates_long_texts() {
    let model = HashEmbedder::new(4);
    let embedder = Embedder::new(model.clone(), 4);
    let index = SqliteIndex::in_memory().unwrap();
    let chunks: Vec<Chunk> = (0..10)
        .map(|i| Chunk {
            doc_name: "big.txt".into(),
            chunk_id: i,
            text: "é".repeat(3000),
        })
        .collect();

    let written = embedder.embed(&chunks, &index).await.unwrap();

    assert_eq!(written, 10);
    assert_eq!(index.len().unwrap(), 10);
    let inputs = model.inputs();
    assert_eq!(inputs.len(), 10);
    assert!(inputs.iter().all(|t| t.chars().count() == MAX_EMBED_CHARS));
}

#[tokio::test]
async fn reingesting_a_document_overwrites_its_vectors() {
    let service = service(
        fetcher(),
        Embedder::new(HashEmbedder::new(8), 8),
        grounded_chat(),
        PipelineSettings::default(),
    );
    let req = request(&[POLICY_URL, NOTES_URL], &["What is the grace period?"]);

    service.run(&req).await.unwrap();
    service.run(&req).await.unwrap();

    assert_eq!(service.index().len().unwrap(), 2);
}

#[tokio::test]
async fn unparseable_reply_is_returned_as_text_citing_the_top_chunks() {
    let service = service(
        fetcher(),
        Embedder::new(HashEmbedder::new(8), 8),
        CannedChat("```\nThe grace period is thirty days.\n```"),
        PipelineSettings::default(),
    );
    let response = service
        .run(&request(&[POLICY_URL, NOTES_URL], &["What is the grace period?"]))
        .await
        .unwrap();

    let answer = answered(&response.answers[0]);
    assert_eq!(answer.answer, "The grace period is thirty days.");
    assert_eq!(answer.citations.len(), 2);
}

#[tokio::test]
async fn loads_local_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handbook.md");
    std::fs::write(&path, "The grace period for renewals is fifteen days.").unwrap();

    let service = RagService::new(
        DocumentLoader::new(
            infrastructure::document_loader::HttpFetcher::new(std::time::Duration::from_secs(5))
                .unwrap(),
        ),
        Embedder::new(HashEmbedder::new(8), 8),
        SqliteIndex::in_memory().unwrap(),
        AnswerService::new(GroundedChat::default().fact("grace", "Fifteen days.")),
        PipelineSettings::default(),
    );
    let reference = path.to_string_lossy().to_string();
    let response = service
        .run(&request(&[reference.as_str()], &["What is the grace period?"]))
        .await
        .unwrap();

    let answer = answered(&response.answers[0]);
    assert_eq!(answer.answer, "Fifteen days.");
    assert_eq!(answer.citations[0].doc_name, "handbook.md");
}

#[tokio::test]
async fn index_write_failure_falls_back_to_keyword_retrieval() {
    let service = RagService::new(
        DocumentLoader::new(fetcher()),
        Embedder::new(HashEmbedder::new(8), 8),
        FailingIndex::rejecting_upserts(),
        AnswerService::new(grounded_chat()),
        PipelineSettings::default(),
    );
    let response = service
        .run(&request(&[POLICY_URL, NOTES_URL], &["What is the grace period?"]))
        .await
        .unwrap();

    assert!(response.diagnostics.fallback_used);
    assert_eq!(response.diagnostics.embedded_chunks, 2);
    assert_eq!(answered(&response.answers[0]).answer, "Thirty days.");
    assert_eq!(service.index().query_count(), 0);
}

#[tokio::test]
async fn index_query_failure_only_fails_that_question() {
    let service = RagService::new(
        DocumentLoader::new(fetcher()),
        Embedder::new(HashEmbedder::new(8), 8),
        FailingIndex::failing_queries([1]),
        AnswerService::new(grounded_chat()),
        PipelineSettings::default(),
    );
    let response = service
        .run(&request(
            &[POLICY_URL, NOTES_URL],
            &[
                "What is the grace period?",
                "What is the waiting period?",
                "How is room rent limited?",
            ],
        ))
        .await
        .unwrap();

    assert!(!response.diagnostics.fallback_used);
    assert_eq!(response.answers.len(), 3);
    assert_eq!(answered(&response.answers[0]).answer, "Thirty days.");
    match &response.answers[1] {
        AnswerSlot::Failed { question, error } => {
            assert_eq!(question, "What is the waiting period?");
            assert!(error.contains("index query timed out"), "{error}");
        }
        other => panic!("expected a failure slot, got {other:?}"),
    }
    assert_eq!(
        answered(&response.answers[2]).answer,
        "One percent of the sum insured per day."
    );
}

#[tokio::test]
async fn rate_limited_chat_is_retried_with_backoff() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let service = RagService::new(
        DocumentLoader::new(fetcher()),
        Embedder::new(HashEmbedder::new(8), 8),
        SqliteIndex::in_memory().unwrap(),
        AnswerService::new(RateLimitedChat::new(4, grounded_chat()))
            .with_retry(instant_retry(&sleeper)),
        PipelineSettings::default(),
    );
    let response = service
        .run(&request(&[POLICY_URL], &["What is the grace period?"]))
        .await
        .unwrap();

    assert_eq!(answered(&response.answers[0]).answer, "Thirty days.");
    assert_eq!(sleeper.delays_ms(), vec![1000, 2000, 4000, 8000]);
}

#[tokio::test]
async fn chat_rate_limits_beyond_the_retry_budget_fail_the_question() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let chat = RateLimitedChat::new(5, grounded_chat());
    let answerer = AnswerService::new(chat).with_retry(instant_retry(&sleeper));
    let err = answerer.answer("What is the grace period?", &[]).await.unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert_eq!(sleeper.delays_ms().len(), 4);
}

#[tokio::test]
async fn empty_chat_reply_becomes_an_error_slot() {
    let service = service(
        fetcher(),
        Embedder::new(HashEmbedder::new(8), 8),
        CannedChat(""),
        PipelineSettings::default(),
    );
    let response = service
        .run(&request(&[POLICY_URL, NOTES_URL], &["What is the grace period?"]))
        .await
        .unwrap();

    match &response.answers[0] {
        AnswerSlot::Failed { question, error } => {
            assert_eq!(question, "What is the grace period?");
            assert!(error.contains("empty reply"), "{error}");
        }
        other => panic!("expected a failure slot, got {other:?}"),
    }
}
