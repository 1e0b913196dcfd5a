use anyhow::Context;
use application::answer_service::AnswerService;
use application::rag_service::{PipelineSettings, RagService};
use clap::Parser;
use colored::Colorize;
use domain::error::RunError;
use domain::models::AnswerSlot;
use domain::request::{RunRequest, RunResponse};
use infrastructure::config::Config;
use infrastructure::document_loader::{DocumentLoader, HttpFetcher};
use infrastructure::embedder::Embedder;
use infrastructure::providers::{IndexBackend, ModelBackend};
use serde_json::json;
use shared::types::Result;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(about = "Answer questions about documents with retrieval-augmented generation")]
pub struct Cli {
    /// Document URL or local path (repeatable)
    #[arg(short, long = "document")]
    pub documents: Vec<String>,

    /// Question to answer (repeatable)
    #[arg(short, long = "question")]
    pub questions: Vec<String>,

    /// JSON request body `{"documents": ..., "questions": [...]}`; `-` reads stdin
    #[arg(long, conflicts_with_all = ["documents", "questions"])]
    pub request: Option<PathBuf>,

    /// Render answers for a terminal instead of printing JSON
    #[arg(long)]
    pub pretty: bool,
}

impl Cli {
    pub fn into_request(self) -> std::result::Result<RunRequest, RunError> {
        match self.request {
            Some(path) => {
                let body = read_request_body(&path)
                    .map_err(|e| RunError::Validation(format!("{e:#}")))?;
                RunRequest::from_json(&body)
            }
            None => RunRequest::new(self.documents, self.questions),
        }
    }
}

fn read_request_body(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("failed to read request from stdin")?;
        return Ok(body);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request file {}", path.display()))
}

#[derive(Default)]
pub struct CliApp;

impl CliApp {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, cli: Cli) -> Result<()> {
        let pretty = cli.pretty;
        let outcome = match cli.into_request() {
            Ok(request) => self.execute(&request).await?,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(response) => {
                if pretty {
                    print!("{}", render_pretty(&response));
                } else {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                Ok(())
            }
            Err(err) => {
                println!("{}", failure_json(&err));
                Err(err.into())
            }
        }
    }

    /// Builds the pipeline from the environment. Configuration problems are returned as the
    /// outer error; pipeline failures come back as the inner `RunError`.
    async fn execute(
        &self,
        request: &RunRequest,
    ) -> Result<std::result::Result<RunResponse, RunError>> {
        let config = Config::load()?;
        tracing::info!(
            provider = ?config.llm_provider,
            backend = ?config.vector_backend,
            documents = request.documents().len(),
            questions = request.questions().len(),
            "starting run"
        );

        let model = ModelBackend::from_config(&config)?;
        let index = IndexBackend::from_config(&config)?;
        let service = RagService::new(
            DocumentLoader::new(HttpFetcher::new(config.http_timeout)?),
            Embedder::new(model.clone(), config.target_dimension),
            index,
            AnswerService::new(model),
            PipelineSettings {
                top_k: config.top_k,
                max_chunks: config.max_chunks,
            },
        );
        Ok(service.run(request).await)
    }
}

pub fn failure_json(err: &RunError) -> String {
    json!({ "step": err.step(), "error": err.to_string() }).to_string()
}

pub fn render_pretty(response: &RunResponse) -> String {
    let mut out = String::new();
    for (i, slot) in response.answers.iter().enumerate() {
        match slot {
            AnswerSlot::Answered(answer) => {
                out.push_str(&format!("{} {}\n", format!("[{}]", i + 1).bold(), answer.answer));
                for citation in &answer.citations {
                    let source = format!("{} #{}", citation.doc_name, citation.chunk_id);
                    out.push_str(&format!("    {}\n", source.cyan()));
                }
            }
            AnswerSlot::Failed { question, error } => {
                out.push_str(&format!(
                    "{} {}\n    {}\n",
                    format!("[{}]", i + 1).bold(),
                    question,
                    error.red()
                ));
            }
        }
    }
    let d = &response.diagnostics;
    let mut summary = format!(
        "chunks: {} total, {} embedded with {}",
        d.total_chunks, d.embedded_chunks, d.embedding_model
    );
    if d.fallback_used {
        summary.push_str(", keyword fallback");
    }
    out.push_str(&format!("{}\n", summary.dimmed()));
    out
}
