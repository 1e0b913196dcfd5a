//! Pinecone data-plane client: upsert and top-k query over a provisioned index.

use anyhow::{bail, Context};
use domain::models::{Chunk, IndexRecord, RetrievedChunk};
use domain::ports::VectorIndex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::types::Result;
use std::time::Duration;
use tokio::sync::OnceCell;

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
/// Records per upsert request; keeps each request under the payload limit.
const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexRecord],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    metadata: Option<MatchMetadata>,
}

#[derive(Deserialize)]
struct MatchMetadata {
    doc_name: String,
    // Pinecone stores every metadata number as a float.
    chunk_id: f64,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

pub struct PineconeIndex {
    client: Client,
    api_key: String,
    index_name: String,
    host: OnceCell<String>,
}

impl PineconeIndex {
    /// `host` is the index's data-plane host; when absent it is looked up by name on first use.
    pub fn new(
        api_key: String,
        index_name: String,
        host: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");
        anyhow::ensure!(!index_name.trim().is_empty(), "missing Pinecone index name");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Pinecone HTTP client")?;
        let host = match host {
            Some(host) => OnceCell::from(normalize_host(&host)),
            None => OnceCell::new(),
        };
        Ok(Self {
            client,
            api_key,
            index_name,
            host,
        })
    }

    async fn host(&self) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| self.describe_index())
            .await?;
        Ok(host.as_str())
    }

    async fn describe_index(&self) -> Result<String> {
        let url = format!("{}/indexes/{}", CONTROL_PLANE_URL, self.index_name);
        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .with_context(|| format!("failed to describe Pinecone index {}", self.index_name))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Pinecone describe index failed ({}): {}", status, body);
        }
        let described: DescribeIndexResponse = response
            .json()
            .await
            .context("failed to parse Pinecone index description")?;
        tracing::debug!(index = %self.index_name, host = %described.host, "resolved Pinecone host");
        Ok(normalize_host(&described.host))
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.host().await?, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Pinecone request to {path} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Pinecone {} failed ({}): {}", path, status, body);
        }
        Ok(response)
    }
}

impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            self.post("/vectors/upsert", &UpsertRequest { vectors: batch })
                .await?;
            tracing::debug!(records = batch.len(), index = %self.index_name, "upserted batch");
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };
        let response: QueryResponse = self
            .post("/query", &request)
            .await?
            .json()
            .await
            .context("failed to parse Pinecone query response")?;
        Ok(into_retrieved(response))
    }
}

fn into_retrieved(response: QueryResponse) -> Vec<RetrievedChunk> {
    response
        .matches
        .into_iter()
        .filter_map(|m| {
            let Some(metadata) = m.metadata else {
                tracing::warn!(id = %m.id, "Pinecone match without metadata skipped");
                return None;
            };
            Some(RetrievedChunk {
                chunk: Chunk {
                    doc_name: metadata.doc_name,
                    chunk_id: metadata.chunk_id as usize,
                    text: metadata.text,
                },
                score: m.score,
            })
        })
        .collect()
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}
