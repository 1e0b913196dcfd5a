//! Fetches document references, extracts their text and chunks it.

use anyhow::{anyhow, bail, Context};
use docx_rs::{read_docx, DocumentChild, Table, TableCellContent, TableChild, TableRowChild};
use domain::chunker::chunk_text;
use domain::error::LoadError;
use domain::models::{extension_of, Chunk, DocumentFormat};
use domain::ports::DocumentFetcher;
use mail_parser::MessageParser;
use memmap2::Mmap;
use reqwest::{Client, Url};
use shared::types::Result;
use shared::utils::last_path_segment;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

const ACCEPT: &str = "application/pdf, application/vnd.openxmlformats-officedocument.wordprocessingml.document, message/rfc822, */*";
const DEFAULT_DOC_NAME: &str = "document";

/// Fetches `http(s)://` references over the network and `file://` URLs or bare
/// paths from the local filesystem.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build document HTTP client")?;
        Ok(Self { client })
    }

    async fn fetch_remote(&self, url: Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        match Url::parse(reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => self.fetch_remote(url).await,
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| anyhow!("not a local file URL: {reference}"))?;
                read_local(&path)
            }
            Ok(url) => bail!("unsupported URL scheme `{}`", url.scheme()),
            Err(_) => read_local(Path::new(reference)),
        }
    }
}

fn read_local(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap.to_vec())
}

/// Name of a document: the last segment of the reference's path, ignoring any query string.
pub fn document_name(reference: &str) -> String {
    let name = match Url::parse(reference) {
        Ok(url) => last_path_segment(url.path()).map(str::to_string),
        Err(_) => Path::new(reference)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
    };
    name.unwrap_or_else(|| DEFAULT_DOC_NAME.to_string())
}

pub struct DocumentLoader<F> {
    fetcher: F,
}

impl<F: DocumentFetcher> DocumentLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Loads every reference in order and concatenates their chunks.
    /// Stops at the first document that fails.
    pub async fn load(&self, references: &[String]) -> std::result::Result<Vec<Chunk>, LoadError> {
        let mut all_chunks = Vec::new();
        for reference in references {
            let chunks = self.load_one(reference).await?;
            all_chunks.extend(chunks);
        }
        Ok(all_chunks)
    }

    async fn load_one(&self, reference: &str) -> std::result::Result<Vec<Chunk>, LoadError> {
        let name = document_name(reference);
        let extension = extension_of(&name);
        let format = DocumentFormat::from_extension(&extension).ok_or_else(|| {
            LoadError::UnsupportedFormat {
                reference: reference.to_string(),
                name: name.clone(),
                extension: extension.clone(),
            }
        })?;

        let bytes = self
            .fetcher
            .fetch(reference)
            .await
            .map_err(|source| LoadError::Fetch {
                reference: reference.to_string(),
                source,
            })?;
        let text = extract_text(format, &bytes).map_err(|source| LoadError::Parse {
            name: name.clone(),
            format,
            source,
        })?;

        let chunks = chunk_text(&text, &name);
        tracing::info!(
            document = %name,
            format = %format,
            bytes = bytes.len(),
            chunks = chunks.len(),
            "document loaded"
        );
        Ok(chunks)
    }
}

/// Best-effort plain text body of a document.
pub fn extract_text(format: DocumentFormat, bytes: &[u8]) -> Result<String> {
    match format {
        DocumentFormat::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| anyhow!("{e}"))
        }
        DocumentFormat::Docx => extract_docx(bytes),
        DocumentFormat::Email => extract_email(bytes),
        DocumentFormat::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let docx = read_docx(bytes).map_err(|e| anyhow!("{e}"))?;
    let mut text = String::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => {
                text.push_str(&p.raw_text());
                text.push('\n');
            }
            DocumentChild::Table(table) => push_table_text(table, &mut text),
            _ => {}
        }
    }
    Ok(text)
}

fn push_table_text(table: &Table, text: &mut String) {
    for row in &table.rows {
        #[allow(unreachable_patterns)]
        let cells = match row {
            TableChild::TableRow(row) => &row.cells,
            _ => continue,
        };
        for cell in cells {
            #[allow(unreachable_patterns)]
            let contents = match cell {
                TableRowChild::TableCell(cell) => &cell.children,
                _ => continue,
            };
            for content in contents {
                match content {
                    TableCellContent::Paragraph(p) => {
                        text.push_str(&p.raw_text());
                        text.push('\t');
                    }
                    TableCellContent::Table(nested) => push_table_text(nested, text),
                    _ => {}
                }
            }
        }
        text.push('\n');
    }
}

fn extract_email(bytes: &[u8]) -> Result<String> {
    let message = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| anyhow!("not a valid RFC 822 message"))?;
    Ok(message
        .body_text(0)
        .map(|body| body.into_owned())
        .unwrap_or_default())
}
