use serde::{Deserialize, Serialize};
use std::fmt;

/// A window of words taken from one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_name: String,
    pub chunk_id: usize,
    pub text: String,
}

impl Chunk {
    /// Key under which the chunk's vector is stored in the similarity index.
    pub fn index_id(&self) -> String {
        format!("{}_{}", self.doc_name, self.chunk_id)
    }

    pub fn citation(&self) -> Citation {
        Citation {
            doc_name: self.doc_name.clone(),
            chunk_id: self.chunk_id,
        }
    }
}

/// A chunk selected for a question, with the relevance score reported by the
/// retrieval path that produced it (higher is more relevant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// One entry written to the similarity index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Chunk,
}

impl IndexRecord {
    pub fn new(chunk: Chunk, values: Vec<f32>) -> Self {
        Self {
            id: chunk.index_id(),
            values,
            metadata: chunk,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub doc_name: String,
    pub chunk_id: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// One slot of the response, in question order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnswerSlot {
    Answered(StructuredAnswer),
    Failed { question: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub total_chunks: usize,
    pub embedded_chunks: usize,
    pub max_chunks: Option<usize>,
    pub embedding_model: String,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Email,
    PlainText,
}

impl DocumentFormat {
    /// Maps a lower-cased file extension to a supported format.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "eml" => Some(Self::Email),
            "txt" | "md" => Some(Self::PlainText),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Email => "email",
            Self::PlainText => "plain text",
        };
        f.write_str(name)
    }
}

/// Extension of a document name: the lower-cased text after its last `.`,
/// or the whole lower-cased name when it has none.
pub fn extension_of(doc_name: &str) -> String {
    let lower = doc_name.to_lowercase();
    match lower.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => lower,
    }
}
