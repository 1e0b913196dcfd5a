//! Error taxonomy of the answering pipeline.

use crate::models::DocumentFormat;
use thiserror::Error;

/// Failure of one call to an external service (embedding model, chat model).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} request timed out: {message}")]
    Timeout {
        service: &'static str,
        message: String,
    },

    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Rate limiting (429), server errors (5xx) and timeouts are worth retrying.
    pub fn is_retryable(&self) -> bool {
        if let Some(status) = self.status() {
            if status == 429 || status >= 500 {
                return true;
            }
        }
        if matches!(self, Self::Timeout { .. }) {
            return true;
        }
        let message = self.to_string().to_lowercase();
        message.contains("timeout") || message.contains("429")
    }
}

/// Failure while turning document references into chunks. Any of these aborts the request.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file type: {extension} (from: {name}, reference: {reference})")]
    UnsupportedFormat {
        reference: String,
        name: String,
        extension: String,
    },

    #[error("invalid document reference {reference}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("failed to fetch {reference}: {source:#}")]
    Fetch {
        reference: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to parse {name} as {format}: {source:#}")]
    Parse {
        name: String,
        format: DocumentFormat,
        #[source]
        source: anyhow::Error,
    },
}

/// Failure while preparing vectors; the request continues with keyword retrieval.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding failed: {0}")]
    Model(#[from] ServiceError),

    #[error("similarity index write failed: {0:#}")]
    Index(#[source] anyhow::Error),
}

/// Request-level failure. Everything else is recovered inside the response.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl RunError {
    /// Name of the pipeline step that failed.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validate",
            Self::Load(_) => "load_documents",
        }
    }
}
