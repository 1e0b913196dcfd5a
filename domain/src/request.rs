use crate::error::RunError;
use crate::models::{AnswerSlot, Diagnostics};
use serde::Serialize;
use serde_json::Value;

pub const DOCUMENTS_REQUIRED: &str = "Missing required field: documents (string or string[])";
pub const QUESTIONS_REQUIRED: &str = "Missing required field: questions (string[])";

/// A validated request: at least one document reference and at least one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    documents: Vec<String>,
    questions: Vec<String>,
}

impl RunRequest {
    pub fn new(documents: Vec<String>, questions: Vec<String>) -> Result<Self, RunError> {
        if documents.is_empty() {
            return Err(RunError::Validation(DOCUMENTS_REQUIRED.to_string()));
        }
        if questions.is_empty() {
            return Err(RunError::Validation(QUESTIONS_REQUIRED.to_string()));
        }
        Ok(Self {
            documents,
            questions,
        })
    }

    /// Parses a JSON body `{documents: string | string[], questions: string[]}`.
    /// A single document string is normalized to a one-element list.
    pub fn from_json(body: &str) -> Result<Self, RunError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| RunError::Validation(format!("Invalid JSON body: {e}")))?;

        let documents = match value.get("documents") {
            Some(Value::String(doc)) if !doc.is_empty() => vec![doc.clone()],
            Some(Value::Array(items)) if !items.is_empty() => string_items(items).ok_or_else(|| {
                RunError::Validation("documents must be a string or array of strings".to_string())
            })?,
            _ => return Err(RunError::Validation(DOCUMENTS_REQUIRED.to_string())),
        };

        let questions = match value.get("questions") {
            Some(Value::Array(items)) if !items.is_empty() => string_items(items).ok_or_else(|| {
                RunError::Validation("questions must be an array of strings".to_string())
            })?,
            _ => return Err(RunError::Validation(QUESTIONS_REQUIRED.to_string())),
        };

        Self::new(documents, questions)
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }
}

fn string_items(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResponse {
    pub answers: Vec<AnswerSlot>,
    pub diagnostics: Diagnostics,
}
