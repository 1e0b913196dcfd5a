pub mod config;
pub mod document_loader;
pub mod embedder;
pub mod gemini_client;
pub mod ollama_client;
pub mod pinecone_index;
pub mod providers;
pub mod retry;
pub mod search;
pub mod sqlite_index;
