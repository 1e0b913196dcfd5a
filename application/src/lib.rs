pub mod answer_service;
pub mod rag_service;
pub mod retriever;
