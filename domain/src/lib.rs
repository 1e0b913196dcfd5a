pub mod chunker;
pub mod error;
pub mod models;
pub mod ports;
pub mod request;
