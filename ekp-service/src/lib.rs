//! Enterprise knowledge platform backend: document ingestion and question
//! answering over the ingested documents.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod llm;
pub mod ollama;
pub mod service;
pub mod storage;
