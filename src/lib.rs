//! Gemini RAG: stage local documents, index them into a Gemini File Search
//! store, and ask questions answered from those documents with citations.
//!
//! Both front ends drive the same pipeline:
//! [`staging`] → [`upload`] → [`documents`] → [`query`] → [`citations`].

pub mod citations;
pub mod cli;
pub mod client;
pub mod config;
pub mod documents;
pub mod error;
pub mod query;
pub mod staging;
pub mod stream;
pub mod types;
pub mod ui;
pub mod upload;

pub use client::{default_client, resolve_client, FileSearchService, GeminiClient};
pub use config::Settings;
pub use error::{RagError, Result};
