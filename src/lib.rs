//! Keeps a document collection's vector embeddings consistent with its source
//! text, and answers questions by retrieving the closest documents and
//! handing them to a local language model as context.
//!
//! # Pipelines
//!
//! - **Sync** ([`sync`]): scan for records whose vector is missing or was
//!   produced by another model, embed them in bounded batches with retry, and
//!   write each vector back together with its model tag and timestamp.
//! - **Query** ([`query`]): embed a question, run a nearest-neighbor search,
//!   render the hits into a prompt, and generate an answer.
//!
//! # Architecture
//!
//! - **Storage**: JSON documents in SQLite, vector indexes in
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec)
//! - **Embeddings**: Voyage AI or any OpenAI-compatible `/embeddings` API
//! - **Generation**: Ollama `/api/generate`, complete or streamed
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite connection bootstrap and schema
//! - [`store`]: Document store boundary and its SQLite implementation
//! - [`embedding`]: Text-to-vector providers
//! - [`generation`]: Prompt-to-text providers and streaming
//! - [`retry`]: Bounded retry for remote calls

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod query;
pub mod retry;
pub mod store;
pub mod sync;
