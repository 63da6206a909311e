//! # book-chat
//!
//! A Rust web application for chatting with the book you are reading:
//! upload a PDF, EPUB or MOBI file, let a local Ollama instance embed it,
//! and ask questions that are answered only from retrieved passages so
//! nothing past your current page gets spoiled.
//!
//! ## Architecture
//!
//! Ingest is a linear pipeline ending in an atomic index swap:
//!
//! ```text
//!   ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//!   │  Upload file  │──▶│ Parse to pages │──▶│ Chunk (1000/ │
//!   │ pdf/epub/mobi │   │  per format    │   │  200 overlap)│
//!   └──────────────┘   └───────────────┘   └──────┬───────┘
//!                                                 │
//!                                                 ▼
//!   ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//!   │ Whole-book    │◀──│ Build snapshot │◀──│ Embed chunks │
//!   │ index swap    │   │ (chunk+vector) │   │ (Ollama)     │
//!   └──────────────┘   └───────────────┘   └──────────────┘
//! ```
//!
//! Questions run the read path against the current snapshot:
//!
//! ```text
//!   ┌──────────┐   ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//!   │ Question  │──▶│ Embed query  │──▶│ Top-5 cosine  │──▶│ Prompt +  │
//!   │ + history │   │ (Ollama)     │   │ retrieval     │   │ generate  │
//!   └──────────┘   └─────────────┘   └──────────────┘   └───────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, data dir, and LLM settings
//! - [`models`] - Shared data types: `Book`, `Page`, `Chunk`, request/response types
//! - [`error`] - The pipeline error taxonomy (`RagError`)
//! - [`parser`] - Format-specific extraction of page text from PDF, EPUB, and MOBI
//! - [`chunker`] - Deterministic overlapping character windows over the book text
//! - [`index`] - In-memory cosine vector index with snapshot swap and disk persistence
//! - [`llm`] - `Embedder`/`Generator` traits and their Ollama implementations
//! - [`engine`] - The RAG orchestrator tying parse, chunk, embed, retrieve, and generate together
//! - [`api`] - Axum HTTP handlers for book upload, Q&A, streaming chat, and config
//! - [`state`] - Shared application state

pub mod api;
pub mod chunker;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod llm;
pub mod models;
pub mod parser;
pub mod state;
