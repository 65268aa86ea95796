//! # Syllabus
//!
//! A retrieval-augmented study assistant backend.
//!
//! Syllabus ingests a directory of PDF study materials into a SQLite vector
//! index, then answers chat requests by retrieving the most similar chunks,
//! assembling a tutor prompt around them and forwarding the prompt (plus an
//! optional image) to a hosted chat model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  PDFs    │──▶│ Extract +   │──▶│ Embed in     │──▶│  SQLite  │
//! │ (docs/)  │   │ Chunk       │   │ batches      │   │  index   │
//! └──────────┘   └─────────────┘   └──────────────┘   └────┬─────┘
//!                                                          │
//!        question (+ image) ──▶ route ──▶ retrieve ◀───────┘
//!                                  │          │
//!                                  ▼          ▼
//!                               prompt ──▶ chat model ──▶ answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! syllabus init                          # create the index database
//! syllabus ingest                        # rebuild the index from PDFs
//! syllabus retrieve "osmosis"            # inspect retrieved context
//! syllabus chat "What is osmosis?"       # one-off answer
//! syllabus serve                         # start the HTTP chat server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and env overrides |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF page-text extraction |
//! | [`ingest`] | Document discovery and index rebuild |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`index`] | Vector index (SQLite and in-memory) |
//! | [`batch`] | Batched embedding with rate-limit backoff |
//! | [`retrieve`] | Top-K retrieval and context formatting |
//! | [`router`] | RAG / general / vision routing |
//! | [`prompt`] | System prompt assembly |
//! | [`image`] | Image normalization for vision requests |
//! | [`chat`] | Chat-completion client |
//! | [`assistant`] | End-to-end answer pipeline |
//! | [`server`] | HTTP chat server |

pub mod assistant;
pub mod batch;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod image;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod router;
pub mod server;
