//! Core data models used throughout Syllabus.
//!
//! These types represent the pages, chunks, index entries, and chat
//! request/response values that flow through the ingestion and answer
//! pipelines.

use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// Text of one physical PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    /// Bare filename of the originating document (e.g. `"unit3.pdf"`).
    /// This is the canonical identity used for citations.
    pub source: String,
    /// Path relative to the document root. Only used for chunk IDs and logs.
    pub path: String,
    /// 1-based page number.
    pub page: u32,
    pub text: String,
}

/// A bounded, contiguous slice of a page's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub page: u32,
    /// Index of this chunk within its page, starting at 0.
    pub chunk_index: u32,
    /// Byte offset of `text` within the page text.
    pub start: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A chunk paired with its embedding vector, ready for insertion.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// An entry returned from a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub chunk_id: String,
    pub source: String,
    pub page: u32,
    pub text: String,
    pub score: f32,
}

/// Strategy used to produce an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Rag,
    General,
    Error,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Rag => "rag",
            Mode::General => "general",
            Mode::Error => "error",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat request. Lives for one request only.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub question: String,
    /// Free-text conversation history supplied by the caller.
    pub history: String,
    pub image: Option<Vec<u8>>,
    /// Raw RAG flag as sent by the caller; see [`crate::router::parse_rag_flag`].
    pub use_rag: String,
}

/// The answer returned to the caller.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub mode: Mode,
}

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Committed {
        range: Range<usize>,
        attempts: u32,
    },
    Abandoned {
        range: Range<usize>,
        attempts: u32,
        reason: String,
    },
}

impl BatchOutcome {
    pub fn range(&self) -> &Range<usize> {
        match self {
            BatchOutcome::Committed { range, .. } | BatchOutcome::Abandoned { range, .. } => range,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, BatchOutcome::Committed { .. })
    }
}

/// Partial-success summary of an index rebuild.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub pages: usize,
    pub chunks: usize,
    pub batches: Vec<BatchOutcome>,
}

impl IngestReport {
    pub fn committed_ranges(&self) -> Vec<Range<usize>> {
        self.batches
            .iter()
            .filter(|b| b.is_committed())
            .map(|b| b.range().clone())
            .collect()
    }

    /// Failed ranges paired with the reason the batch was abandoned.
    pub fn failed_ranges(&self) -> Vec<(Range<usize>, String)> {
        self.batches
            .iter()
            .filter_map(|b| match b {
                BatchOutcome::Abandoned { range, reason, .. } => {
                    Some((range.clone(), reason.clone()))
                }
                BatchOutcome::Committed { .. } => None,
            })
            .collect()
    }

    pub fn chunks_indexed(&self) -> usize {
        self.committed_ranges().iter().map(|r| r.len()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.batches.iter().all(BatchOutcome::is_committed)
    }
}
