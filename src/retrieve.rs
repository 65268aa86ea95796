//! Retriever: top-K chunks for a query, formatted as a context block.
//!
//! Each hit becomes
//!
//! ```text
//! --- FROM DOCUMENT: <source> ---
//! <chunk text>
//! ```
//!
//! and blocks are joined by a blank line, best match first. Retrieval never
//! fails the request: an embedding or index error is logged and yields an
//! empty [`Retrieval`].

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::index::VectorIndex;
use crate::models::ScoredEntry;

/// Context block and citation list for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    pub context: String,
    /// Distinct source filenames, sorted.
    pub sources: Vec<String>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

pub fn format_block(source: &str, text: &str) -> String {
    format!("--- FROM DOCUMENT: {} ---\n{}", source, text)
}

/// Build a [`Retrieval`] from ranked hits.
pub fn assemble(hits: &[ScoredEntry]) -> Retrieval {
    let context = hits
        .iter()
        .map(|h| format_block(&h.source, &h.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    let sources: BTreeSet<String> = hits.iter().map(|h| h.source.clone()).collect();
    Retrieval {
        context,
        sources: sources.into_iter().collect(),
    }
}

/// Embed `query` and fetch the `top_k` closest chunks.
pub async fn retrieve(
    query: &str,
    provider: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    top_k: usize,
) -> Retrieval {
    let vector = match embed_query(provider, query).await {
        Ok(v) => v,
        Err(e) => {
            warn!("retrieval skipped, query embedding failed: {}", e);
            return Retrieval::default();
        }
    };

    match index.query(&vector, top_k).await {
        Ok(hits) => {
            debug!(
                "retrieved {} chunk(s): {:?}",
                hits.len(),
                hits.iter().map(|h| (&h.source, h.score)).collect::<Vec<_>>()
            );
            assemble(&hits)
        }
        Err(e) => {
            warn!("retrieval skipped, index query failed: {:#}", e);
            Retrieval::default()
        }
    }
}
