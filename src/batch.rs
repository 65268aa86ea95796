//! Batch ingestion controller.
//!
//! Splits the chunk sequence into fixed-size batches and, for each batch in
//! order, embeds it with [`EmbedIntent::Document`] and appends it to the
//! index in one transaction.
//!
//! Only rate-limit failures are retried. After attempt `n` fails, the
//! controller sleeps `backoff × n` before trying again, for at most
//! `max_attempts` attempts in total. Any other failure abandons the batch
//! and the controller moves on to the next one. Committed batches are never
//! rolled back.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbedIntent, EmbeddingProvider};
use crate::index::VectorIndex;
use crate::models::{BatchOutcome, Chunk, IndexEntry};

#[derive(Debug, Clone)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl BatchPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_secs(config.backoff_secs),
        }
    }

    /// Delay after the `attempt`-th (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// Embed and index `chunks` batch by batch, returning one outcome per batch.
pub async fn index_in_batches(
    chunks: &[Chunk],
    provider: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    policy: &BatchPolicy,
) -> Vec<BatchOutcome> {
    let total = chunks.len();
    let mut outcomes = Vec::new();

    for (n, batch) in chunks.chunks(policy.batch_size).enumerate() {
        let start = n * policy.batch_size;
        let range = start..start + batch.len();
        let outcome = run_batch(batch, range, provider, index, policy).await;

        match &outcome {
            BatchOutcome::Committed { range, attempts } => info!(
                "indexed chunks {}..{} of {} ({} attempt{})",
                range.start,
                range.end,
                total,
                attempts,
                if *attempts == 1 { "" } else { "s" }
            ),
            BatchOutcome::Abandoned {
                range,
                attempts,
                reason,
            } => warn!(
                "abandoned chunks {}..{} after {} attempt(s): {}",
                range.start, range.end, attempts, reason
            ),
        }
        outcomes.push(outcome);
    }

    outcomes
}

async fn run_batch(
    batch: &[Chunk],
    range: std::ops::Range<usize>,
    provider: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    policy: &BatchPolicy,
) -> BatchOutcome {
    let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!("embedding chunks {}..{} (attempt {})", range.start, range.end, attempt);

        let vectors = match provider.embed(&texts, EmbedIntent::Document).await {
            Ok(v) => v,
            Err(e) if e.is_rate_limit() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "rate limited on chunks {}..{}, retrying in {}s",
                    range.start,
                    range.end,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(e) => {
                return BatchOutcome::Abandoned {
                    range,
                    attempts: attempt,
                    reason: e.to_string(),
                }
            }
        };

        if vectors.len() != batch.len() {
            return BatchOutcome::Abandoned {
                range,
                attempts: attempt,
                reason: format!(
                    "provider returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                ),
            };
        }

        let entries: Vec<IndexEntry> = batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        return match index.add(&entries).await {
            Ok(()) => BatchOutcome::Committed {
                range,
                attempts: attempt,
            },
            Err(e) => BatchOutcome::Abandoned {
                range,
                attempts: attempt,
                reason: format!("index write failed: {:#}", e),
            },
        };
    }
}
