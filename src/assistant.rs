//! The answer pipeline.
//!
//! An [`Assistant`] owns the embedding provider, the vector index and the
//! chat model. It is built once at startup and shared (`Arc`) by every
//! request. [`Assistant::ask`] never fails: provider errors become the fixed
//! [`APOLOGY`] answer with mode `error`.
//!
//! ```text
//! question ─▶ route ─┬─ rag ──▶ retrieve ─▶ rag prompt ─┐
//!                    └─ general ──────────▶ general prompt ─┤
//! image ─▶ preprocess ─────────────────────────────────────┴─▶ chat model
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::chat::{ChatClient, ChatModel, ChatPrompt};
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::image::preprocess;
use crate::index::{SqliteIndex, VectorIndex};
use crate::models::{ChatRequest, ChatResponse, Mode};
use crate::prompt::{general_prompt, rag_prompt};
use crate::retrieve::{retrieve, Retrieval};
use crate::router::{route, Engine};

/// Answer returned when the chat provider fails.
pub const APOLOGY: &str = "The AI engine is currently busy. Please try again in a moment.";

/// Prefix for answers produced by the text model after the vision model failed.
pub const IMAGE_SKIPPED_NOTICE: &str =
    "_The attached image could not be analysed right now, so this answer is based on your question alone._\n\n";

pub struct Assistant {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    chat: Arc<dyn ChatModel>,
}

impl Assistant {
    /// Assemble an assistant from its parts.
    ///
    /// Fails if the index was built with a different embedding model than
    /// `embedder`, since query vectors would not be comparable.
    pub async fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        match index.meta().await? {
            Some(meta) if embedder.model_name() != "disabled" && meta.model != embedder.model_name() => {
                bail!(
                    "Index was built with embedding model '{}' but the configured model is '{}'; re-run `syllabus ingest`",
                    meta.model,
                    embedder.model_name()
                );
            }
            Some(meta) => info!(
                "index ready: {} entries, model {}, built {}",
                index.count().await?,
                meta.model,
                meta.built_at
            ),
            None => warn!("index has not been built yet; answers will use general knowledge"),
        }

        Ok(Self {
            config,
            embedder,
            index,
            chat,
        })
    }

    /// Build the production assistant: SQLite index, configured embedding
    /// provider and the OpenAI-compatible chat client.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteIndex::open(&config.index.path).await?);
        let chat: Arc<dyn ChatModel> = Arc::new(ChatClient::from_env(&config.chat)?);
        Self::new(config.clone(), embedder, index, chat).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Retrieve the context block and sources for `query`.
    pub async fn retrieve(&self, query: &str) -> Retrieval {
        retrieve(
            query,
            self.embedder.as_ref(),
            self.index.as_ref(),
            self.config.retrieval.top_k,
        )
        .await
    }

    /// Answer one chat request.
    ///
    /// When retrieval was requested but returned nothing (empty index or a
    /// failed lookup), the request is answered with the general prompt in
    /// [`Mode::General`], so the fallback disclosure sentence of the tutor
    /// prompt never appears for an empty index.
    pub async fn ask(&self, request: ChatRequest) -> ChatResponse {
        let routed = route(&request.question, &request.use_rag, request.image.is_some());

        let retrieval = if routed.use_rag {
            self.retrieve(&request.question).await
        } else {
            Retrieval::default()
        };

        // Nothing retrieved means nothing to cite: answer in general mode.
        let (mode, system, sources) = if retrieval.is_empty() {
            (Mode::General, general_prompt(&request.history), Vec::new())
        } else {
            (
                Mode::Rag,
                rag_prompt(
                    &self.config.prompt.curriculum,
                    &request.history,
                    &retrieval.context,
                ),
                retrieval.sources,
            )
        };

        let image = request
            .image
            .as_deref()
            .and_then(|bytes| preprocess(bytes, &self.config.image));
        let engine = match (routed.engine, &image) {
            (Engine::Vision, Some(_)) => Engine::Vision,
            _ => Engine::Text,
        };

        let prompt = ChatPrompt {
            system,
            user: request.question,
            image,
        };

        info!(
            "answering: mode={} engine={:?} sources={:?}",
            mode, engine, sources
        );

        match self.complete(engine, prompt).await {
            Some(answer) => ChatResponse {
                answer,
                sources,
                mode,
            },
            None => ChatResponse {
                answer: APOLOGY.to_string(),
                sources: Vec::new(),
                mode: Mode::Error,
            },
        }
    }

    /// Call the chat model; on a vision failure retry once text-only.
    async fn complete(&self, engine: Engine, prompt: ChatPrompt) -> Option<String> {
        match self.chat.complete(engine, &prompt).await {
            Ok(answer) => Some(answer),
            Err(e) if engine == Engine::Vision => {
                warn!(
                    "vision model {} failed ({}), retrying without the image",
                    self.chat.model_for(Engine::Vision),
                    e
                );
                let text_only = ChatPrompt {
                    image: None,
                    ..prompt
                };
                match self.chat.complete(Engine::Text, &text_only).await {
                    Ok(answer) => Some(format!("{}{}", IMAGE_SKIPPED_NOTICE, answer)),
                    Err(e) => {
                        warn!("text fallback failed: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                warn!(
                    "chat model {} failed: {}",
                    self.chat.model_for(engine),
                    e
                );
                None
            }
        }
    }
}
