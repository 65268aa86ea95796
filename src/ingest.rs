//! Ingestion pipeline orchestration.
//!
//! Discovers PDF files under the document root, extracts one
//! [`DocumentPage`] per physical page, chunks the pages and hands the chunks
//! to the batch controller. Every run is a destructive rebuild: the index is
//! cleared and recreated. If no page yields any text, ingestion aborts before
//! the index is touched.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::batch::{index_in_batches, BatchPolicy};
use crate::chunk::chunk_pages;
use crate::config::{Config, DocumentsConfig};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::extract::extract_pdf_pages;
use crate::index::{SqliteIndex, VectorIndex};
use crate::models::{DocumentPage, IngestReport};

/// A file selected for ingestion.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Path relative to the document root, with `/` separators.
    pub relative: String,
    /// Bare filename, used as the citation source.
    pub filename: String,
    pub size: u64,
}

/// Pages loaded from the document root plus file counters.
#[derive(Debug, Default)]
pub struct LoadedPages {
    pub pages: Vec<DocumentPage>,
    pub files_scanned: usize,
    pub files_skipped: usize,
}

/// Walk the document root and return matching files sorted by relative path,
/// along with the number of files skipped for size.
pub fn discover_documents(docs: &DocumentsConfig) -> Result<(Vec<DiscoveredFile>, usize)> {
    let root = &docs.root;
    if !root.is_dir() {
        bail!("Document directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&docs.include_globs)?;
    let exclude_set = build_globset(&docs.exclude_globs)?;

    let mut files = Vec::new();
    let mut skipped = 0usize;

    for entry in WalkDir::new(root).follow_links(docs.follow_symlinks) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warn!("skipping {}: {}", rel_str, e);
                skipped += 1;
                continue;
            }
        };
        if size > docs.max_file_bytes {
            warn!(
                "skipping {}: {} bytes exceeds max_file_bytes ({})",
                rel_str, size, docs.max_file_bytes
            );
            skipped += 1;
            continue;
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| rel_str.clone());

        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            relative: rel_str,
            filename,
            size,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok((files, skipped))
}

/// Extension matching is case-insensitive, so `**/*.pdf` also picks up `NOTES.PDF`.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .build()
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Extract pages from every discovered file. Files that fail to read or
/// parse are skipped with a warning. Pages without text are dropped.
pub async fn load_pages(docs: &DocumentsConfig) -> Result<LoadedPages> {
    let (files, size_skipped) = discover_documents(docs)?;
    let mut loaded = LoadedPages {
        files_scanned: files.len(),
        files_skipped: size_skipped,
        ..Default::default()
    };

    for file in files {
        match extract_file(&file.path).await {
            Ok(texts) => {
                let before = loaded.pages.len();
                for (i, text) in texts.into_iter().enumerate() {
                    if text.trim().is_empty() {
                        continue;
                    }
                    loaded.pages.push(DocumentPage {
                        source: file.filename.clone(),
                        path: file.relative.clone(),
                        page: i as u32 + 1,
                        text,
                    });
                }
                info!(
                    "extracted {} page(s) with text from {}",
                    loaded.pages.len() - before,
                    file.relative
                );
            }
            Err(e) => {
                warn!("skipping {}: {:#}", file.relative, e);
                loaded.files_skipped += 1;
            }
        }
    }

    Ok(loaded)
}

async fn extract_file(path: &Path) -> Result<Vec<String>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let pages = tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes)).await??;
    Ok(pages)
}

/// Clear `index` and rebuild it from `pages`.
///
/// Aborts without touching the index when `pages` contains no text.
pub async fn rebuild(
    pages: &[DocumentPage],
    config: &Config,
    provider: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
) -> Result<IngestReport> {
    if pages.is_empty() {
        bail!("No document pages found; index left untouched");
    }

    let chunks = chunk_pages(
        pages,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    );
    if chunks.is_empty() {
        bail!("Documents contain no extractable text; index left untouched");
    }

    index.reset(provider.model_name()).await?;
    info!(
        "rebuilding index: {} pages, {} chunks, model {}",
        pages.len(),
        chunks.len(),
        provider.model_name()
    );

    let policy = BatchPolicy::from_config(&config.embedding);
    let batches = index_in_batches(&chunks, provider, index, &policy).await;

    Ok(IngestReport {
        pages: pages.len(),
        chunks: chunks.len(),
        batches,
        ..Default::default()
    })
}

/// Run `syllabus ingest`: load the document directory and rebuild the
/// configured SQLite index.
pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<IngestReport> {
    let loaded = load_pages(&config.documents).await?;
    if loaded.pages.is_empty() {
        bail!(
            "No document pages found under {} ({} file(s) scanned, {} skipped); index left untouched",
            config.documents.root.display(),
            loaded.files_scanned,
            loaded.files_skipped
        );
    }

    if dry_run {
        let chunks = chunk_pages(
            &loaded.pages,
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        );
        let batch_size = config.embedding.batch_size.max(1);
        println!("ingest (dry-run)");
        println!("  files scanned: {}", loaded.files_scanned);
        println!("  files skipped: {}", loaded.files_skipped);
        println!("  pages: {}", loaded.pages.len());
        println!("  chunks: {}", chunks.len());
        println!("  batches: {}", chunks.len().div_ceil(batch_size));
        return Ok(IngestReport {
            files_scanned: loaded.files_scanned,
            files_skipped: loaded.files_skipped,
            pages: loaded.pages.len(),
            chunks: chunks.len(),
            batches: Vec::new(),
        });
    }

    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled; set [embedding].provider to build the index");
    }
    let provider = create_provider(&config.embedding)?;
    let index = SqliteIndex::open(&config.index.path).await?;

    let mut report = rebuild(&loaded.pages, config, provider.as_ref(), &index).await?;
    report.files_scanned = loaded.files_scanned;
    report.files_skipped = loaded.files_skipped;
    index.pool().close().await;

    println!("ingest");
    println!("  files scanned: {}", report.files_scanned);
    println!("  files skipped: {}", report.files_skipped);
    println!("  pages: {}", report.pages);
    println!("  chunks: {}", report.chunks);
    println!("  chunks indexed: {}", report.chunks_indexed());
    for (range, reason) in report.failed_ranges() {
        println!("  failed chunks {}..{}: {}", range.start, range.end, reason);
    }
    if report.is_complete() {
        println!("ok");
    } else {
        println!("partial");
    }

    Ok(report)
}
