//! Ingestion against real directories of PDF files.

mod common;

use std::fs;
use std::sync::Arc;

use common::{pdf_bytes, test_config, BagOfWords, ScriptedChat};
use syllabus::assistant::Assistant;
use syllabus::config::parse_config;
use syllabus::index::MemoryIndex;
use syllabus::ingest::{load_pages, rebuild, run_ingest};
use syllabus::models::{ChatRequest, Mode};
use tempfile::TempDir;

fn config_for(tmp: &TempDir) -> syllabus::config::Config {
    let text = format!(
        r#"
[index]
path = "{}"

[documents]
root = "{}"
"#,
        tmp.path().join("db/index.sqlite").display(),
        tmp.path().join("docs").display()
    );
    parse_config(&text).unwrap()
}

#[tokio::test]
async fn test_empty_directory_aborts_without_creating_index() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("docs")).unwrap();
    let cfg = config_for(&tmp);

    let err = run_ingest(&cfg, false).await.unwrap_err();
    assert!(err.to_string().contains("No document pages found"));
    assert!(!cfg.index.path.exists());
}

#[tokio::test]
async fn test_corrupt_pdfs_are_skipped_then_abort() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs/unit1");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("broken.pdf"), b"%PDF-1.4 this file was truncated").unwrap();
    fs::write(docs.join("fake.PDF"), b"plain text pretending to be a pdf").unwrap();
    fs::write(docs.join("readme.md"), b"# not a pdf").unwrap();
    let cfg = config_for(&tmp);

    let loaded = load_pages(&cfg.documents).await.unwrap();
    assert_eq!(loaded.files_scanned, 2);
    assert_eq!(loaded.files_skipped, 2);
    assert!(loaded.pages.is_empty());

    assert!(run_ingest(&cfg, true).await.is_err());
    assert!(!cfg.index.path.exists());
}

#[tokio::test]
async fn test_missing_document_directory_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_for(&tmp);
    let err = run_ingest(&cfg, false).await.unwrap_err();
    assert!(err.to_string().contains("Document directory does not exist"));
}

#[tokio::test]
async fn test_one_page_pdf_is_ingested_and_cited() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs/unit3");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("x.pdf"),
        pdf_bytes(&["Osmosis is the movement of water across a membrane."]),
    )
    .unwrap();
    let cfg = config_for(&tmp);

    let loaded = load_pages(&cfg.documents).await.unwrap();
    assert_eq!(loaded.files_scanned, 1);
    assert_eq!(loaded.files_skipped, 0);
    assert_eq!(loaded.pages.len(), 1);
    assert_eq!(loaded.pages[0].source, "x.pdf");
    assert_eq!(loaded.pages[0].page, 1);
    assert!(loaded.pages[0].text.contains("Osmosis"));

    let index = Arc::new(MemoryIndex::new());
    let report = rebuild(&loaded.pages, &cfg, &BagOfWords::new(), index.as_ref())
        .await
        .unwrap();
    assert!(report.is_complete());

    let assistant = Assistant::new(
        test_config(),
        Arc::new(BagOfWords::new()),
        index,
        Arc::new(ScriptedChat::new()),
    )
    .await
    .unwrap();
    let response = assistant
        .ask(ChatRequest {
            question: "What is osmosis?".to_string(),
            history: String::new(),
            image: None,
            use_rag: "true".to_string(),
        })
        .await;

    assert_eq!(response.mode, Mode::Rag);
    assert_eq!(response.sources, vec!["x.pdf"]);
}

#[tokio::test]
async fn test_pages_are_numbered_from_one() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("cells.pdf"),
        pdf_bytes(&["Mitosis produces two identical cells.", "Meiosis produces four gametes."]),
    )
    .unwrap();
    let cfg = config_for(&tmp);

    let loaded = load_pages(&cfg.documents).await.unwrap();
    let numbers: Vec<u32> = loaded.pages.iter().map(|p| p.page).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert!(loaded.pages[0].text.contains("Mitosis"));
    assert!(loaded.pages[1].text.contains("Meiosis"));
    assert!(loaded.pages.iter().all(|p| p.source == "cells.pdf"));
}

#[tokio::test]
async fn test_blank_pages_are_dropped_and_numbering_kept() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("mixed.pdf"),
        pdf_bytes(&["Stacks are last in first out.", "", "Queues are first in first out."]),
    )
    .unwrap();
    let cfg = config_for(&tmp);

    let loaded = load_pages(&cfg.documents).await.unwrap();
    let numbers: Vec<u32> = loaded.pages.iter().map(|p| p.page).collect();
    assert_eq!(numbers, vec![1, 3]);
}
