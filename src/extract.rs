//! Per-page text extraction for PDF documents.
//!
//! Extraction never panics into the caller: a parser panic is caught and
//! reported as [`ExtractError::Pdf`], so the ingestor can skip the file and
//! move on.

use std::panic::{self, AssertUnwindSafe};

/// Extraction error. The ingestor logs it and skips the file.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("PDF contains no pages")]
    Empty,
}

/// Extract the text of every page, in page order.
///
/// The returned vector has one entry per physical page; pages without a text
/// layer come back as empty strings.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(ExtractError::Pdf("missing %PDF header".to_string()));
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    let pages = match result {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => return Err(ExtractError::Pdf(e.to_string())),
        Err(_) => return Err(ExtractError::Pdf("parser panicked".to_string())),
    };

    if pages.is_empty() {
        return Err(ExtractError::Empty);
    }

    Ok(pages.into_iter().map(|p| normalize_page_text(&p)).collect())
}

/// Normalize line endings and strip NUL/control noise left by the PDF parser.
pub fn normalize_page_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf_pages(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn truncated_pdf_returns_error() {
        let err = extract_pdf_pages(b"%PDF-1.4\n1 0 obj << /Type /Catalog").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_) | ExtractError::Empty));
    }

    #[test]
    fn normalizes_line_endings_and_controls() {
        assert_eq!(normalize_page_text("a\r\nb\rc\u{0}d\te"), "a\nb\ncd\te");
    }
}
