//! Document parsing and text extraction.

use crate::types::DocumentType;
use delve_core::{AppResult, IngestionError};
use std::path::Path;

/// Resolve the type of a document from a declared type or its name.
///
/// A declared type wins over the extension. Unknown types are rejected
/// with `UnsupportedFormat`.
pub fn resolve_type(name: &str, declared: Option<&str>) -> AppResult<DocumentType> {
    match declared {
        Some(declared) => DocumentType::parse(declared).ok_or_else(|| {
            IngestionError::UnsupportedFormat {
                name: name.to_string(),
                reason: format!("unknown document type '{}'", declared),
            }
            .into()
        }),
        None => DocumentType::from_path(Path::new(name)).ok_or_else(|| {
            IngestionError::UnsupportedFormat {
                name: name.to_string(),
                reason: "cannot infer type from file extension".to_string(),
            }
            .into()
        }),
    }
}

/// Extract plain text from raw document bytes.
///
/// # Errors
/// * `UnsupportedFormat` - invalid PDF or non-UTF-8 text
/// * `EmptyDocument` - nothing but whitespace after extraction
pub fn extract_text(name: &str, bytes: &[u8], doc_type: DocumentType) -> AppResult<String> {
    let text = match doc_type {
        DocumentType::Pdf => extract_pdf(name, bytes)?,
        DocumentType::Markdown => clean_markdown(&decode_utf8(name, bytes)?),
        DocumentType::Text => decode_utf8(name, bytes)?,
    };

    if text.trim().is_empty() {
        return Err(IngestionError::EmptyDocument(name.to_string()).into());
    }

    tracing::debug!(
        "Extracted {} characters from {} ({})",
        text.chars().count(),
        name,
        doc_type
    );

    Ok(text)
}

fn extract_pdf(name: &str, bytes: &[u8]) -> AppResult<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        IngestionError::UnsupportedFormat {
            name: name.to_string(),
            reason: format!("invalid PDF: {}", e),
        }
        .into()
    })
}

fn decode_utf8(name: &str, bytes: &[u8]) -> AppResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        IngestionError::UnsupportedFormat {
            name: name.to_string(),
            reason: format!("not valid UTF-8 text: {}", e),
        }
        .into()
    })
}

/// Clean markdown by removing heading markers, fences and rules.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") || is_horizontal_rule(trimmed) {
            continue;
        }

        let content = trimmed.trim_start_matches('#').trim();
        if !content.is_empty() {
            result.push_str(content);
            result.push('\n');
        }
    }

    result.trim_end().to_string()
}

fn is_horizontal_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|marker| compact.chars().all(|c| c == *marker))
}
