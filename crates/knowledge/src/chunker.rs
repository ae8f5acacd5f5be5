//! Text chunking with configurable size and overlap.

use crate::types::{Chunk, ChunkId};
use delve_core::{AppError, AppResult};

/// Check chunking parameters.
pub fn validate_params(chunk_size: usize, overlap: usize) -> AppResult<()> {
    if chunk_size == 0 {
        return Err(AppError::Config("chunk_size must be greater than 0".to_string()));
    }
    if overlap >= chunk_size {
        return Err(AppError::Config(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }
    Ok(())
}

/// Chunk text into overlapping segments.
///
/// Offsets are counted in characters, never bytes, so multi-byte text splits
/// on character boundaries. Consecutive chunks share exactly `overlap`
/// characters and the last chunk carries whatever remains. Chunk text is
/// kept verbatim.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> AppResult<Vec<Chunk>> {
    validate_params(chunk_size, overlap)?;

    // Byte offset of every character, plus the end of the text
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::new();
    if total_chars == 0 {
        return Ok(chunks);
    }

    let step = chunk_size - overlap;
    let mut start = 0;
    let mut position = 0u32;

    loop {
        let end = (start + chunk_size).min(total_chars);

        chunks.push(Chunk {
            id: ChunkId::new(document_id, position),
            start,
            end,
            text: text[boundaries[start]..boundaries[end]].to_string(),
        });

        if end == total_chars {
            break;
        }

        position += 1;
        start += step;
    }

    tracing::debug!(
        "Chunked {} into {} chunks (size: {}, overlap: {})",
        document_id,
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_thousand_characters() {
        let text: String = "abcdefghij".repeat(300);
        let chunks = chunk_text("doc.txt", &text, 1000, 200).unwrap();

        assert_eq!(chunks.len(), 4);
        let offsets: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(offsets, vec![(0, 1000), (800, 1800), (1600, 2600), (2400, 3000)]);

        for pair in chunks.windows(2) {
            let tail: String = pair[0].text.chars().skip(800).collect();
            let head: String = pair[1].text.chars().take(200).collect();
            assert_eq!(tail, head);
        }

        assert!(chunks[3].len() < 1000);
    }

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(50);
        let first = chunk_text("fox.txt", &text, 120, 30).unwrap();
        let second = chunk_text("fox.txt", &text, 120, 30).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunk_text("short.txt", "  hello  ", 1000, 200).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "  hello  ");
        assert_eq!(chunks[0].id, ChunkId::new("short.txt", 0));
    }

    #[test]
    fn test_multibyte_text_uses_character_offsets() {
        let text = "é".repeat(25);
        let chunks = chunk_text("accents.txt", &text, 10, 5).unwrap();

        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.text.chars().count() == c.len()));
        assert_eq!(chunks.last().map(|c| c.end), Some(25));
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("empty.txt", "", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(chunk_text("a", "abc", 0, 0), Err(AppError::Config(_))));
        assert!(matches!(chunk_text("a", "abc", 10, 10), Err(AppError::Config(_))));
    }
}
