use super::*;

fn sentence_text(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("This is sentence number {} with a bit of padding. ", i))
        .collect()
}

#[test]
fn test_short_text_single_chunk() {
    let chunker = Chunker::default();
    let chunks = chunker.chunk_text("short message", "[header]").unwrap();

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].full_text, "[header]\n\nshort message");
    assert_eq!(chunks[0].lexical_text, "short message");
}

#[test]
fn test_no_header_single_chunk() {
    let chunker = Chunker::default();
    let chunks = chunker.chunk_text("short message", "").unwrap();

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].full_text, "short message");
}

#[test]
fn test_whitespace_only_is_an_error() {
    let chunker = Chunker::default();
    assert!(matches!(
        chunker.chunk_text("   \n\t ", "[h]"),
        Err(ChunkError::EmptyInput)
    ));
    assert!(matches!(
        chunker.chunk_text("", "[h]"),
        Err(ChunkError::EmptyInput)
    ));
}

#[test]
fn test_long_text_splits_with_header_on_every_chunk() {
    let chunker = Chunker::new(100, 20);
    let text = sentence_text(100);
    let chunks = chunker.chunk_text(&text, "[header]").unwrap();

    assert!(chunks.len() > 1, "expected multiple chunks");
    for chunk in &chunks {
        assert!(chunk.full_text.starts_with("[header]\n\n"));
        assert!(!chunk.lexical_text.starts_with("[header]"));
    }
}

#[test]
fn test_chunks_respect_token_budget() {
    let chunker = Chunker::new(100, 20);
    let text = sentence_text(100);
    let chunks = chunker.chunk_text(&text, "[header]").unwrap();

    for chunk in &chunks {
        // Boundary snapping only ever shrinks a window; a couple of tokens of
        // slack covers re-tokenisation drift of the decoded text.
        assert!(
            count_tokens(&chunk.full_text) <= 104,
            "chunk exceeds target: {} tokens",
            count_tokens(&chunk.full_text)
        );
    }
}

#[test]
fn test_overlap_repeats_content() {
    let chunker = Chunker::new(60, 30);
    let text = sentence_text(60);
    let chunks = chunker.chunk_text(&text, "").unwrap();
    assert!(chunks.len() > 2);

    // With a 50% overlap, consecutive chunks share at least one word.
    let first_words: Vec<&str> = chunks[0].lexical_text.split_whitespace().collect();
    let tail = &first_words[first_words.len().saturating_sub(3)..];
    assert!(
        tail.iter().any(|w| chunks[1].lexical_text.contains(w)),
        "no overlap between consecutive chunks"
    );
}

#[test]
fn test_non_final_chunks_end_on_boundary() {
    let chunker = Chunker::new(80, 10);
    let text = sentence_text(80);
    let chunks = chunker.chunk_text(&text, "").unwrap();
    assert!(chunks.len() > 1);

    for chunk in &chunks[..chunks.len() - 1] {
        let t = &chunk.lexical_text;
        assert!(
            t.ends_with(". ")
                || t.ends_with("! ")
                || t.ends_with("? ")
                || t.ends_with("\n\n")
                || !t.ends_with(char::is_alphanumeric),
            "non-final chunk ends mid-word: ...{:?}",
            &t[t.len().saturating_sub(20)..]
        );
    }
}

#[test]
fn test_cyrillic_text_chunks_cleanly() {
    let chunker = Chunker::new(50, 10);
    let text = "Коли Іра прилітає з Катовіце? ".repeat(60);
    let chunks = chunker.chunk_text(&text, "[h]").unwrap();

    assert!(chunks.len() > 1);
    for chunk in chunks.iter().filter(|c| c.lexical_text.len() > 20) {
        // Every non-trivial chunk decodes to valid text containing whole words.
        assert!(chunk.lexical_text.contains("Іра") || chunk.lexical_text.contains("Катовіце"));
    }
}

#[test]
fn test_progress_guaranteed_with_huge_overlap() {
    // Overlap >= window must still advance at least one token per step.
    let chunker = Chunker::new(30, 500);
    let text = sentence_text(40);
    let chunks = chunker.chunk_text(&text, "").unwrap();
    assert!(!chunks.is_empty());
}
