use condense_common::{CondenseError, Result};

/// Separator placed between paragraphs of one block
pub const PARAGRAPH_SEPARATOR: &str = " ";

/// A group of consecutive paragraphs joined into one text unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    /// Joined paragraph text
    pub text: String,

    /// Index of the first paragraph in the block
    pub start: usize,

    /// Index one past the last paragraph in the block
    pub end: usize,
}

impl TextBlock {
    /// Number of paragraphs in the block
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the block holds no paragraphs
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split paragraphs into non-overlapping blocks of at most `size` paragraphs
///
/// The last block may be shorter. An empty input yields no blocks.
pub fn chunk_paragraphs<S: AsRef<str>>(paragraphs: &[S], size: usize) -> Result<Vec<TextBlock>> {
    if size == 0 {
        return Err(CondenseError::config("Chunk size must be positive"));
    }

    let blocks = paragraphs
        .chunks(size)
        .enumerate()
        .map(|(i, window)| {
            let start = i * size;
            let text = window
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(PARAGRAPH_SEPARATOR);

            TextBlock {
                text,
                start,
                end: start + window.len(),
            }
        })
        .collect();

    Ok(blocks)
}

/// Split text by paragraphs
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Paragraph {}.", i)).collect()
    }

    #[test]
    fn test_chunk_empty_input() {
        let paragraphs: Vec<String> = Vec::new();
        let blocks = chunk_paragraphs(&paragraphs, 5).unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_chunk_zero_size_is_rejected() {
        let err = chunk_paragraphs(&numbered(3), 0).unwrap_err();
        assert!(matches!(err, CondenseError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_chunk_count_is_ceiling() {
        for n in 0..=12 {
            for size in 1..=6 {
                let blocks = chunk_paragraphs(&numbered(n), size).unwrap();
                assert_eq!(blocks.len(), (n + size - 1) / size, "n={} size={}", n, size);
            }
        }
    }

    #[test]
    fn test_chunk_covers_every_paragraph_in_order() {
        let paragraphs = numbered(11);
        let blocks = chunk_paragraphs(&paragraphs, 4).unwrap();

        let mut next = 0;
        for block in &blocks {
            assert_eq!(block.start, next);
            assert!(!block.is_empty() && block.len() <= 4);
            assert_eq!(block.text, paragraphs[block.start..block.end].join(" "));
            next = block.end;
        }
        assert_eq!(next, paragraphs.len());
    }

    #[test]
    fn test_chunk_seven_paragraphs_by_five() {
        let paragraphs = numbered(7);
        let blocks = chunk_paragraphs(&paragraphs, 5).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 5);
        assert_eq!(blocks[1].len(), 2);
        assert_eq!(blocks[1].text, "Paragraph 5. Paragraph 6.");
    }

    #[test]
    fn test_chunk_accepts_str_slices() {
        let blocks = chunk_paragraphs(&["a", "b", "c"], 2).unwrap();
        assert_eq!(blocks[0].text, "a b");
        assert_eq!(blocks[1].text, "c");
    }

    #[test]
    fn test_split_paragraphs() {
        let text = "Paragraph 1.\n\nParagraph 2.\r\n\r\n\n\nParagraph 3.";
        let paras = split_paragraphs(text);
        assert_eq!(paras, vec!["Paragraph 1.", "Paragraph 2.", "Paragraph 3."]);
    }
}
