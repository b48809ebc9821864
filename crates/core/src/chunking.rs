use crate::error::ChatError;
use crate::models::{
    ChatOptions, Chunk, DEFAULT_MAX_CHUNK_LENGTH, DEFAULT_OVERLAP_LENGTH, DEFAULT_SEPARATOR,
};

/// Character-based splitter settings. Lengths count `char`s, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    max_chunk_length: usize,
    overlap_length: usize,
    separator: String,
}

impl ChunkingConfig {
    pub fn new(
        max_chunk_length: usize,
        overlap_length: usize,
        separator: impl Into<String>,
    ) -> Result<Self, ChatError> {
        let separator = separator.into();

        if max_chunk_length == 0 {
            return Err(ChatError::InvalidConfig(
                "max_chunk_length must be greater than zero".to_string(),
            ));
        }
        if overlap_length >= max_chunk_length {
            return Err(ChatError::InvalidConfig(format!(
                "overlap_length {overlap_length} must be smaller than max_chunk_length {max_chunk_length}"
            )));
        }
        if separator.is_empty() {
            return Err(ChatError::InvalidConfig(
                "separator must not be empty".to_string(),
            ));
        }

        Ok(Self {
            max_chunk_length,
            overlap_length,
            separator,
        })
    }

    pub fn max_chunk_length(&self) -> usize {
        self.max_chunk_length
    }

    pub fn overlap_length(&self) -> usize {
        self.overlap_length
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            overlap_length: DEFAULT_OVERLAP_LENGTH,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl TryFrom<&ChatOptions> for ChunkingConfig {
    type Error = ChatError;

    fn try_from(value: &ChatOptions) -> Result<Self, Self::Error> {
        Self::new(
            value.max_chunk_length,
            value.overlap_length,
            value.separator.clone(),
        )
    }
}

/// Splits `text` into overlapping chunks of at most `max_chunk_length` characters.
///
/// A chunk ends right after the last separator inside its window, or is cut hard at the
/// window edge when the window holds no separator. The next chunk starts `overlap_length`
/// characters before that end, moved forward to a separator boundary when one is available.
/// When that would not move past the previous start, the next chunk starts at the previous end.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let separator: Vec<char> = config.separator.chars().collect();
    let len = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut previous_end = 0;

    while start < len {
        let window_end = (start + config.max_chunk_length).min(len);
        // Every chunk reaches past the previous one, so none is contained in its predecessor.
        let end = if window_end == len {
            len
        } else {
            last_boundary(&chars, &separator, start.max(previous_end), window_end)
                .unwrap_or(window_end)
        };

        chunks.push(Chunk {
            index: chunks.len(),
            text: chars[start..end].iter().collect(),
            start,
            end,
        });

        if end == len {
            break;
        }

        let candidate = end.saturating_sub(config.overlap_length);
        let next = if candidate <= start {
            end
        } else if is_boundary(&chars, &separator, candidate) {
            candidate
        } else {
            first_boundary(&chars, &separator, candidate + 1, end).unwrap_or(candidate)
        };

        previous_end = end;
        start = next;
    }

    chunks
}

/// Position directly after a separator, or the start of the text.
fn is_boundary(chars: &[char], separator: &[char], position: usize) -> bool {
    position == 0
        || (position >= separator.len() && chars[position - separator.len()..position] == *separator)
}

/// Largest boundary in `(floor, window_end]` whose separator lies entirely after `floor`.
fn last_boundary(chars: &[char], separator: &[char], floor: usize, window_end: usize) -> Option<usize> {
    let lowest = floor + separator.len();
    (lowest..=window_end)
        .rev()
        .find(|&position| position > floor && is_boundary(chars, separator, position))
}

fn first_boundary(chars: &[char], separator: &[char], from: usize, to: usize) -> Option<usize> {
    (from..to).find(|&position| is_boundary(chars, separator, position))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts_of(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|chunk| chunk.text.as_str()).collect()
    }

    fn assert_chunk_invariants(text: &str, config: &ChunkingConfig) {
        let chars: Vec<char> = text.chars().collect();
        let chunks = split_text(text, config);

        if chars.is_empty() {
            assert!(chunks.is_empty());
            return;
        }

        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[chunks.len() - 1].end, chars.len());

        for (position, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, position);
            assert!(chunk.char_len() > 0);
            assert!(chunk.char_len() <= config.max_chunk_length());
            let expected: String = chars[chunk.start..chunk.end].iter().collect();
            assert_eq!(chunk.text, expected);
        }

        for pair in chunks.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            assert!(next.start > previous.start, "no progress at {}", next.start);
            assert!(next.start <= previous.end, "gap between chunks at {}", previous.end);
            assert!(previous.end - next.start <= config.overlap_length());
            assert!(next.end > previous.end, "chunk {} lies inside its predecessor", next.index);
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("Total revenue was $4.2M in Q3", &ChunkingConfig::default());
        assert_eq!(texts_of(&chunks), vec!["Total revenue was $4.2M in Q3"]);
    }

    #[test]
    fn chunks_end_at_last_separator_in_window() {
        let config = ChunkingConfig::new(8, 0, "\n").unwrap();
        let chunks = split_text("aaaa\nbbbb\ncccc", &config);
        assert_eq!(texts_of(&chunks), vec!["aaaa\n", "bbbb\n", "cccc"]);
    }

    #[test]
    fn text_without_separator_is_hard_cut() {
        let config = ChunkingConfig::new(4, 1, "\n").unwrap();
        let chunks = split_text("abcdefghij", &config);
        assert_eq!(texts_of(&chunks), vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn overlap_is_exact_when_it_lands_on_a_separator() {
        let config = ChunkingConfig::new(10, 4, " ").unwrap();
        let chunks = split_text("one two three four five", &config);
        assert_eq!(chunks[0].text, "one two ");
        assert_eq!(chunks[1].start, 4);
        assert!(chunks[1].text.starts_with("two "));
        assert_eq!(chunks[0].end - chunks[1].start, 4);
    }

    #[test]
    fn overlap_moves_forward_to_next_separator() {
        let config = ChunkingConfig::new(12, 7, "\n").unwrap();
        let chunks = split_text("alpha\nbeta\ngamma\ndelta", &config);
        assert_eq!(chunks[0].text, "alpha\nbeta\n");
        assert_eq!(chunks[1].start, 6);
        assert_eq!(chunks[1].text, "beta\ngamma\n");
        assert_eq!(chunks[0].end - chunks[1].start, 5);
    }

    #[test]
    fn early_separator_does_not_produce_nested_chunk() {
        let config = ChunkingConfig::new(10, 5, "\n").unwrap();
        let text = format!("a\n{}", "b".repeat(20));
        let chunks = split_text(&text, &config);

        assert_eq!(chunks[0].text, "a\n");
        assert_eq!(chunks[1].start, 2);
        assert_eq!(chunks[1].text, "bbbbbbbbbb");
        assert!(chunks.iter().all(|chunk| chunk.text != "\n"));
        assert_chunk_invariants(&text, &config);
    }

    #[test]
    fn multibyte_text_is_measured_in_characters() {
        let config = ChunkingConfig::new(3, 1, "\n").unwrap();
        let chunks = split_text("äöüßé", &config);
        assert_eq!(texts_of(&chunks), vec!["äöü", "üßé"]);
    }

    #[test]
    fn invariants_hold_across_configurations() {
        let repeated_lines = "lorem ipsum dolor sit amet\n".repeat(40);
        let single_line = "no separators at all ".repeat(30);
        let corpus = [
            "",
            "x",
            "Total revenue was $4.2M in Q3\nOperating costs rose by 3%\n\nOutlook remains stable",
            repeated_lines.as_str(),
            single_line.as_str(),
            "\n\n\n\n\n\n\n\n\n\n",
            "tail separator\n",
            "a\nbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
        ];
        let configs = [
            ChunkingConfig::new(1, 0, "\n").unwrap(),
            ChunkingConfig::new(5, 4, "\n").unwrap(),
            ChunkingConfig::new(16, 3, " ").unwrap(),
            ChunkingConfig::new(50, 10, "\n\n").unwrap(),
            ChunkingConfig::default(),
        ];

        for text in corpus {
            for config in &configs {
                assert_chunk_invariants(text, config);
            }
        }
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        assert!(matches!(
            ChunkingConfig::new(100, 100, "\n"),
            Err(ChatError::InvalidConfig(_))
        ));
        assert!(matches!(
            ChunkingConfig::new(100, 250, "\n"),
            Err(ChatError::InvalidConfig(_))
        ));
        assert!(ChunkingConfig::new(0, 0, "\n").is_err());
        assert!(ChunkingConfig::new(10, 2, "").is_err());
    }
}
