//! Text chunker for streaming response output
//!
//! Buffers response deltas and emits chunks for synthesis at sentence ends,
//! at clause boundaries once enough text is buffered, or at a hard length
//! limit. Indic and CJK terminators (।, ॥, 。) are recognized alongside
//! standard punctuation.

use unicode_segmentation::UnicodeSegmentation;

use voice_orchestrator_config::TurnConfig;

/// Terminators that only end a sentence when followed by whitespace
const SPACED_TERMINATORS: &[&str] = &[".", "!", "?", "…"];

/// Terminators that end a sentence on their own
const CLOSED_TERMINATORS: &[&str] = &["।", "॥", "。", "！", "？"];

const CLAUSE_MARKS: &[&str] = &[",", ";", ":", "،", "、", "，"];

/// Closing quotes and brackets kept with the sentence they close
const CLOSERS: &[&str] = &["\"", "'", ")", "]", "”", "’", "」", "』"];

/// Streaming sentence/clause chunker
#[derive(Debug, Clone)]
pub struct TextChunker {
    buffer: String,
    max_chars: usize,
    min_clause_chars: usize,
}

impl TextChunker {
    pub fn new(max_chars: usize, min_clause_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            max_chars: max_chars.max(1),
            min_clause_chars,
        }
    }

    pub fn from_config(config: &TurnConfig) -> Self {
        Self::new(config.chunk_max_chars, config.chunk_min_clause_chars)
    }

    /// Add a delta, returning every chunk it completes
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut chunks = Vec::new();
        while let Some(split) = self.next_split() {
            if let Some(chunk) = self.take(split) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Flush whatever is left at end of stream
    pub fn finish(&mut self) -> Option<String> {
        let len = self.buffer.len();
        self.take(len)
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Split off `self.buffer[..at]`, trimmed; `None` if only whitespace
    fn take(&mut self, at: usize) -> Option<String> {
        let rest = self.buffer.split_off(at);
        let chunk = std::mem::replace(&mut self.buffer, rest.trim_start().to_string());
        let chunk = chunk.trim();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk.to_string())
        }
    }

    /// Byte offset where the next chunk ends, if one is complete
    fn next_split(&self) -> Option<usize> {
        let graphemes: Vec<(usize, &str)> = self.buffer.grapheme_indices(true).collect();
        let end_of = |i: usize| graphemes[i].0 + graphemes[i].1.len();

        let mut clause_end = None;
        for (i, &(_, g)) in graphemes.iter().enumerate().take(self.max_chars) {
            if CLOSED_TERMINATORS.contains(&g) {
                return Some(end_of(skip_closers(&graphemes, i)));
            }

            if SPACED_TERMINATORS.contains(&g) {
                let last = skip_closers(&graphemes, i);
                if followed_by_space(&graphemes, last) {
                    return Some(end_of(last));
                }
            }

            if clause_end.is_none()
                && CLAUSE_MARKS.contains(&g)
                && i + 1 >= self.min_clause_chars
                && followed_by_space(&graphemes, i)
            {
                clause_end = Some(end_of(i));
            }
        }

        if clause_end.is_some() {
            return clause_end;
        }

        if graphemes.len() < self.max_chars {
            return None;
        }

        // Hard limit: break at the last space inside the window if possible
        let window = &graphemes[..self.max_chars];
        match window
            .iter()
            .rposition(|(_, g)| is_space(g))
            .filter(|&pos| pos > 0)
        {
            Some(pos) => Some(window[pos].0),
            None => Some(end_of(self.max_chars - 1)),
        }
    }
}

fn is_space(g: &str) -> bool {
    g.chars().all(char::is_whitespace)
}

fn followed_by_space(graphemes: &[(usize, &str)], i: usize) -> bool {
    graphemes.get(i + 1).map_or(false, |(_, g)| is_space(g))
}

/// Index of the last closing quote/bracket directly after `i`
fn skip_closers(graphemes: &[(usize, &str)], mut i: usize) -> usize {
    while let Some((_, g)) = graphemes.get(i + 1) {
        if CLOSERS.contains(g) {
            i += 1;
        } else {
            break;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> TextChunker {
        TextChunker::new(100, 20)
    }

    #[test]
    fn test_sentence_boundary_needs_following_space() {
        let mut c = chunker();
        assert!(c.push("Hello there.").is_empty());
        assert_eq!(c.push(" How are"), vec!["Hello there."]);
        assert_eq!(c.buffered(), "How are");
        assert_eq!(c.finish().as_deref(), Some("How are"));
        assert!(c.finish().is_none());
    }

    #[test]
    fn test_decimal_not_a_boundary() {
        let mut c = chunker();
        assert!(c.push("Pi is 3.14 roughly").is_empty());
    }

    #[test]
    fn test_multiple_sentences_in_one_delta() {
        let mut c = chunker();
        let chunks = c.push("One. Two! Three? Four");
        assert_eq!(chunks, vec!["One.", "Two!", "Three?"]);
    }

    #[test]
    fn test_closing_quote_stays_with_sentence() {
        let mut c = chunker();
        let chunks = c.push("She said \"go.\" Then");
        assert_eq!(chunks, vec!["She said \"go.\""]);
    }

    #[test]
    fn test_indic_terminator() {
        let mut c = chunker();
        let chunks = c.push("नमस्ते। आप कैसे हैं");
        assert_eq!(chunks, vec!["नमस्ते।"]);
    }

    #[test]
    fn test_clause_boundary_after_minimum() {
        let mut c = chunker();
        assert!(c.push("Well, ").is_empty());
        let chunks = c.push("that is a longer clause, and more");
        assert_eq!(chunks, vec!["Well, that is a longer clause,"]);
    }

    #[test]
    fn test_hard_limit_splits_at_space() {
        let mut c = TextChunker::new(10, 5);
        let chunks = c.push("abcd efgh ijkl");
        assert_eq!(chunks, vec!["abcd efgh"]);
        assert_eq!(c.buffered(), "ijkl");
    }

    #[test]
    fn test_hard_limit_without_space() {
        let mut c = TextChunker::new(4, 2);
        let chunks = c.push("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh"]);
        assert_eq!(c.finish().as_deref(), Some("ij"));
    }
}
