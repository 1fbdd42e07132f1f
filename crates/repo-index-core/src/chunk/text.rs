//! Generic paragraph/sentence splitter.
//!
//! The text is first cut into atomic pieces no longer than the chunk size,
//! preferring paragraph breaks, then sentence boundaries, then word
//! boundaries, then plain character counts. Pieces are merged greedily
//! into chunks; when a chunk closes, the next one starts with as many of
//! its trailing pieces as fit in the overlap budget.
//!
//! Pieces are contiguous byte ranges, so every chunk is a verbatim slice of
//! the input. Sizes are measured in characters.

use std::ops::Range;

use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLimits {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            chunk_chars: 512,
            overlap_chars: 64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Level {
    Paragraph,
    Sentence,
    Word,
    Char,
}

impl Level {
    fn next(self) -> Self {
        match self {
            Level::Paragraph => Level::Sentence,
            Level::Sentence => Level::Word,
            Level::Word | Level::Char => Level::Char,
        }
    }
}

/// The fallback splitter used for unmapped content types and whenever a
/// structural split is abandoned.
#[derive(Debug, Clone, Default)]
pub struct SentenceSplitter {
    limits: TextLimits,
}

impl SentenceSplitter {
    pub fn new(limits: TextLimits) -> Self {
        Self { limits }
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut pieces = Vec::new();
        self.atomize(text, 0, Level::Paragraph, &mut pieces);
        self.merge(text, &pieces)
            .into_iter()
            .map(|r| &text[r])
            .collect()
    }

    fn atomize(&self, text: &str, base: usize, level: Level, out: &mut Vec<Range<usize>>) {
        if text.is_empty() {
            return;
        }
        if text.chars().count() <= self.limits.chunk_chars {
            out.push(base..base + text.len());
            return;
        }
        let parts: Vec<(usize, &str)> = match level {
            Level::Paragraph => paragraph_bound_indices(text),
            Level::Sentence => text.split_sentence_bound_indices().collect(),
            Level::Word => text.split_word_bound_indices().collect(),
            Level::Char => {
                self.hard_split(text, base, out);
                return;
            }
        };
        if parts.len() <= 1 {
            self.atomize(text, base, level.next(), out);
            return;
        }
        for (offset, part) in parts {
            self.atomize(part, base + offset, level, out);
        }
    }

    fn hard_split(&self, text: &str, base: usize, out: &mut Vec<Range<usize>>) {
        let mut start = 0;
        let mut count = 0;
        for (i, _) in text.char_indices() {
            if count == self.limits.chunk_chars {
                out.push(base + start..base + i);
                start = i;
                count = 0;
            }
            count += 1;
        }
        if start < text.len() {
            out.push(base + start..base + text.len());
        }
    }

    fn merge(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let len = |r: &Range<usize>| text[r.clone()].chars().count();

        let mut chunks = Vec::new();
        let mut current: Vec<Range<usize>> = Vec::new();
        let mut current_len = 0;

        for piece in pieces {
            let piece_len = len(piece);
            if !current.is_empty() && current_len + piece_len > self.limits.chunk_chars {
                chunks.push(span(&current));

                let mut overlap: Vec<Range<usize>> = Vec::new();
                let mut overlap_len = 0;
                for prev in current.iter().rev() {
                    let prev_len = len(prev);
                    if overlap_len + prev_len > self.limits.overlap_chars {
                        break;
                    }
                    overlap_len += prev_len;
                    overlap.push(prev.clone());
                }
                overlap.reverse();
                while !overlap.is_empty() && overlap_len + piece_len > self.limits.chunk_chars {
                    overlap_len -= len(&overlap.remove(0));
                }
                current = overlap;
                current_len = overlap_len;
            }
            current.push(piece.clone());
            current_len += piece_len;
        }
        if !current.is_empty() {
            chunks.push(span(&current));
        }
        chunks
    }
}

fn span(pieces: &[Range<usize>]) -> Range<usize> {
    pieces[0].start..pieces[pieces.len() - 1].end
}

/// Split after every blank-line run, keeping the separator with the
/// preceding paragraph.
fn paragraph_bound_indices(text: &str) -> Vec<(usize, &str)> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\n' {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        let mut newlines = 1;
        while j < bytes.len() && matches!(bytes[j], b'\n' | b'\r' | b' ' | b'\t') {
            if bytes[j] == b'\n' {
                newlines += 1;
            }
            j += 1;
        }
        if newlines >= 2 && j < bytes.len() {
            parts.push((start, &text[start..j]));
            start = j;
        }
        i = j;
    }
    if start < text.len() {
        parts.push((start, &text[start..]));
    }
    parts
}
