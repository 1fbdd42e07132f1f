//! File chunking.
//!
//! [`Chunker::chunk`] turns one file's text into ordered, overlapping
//! [`Chunk`]s:
//!
//! 1. Derive a [`ContentType`] from the path's extension.
//! 2. If the [`SplitterRegistry`] has a structural splitter for it, split
//!    along the syntax tree (40 lines max, 5 lines of overlap, 1500 chars
//!    max by default). Any parse failure discards the partial output.
//! 3. Otherwise, or if the structural split failed or produced nothing,
//!    use the [`SentenceSplitter`] (512 chars, 64 chars of overlap).
//! 4. Drop chunks whose trimmed text is empty and number the rest densely
//!    from zero.
//!
//! Chunking is total and deterministic for a given `(text, path)`. An empty
//! result is legitimate (e.g. a whitespace-only file).
//!
//! # Example
//!
//! ```rust
//! use repo_index_core::chunk::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::default());
//! let chunks = chunker.chunk("fn main() {}\n", "src/main.rs");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].ordinal, 0);
//! ```

pub mod language;
pub mod structural;
pub mod text;

use std::collections::HashMap;

use tracing::debug;

pub use language::ContentType;
pub use structural::{CodeLimits, LineSplitter, SplitError, StructuralSplitter, TreeSitterSplitter};
pub use text::{SentenceSplitter, TextLimits};

use crate::models::Chunk;

/// Size parameters for both splitting strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkerConfig {
    pub code: CodeLimits,
    pub text: TextLimits,
}

/// Static mapping from content type to structural splitter.
pub struct SplitterRegistry {
    splitters: HashMap<ContentType, Box<dyn StructuralSplitter>>,
}

impl SplitterRegistry {
    /// Register a splitter for every source-code content type: tree-sitter
    /// where a grammar is compiled in, line-based otherwise.
    pub fn new(limits: CodeLimits) -> Self {
        let mut splitters: HashMap<ContentType, Box<dyn StructuralSplitter>> = HashMap::new();
        for content_type in ContentType::CODE {
            let splitter: Box<dyn StructuralSplitter> = match content_type.tree_sitter_language() {
                Some(language) => Box::new(TreeSitterSplitter::new(language, limits)),
                None => Box::new(LineSplitter::new(limits)),
            };
            splitters.insert(content_type, splitter);
        }
        Self { splitters }
    }

    pub fn splitter_for(&self, content_type: ContentType) -> Option<&dyn StructuralSplitter> {
        self.splitters.get(&content_type).map(|s| s.as_ref())
    }
}

/// Splits file text into chunks using a structural strategy with a generic
/// fallback.
pub struct Chunker {
    registry: SplitterRegistry,
    fallback: SentenceSplitter,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            registry: SplitterRegistry::new(config.code),
            fallback: SentenceSplitter::new(config.text),
        }
    }

    pub fn chunk(&self, text: &str, path: &str) -> Vec<Chunk> {
        let content_type = ContentType::from_path(path);
        let pieces = match self.registry.splitter_for(content_type) {
            Some(splitter) => match splitter.split(text) {
                Ok(pieces) if pieces.iter().any(|p| !p.trim().is_empty()) => pieces,
                Ok(_) => self.fallback.split(text),
                Err(e) => {
                    debug!(path, language = content_type.as_str(), error = %e, "structural split failed, using text splitter");
                    self.fallback.split(text)
                }
            },
            None => self.fallback.split(text),
        };

        pieces
            .into_iter()
            .filter(|piece| !piece.trim().is_empty())
            .enumerate()
            .map(|(ordinal, piece)| Chunk {
                source_path: path.to_string(),
                ordinal,
                text: piece.to_string(),
                byte_length: piece.len(),
            })
            .collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_only_file_has_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("   \n\n\t  \n", "notes.txt").is_empty());
        assert!(chunker.chunk("\n\n\n", "main.py").is_empty());
        assert!(chunker.chunk("", "lib.rs").is_empty());
    }

    #[test]
    fn test_ordinals_dense_and_paths_set() {
        let text = (0..100)
            .map(|i| format!("Paragraph number {i} explains something."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = Chunker::default().chunk(&text, "docs/guide.md");
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i);
            assert_eq!(c.source_path, "docs/guide.md");
            assert_eq!(c.byte_length, c.text.len());
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "def a():\n    return 1\n\n\ndef b():\n    return 2\n".repeat(20);
        let chunker = Chunker::default();
        let c1 = chunker.chunk(&text, "mod.py");
        let c2 = chunker.chunk(&text, "mod.py");
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_malformed_code_falls_back_to_text() {
        let text = "fn broken( {\n    let x = ;\n";
        let chunks = Chunker::default().chunk(text, "broken.rs");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_unmapped_extension_uses_text_limits() {
        let line = "a line of configuration text that repeats\n";
        let text = line.repeat(40);
        let chunks = Chunker::default().chunk(&text, "settings.ini");
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 512));
    }

    #[test]
    fn test_code_uses_line_limits() {
        let text: String = (0..60)
            .map(|i| format!("def f{i}():\n    return {i}\n\n"))
            .collect();
        let chunks = Chunker::default().chunk(&text, "funcs.py");
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.lines().count() <= 40);
            assert!(c.text.chars().count() <= 1500);
        }
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = SplitterRegistry::new(CodeLimits::default());
        assert!(registry.splitter_for(ContentType::Rust).is_some());
        assert!(registry.splitter_for(ContentType::Python).is_some());
        for content_type in ContentType::CODE {
            assert!(
                registry.splitter_for(content_type).is_some(),
                "no splitter for {}",
                content_type.as_str()
            );
        }
        assert!(registry.splitter_for(ContentType::Generic).is_none());
    }

    #[test]
    fn test_non_rust_code_uses_line_limits() {
        let go: String = std::iter::once("package main\n\n".to_string())
            .chain((0..60).map(|i| format!("func F{i}() int {{\n\treturn {i}\n}}\n\n")))
            .collect();
        let java: String = std::iter::once("class Big {\n".to_string())
            .chain((0..60).map(|i| format!("    int m{i}() {{\n        return {i};\n    }}\n\n")))
            .chain(std::iter::once("}\n".to_string()))
            .collect();
        let ruby: String = (0..60).map(|i| format!("def m{i}\n  {i}\nend\n\n")).collect();
        let kotlin: String = (0..60).map(|i| format!("fun m{i}(): Int {{\n    return {i}\n}}\n\n")).collect();

        let chunker = Chunker::default();
        for (text, path) in [
            (go, "main.go"),
            (java, "Big.java"),
            (ruby, "lib.rb"),
            (kotlin, "Main.kt"),
        ] {
            let chunks = chunker.chunk(&text, path);
            assert!(chunks.len() > 1, "{path} produced one chunk");
            for c in &chunks {
                assert!(c.text.lines().count() <= 40, "{path}: chunk over 40 lines");
                assert!(c.text.chars().count() <= 1500, "{path}: chunk over 1500 chars");
            }
        }
    }
}
