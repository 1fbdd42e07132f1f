//! Syntax-aware splitting with tree-sitter.
//!
//! The file is parsed and covered by line ranges that follow the syntax
//! tree: each top-level node (with any leading comments or blank lines) is
//! one unit, nodes too large for a chunk are broken into their children,
//! and leaves that are still too large are split by lines. Units are then
//! packed greedily into chunks, and every chunk after the first is
//! prefixed with up to `overlap_lines` trailing lines of its predecessor.
//!
//! Chunks never exceed `max_lines` lines or `max_chars` characters,
//! overlap included.

use std::ops::Range;

use thiserror::Error;
use tree_sitter::{Language, Node, Parser};

/// Why a structural split was abandoned. Callers fall back to the generic
/// splitter; this never leaves the chunker.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("failed to load grammar: {0}")]
    Grammar(String),

    #[error("parser produced no tree")]
    NoTree,

    #[error("source contains syntax errors")]
    Syntax,

    #[error("line {0} exceeds the chunk character cap")]
    OversizedLine(usize),
}

/// A content-type specific splitter: text in, raw chunk texts out.
pub trait StructuralSplitter: Send + Sync {
    fn split<'a>(&self, text: &'a str) -> Result<Vec<&'a str>, SplitError>;
}

/// Bounds for structural chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLimits {
    pub max_lines: usize,
    pub overlap_lines: usize,
    pub max_chars: usize,
}

impl Default for CodeLimits {
    fn default() -> Self {
        Self {
            max_lines: 40,
            overlap_lines: 5,
            max_chars: 1500,
        }
    }
}

impl CodeLimits {
    /// Lines available to new content once room for the overlap is reserved.
    fn body_lines(&self) -> usize {
        self.max_lines.saturating_sub(self.overlap_lines).max(1)
    }
}

/// [`StructuralSplitter`] backed by a tree-sitter grammar.
pub struct TreeSitterSplitter {
    language: Language,
    limits: CodeLimits,
}

impl TreeSitterSplitter {
    pub fn new(language: Language, limits: CodeLimits) -> Self {
        Self { language, limits }
    }
}

impl StructuralSplitter for TreeSitterSplitter {
    fn split<'a>(&self, text: &'a str) -> Result<Vec<&'a str>, SplitError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| SplitError::Grammar(e.to_string()))?;
        let tree = parser.parse(text, None).ok_or(SplitError::NoTree)?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(SplitError::Syntax);
        }

        let lines = Lines::new(text);
        check_line_lengths(&lines, self.limits)?;

        let packer = Packer {
            lines: &lines,
            limits: self.limits,
        };
        let mut units = Vec::new();
        packer.collect_units(root, 0..lines.count(), &mut units);
        let ranges = packer.pack(&units);
        Ok(ranges.into_iter().map(|r| lines.slice(r)).collect())
    }
}

/// [`StructuralSplitter`] for code without a compiled-in grammar: splits
/// by lines under the same [`CodeLimits`], with the same overlap.
pub struct LineSplitter {
    limits: CodeLimits,
}

impl LineSplitter {
    pub fn new(limits: CodeLimits) -> Self {
        Self { limits }
    }
}

impl StructuralSplitter for LineSplitter {
    fn split<'a>(&self, text: &'a str) -> Result<Vec<&'a str>, SplitError> {
        let lines = Lines::new(text);
        check_line_lengths(&lines, self.limits)?;
        let packer = Packer {
            lines: &lines,
            limits: self.limits,
        };
        let mut units = Vec::new();
        packer.split_rows(0..lines.count(), &mut units);
        let ranges = packer.pack(&units);
        Ok(ranges.into_iter().map(|r| lines.slice(r)).collect())
    }
}

fn check_line_lengths(lines: &Lines<'_>, limits: CodeLimits) -> Result<(), SplitError> {
    for row in 0..lines.count() {
        if lines.chars(row..row + 1) > limits.max_chars {
            return Err(SplitError::OversizedLine(row + 1));
        }
    }
    Ok(())
}

/// Line table over the source text.
struct Lines<'a> {
    text: &'a str,
    /// Byte offset of every line start, plus `text.len()`.
    starts: Vec<usize>,
    /// Cumulative character counts at each line start.
    char_prefix: Vec<usize>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        let mut char_prefix = vec![0];
        let mut bytes = 0;
        let mut chars = 0;
        for line in text.split_inclusive('\n') {
            bytes += line.len();
            chars += line.chars().count();
            starts.push(bytes);
            char_prefix.push(chars);
        }
        Self {
            text,
            starts,
            char_prefix,
        }
    }

    fn count(&self) -> usize {
        self.starts.len() - 1
    }

    fn chars(&self, rows: Range<usize>) -> usize {
        self.char_prefix[rows.end] - self.char_prefix[rows.start]
    }

    fn slice(&self, rows: Range<usize>) -> &'a str {
        &self.text[self.starts[rows.start]..self.starts[rows.end]]
    }
}

struct Packer<'l, 'a> {
    lines: &'l Lines<'a>,
    limits: CodeLimits,
}

impl Packer<'_, '_> {
    fn fits(&self, rows: &Range<usize>) -> bool {
        rows.len() <= self.limits.body_lines() && self.lines.chars(rows.clone()) <= self.limits.max_chars
    }

    /// Cover `rows` with units following the named children of `node`.
    fn collect_units(&self, node: Node<'_>, rows: Range<usize>, out: &mut Vec<Range<usize>>) {
        let mut cursor_row = rows.start;
        let mut walker = node.walk();
        for child in node.named_children(&mut walker) {
            let end = end_row(&child).min(rows.end);
            if end <= cursor_row {
                continue;
            }
            let span = cursor_row..end;
            if self.fits(&span) {
                out.push(span);
            } else if child.named_child_count() > 0 {
                self.collect_units(child, span, out);
            } else {
                self.split_rows(span, out);
            }
            cursor_row = end;
        }
        if cursor_row < rows.end {
            self.split_rows(cursor_row..rows.end, out);
        }
    }

    /// Last-resort split of a span by lines.
    fn split_rows(&self, rows: Range<usize>, out: &mut Vec<Range<usize>>) {
        let mut start = rows.start;
        while start < rows.end {
            let mut end = start + 1;
            while end < rows.end && self.fits(&(start..end + 1)) {
                end += 1;
            }
            out.push(start..end);
            start = end;
        }
    }

    /// Merge contiguous units into chunks, then extend each chunk after the
    /// first backwards by the overlap.
    fn pack(&self, units: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut bodies: Vec<Range<usize>> = Vec::new();
        let mut current: Option<Range<usize>> = None;
        for unit in units {
            current = match current {
                None => Some(unit.clone()),
                Some(cur) => {
                    let merged = cur.start..unit.end;
                    if self.fits(&merged) {
                        Some(merged)
                    } else {
                        bodies.push(cur);
                        Some(unit.clone())
                    }
                }
            };
        }
        bodies.extend(current);

        let mut chunks = Vec::with_capacity(bodies.len());
        for (i, body) in bodies.iter().enumerate() {
            if i == 0 {
                chunks.push(body.clone());
                continue;
            }
            let prev = &bodies[i - 1];
            let mut overlap = self.limits.overlap_lines.min(body.start - prev.start);
            while overlap > 0 {
                let candidate = body.start - overlap..body.end;
                if candidate.len() <= self.limits.max_lines
                    && self.lines.chars(candidate.clone()) <= self.limits.max_chars
                {
                    break;
                }
                overlap -= 1;
            }
            chunks.push(body.start - overlap..body.end);
        }
        chunks
    }
}

/// Exclusive end row of a node. A node ending at column 0 ends on the
/// previous line.
fn end_row(node: &Node<'_>) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row
    } else {
        end.row + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rust_splitter(limits: CodeLimits) -> TreeSitterSplitter {
        TreeSitterSplitter::new(tree_sitter_rust::LANGUAGE.into(), limits)
    }

    fn many_functions(n: usize) -> String {
        (0..n)
            .map(|i| format!("fn f_{i:02}() -> u32 {{\n    {i}\n}}\n\n"))
            .collect()
    }

    #[test]
    fn test_small_file_single_chunk() {
        let src = "use std::io;\n\nfn main() {\n    println!(\"hi\");\n}\n";
        let chunks = rust_splitter(CodeLimits::default()).split(src).unwrap();
        assert_eq!(chunks, vec![src]);
    }

    #[test]
    fn test_bounds_respected() {
        let src = many_functions(30);
        let limits = CodeLimits::default();
        let chunks = rust_splitter(limits).split(&src).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.lines().count() <= limits.max_lines);
            assert!(chunk.chars().count() <= limits.max_chars);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap_by_five_lines() {
        let src = many_functions(30);
        let chunks = rust_splitter(CodeLimits::default()).split(&src).unwrap();
        let first: Vec<&str> = chunks[0].lines().collect();
        let second: Vec<&str> = chunks[1].lines().collect();
        assert_eq!(&first[first.len() - 5..], &second[..5]);
    }

    #[test]
    fn test_chunks_start_at_item_boundaries() {
        let src = many_functions(30);
        let chunks = rust_splitter(CodeLimits {
            overlap_lines: 0,
            ..CodeLimits::default()
        })
        .split(&src)
        .unwrap();
        for chunk in &chunks {
            assert!(
                chunk.trim_start().starts_with("fn f_"),
                "chunk starts mid-item: {chunk:?}"
            );
        }
        assert_eq!(chunks.concat(), src);
    }

    #[test]
    fn test_oversized_item_is_split_inside() {
        let body: String = (0..80).map(|i| format!("    let x{i} = {i};\n")).collect();
        let src = format!("fn big() {{\n{body}}}\n");
        let limits = CodeLimits::default();
        let chunks = rust_splitter(limits).split(&src).unwrap();
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.lines().count() <= limits.max_lines);
        }
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = rust_splitter(CodeLimits::default())
            .split("fn broken( {\n")
            .unwrap_err();
        assert!(matches!(err, SplitError::Syntax));
    }

    #[test]
    fn test_oversized_line_is_reported() {
        let src = format!("const X: &str = \"{}\";\n", "a".repeat(2000));
        let err = rust_splitter(CodeLimits::default()).split(&src).unwrap_err();
        assert!(matches!(err, SplitError::OversizedLine(1)));
    }

    #[test]
    fn test_python_grammar() {
        let src = "import os\n\n\nclass A:\n    def run(self):\n        return os.getcwd()\n";
        let splitter = TreeSitterSplitter::new(tree_sitter_python::LANGUAGE.into(), CodeLimits::default());
        let chunks = splitter.split(src).unwrap();
        assert_eq!(chunks.concat(), src);
    }

    #[test]
    fn test_go_functions_respect_code_bounds() {
        let funcs: String = (0..60)
            .map(|i| format!("func F{i}() int {{\n\treturn {i}\n}}\n\n"))
            .collect();
        let src = format!("package main\n\n{funcs}");
        let limits = CodeLimits::default();
        let splitter = TreeSitterSplitter::new(tree_sitter_go::LANGUAGE.into(), limits);
        let chunks = splitter.split(&src).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.lines().count() <= limits.max_lines);
            assert!(chunk.chars().count() <= limits.max_chars);
        }
        assert!(chunks[1..]
            .iter()
            .all(|c| c.lines().any(|l| l.starts_with("func F"))));
    }

    #[test]
    fn test_line_splitter_bounds_and_overlap() {
        let src: String = (0..100).map(|i| format!("val v{i} = {i}\n")).collect();
        let limits = CodeLimits::default();
        let chunks = LineSplitter::new(limits).split(&src).unwrap();
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.lines().count() <= limits.max_lines);
        }
        let first: Vec<&str> = chunks[0].lines().collect();
        let second: Vec<&str> = chunks[1].lines().collect();
        assert_eq!(&first[first.len() - 5..], &second[..5]);
    }

    #[test]
    fn test_line_splitter_rejects_oversized_line() {
        let src = format!("local s = \"{}\"\n", "b".repeat(1600));
        let err = LineSplitter::new(CodeLimits::default()).split(&src).unwrap_err();
        assert!(matches!(err, SplitError::OversizedLine(1)));
    }
}
