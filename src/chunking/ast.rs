//! AST-aware chunking using tree-sitter.
//!
//! Top-level definitions become symbol-named chunks; runs of other
//! top-level nodes (imports, constants) merge into anonymous chunks up to
//! the character budget. Oversized definitions are split into overlapping
//! line windows. Falls back to the heuristic chunker when parsing fails,
//! the file is huge, or the parse is mostly error nodes.

use super::{ChunkPiece, Chunker, Language};
use crate::config::ChunkingConfig;
use crate::chunking::heuristic::HeuristicChunker;

/// Files larger than this skip AST parsing entirely.
const MAX_FILE_SIZE: usize = 500 * 1024;

/// If more than this fraction of AST nodes are error nodes, fall back.
const ERROR_THRESHOLD: f64 = 0.30;

pub struct AstChunker {
    language: Language,
    config: ChunkingConfig,
}

impl AstChunker {
    pub fn new(language: Language, config: ChunkingConfig) -> Self {
        Self { language, config }
    }

    fn chunk_ast(&self, source: &str) -> Option<Vec<ChunkPiece>> {
        if source.len() > MAX_FILE_SIZE {
            return None;
        }

        let mut parser = tree_sitter::Parser::new();
        let ts_language = self.language.tree_sitter_language()?;
        parser.set_language(&ts_language).ok()?;
        let tree = parser.parse(source, None)?;
        let root = tree.root_node();

        let (total, errors) = count_nodes(root);
        if total > 0 && (errors as f64 / total as f64) > ERROR_THRESHOLD {
            tracing::debug!(
                "AST error rate {:.0}% exceeds threshold, falling back",
                (errors as f64 / total as f64) * 100.0
            );
            return None;
        }

        let lines: Vec<&str> = source.lines().collect();
        let mut pieces: Vec<ChunkPiece> = Vec::new();
        // Accumulates rows of consecutive non-definition nodes
        let mut pending: Option<(usize, usize)> = None;

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            let start = child.start_position().row;
            let end = child.end_position().row.min(lines.len().saturating_sub(1));

            match definition_symbol(child, self.language, source) {
                Some(symbol) => {
                    self.flush_pending(&lines, &mut pending, pieces.is_empty(), &mut pieces);
                    self.emit_definition(&lines, start, end, &symbol, &mut pieces);
                }
                None => {
                    pending = match pending {
                        Some((s, _)) => Some((s, end)),
                        None => Some((start, end)),
                    };
                }
            }
        }
        self.flush_pending(&lines, &mut pending, pieces.is_empty(), &mut pieces);

        if pieces.is_empty() {
            return None;
        }
        Some(pieces)
    }

    /// Emit one chunk per definition, splitting oversized ones into
    /// overlapping line windows named `symbol::partN`.
    fn emit_definition(
        &self,
        lines: &[&str],
        start: usize,
        end: usize,
        symbol: &str,
        pieces: &mut Vec<ChunkPiece>,
    ) {
        let text = lines[start..=end].join("\n");
        if text.len() <= self.config.max_chars {
            if text.trim().len() >= self.config.min_chars {
                pieces.push(ChunkPiece {
                    code_text: text,
                    start_line: start + 1,
                    end_line: end + 1,
                    symbol_name: Some(symbol.to_string()),
                });
            }
            return;
        }

        let window = (self.config.max_chars / 80).max(10);
        let overlap = self.config.overlap_lines;
        let mut i = start;
        let mut part = 0usize;
        while i <= end {
            let window_end = (i + window - 1).min(end);
            let text = lines[i..=window_end].join("\n");
            if text.trim().len() >= self.config.min_chars {
                pieces.push(ChunkPiece {
                    code_text: text,
                    start_line: i + 1,
                    end_line: window_end + 1,
                    symbol_name: Some(format!("{symbol}::part{part}")),
                });
            }
            part += 1;
            if window_end >= end {
                break;
            }
            i = (window_end + 1).saturating_sub(overlap).max(i + 1);
        }
    }

    /// Flush accumulated non-definition rows as anonymous chunks. The run
    /// before the first definition is the module preamble.
    fn flush_pending(
        &self,
        lines: &[&str],
        pending: &mut Option<(usize, usize)>,
        is_preamble: bool,
        pieces: &mut Vec<ChunkPiece>,
    ) {
        let Some((start, end)) = pending.take() else {
            return;
        };
        let text = lines[start..=end].join("\n");
        if text.trim().len() < self.config.min_chars {
            return;
        }
        let symbol = if is_preamble {
            Some("<module>".to_string())
        } else {
            None
        };
        if text.len() <= self.config.max_chars {
            pieces.push(ChunkPiece {
                code_text: text,
                start_line: start + 1,
                end_line: end + 1,
                symbol_name: symbol,
            });
        } else {
            // Rare: a giant run of imports/constants; reuse the window split
            self.emit_definition(lines, start, end, "<module>", pieces);
        }
    }
}

impl Chunker for AstChunker {
    fn chunk(&self, source: &str) -> Vec<ChunkPiece> {
        if source.trim().is_empty() {
            return Vec::new();
        }
        match self.chunk_ast(source) {
            Some(pieces) => pieces,
            None => HeuristicChunker::new(self.config.clone()).chunk(source),
        }
    }
}

/// If `node` is a top-level definition, return its display name.
fn definition_symbol(
    node: tree_sitter::Node,
    language: Language,
    source: &str,
) -> Option<String> {
    // `export function f() {}` wraps the declaration in an export node
    if node.kind() == "export_statement" {
        if let Some(inner) = node.child_by_field_name("declaration") {
            return definition_symbol(inner, language, source);
        }
        return None;
    }
    let kinds: &[&str] = match language {
        Language::Rust => &[
            "function_item",
            "struct_item",
            "enum_item",
            "trait_item",
            "impl_item",
            "mod_item",
        ],
        Language::JavaScript | Language::TypeScript => &[
            "function_declaration",
            "generator_function_declaration",
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
        ],
        Language::Unknown => &[],
    };
    if !kinds.contains(&node.kind()) {
        return None;
    }

    // impl blocks name the type they implement
    let name_node = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))?;
    let name = name_node.utf8_text(source.as_bytes()).ok()?;
    Some(name.to_string())
}

fn count_nodes(node: tree_sitter::Node) -> (usize, usize) {
    let mut total = 1;
    let mut errors = usize::from(node.is_error());
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let (t, e) = count_nodes(child);
        total += t;
        errors += e;
    }
    (total, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkingConfig {
        ChunkingConfig {
            max_chars: 1500,
            overlap_lines: 3,
            min_chars: 10,
        }
    }

    #[test]
    fn test_rust_functions_get_symbols() {
        let source = "\
use std::fmt;

fn alpha() -> usize {
    1 + 1
}

struct Widget {
    size: usize,
}
";
        let chunker = AstChunker::new(Language::Rust, config());
        let pieces = chunker.chunk(source);

        let symbols: Vec<Option<&str>> =
            pieces.iter().map(|p| p.symbol_name.as_deref()).collect();
        assert!(symbols.contains(&Some("alpha")));
        assert!(symbols.contains(&Some("Widget")));
    }

    #[test]
    fn test_preamble_marked_as_module() {
        let source = "\
use std::collections::HashMap;
use std::fmt::Display;

fn beta() -> usize {
    42
}
";
        let chunker = AstChunker::new(Language::Rust, config());
        let pieces = chunker.chunk(source);
        assert_eq!(pieces[0].symbol_name.as_deref(), Some("<module>"));
        assert_eq!(pieces[0].start_line, 1);
    }

    #[test]
    fn test_line_numbers_are_one_based_inclusive() {
        let source = "fn gamma() {\n    let x = 3;\n}\n";
        let chunker = AstChunker::new(Language::Rust, config());
        let pieces = chunker.chunk(source);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].start_line, 1);
        assert_eq!(pieces[0].end_line, 3);
    }

    #[test]
    fn test_oversized_definition_split_with_parts() {
        let body: String = (0..200)
            .map(|i| format!("    let value_{i} = compute_something({i});\n"))
            .collect();
        let source = format!("fn big() {{\n{body}}}\n");

        let chunker = AstChunker::new(Language::Rust, config());
        let pieces = chunker.chunk(&source);
        assert!(pieces.len() > 1);
        assert_eq!(pieces[0].symbol_name.as_deref(), Some("big::part0"));
        assert_eq!(pieces[1].symbol_name.as_deref(), Some("big::part1"));
        // Consecutive windows overlap
        assert!(pieces[1].start_line <= pieces[0].end_line);
    }

    #[test]
    fn test_typescript_class() {
        let source = "\
export function loadConfig(path: string): Config {
    return JSON.parse(readFileSync(path, 'utf8'));
}

class Server {
    port: number;
}
";
        let chunker = AstChunker::new(Language::TypeScript, config());
        let pieces = chunker.chunk(source);
        let symbols: Vec<Option<&str>> =
            pieces.iter().map(|p| p.symbol_name.as_deref()).collect();
        assert!(symbols.contains(&Some("Server")));
    }

    #[test]
    fn test_empty_source() {
        let chunker = AstChunker::new(Language::Rust, config());
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("  \n\n  ").is_empty());
    }

    #[test]
    fn test_min_chars_discards_tiny_chunks() {
        let chunker = AstChunker::new(
            Language::Rust,
            ChunkingConfig {
                min_chars: 500,
                ..config()
            },
        );
        assert!(chunker.chunk("fn t() {}\n").is_empty());
    }
}
