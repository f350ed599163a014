//! Line-window chunker with overlap, used for languages without AST
//! support. Windows prefer to break just before a structural boundary line
//! (`fn `, `def `, `class `, ...) when one falls in the back half of the
//! window.

use super::{ChunkPiece, Chunker};
use crate::config::ChunkingConfig;

/// Line prefixes that hint at a block boundary, language-agnostic.
const BLOCK_HINTS: &[&str] = &[
    "func ",
    "fn ",
    "def ",
    "class ",
    "public ",
    "private ",
    "protected ",
    "interface ",
    "struct ",
    "impl ",
    "module ",
];

pub struct HeuristicChunker {
    config: ChunkingConfig,
}

impl HeuristicChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }
}

impl Chunker for HeuristicChunker {
    fn chunk(&self, source: &str) -> Vec<ChunkPiece> {
        let lines: Vec<&str> = source.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let max_lines = (self.config.max_chars / 80).max(10);
        let overlap = self.config.overlap_lines;
        let mut pieces = Vec::new();

        let mut i = 0usize;
        while i < lines.len() {
            let window_end = (i + max_lines).min(lines.len());
            let mut break_at = window_end;

            // Look backwards through the back half of the window for a
            // block-start line to break at.
            let floor = i + max_lines / 2;
            let mut j = window_end;
            while j > floor + 1 && j > i + 1 {
                j -= 1;
                if is_block_start(lines[j]) {
                    break_at = j;
                    break;
                }
            }

            let text = lines[i..break_at].join("\n");
            if text.trim().len() >= self.config.min_chars {
                pieces.push(ChunkPiece {
                    code_text: text,
                    start_line: i + 1,
                    end_line: break_at,
                    symbol_name: None,
                });
            }

            if break_at >= lines.len() {
                break;
            }
            i = if break_at > overlap && break_at - overlap > i {
                break_at - overlap
            } else {
                break_at
            };
        }

        pieces
    }
}

fn is_block_start(line: &str) -> bool {
    BLOCK_HINTS.iter().any(|hint| line.starts_with(hint))
}
