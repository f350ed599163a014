//! Code chunking: AST-aware for supported languages, line-based heuristic
//! for the rest. Both implementations sit behind the [`Chunker`] trait so
//! the build orchestrator can treat them interchangeably.

pub mod ast;
pub mod heuristic;

use crate::config::ChunkingConfig;

/// Output of the chunking process, before chunk ids are assigned.
#[derive(Debug, Clone)]
pub struct ChunkPiece {
    pub code_text: String,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    /// Best-effort: enclosing function/class/struct name
    pub symbol_name: Option<String>,
}

/// A language-specific splitting strategy.
pub trait Chunker: Send + Sync {
    fn chunk(&self, source: &str) -> Vec<ChunkPiece>;
}

/// Languages with tree-sitter AST support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    JavaScript,
    TypeScript,
    Unknown,
}

impl Language {
    pub fn from_name(lang: &str) -> Self {
        match lang {
            "rust" => Language::Rust,
            "javascript" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            _ => Language::Unknown,
        }
    }

    /// The tree-sitter grammar for this language, or None if unsupported.
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => {
                Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            }
            Language::Unknown => None,
        }
    }
}

/// Return the chunker for `language`, falling back to the heuristic one.
pub fn chunker_for(language: &str, config: &ChunkingConfig) -> Box<dyn Chunker> {
    let lang = Language::from_name(language);
    if lang.tree_sitter_language().is_some() {
        Box::new(ast::AstChunker::new(lang, config.clone()))
    } else {
        Box::new(heuristic::HeuristicChunker::new(config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_name() {
        assert_eq!(Language::from_name("rust"), Language::Rust);
        assert_eq!(Language::from_name("typescript"), Language::TypeScript);
        assert_eq!(Language::from_name("markdown"), Language::Unknown);
    }

    #[test]
    fn test_ast_chunker_selected_for_rust() {
        let config = ChunkingConfig {
            min_chars: 1,
            ..Default::default()
        };
        let chunker = chunker_for("rust", &config);
        let pieces = chunker.chunk("fn hello() {\n    println!(\"hi\");\n}\n");
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].symbol_name.as_deref(), Some("hello"));
    }

    #[test]
    fn test_heuristic_selected_for_unknown() {
        let config = ChunkingConfig {
            min_chars: 1,
            ..Default::default()
        };
        let chunker = chunker_for("markdown", &config);
        let pieces = chunker.chunk("# Title\n\nsome prose\n");
        assert_eq!(pieces.len(), 1);
        assert!(pieces[0].symbol_name.is_none());
    }
}
