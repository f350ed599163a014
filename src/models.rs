use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A contiguous region of a source file, produced by chunking.
///
/// `chunk_id` is assigned at metadata insertion and is simultaneously the
/// metadata primary key, the dense embedding-matrix row, and the sparse
/// document index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: i64,
    /// Relative to the repo root, forward-slash normalized
    pub file_path: String,
    /// Lowercase language identifier, e.g. "python", "rust"
    pub language: String,
    /// 1-indexed, inclusive
    pub start_line: usize,
    /// 1-indexed, inclusive
    pub end_line: usize,
    pub symbol_name: Option<String>,
    pub code_text: String,
}

/// Retrieval strategy for a search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Dense,
    Sparse,
    Hybrid,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Dense => "dense",
            RetrievalMode::Sparse => "sparse",
            RetrievalMode::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dense" => Ok(RetrievalMode::Dense),
            "sparse" => Ok(RetrievalMode::Sparse),
            "hybrid" => Ok(RetrievalMode::Hybrid),
            other => Err(format!("unknown retrieval mode: {other}")),
        }
    }
}

/// Search request body.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k_retrieve")]
    pub top_k_retrieve: usize,
    #[serde(default = "default_top_k_rerank")]
    pub top_k_rerank: usize,
    /// Defaults to the configured mode when absent
    pub retrieval_mode: Option<RetrievalMode>,
    pub filter_language: Option<String>,
    pub filter_path_prefix: Option<String>,
    #[serde(default = "default_true")]
    pub return_snippets: bool,
}

fn default_top_k_retrieve() -> usize {
    100
}

fn default_top_k_rerank() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// A single ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub chunk_id: i64,
    pub file_path: String,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    pub symbol_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    /// 1-based position after retrieval and filtering
    pub retrieval_rank: usize,
    pub retrieval_score: f32,
    pub rerank_score: Option<f32>,
    /// 1-based position in the final ordering
    pub final_rank: usize,
}

/// Search response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub request_id: String,
    pub query: String,
    pub retrieval_mode: RetrievalMode,
    pub results: Vec<SearchResultItem>,
    pub timings_ms: HashMap<String, f64>,
    pub rerank_skipped: bool,
    /// Candidate count after the filter stage
    pub total_candidates: usize,
}

/// `/stats` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub index_size: usize,
    pub n_chunks: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub retrieval_mode: RetrievalMode,
    pub biencoder_model: String,
    pub crossencoder_model: String,
}

/// Summary of one index build run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSummary {
    pub files_scanned: usize,
    pub chunks_produced: usize,
    pub chunks_per_language: HashMap<String, usize>,
    pub embedding_dim: usize,
    /// Bytes written, keyed by artifact file name
    pub artifact_bytes: HashMap<String, u64>,
    pub scan_s: f64,
    pub chunk_s: f64,
    pub embed_s: f64,
    pub build_s: f64,
    pub total_s: f64,
}

/// Indexing job state machine: idle -> indexing -> done | error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum IndexingStatus {
    Idle,
    Indexing {
        repo_path: String,
    },
    Done {
        repo_path: String,
        summary: IndexSummary,
    },
    Error {
        repo_path: String,
        message: String,
    },
}

impl IndexingStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, IndexingStatus::Indexing { .. })
    }
}

/// `/index` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexRequest {
    pub repo_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query": "foo"}"#).unwrap();
        assert_eq!(req.top_k_retrieve, 100);
        assert_eq!(req.top_k_rerank, 10);
        assert!(req.retrieval_mode.is_none());
        assert!(req.return_snippets);
    }

    #[test]
    fn test_retrieval_mode_parse() {
        let req: SearchRequest =
            serde_json::from_str(r#"{"query": "foo", "retrieval_mode": "sparse"}"#).unwrap();
        assert_eq!(req.retrieval_mode, Some(RetrievalMode::Sparse));
        assert!(
            serde_json::from_str::<SearchRequest>(r#"{"query": "q", "retrieval_mode": "fuzzy"}"#)
                .is_err()
        );
    }

    #[test]
    fn test_snippet_omitted_when_none() {
        let item = SearchResultItem {
            chunk_id: 0,
            file_path: "a.rs".into(),
            language: "rust".into(),
            start_line: 1,
            end_line: 2,
            symbol_name: None,
            code_snippet: None,
            retrieval_rank: 1,
            retrieval_score: 0.5,
            rerank_score: None,
            final_rank: 1,
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("code_snippet"));
        // symbol_name and rerank_score stay present as explicit nulls
        assert!(json.contains("\"symbol_name\":null"));
        assert!(json.contains("\"rerank_score\":null"));
    }

    #[test]
    fn test_indexing_status_serialization() {
        let status = IndexingStatus::Idle;
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"state": "idle"})
        );

        let status = IndexingStatus::Error {
            repo_path: "/tmp/repo".into(),
            message: "boom".into(),
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["state"], "error");
        assert_eq!(v["message"], "boom");
    }
}
