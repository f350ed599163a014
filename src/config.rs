use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level HERMES configuration.
///
/// Resolution order: built-in defaults, then an optional JSON config file
/// (unknown keys are rejected), then `HERMES_*` environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Where index artifacts are stored
    pub artifacts_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Logging level (trace|debug|info|warn|error)
    pub log_level: String,
    /// Emit JSON-formatted logs
    pub log_json: bool,
    pub chunking: ChunkingConfig,
    pub embed: EmbedConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
}

/// Controls how source files are split into searchable chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    pub max_chars: usize,
    /// Lines of overlap between consecutive chunks of a split block
    pub overlap_lines: usize,
    /// Discard chunks shorter than this
    pub min_chars: usize,
}

/// Bi-encoder and cross-encoder model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EmbedConfig {
    /// Base URL of the OpenAI-compatible model server
    pub base_url: String,
    /// API key, only needed for cloud providers
    pub api_key: Option<String>,
    pub biencoder_model: String,
    pub biencoder_batch_size: usize,
    pub biencoder_max_length: usize,
    pub crossencoder_model: String,
    pub crossencoder_batch_size: usize,
    pub crossencoder_max_length: usize,
    /// LRU capacity for the query-embedding cache
    pub query_cache_size: usize,
}

/// Dense index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IndexConfig {
    /// Use an IVF index for large corpora; Flat (exact) otherwise
    pub faiss_use_ivf: bool,
    /// Number of IVF partitions probed per query
    pub faiss_nprobe: usize,
    /// Number of IVF coarse centroids
    pub faiss_ivf_nlist: usize,
}

/// Search pipeline defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchConfig {
    /// Default retrieval strategy: dense, sparse, or hybrid
    pub retrieval_mode: crate::models::RetrievalMode,
    /// Candidates fetched from each retriever
    pub top_k_retrieve: usize,
    /// Final results after reranking
    pub top_k_rerank: usize,
    /// Cap on candidates sent to the cross-encoder
    pub max_rerank_candidates: usize,
    /// If reranking exceeds this, return retrieval-order results
    pub rerank_timeout_seconds: f64,
    /// RRF constant for reciprocal rank fusion
    pub rrf_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            bind_addr: "127.0.0.1:8000".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            chunking: ChunkingConfig::default(),
            embed: EmbedConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1500,
            overlap_lines: 3,
            min_chars: 50,
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            biencoder_model: "all-minilm".to_string(),
            biencoder_batch_size: 64,
            biencoder_max_length: 512,
            crossencoder_model: "ms-marco-minilm".to_string(),
            crossencoder_batch_size: 16,
            crossencoder_max_length: 512,
            query_cache_size: 1024,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            faiss_use_ivf: false,
            faiss_nprobe: 8,
            faiss_ivf_nlist: 100,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            retrieval_mode: crate::models::RetrievalMode::Hybrid,
            top_k_retrieve: 100,
            top_k_rerank: 10,
            max_rerank_candidates: 50,
            rerank_timeout_seconds: 10.0,
            rrf_k: 60,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the JSON file at `path` (if any),
    /// then environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => {
                let data = std::fs::read_to_string(p)?;
                serde_json::from_str(&data)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("HERMES_ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("HERMES_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(level) = std::env::var("HERMES_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(val) = std::env::var("HERMES_LOG_JSON") {
            self.log_json = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(url) = std::env::var("HERMES_EMBED_BASE_URL") {
            self.embed.base_url = url;
        }
        if let Ok(key) = std::env::var("HERMES_EMBED_API_KEY") {
            self.embed.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("HERMES_EMBED_BIENCODER_MODEL") {
            self.embed.biencoder_model = model;
        }
        if let Ok(model) = std::env::var("HERMES_EMBED_CROSSENCODER_MODEL") {
            self.embed.crossencoder_model = model;
        }
        if let Ok(val) = std::env::var("HERMES_EMBED_QUERY_CACHE_SIZE") {
            if let Ok(v) = val.parse() {
                self.embed.query_cache_size = v;
            }
        }
        if let Ok(val) = std::env::var("HERMES_INDEX_FAISS_USE_IVF") {
            self.index.faiss_use_ivf = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("HERMES_INDEX_FAISS_NPROBE") {
            if let Ok(v) = val.parse() {
                self.index.faiss_nprobe = v;
            }
        }
        if let Ok(val) = std::env::var("HERMES_INDEX_FAISS_IVF_NLIST") {
            if let Ok(v) = val.parse() {
                self.index.faiss_ivf_nlist = v;
            }
        }
        if let Ok(val) = std::env::var("HERMES_SEARCH_RETRIEVAL_MODE") {
            if let Ok(mode) = val.parse() {
                self.search.retrieval_mode = mode;
            }
        }
        if let Ok(val) = std::env::var("HERMES_SEARCH_TOP_K_RETRIEVE") {
            if let Ok(v) = val.parse() {
                self.search.top_k_retrieve = v;
            }
        }
        if let Ok(val) = std::env::var("HERMES_SEARCH_TOP_K_RERANK") {
            if let Ok(v) = val.parse() {
                self.search.top_k_rerank = v;
            }
        }
        if let Ok(val) = std::env::var("HERMES_SEARCH_RERANK_TIMEOUT_SECONDS") {
            if let Ok(v) = val.parse() {
                self.search.rerank_timeout_seconds = v;
            }
        }
        if let Ok(val) = std::env::var("HERMES_SEARCH_RRF_K") {
            if let Ok(v) = val.parse() {
                self.search.rrf_k = v;
            }
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.artifacts_dir.join("metadata.db")
    }

    pub fn dense_index_path(&self) -> PathBuf {
        self.artifacts_dir.join("faiss.index")
    }

    pub fn sparse_index_path(&self) -> PathBuf {
        self.artifacts_dir.join("sparse_index.json")
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.artifacts_dir.join("embeddings.npy")
    }
}
