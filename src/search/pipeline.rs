//! The multi-stage search pipeline: embed -> retrieve -> filter -> rerank.
//!
//! A pipeline instance is immutable once loaded; hot reload builds a fresh
//! instance against the current artifacts and swaps an atomic reference
//! (see [`crate::state::AppState`]), so in-flight requests keep the
//! instance they started with.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::embed::biencoder::BiEncoder;
use crate::embed::cache::QueryCache;
use crate::embed::crossencoder::CrossEncoder;
use crate::error::HermesError;
use crate::index::dense::DenseIndex;
use crate::index::metadata::MetadataStore;
use crate::index::sparse::{tokenize, SparseIndex};
use crate::models::{RetrievalMode, SearchRequest, SearchResponse, SearchResultItem};
use crate::search::fusion::reciprocal_rank_fusion;

/// Workers available for cross-encoder offload.
const RERANK_WORKERS: usize = 2;

/// An in-flight candidate between pipeline stages.
#[derive(Debug, Clone)]
struct Candidate {
    chunk_id: i64,
    retrieval_score: f32,
    /// 1-based, assigned after the filter stage
    retrieval_rank: usize,
    rerank_score: Option<f32>,
}

/// Loads artifacts once and executes searches against them.
pub struct SearchPipeline {
    config: Config,
    store: Arc<MetadataStore>,
    dense: Arc<DenseIndex>,
    sparse: Option<Arc<SparseIndex>>,
    biencoder: Arc<dyn BiEncoder>,
    crossencoder: Arc<dyn CrossEncoder>,
    cache: QueryCache,
    rerank_pool: Arc<Semaphore>,
}

impl SearchPipeline {
    /// Load the artifact set under `config.artifacts_dir`. The model
    /// wrappers are shared with the caller so reloads reuse them.
    pub fn load(
        config: Config,
        biencoder: Arc<dyn BiEncoder>,
        crossencoder: Arc<dyn CrossEncoder>,
    ) -> Result<Self, HermesError> {
        let store = MetadataStore::open(&config.metadata_path())?;

        let mut dense = DenseIndex::load(&config.dense_index_path())
            .map_err(|e| HermesError::Index(format!("{e:#}")))?;
        dense.set_nprobe(config.index.faiss_nprobe);

        let sparse_path = config.sparse_index_path();
        let sparse = if sparse_path.exists() {
            Some(Arc::new(
                SparseIndex::load(&sparse_path)
                    .map_err(|e| HermesError::Index(format!("{e:#}")))?,
            ))
        } else {
            None
        };

        // The three artifacts must agree on the chunk-id space.
        let n_chunks = store.count()?;
        if dense.ntotal() != n_chunks {
            return Err(HermesError::Integrity(format!(
                "dense index holds {} vectors but metadata has {n_chunks} chunks",
                dense.ntotal()
            )));
        }
        if let Some(sparse) = &sparse {
            if sparse.len() != n_chunks {
                return Err(HermesError::Integrity(format!(
                    "sparse index holds {} documents but metadata has {n_chunks} chunks",
                    sparse.len()
                )));
            }
        }

        let cache = QueryCache::new(config.embed.query_cache_size);
        tracing::info!(n_chunks, "search pipeline ready");

        Ok(Self {
            config,
            store: Arc::new(store),
            dense: Arc::new(dense),
            sparse,
            biencoder,
            crossencoder,
            cache,
            rerank_pool: Arc::new(Semaphore::new(RERANK_WORKERS)),
        })
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, HermesError> {
        validate(&request)?;
        let request_id = new_request_id();
        let mode = request
            .retrieval_mode
            .unwrap_or(self.config.search.retrieval_mode);
        let mut timings: HashMap<String, f64> = HashMap::new();
        let t_total = Instant::now();

        // 1. Embed query (dense and hybrid modes only)
        let query_vec = if mode != RetrievalMode::Sparse {
            let t = Instant::now();
            let vec = self.embed_query(&request.query).await?;
            timings.insert("embed_query_ms".to_string(), ms(t));
            Some(vec)
        } else {
            None
        };

        // 2. Retrieve
        let t = Instant::now();
        let mut candidates = self
            .retrieve(&request.query, query_vec, request.top_k_retrieve, mode)
            .await?;
        timings.insert("retrieval_ms".to_string(), ms(t));

        // 3. Filter, then assign retrieval ranks over the survivors
        if request.filter_language.is_some() || request.filter_path_prefix.is_some() {
            let keep = self.store.filter_ids(
                request.filter_language.as_deref(),
                request.filter_path_prefix.as_deref(),
            )?;
            candidates.retain(|c| keep.contains(&c.chunk_id));
        }
        for (i, candidate) in candidates.iter_mut().enumerate() {
            candidate.retrieval_rank = i + 1;
        }
        let total_candidates = candidates.len();

        // 4. Rerank under a deadline; degrade to retrieval order on failure
        let mut rerank_skipped = false;
        let t = Instant::now();
        if candidates.is_empty() {
            rerank_skipped = true;
        } else {
            match self.rerank(&request.query, &candidates).await {
                Ok(Some(reranked)) => candidates = reranked,
                Ok(None) => rerank_skipped = true,
                Err(err) => return Err(err),
            }
        }
        timings.insert("rerank_ms".to_string(), ms(t));

        // 5. Truncate and assemble
        candidates.truncate(request.top_k_rerank);
        let results = self.build_results(&candidates, request.return_snippets)?;
        timings.insert("total_ms".to_string(), ms(t_total));

        Ok(SearchResponse {
            request_id,
            query: request.query,
            retrieval_mode: mode,
            results,
            timings_ms: timings,
            rerank_skipped,
            total_candidates,
        })
    }

    /// Rebuild from the artifacts on disk, reusing this pipeline's model
    /// wrappers. The caller swaps the returned instance into the live slot.
    pub fn reload(&self) -> Result<SearchPipeline, HermesError> {
        SearchPipeline::load(
            self.config.clone(),
            self.biencoder.clone(),
            self.crossencoder.clone(),
        )
    }

    pub fn n_chunks(&self) -> Result<usize, HermesError> {
        self.store.count()
    }

    pub fn index_size(&self) -> usize {
        self.dense.ntotal()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn biencoder_model(&self) -> &str {
        self.biencoder.model_name()
    }

    pub fn crossencoder_model(&self) -> &str {
        self.crossencoder.model_name()
    }

    // ── stages ──────────────────────────────────────────

    async fn embed_query(&self, query: &str) -> Result<Arc<Vec<f32>>, HermesError> {
        if let Some(cached) = self.cache.get(query) {
            return Ok(cached);
        }
        let vec = self
            .biencoder
            .encode_one(query)
            .await
            .map_err(|e| HermesError::Model(format!("{e:#}")))?;
        let vec = Arc::new(vec);
        self.cache.put(query, vec.clone());
        Ok(vec)
    }

    async fn retrieve(
        &self,
        query: &str,
        query_vec: Option<Arc<Vec<f32>>>,
        top_k: usize,
        mode: RetrievalMode,
    ) -> Result<Vec<Candidate>, HermesError> {
        match mode {
            RetrievalMode::Dense => {
                let vec = query_vec.expect("dense mode embeds the query");
                let hits = self.dense_search(vec, top_k).await?;
                Ok(to_candidates(hits))
            }
            RetrievalMode::Sparse => {
                let hits = self.sparse_search(query.to_string(), top_k).await?;
                Ok(to_candidates(hits))
            }
            RetrievalMode::Hybrid => {
                let vec = query_vec.expect("hybrid mode embeds the query");
                let (dense, sparse) = tokio::join!(
                    self.dense_search(vec, top_k),
                    self.sparse_search(query.to_string(), top_k)
                );
                let fused = reciprocal_rank_fusion(
                    &[dense?, sparse?],
                    self.config.search.rrf_k,
                    top_k,
                );
                Ok(to_candidates(fused))
            }
        }
    }

    async fn dense_search(
        &self,
        query_vec: Arc<Vec<f32>>,
        top_k: usize,
    ) -> Result<Vec<(i64, f32)>, HermesError> {
        let dense = self.dense.clone();
        tokio::task::spawn_blocking(move || dense.search(&query_vec, top_k))
            .await
            .map_err(|e| HermesError::Index(format!("dense search task failed: {e}")))
    }

    async fn sparse_search(
        &self,
        query: String,
        top_k: usize,
    ) -> Result<Vec<(i64, f32)>, HermesError> {
        let Some(sparse) = self.sparse.clone() else {
            return Ok(Vec::new());
        };
        tokio::task::spawn_blocking(move || sparse.search(&tokenize(&query), top_k))
            .await
            .map_err(|e| HermesError::Index(format!("sparse search task failed: {e}")))
    }

    /// Score the leading candidates with the cross-encoder on a bounded
    /// worker pool, joining with a deadline. Returns `Ok(None)` when the
    /// rerank was skipped (timeout or model failure); the in-flight call is
    /// left to finish in the background and its result is dropped.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[Candidate],
    ) -> Result<Option<Vec<Candidate>>, HermesError> {
        let cap = self
            .config
            .search
            .max_rerank_candidates
            .min(candidates.len());
        let head = &candidates[..cap];
        let tail = &candidates[cap..];

        let ids: Vec<i64> = head.iter().map(|c| c.chunk_id).collect();
        // A miss here is fatal: retrieval only emits ids the artifacts claim
        let metas = self.store.get_many(&ids)?;
        let passages: Vec<String> = metas.into_iter().map(|m| m.code_text).collect();

        let crossencoder = self.crossencoder.clone();
        let pool = self.rerank_pool.clone();
        let query = query.to_string();
        let handle = tokio::spawn(async move {
            // The pool is never closed, so acquisition only waits for a slot
            let _permit = pool.acquire_owned().await.ok();
            crossencoder.score(&query, &passages).await
        });

        let deadline = Duration::from_secs_f64(self.config.search.rerank_timeout_seconds);
        let scores = match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(Ok(scores))) if scores.len() == cap => scores,
            Ok(Ok(Ok(scores))) => {
                tracing::warn!(
                    got = scores.len(),
                    expected = cap,
                    "cross-encoder returned wrong score count, skipping rerank"
                );
                return Ok(None);
            }
            Ok(Ok(Err(err))) => {
                tracing::warn!("rerank failed, returning retrieval order: {err:#}");
                return Ok(None);
            }
            Ok(Err(join_err)) => {
                tracing::warn!("rerank task failed: {join_err}");
                return Ok(None);
            }
            Err(_) => {
                tracing::warn!(
                    timeout_s = self.config.search.rerank_timeout_seconds,
                    "rerank timed out, returning retrieval order"
                );
                return Ok(None);
            }
        };

        let mut reranked: Vec<Candidate> = head
            .iter()
            .zip(&scores)
            .map(|(c, &score)| Candidate {
                rerank_score: Some(score),
                ..c.clone()
            })
            .collect();
        reranked.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.retrieval_rank.cmp(&b.retrieval_rank))
        });
        reranked.extend(tail.iter().cloned());
        Ok(Some(reranked))
    }

    fn build_results(
        &self,
        candidates: &[Candidate],
        return_snippets: bool,
    ) -> Result<Vec<SearchResultItem>, HermesError> {
        let ids: Vec<i64> = candidates.iter().map(|c| c.chunk_id).collect();
        let metas = self.store.get_many(&ids)?;

        let results = candidates
            .iter()
            .zip(metas)
            .enumerate()
            .map(|(i, (candidate, meta))| SearchResultItem {
                chunk_id: candidate.chunk_id,
                file_path: meta.file_path,
                language: meta.language,
                start_line: meta.start_line,
                end_line: meta.end_line,
                symbol_name: meta.symbol_name.filter(|s| !s.is_empty()),
                code_snippet: return_snippets.then_some(meta.code_text),
                retrieval_rank: candidate.retrieval_rank,
                retrieval_score: round4(candidate.retrieval_score),
                rerank_score: candidate.rerank_score.map(round4),
                final_rank: i + 1,
            })
            .collect();
        Ok(results)
    }
}

fn validate(request: &SearchRequest) -> Result<(), HermesError> {
    if request.query.trim().is_empty() {
        return Err(HermesError::Validation("query must not be empty".into()));
    }
    if !(1..=1000).contains(&request.top_k_retrieve) {
        return Err(HermesError::Validation(
            "top_k_retrieve must be between 1 and 1000".into(),
        ));
    }
    if !(1..=200).contains(&request.top_k_rerank) {
        return Err(HermesError::Validation(
            "top_k_rerank must be between 1 and 200".into(),
        ));
    }
    Ok(())
}

fn to_candidates(hits: Vec<(i64, f32)>) -> Vec<Candidate> {
    hits.into_iter()
        .map(|(chunk_id, score)| Candidate {
            chunk_id,
            retrieval_score: score,
            retrieval_rank: 0,
            rerank_score: None,
        })
        .collect()
}

fn new_request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

fn ms(start: Instant) -> f64 {
    let v = start.elapsed().as_secs_f64() * 1000.0;
    (v * 100.0).round() / 100.0
}

fn round4(v: f32) -> f32 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            top_k_retrieve: 100,
            top_k_rerank: 10,
            retrieval_mode: None,
            filter_language: None,
            filter_path_prefix: None,
            return_snippets: true,
        }
    }

    #[test]
    fn test_validate_rejects_empty_query() {
        assert!(matches!(
            validate(&request("   ")),
            Err(HermesError::Validation(_))
        ));
        assert!(validate(&request("ok")).is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_k() {
        let mut req = request("q");
        req.top_k_retrieve = 0;
        assert!(validate(&req).is_err());
        req.top_k_retrieve = 1001;
        assert!(validate(&req).is_err());
        req.top_k_retrieve = 1000;
        req.top_k_rerank = 201;
        assert!(validate(&req).is_err());
    }

    #[test]
    fn test_request_id_shape() {
        let a = new_request_id();
        let b = new_request_id();
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
