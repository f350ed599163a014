//! HTTP serving surface: health, index lifecycle, stats, and search.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::HermesError;
use crate::index::build::{build_index, has_artifacts};
use crate::models::{
    IndexRequest, IndexingStatus, SearchRequest, SearchResponse, StatsResponse,
};
use crate::search::pipeline::SearchPipeline;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/index/check", get(index_check))
        .route("/index/status", get(index_status))
        .route("/index", post(start_index))
        .route("/reload-index", post(reload_index))
        .route("/stats", get(stats))
        .route("/search", post(search))
        .with_state(state)
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /index/check - whether a complete artifact set exists on disk
pub async fn index_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let has_index = has_artifacts(&state.config.artifacts_dir);
    Json(serde_json::json!({"has_index": has_index}))
}

/// GET /index/status - background job state machine
pub async fn index_status(State(state): State<AppState>) -> Json<IndexingStatus> {
    Json(state.indexing.read().clone())
}

/// POST /index - start a background indexing job for a local repository
pub async fn start_index(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<serde_json::Value>, HermesError> {
    let repo_path = PathBuf::from(req.repo_path.trim());
    if req.repo_path.trim().is_empty() {
        return Err(HermesError::Validation("repo_path is required".into()));
    }
    if !repo_path.is_dir() {
        return Err(HermesError::Validation(format!(
            "repo_path is not a directory: {}",
            repo_path.display()
        )));
    }

    // One job per process; a finished (done/error) job may be superseded.
    {
        let mut indexing = state.indexing.write();
        if indexing.is_running() {
            return Err(HermesError::Validation(
                "an indexing job is already running".into(),
            ));
        }
        *indexing = IndexingStatus::Indexing {
            repo_path: repo_path.display().to_string(),
        };
    }

    let job_state = state.clone();
    tokio::spawn(async move {
        let repo_display = repo_path.display().to_string();
        let result =
            build_index(&repo_path, &job_state.config, job_state.biencoder.as_ref()).await;
        let mut indexing = job_state.indexing.write();
        *indexing = match result {
            Ok(summary) => IndexingStatus::Done {
                repo_path: repo_display,
                summary,
            },
            Err(err) => {
                tracing::error!("indexing failed for {repo_display}: {err:#}");
                IndexingStatus::Error {
                    repo_path: repo_display,
                    message: format!("{err:#}"),
                }
            }
        };
    });

    Ok(Json(serde_json::json!({
        "message": format!("Indexing started for {}", req.repo_path.trim())
    })))
}

/// POST /reload-index - load the artifacts on disk and swap the live pipeline
pub async fn reload_index(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, HermesError> {
    if !has_artifacts(&state.config.artifacts_dir) {
        return Err(HermesError::NoIndex);
    }

    // Build the replacement off the lock; in-flight requests keep their Arc.
    let current = state.pipeline.read().clone();
    let reloaded = match current {
        Some(pipeline) => pipeline.reload()?,
        None => SearchPipeline::load(
            state.config.clone(),
            state.biencoder.clone(),
            state.crossencoder.clone(),
        )?,
    };
    let n_chunks = reloaded.n_chunks()?;
    *state.pipeline.write() = Some(Arc::new(reloaded));
    tracing::info!(n_chunks, "pipeline reloaded");

    Ok(Json(serde_json::json!({"n_chunks": n_chunks})))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, HermesError> {
    let pipeline = state.pipeline()?;
    let cache = pipeline.cache();
    Ok(Json(StatsResponse {
        index_size: pipeline.index_size(),
        n_chunks: pipeline.n_chunks()?,
        cache_hits: cache.hits(),
        cache_misses: cache.misses(),
        cache_hit_rate: (cache.hit_rate() * 10_000.0).round() / 10_000.0,
        retrieval_mode: state.config.search.retrieval_mode,
        biencoder_model: pipeline.biencoder_model().to_string(),
        crossencoder_model: pipeline.crossencoder_model().to_string(),
    }))
}

/// POST /search
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, HermesError> {
    let pipeline = state.pipeline()?;
    let response = pipeline.search(req).await?;
    Ok(Json(response))
}
