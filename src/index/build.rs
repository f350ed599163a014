//! Offline indexing pipeline: scan -> chunk -> embed -> build artifacts.
//!
//! All four artifacts are derived from the same ordered chunk list in one
//! pass, which is what keeps the chunk-id space aligned across the metadata
//! store, the dense matrix, and the sparse index. Artifacts are written to
//! a staging directory and renamed into place as a group, so a failed build
//! never clobbers a servable artifact set.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::chunking::chunker_for;
use crate::config::Config;
use crate::embed::biencoder::BiEncoder;
use crate::index::dense::DenseIndex;
use crate::index::metadata::MetadataStore;
use crate::index::npy;
use crate::index::sparse::{SparseIndex, DEFAULT_B, DEFAULT_K1};
use crate::ingest::scan_repository;
use crate::models::{Chunk, IndexSummary};

const ARTIFACT_FILES: &[&str] = &[
    "metadata.db",
    "faiss.index",
    "sparse_index.json",
    "embeddings.npy",
];

/// Run the full indexing pipeline and return a build summary.
pub async fn build_index(
    repo_path: &Path,
    config: &Config,
    biencoder: &dyn BiEncoder,
) -> Result<IndexSummary> {
    let artifacts = config.artifacts_dir.clone();
    std::fs::create_dir_all(&artifacts)
        .with_context(|| format!("failed to create {}", artifacts.display()))?;
    let t0 = Instant::now();

    // 1. Scan repository
    tracing::info!(repo = %repo_path.display(), "phase: scan");
    let repo = repo_path.to_path_buf();
    let files = tokio::task::spawn_blocking(move || scan_repository(&repo)).await?;
    if files.is_empty() {
        bail!("no indexable files found in {}", repo_path.display());
    }
    let files_scanned = files.len();
    let scan_s = t0.elapsed().as_secs_f64();

    // 2. Chunk files
    tracing::info!(n_files = files_scanned, "phase: chunk");
    let t_chunk = Instant::now();
    let chunking = config.chunking.clone();
    let chunks = tokio::task::spawn_blocking(move || {
        let mut chunks: Vec<Chunk> = Vec::new();
        for file in &files {
            let chunker = chunker_for(&file.language, &chunking);
            for piece in chunker.chunk(&file.content) {
                chunks.push(Chunk {
                    chunk_id: chunks.len() as i64,
                    file_path: file.relative_path.clone(),
                    language: file.language.clone(),
                    start_line: piece.start_line,
                    end_line: piece.end_line,
                    symbol_name: piece.symbol_name,
                    code_text: piece.code_text,
                });
            }
        }
        chunks
    })
    .await?;
    if chunks.is_empty() {
        bail!("chunking produced zero chunks");
    }
    let chunks_produced = chunks.len();
    let mut chunks_per_language: HashMap<String, usize> = HashMap::new();
    for chunk in &chunks {
        *chunks_per_language.entry(chunk.language.clone()).or_insert(0) += 1;
    }
    let chunk_s = t_chunk.elapsed().as_secs_f64();
    tracing::info!(n_chunks = chunks_produced, "chunking complete");

    // 3. Embed chunks
    tracing::info!("phase: embed");
    let t_embed = Instant::now();
    let texts: Vec<String> = chunks.iter().map(|c| c.code_text.clone()).collect();
    let embeddings = biencoder.encode_batch(&texts).await?;
    if embeddings.len() != chunks.len() {
        bail!(
            "bi-encoder returned {} embeddings for {} chunks",
            embeddings.len(),
            chunks.len()
        );
    }
    let embedding_dim = embeddings.first().map(|v| v.len()).unwrap_or(0);
    if embedding_dim == 0 || embeddings.iter().any(|v| v.len() != embedding_dim) {
        bail!("bi-encoder returned inconsistent embedding dimensions");
    }
    let embed_s = t_embed.elapsed().as_secs_f64();

    // 4. Build artifacts in a staging directory, then rename into place
    tracing::info!("phase: build artifacts");
    let t_build = Instant::now();
    let index_config = config.index.clone();
    let staging = artifacts.join(".staging");
    let staging_clone = staging.clone();
    let artifact_bytes = tokio::task::spawn_blocking(move || {
        write_staged_artifacts(&staging_clone, &chunks, &texts, &embeddings, &index_config)
    })
    .await??;

    for name in ARTIFACT_FILES {
        std::fs::rename(staging.join(name), artifacts.join(name))
            .with_context(|| format!("failed to move {name} into place"))?;
    }
    let _ = std::fs::remove_dir_all(&staging);
    let build_s = t_build.elapsed().as_secs_f64();

    let summary = IndexSummary {
        files_scanned,
        chunks_produced,
        chunks_per_language,
        embedding_dim,
        artifact_bytes,
        scan_s: round2(scan_s),
        chunk_s: round2(chunk_s),
        embed_s: round2(embed_s),
        build_s: round2(build_s),
        total_s: round2(t0.elapsed().as_secs_f64()),
    };
    tracing::info!(
        n_files = summary.files_scanned,
        n_chunks = summary.chunks_produced,
        total_s = summary.total_s,
        "indexing complete"
    );
    Ok(summary)
}

fn write_staged_artifacts(
    staging: &Path,
    chunks: &[Chunk],
    texts: &[String],
    embeddings: &[Vec<f32>],
    index_config: &crate::config::IndexConfig,
) -> Result<HashMap<String, u64>> {
    // A leftover staging dir from a crashed build is stale; start clean.
    if staging.exists() {
        std::fs::remove_dir_all(staging)?;
    }
    std::fs::create_dir_all(staging)?;
    let mut artifact_bytes = HashMap::new();

    let db_path: PathBuf = staging.join("metadata.db");
    {
        let store = MetadataStore::open(&db_path)?;
        store.insert_many(chunks)?;
    }
    artifact_bytes.insert(
        "metadata.db".to_string(),
        std::fs::metadata(&db_path)?.len(),
    );

    let dense = DenseIndex::build(embeddings, index_config)?;
    let bytes = dense.save(&staging.join("faiss.index"))?;
    artifact_bytes.insert("faiss.index".to_string(), bytes);

    let sparse = SparseIndex::build(texts, DEFAULT_K1, DEFAULT_B);
    let bytes = sparse.save(&staging.join("sparse_index.json"))?;
    artifact_bytes.insert("sparse_index.json".to_string(), bytes);

    let dim = embeddings.first().map(|v| v.len()).unwrap_or(0);
    let mut flat = Vec::with_capacity(embeddings.len() * dim);
    for row in embeddings {
        flat.extend_from_slice(row);
    }
    let bytes = npy::write_matrix(
        &staging.join("embeddings.npy"),
        &flat,
        embeddings.len(),
        dim,
    )?;
    artifact_bytes.insert("embeddings.npy".to_string(), bytes);

    Ok(artifact_bytes)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// True when a complete artifact set is present.
pub fn has_artifacts(artifacts_dir: &Path) -> bool {
    ARTIFACT_FILES
        .iter()
        .all(|name| artifacts_dir.join(name).exists())
}
