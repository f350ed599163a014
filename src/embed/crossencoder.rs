//! Cross-encoder: scores (query, passage) pairs for reranking.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbedConfig;
use crate::embed::clamp_for_model;

/// Pairwise relevance scorer. Scores come back in passage input order; no
/// normalization is guaranteed, only that higher means more relevant.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;
}

/// Cross-encoder backed by an OpenAI-compatible `/v1/rerank` endpoint.
/// One batched request scores every pair, and calls through one wrapper
/// instance are serialized.
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    config: EmbedConfig,
    call_lock: tokio::sync::Mutex<()>,
}

impl HttpCrossEncoder {
    pub fn new(client: reqwest::Client, config: EmbedConfig) -> Self {
        tracing::info!(model = %config.crossencoder_model, "cross-encoder ready");
        Self {
            client,
            config,
            call_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.call_lock.lock().await;

        let url = format!("{}/v1/rerank", self.config.base_url.trim_end_matches('/'));
        let documents: Vec<String> = passages
            .iter()
            .map(|p| clamp_for_model(p, self.config.crossencoder_max_length).to_string())
            .collect();
        let req = RerankRequest {
            model: self.config.crossencoder_model.clone(),
            query: clamp_for_model(query, self.config.crossencoder_max_length).to_string(),
            top_n: documents.len(),
            documents,
        };

        let mut builder = self.client.post(&url).json(&req);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let resp = builder
            .send()
            .await
            .context("failed to reach rerank endpoint")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("rerank endpoint returned {status}: {body}");
        }

        let body: RerankResponse = resp
            .json()
            .await
            .context("failed to parse rerank response")?;

        // The endpoint returns results sorted by relevance; map scores back
        // to the caller's passage order.
        let mut scores = vec![f32::NEG_INFINITY; passages.len()];
        for item in body.results {
            if item.index >= scores.len() {
                anyhow::bail!("rerank response index {} out of range", item.index);
            }
            scores[item.index] = item.relevance_score;
        }
        if scores.iter().any(|s| *s == f32::NEG_INFINITY) {
            anyhow::bail!("rerank response did not cover every document");
        }
        Ok(scores)
    }

    fn model_name(&self) -> &str {
        &self.config.crossencoder_model
    }
}

#[derive(Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: usize,
    relevance_score: f32,
}
