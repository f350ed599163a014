//! Bi-encoder: maps a single text to a fixed-length unit vector.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbedConfig;
use crate::embed::{clamp_for_model, l2_normalize};

/// Single-query and batch embedder. Implementations must return
/// L2-normalized vectors of a stable dimension.
#[async_trait]
pub trait BiEncoder: Send + Sync {
    async fn encode_one(&self, text: &str) -> Result<Vec<f32>>;

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

/// Bi-encoder backed by an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// The backing model server is not assumed to be thread-safe; calls through
/// one wrapper instance are serialized.
pub struct HttpBiEncoder {
    client: reqwest::Client,
    config: EmbedConfig,
    call_lock: tokio::sync::Mutex<()>,
}

impl HttpBiEncoder {
    pub fn new(client: reqwest::Client, config: EmbedConfig) -> Self {
        tracing::info!(model = %config.biencoder_model, "bi-encoder ready");
        Self {
            client,
            config,
            call_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn embed_request(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/'));
        let req = EmbeddingsRequest {
            model: self.config.biencoder_model.clone(),
            input: inputs,
        };

        let mut builder = self.client.post(&url).json(&req);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let resp = builder
            .send()
            .await
            .context("failed to reach embeddings endpoint")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("embeddings endpoint returned {status}: {body}");
        }

        let body: EmbeddingsResponse = resp
            .json()
            .await
            .context("failed to parse embeddings response")?;

        let mut embeddings: Vec<Vec<f32>> =
            body.data.into_iter().map(|d| d.embedding).collect();
        for vec in &mut embeddings {
            l2_normalize(vec);
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl BiEncoder for HttpBiEncoder {
    async fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let _guard = self.call_lock.lock().await;
        let clamped = clamp_for_model(text, self.config.biencoder_max_length).to_string();
        let mut vecs = self.embed_request(vec![clamped]).await?;
        vecs.pop().context("no embedding returned")
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let _guard = self.call_lock.lock().await;
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.biencoder_batch_size.max(1)) {
            let clamped: Vec<String> = batch
                .iter()
                .map(|t| clamp_for_model(t, self.config.biencoder_max_length).to_string())
                .collect();
            let vecs = self.embed_request(clamped).await?;
            if vecs.len() != batch.len() {
                anyhow::bail!(
                    "embeddings endpoint returned {} vectors for {} inputs",
                    vecs.len(),
                    batch.len()
                );
            }
            all.extend(vecs);
        }
        Ok(all)
    }

    fn model_name(&self) -> &str {
        &self.config.biencoder_model
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsData>,
}

#[derive(Deserialize)]
struct EmbeddingsData {
    embedding: Vec<f32>,
}
