use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::Config;
use crate::embed::biencoder::{BiEncoder, HttpBiEncoder};
use crate::embed::crossencoder::{CrossEncoder, HttpCrossEncoder};
use crate::error::HermesError;
use crate::index::build::has_artifacts;
use crate::models::IndexingStatus;
use crate::search::pipeline::SearchPipeline;

/// Shared application state.
///
/// The live pipeline sits behind an atomic reference: handlers clone the
/// `Arc` out of the lock and run against that instance, so a reload swap
/// never interrupts an in-flight request.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<RwLock<Option<Arc<SearchPipeline>>>>,
    pub indexing: Arc<RwLock<IndexingStatus>>,
    pub biencoder: Arc<dyn BiEncoder>,
    pub crossencoder: Arc<dyn CrossEncoder>,
}

impl AppState {
    /// Build state with HTTP-backed model wrappers and, when a complete
    /// artifact set is already on disk, an eagerly loaded pipeline.
    pub fn new(config: Config) -> Result<Self, HermesError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| HermesError::Model(e.to_string()))?;

        let biencoder: Arc<dyn BiEncoder> =
            Arc::new(HttpBiEncoder::new(client.clone(), config.embed.clone()));
        let crossencoder: Arc<dyn CrossEncoder> =
            Arc::new(HttpCrossEncoder::new(client, config.embed.clone()));

        Self::with_encoders(config, biencoder, crossencoder)
    }

    /// Build state around caller-supplied model wrappers.
    pub fn with_encoders(
        config: Config,
        biencoder: Arc<dyn BiEncoder>,
        crossencoder: Arc<dyn CrossEncoder>,
    ) -> Result<Self, HermesError> {
        let pipeline = if has_artifacts(&config.artifacts_dir) {
            match SearchPipeline::load(config.clone(), biencoder.clone(), crossencoder.clone()) {
                Ok(p) => Some(Arc::new(p)),
                Err(err) => {
                    tracing::warn!("artifacts present but pipeline failed to load: {err}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            config,
            pipeline: Arc::new(RwLock::new(pipeline)),
            indexing: Arc::new(RwLock::new(IndexingStatus::Idle)),
            biencoder,
            crossencoder,
        })
    }

    /// The current pipeline, or the no-index client error.
    pub fn pipeline(&self) -> Result<Arc<SearchPipeline>, HermesError> {
        self.pipeline.read().clone().ok_or(HermesError::NoIndex)
    }
}
