use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Error taxonomy for the serving plane.
///
/// Rerank timeouts are deliberately not represented here: the pipeline
/// degrades by skipping the rerank stage and never surfaces them as errors.
#[derive(Error, Debug)]
pub enum HermesError {
    #[error("{0}")]
    Validation(String),

    #[error("No index loaded. Please index a repository first.")]
    NoIndex,

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Index integrity violation: {0}")]
    Integrity(String),

    #[error("Indexing failed: {0}")]
    Index(String),

    #[error("Metadata store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HermesError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HermesError::Validation(_) | HermesError::NoIndex => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HermesError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Integrity errors mean the artifact id spaces have diverged;
        // continuing would lie about results, so they surface as 500s.
        if matches!(self, HermesError::Integrity(_)) {
            tracing::error!("{self}");
        }
        let detail = match &self {
            HermesError::Model(_) => "Model call failed".to_string(),
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
