use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

/// Generic body returned to the browser; details only go to the log.
pub const ERROR_BODY: &str = "Erreur interne du serveur";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request body: {0}")]
    InvalidRequest(#[from] serde_json::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("openai: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        error!("Chat request failed: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": ERROR_BODY })),
        )
            .into_response()
    }
}
