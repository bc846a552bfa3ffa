use crate::dice;
use crate::error::ChatError;
use crate::llm::InferenceBackend;
use crate::persona::compose_messages;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, post},
    Router,
};
use casus_shared::sse::{encode_reply, CONTENT_TYPE};
use casus_shared::{ChatMessage, ChatRequest, MessageRole};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn InferenceBackend>,
    pub max_messages: Option<usize>,
}

impl AppState {
    pub fn new(backend: Arc<dyn InferenceBackend>, max_messages: Option<usize>) -> Self {
        Self {
            backend,
            max_messages,
        }
    }
}

/// `/api/chat` for the chat stream, 404 for the rest of `/api/`, static files
/// for everything else.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/*rest", any(api_not_found))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn api_not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, ChatError> {
    let request: ChatRequest = serde_json::from_slice(&body)?;
    info!("Chat request with {} messages", request.messages.len());

    if let Some(reply) = local_command_reply(&request.messages) {
        info!("Answered local command without the model");
        return Ok(event_stream(Body::from(encode_reply(&reply))));
    }

    let messages = keep_recent(request.messages, state.max_messages);
    let messages = compose_messages(messages, request.casus.as_ref());
    let events = state.backend.stream_chat(messages).await?;
    Ok(event_stream(Body::from_stream(events)))
}

/// Reply for a slash-command in the latest user message, if it is one.
fn local_command_reply(messages: &[ChatMessage]) -> Option<String> {
    let last = messages.iter().rev().find(|m| m.role == MessageRole::User)?;
    dice::interpret(last.content.trim())
}

fn keep_recent(mut messages: Vec<ChatMessage>, max: Option<usize>) -> Vec<ChatMessage> {
    if let Some(max) = max {
        if messages.len() > max {
            let excess = messages.len() - max;
            messages.drain(..excess);
        }
    }
    messages
}

fn event_stream(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_recent_drops_oldest() {
        let messages: Vec<ChatMessage> = (0..5).map(|i| ChatMessage::user(i.to_string())).collect();
        let kept = keep_recent(messages.clone(), Some(2));
        assert_eq!(kept, messages[3..].to_vec());
        assert_eq!(keep_recent(messages.clone(), None), messages);
        assert_eq!(keep_recent(messages.clone(), Some(10)), messages);
    }

    #[test]
    fn command_is_read_from_latest_user_message() {
        let messages = vec![
            ChatMessage::user("/help"),
            ChatMessage::assistant("aide"),
            ChatMessage::user("raconte une histoire"),
        ];
        assert_eq!(local_command_reply(&messages), None);

        let messages = vec![ChatMessage::user("  /help  ")];
        assert_eq!(local_command_reply(&messages).as_deref(), Some(dice::HELP_TEXT));
    }
}
