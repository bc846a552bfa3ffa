use crate::config::{BackendConfig, ServerConfig};
use crate::error::ChatError;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::BoxError;
use casus_shared::sse::DONE_SENTINEL;
use casus_shared::{ChatMessage, MessageRole};
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Raw SSE bytes as they should reach the browser.
pub type EventStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// A hosted model that answers a conversation with an event stream.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<EventStream, ChatError>;
}

pub fn backend_from_config(config: &ServerConfig) -> Arc<dyn InferenceBackend> {
    match &config.backend {
        BackendConfig::WorkersAi {
            base_url,
            account_id,
            api_token,
        } => Arc::new(WorkersAiBackend::new(
            base_url,
            account_id,
            api_token.clone(),
            config.model.clone(),
            config.max_tokens,
        )),
        BackendConfig::OpenAi { api_key, base_url } => Arc::new(OpenAiBackend::new(
            api_key.clone(),
            base_url.clone(),
            config.model.clone(),
            config.max_tokens,
        )),
    }
}

#[derive(Serialize)]
struct WorkersAiRequest<'a> {
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

/// Cloudflare Workers AI; its SSE body is relayed untouched.
pub struct WorkersAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    max_tokens: u32,
}

impl WorkersAiBackend {
    pub fn new(
        base_url: &str,
        account_id: &str,
        api_token: String,
        model: String,
        max_tokens: u32,
    ) -> Self {
        let endpoint = format!(
            "{}/accounts/{}/ai/run/{}",
            base_url.trim_end_matches('/'),
            account_id,
            model
        );
        info!("Initializing Workers AI backend with model: {}", model);
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_token,
            max_tokens,
        }
    }
}

#[async_trait]
impl InferenceBackend for WorkersAiBackend {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<EventStream, ChatError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .header("accept", "text/event-stream")
            .json(&WorkersAiRequest {
                messages: &messages,
                max_tokens: self.max_tokens,
                stream: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes_stream().map_err(BoxError::from).boxed())
    }
}

/// Any OpenAI-compatible chat completions API, re-framed as SSE with the
/// `choices[].delta.content` payload shape.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(api_key: String, base_url: Option<String>, model: String, max_tokens: u32) -> Self {
        info!("Initializing OpenAI backend with model: {}", model);
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            model,
            max_tokens,
        }
    }

    fn convert_message(msg: ChatMessage) -> Result<ChatCompletionRequestMessage, ChatError> {
        let message = match msg.role {
            MessageRole::System => ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(msg.content)
                    .build()?,
            ),
            MessageRole::User => ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.content)
                    .build()?,
            ),
            MessageRole::Assistant => ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.content)
                    .build()?,
            ),
        };
        Ok(message)
    }
}

/// One `data:` event in the OpenAI delta shape.
fn delta_event(content: &str) -> Bytes {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    Bytes::from(format!("data: {payload}\n\n"))
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<EventStream, ChatError> {
        let messages = messages
            .into_iter()
            .map(Self::convert_message)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(self.max_tokens)
            .stream(true)
            .build()?;

        let upstream = self.client.chat().create_stream(request).await.map_err(|e| {
            error!("Failed to create OpenAI stream: {:?}", e);
            e
        })?;

        let events = upstream
            .filter_map(|result| async move {
                match result {
                    Ok(response) => {
                        let content: String = response
                            .choices
                            .iter()
                            .filter_map(|choice| choice.delta.content.as_deref())
                            .collect();
                        (!content.is_empty()).then(|| Ok(delta_event(&content)))
                    }
                    Err(e) => {
                        error!("OpenAI stream error: {:?}", e);
                        Some(Err(BoxError::from(e)))
                    }
                }
            })
            .chain(stream::once(async {
                Ok(Bytes::from(format!("data: {DONE_SENTINEL}\n\n")))
            }));

        Ok(events.boxed())
    }
}
