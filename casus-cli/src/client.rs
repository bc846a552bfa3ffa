use anyhow::{Context, Result};
use casus_shared::{ChatRequest, ReplyAssembler};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    Delta(String),
    Done,
    Failed(String),
}

/// Progress of one request, tagged with the generation it was sent under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    pub generation: u64,
    pub kind: ReplyKind,
}

pub struct BackendClient {
    http: reqwest::Client,
    chat_url: String,
    tx: mpsc::UnboundedSender<ReplyEvent>,
}

impl BackendClient {
    pub fn new(server_url: &str) -> (Self, mpsc::UnboundedReceiver<ReplyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            http: reqwest::Client::new(),
            chat_url: format!("{}/api/chat", server_url.trim_end_matches('/')),
            tx,
        };
        (client, rx)
    }

    /// Streams the reply to `request` in the background. Every event it
    /// produces carries `generation`.
    pub fn send(&self, generation: u64, request: ChatRequest) {
        let http = self.http.clone();
        let url = self.chat_url.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            info!("Sending {} messages to {}", request.messages.len(), url);
            let kind = match stream_reply(&http, &url, &request, generation, &tx).await {
                Ok(()) => ReplyKind::Done,
                Err(e) => {
                    error!("Chat request failed: {:#}", e);
                    ReplyKind::Failed(e.to_string())
                }
            };
            if tx.send(ReplyEvent { generation, kind }).is_err() {
                error!("Failed to deliver final reply event");
            }
        });
    }
}

async fn stream_reply(
    http: &reqwest::Client,
    url: &str,
    request: &ChatRequest,
    generation: u64,
    tx: &mpsc::UnboundedSender<ReplyEvent>,
) -> Result<()> {
    let delta = |text| ReplyEvent {
        generation,
        kind: ReplyKind::Delta(text),
    };
    let response = http
        .post(url)
        .json(request)
        .send()
        .await
        .context("server unreachable")?
        .error_for_status()
        .context("server rejected the request")?;

    let mut assembler = ReplyAssembler::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("stream interrupted")?;
        for text in assembler.push(&chunk) {
            tx.send(delta(text))?;
        }
        if assembler.is_done() {
            debug!("Received end of stream");
            return Ok(());
        }
    }
    for text in assembler.finish() {
        tx.send(delta(text))?;
    }
    Ok(())
}
