use crate::sse::{SseDecoder, SseFrame, StreamPayload};
use tracing::warn;

/// Turns a chunked event stream into the growing assistant reply.
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    decoder: SseDecoder,
    text: String,
}

impl ReplyAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk, returning the text increments it produced.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let frames = self.decoder.feed(chunk);
        self.apply(frames)
    }

    /// Call once the byte stream has ended.
    pub fn finish(&mut self) -> Vec<String> {
        let frames = self.decoder.finish();
        self.apply(frames)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// True once `[DONE]` was seen.
    pub fn is_done(&self) -> bool {
        self.decoder.is_finished()
    }

    fn apply(&mut self, frames: Vec<SseFrame>) -> Vec<String> {
        let mut deltas = Vec::new();
        for frame in frames {
            let SseFrame::Data(data) = frame else {
                break;
            };
            match StreamPayload::parse(&data) {
                Ok(payload) => {
                    let delta = payload.text();
                    if !delta.is_empty() {
                        self.text.push_str(&delta);
                        deltas.push(delta);
                    }
                }
                Err(e) => {
                    warn!("Skipping undecodable stream payload: {} ({})", e, data);
                }
            }
        }
        deltas
    }
}
