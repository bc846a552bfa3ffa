//! Server-Sent Events framing for the chat stream.
//!
//! The wire format is a sequence of `data: <payload>` lines, each event closed
//! by a blank line, ending with the literal payload `[DONE]`.

use serde::Deserialize;

pub const DONE_SENTINEL: &str = "[DONE]";
pub const CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// Encodes a finished reply as one `{ "response": ... }` event plus the
/// `[DONE]` sentinel.
pub fn encode_reply(text: &str) -> String {
    let payload = serde_json::json!({ "response": text });
    format!("data: {payload}\n\ndata: {DONE_SENTINEL}\n\n")
}

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Data(String),
    Done,
}

/// Incremental decoder carrying partial events across network reads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    // Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    buffer: String,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feeds one chunk and returns the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }
        let text = self.decode_utf8(chunk);
        self.buffer.push_str(&text);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        self.drain_events()
    }

    /// Flushes whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.buffer.push_str(&tail);
        }
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        self.buffer.push_str("\n\n");
        let frames = self.drain_events();
        self.buffer.clear();
        frames
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut text = String::new();
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    text.push_str(
                        std::str::from_utf8(&self.pending[start..valid_end]).unwrap_or_default(),
                    );
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // Incomplete sequence at the end: hold it for the next chunk.
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        text
    }

    fn drain_events(&mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let raw: String = self.buffer.drain(..pos + 2).collect();
            let Some(data) = event_data(&raw[..pos]) else {
                continue;
            };
            if data == DONE_SENTINEL {
                frames.push(SseFrame::Done);
                self.finished = true;
                self.buffer.clear();
                self.pending.clear();
                break;
            }
            frames.push(SseFrame::Data(data));
        }
        frames
    }
}

/// Joins the `data:` lines of one raw event, `None` if it has none.
fn event_data(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw
        .split('\n')
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// The two payload shapes accepted on the stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StreamPayload {
    /// Workers AI style: `{ "response": "..." }`.
    Response { response: String },
    /// OpenAI style: `{ "choices": [{ "delta": { "content": "..." } }] }`.
    Completion { choices: Vec<CompletionChoice> },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub delta: CompletionDelta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompletionDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamPayload {
    pub fn parse(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }

    pub fn text(&self) -> String {
        match self {
            Self::Response { response } => response.clone(),
            Self::Completion { choices } => choices
                .iter()
                .filter_map(|c| c.delta.content.as_deref())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn decode_all(chunks: &[&[u8]]) -> Vec<SseFrame> {
        let mut decoder = SseDecoder::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(decoder.feed(chunk));
        }
        frames.extend(decoder.finish());
        frames
    }

    fn reply_text(frames: &[SseFrame]) -> String {
        frames
            .iter()
            .filter_map(|f| match f {
                SseFrame::Data(d) => StreamPayload::parse(d).ok().map(|p| p.text()),
                SseFrame::Done => None,
            })
            .collect()
    }

    #[test]
    fn encoder_emits_two_events() {
        assert_eq!(
            encode_reply("Salut"),
            "data: {\"response\":\"Salut\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[test]
    fn decodes_encoder_output() {
        let bytes = encode_reply("ligne 1\nligne 2");
        let frames = decode_all(&[bytes.as_bytes()]);
        assert_eq!(frames.last(), Some(&SseFrame::Done));
        assert_eq!(reply_text(&frames), "ligne 1\nligne 2");
    }

    #[test]
    fn partial_event_waits_for_boundary() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"respo").is_empty());
        assert!(decoder.feed(b"nse\":\"a\"}\n").is_empty());
        assert_eq!(
            decoder.feed(b"\n"),
            vec![SseFrame::Data("{\"response\":\"a\"}".into())]
        );
    }

    #[test]
    fn crlf_split_across_chunks_is_normalized() {
        let frames = decode_all(&[b"data: x\r", b"\n\r", b"\ndata: [DONE]\r\n\r\n"]);
        assert_eq!(frames, vec![SseFrame::Data("x".into()), SseFrame::Done]);
    }

    #[test]
    fn multiple_data_lines_are_joined() {
        let frames = decode_all(&[b"data: a\ndata:b\ndata:   c\n\n"]);
        assert_eq!(frames, vec![SseFrame::Data("a\nb\nc".into())]);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let frames = decode_all(&[b": keep-alive\n\nevent: message\nid: 4\ndata: y\nretry: 10\n\n"]);
        assert_eq!(frames, vec![SseFrame::Data("y".into())]);
    }

    #[test]
    fn done_stops_processing_within_same_chunk() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: a\n\ndata: [DONE]\n\ndata: b\n\n");
        assert_eq!(frames, vec![SseFrame::Data("a".into()), SseFrame::Done]);
        assert!(decoder.is_finished());
        assert!(decoder.feed(b"data: c\n\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn finish_flushes_trailing_event() {
        let frames = decode_all(&[b"data: a\n\ndata: tail"]);
        assert_eq!(
            frames,
            vec![SseFrame::Data("a".into()), SseFrame::Data("tail".into())]
        );
    }

    #[test]
    fn split_multibyte_character_survives() {
        let bytes = "data: é\n\n".as_bytes();
        // 'é' is two bytes; cut between them.
        let cut = "data: ".len() + 1;
        let frames = decode_all(&[&bytes[..cut], &bytes[cut..]]);
        assert_eq!(frames, vec![SseFrame::Data("é".into())]);
    }

    #[test]
    fn invalid_byte_does_not_swallow_split_character() {
        let whole = decode_all(&[b"data: \xFF\xC3\xA9\n\n"]);
        let split = decode_all(&[b"data: \xFF\xC3", b"\xA9\n\n"]);
        assert_eq!(whole, vec![SseFrame::Data("\u{FFFD}é".into())]);
        assert_eq!(split, whole);
    }

    fn split_at_cuts<'a>(bytes: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
        let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
        points.sort_unstable();
        let mut chunks = Vec::new();
        let mut start = 0;
        for p in points {
            chunks.push(&bytes[start..p]);
            start = p;
        }
        chunks.push(&bytes[start..]);
        chunks
    }

    #[rstest]
    #[case(r#"{"response":"abc"}"#, "abc")]
    #[case(r#"{"response":"","usage":{"prompt_tokens":3}}"#, "")]
    #[case(r#"{"choices":[{"delta":{"content":"xy"}}]}"#, "xy")]
    #[case(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#, "")]
    #[case(r#"{"choices":[]}"#, "")]
    fn payload_shapes(#[case] data: &str, #[case] expected: &str) {
        assert_eq!(StreamPayload::parse(data).unwrap().text(), expected);
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"other":1}"#)]
    #[case(r#"{"response":42}"#)]
    fn unknown_payloads_fail(#[case] data: &str) {
        assert!(StreamPayload::parse(data).is_err());
    }

    proptest! {
        #[test]
        fn decoding_is_split_invariant(text in "\\PC*", cuts in proptest::collection::vec(any::<usize>(), 0..8)) {
            let encoded = encode_reply(&text);
            let frames = decode_all(&split_at_cuts(encoded.as_bytes(), &cuts));
            prop_assert_eq!(frames.last(), Some(&SseFrame::Done));
            prop_assert_eq!(reply_text(&frames), text);
        }

        #[test]
        fn malformed_bytes_decode_the_same_in_any_split(
            body in proptest::collection::vec(
                proptest::sample::select(vec![b'a', b'\n', b'\r', b':', 0xC3, 0xA9, 0xE2, 0x82, 0xAC, 0xFF, 0x80]),
                0..48,
            ),
            cuts in proptest::collection::vec(any::<usize>(), 0..8),
        ) {
            let mut bytes = b"data: ".to_vec();
            bytes.extend_from_slice(&body);
            let whole = decode_all(&[bytes.as_slice()]);
            prop_assert_eq!(decode_all(&split_at_cuts(&bytes, &cuts)), whole);
        }
    }
}
