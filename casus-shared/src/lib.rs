use serde::{Deserialize, Serialize};

pub mod reply;
pub mod sse;

pub use reply::ReplyAssembler;
pub use sse::{encode_reply, SseDecoder, SseFrame, StreamPayload};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Game role the user wants Casus to take for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasusMode {
    /// Casus runs the game.
    Mj,
    /// Casus assists a player.
    Joueur,
}

impl CasusMode {
    /// Lenient parse: surrounding whitespace and case are ignored, anything
    /// else than `mj`/`joueur` is no mode at all.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "mj" => Some(Self::Mj),
            "joueur" => Some(Self::Joueur),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mj => "mj",
            Self::Joueur => "joueur",
        }
    }
}

/// Optional per-request persona settings sent alongside the messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasusProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub univers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl CasusProfile {
    pub fn mode(&self) -> Option<CasusMode> {
        self.mode.as_deref().and_then(CasusMode::parse)
    }

    pub fn univers(&self) -> Option<&str> {
        non_blank(self.univers.as_deref())
    }

    pub fn style(&self) -> Option<&str> {
        non_blank(self.style.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.mode().is_none() && self.univers().is_none() && self.style().is_none()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub casus: Option<CasusProfile>,
}
