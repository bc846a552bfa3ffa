use casus_shared::{CasusMode, CasusProfile, ChatMessage, ChatRequest};

/// Shown in place of a reply when the server cannot be reached.
pub const APOLOGY: &str =
    "Désolé, je n'arrive pas à joindre Casus pour le moment. Réessaie dans un instant.";

/// Commands handled by the client itself, never sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCommand {
    Reset,
    Mode(Option<String>),
    Univers(Option<String>),
    Style(Option<String>),
}

impl LocalCommand {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input, ""),
        };
        let value = (!rest.is_empty()).then(|| rest.to_string());
        match head.to_lowercase().as_str() {
            "/reset" => Some(Self::Reset),
            "/mode" => Some(Self::Mode(value.filter(|v| !v.eq_ignore_ascii_case("off")))),
            "/univers" => Some(Self::Univers(value)),
            "/style" => Some(Self::Style(value)),
            _ => None,
        }
    }
}

/// Conversation state of one terminal session.
#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    profile: CasusProfile,
    streaming: Option<String>,
    /// Identifies the request whose reply `streaming` collects.
    generation: u64,
    notice: Option<String>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn profile(&self) -> &CasusProfile {
        &self.profile
    }

    pub fn streaming(&self) -> Option<&str> {
        self.streaming.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn add_user_message(&mut self, content: String) {
        self.notice = None;
        self.messages.push(ChatMessage::user(content));
    }

    /// Body for `POST /api/chat` carrying the whole history.
    pub fn request(&self) -> ChatRequest {
        ChatRequest {
            messages: self.messages.clone(),
            casus: (!self.profile.is_empty()).then(|| self.profile.clone()),
        }
    }

    /// Opens a new reply and returns the generation its events must carry.
    pub fn start_streaming(&mut self) -> u64 {
        self.generation += 1;
        self.streaming = Some(String::new());
        self.generation
    }

    /// True while `generation` is the reply being streamed.
    pub fn is_current(&self, generation: u64) -> bool {
        self.streaming.is_some() && generation == self.generation
    }

    pub fn append(&mut self, generation: u64, delta: &str) {
        if !self.is_current(generation) {
            return;
        }
        if let Some(ref mut reply) = self.streaming {
            reply.push_str(delta);
        }
    }

    pub fn finish_streaming(&mut self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        if let Some(content) = self.streaming.take() {
            if !content.is_empty() {
                self.messages.push(ChatMessage::assistant(content));
            }
        }
    }

    /// Keeps whatever already arrived, then appends the apology.
    pub fn fail(&mut self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        self.finish_streaming(generation);
        self.messages.push(ChatMessage::assistant(APOLOGY));
    }

    /// Forgets the conversation; the profile stays. Events still in flight
    /// for the abandoned reply are ignored from now on.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.streaming = None;
        self.generation += 1;
        self.notice = Some("Conversation réinitialisée.".to_string());
    }

    pub fn apply(&mut self, command: LocalCommand) {
        let notice = match command {
            LocalCommand::Reset => {
                self.reset();
                return;
            }
            LocalCommand::Mode(mode) => match mode.as_deref().map(CasusMode::parse) {
                None => {
                    self.profile.mode = None;
                    "Mode retiré.".to_string()
                }
                Some(Some(parsed)) => {
                    self.profile.mode = Some(parsed.as_str().to_string());
                    format!("Mode : {}", parsed.as_str())
                }
                Some(None) => "Mode inconnu, utilise mj, joueur ou off.".to_string(),
            },
            LocalCommand::Univers(univers) => {
                let notice = match &univers {
                    Some(u) => format!("Univers : {u}"),
                    None => "Univers retiré.".to_string(),
                };
                self.profile.univers = univers;
                notice
            }
            LocalCommand::Style(style) => {
                let notice = match &style {
                    Some(s) => format!("Style : {s}"),
                    None => "Style retiré.".to_string(),
                };
                self.profile.style = style;
                notice
            }
        };
        self.notice = Some(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casus_shared::MessageRole;

    #[test]
    fn parses_local_commands() {
        assert_eq!(LocalCommand::parse("/reset"), Some(LocalCommand::Reset));
        assert_eq!(
            LocalCommand::parse("/mode  MJ "),
            Some(LocalCommand::Mode(Some("MJ".into())))
        );
        assert_eq!(LocalCommand::parse("/mode off"), Some(LocalCommand::Mode(None)));
        assert_eq!(
            LocalCommand::parse("/univers Space opera, ton léger"),
            Some(LocalCommand::Univers(Some("Space opera, ton léger".into())))
        );
        assert_eq!(LocalCommand::parse("/style"), Some(LocalCommand::Style(None)));
        assert_eq!(LocalCommand::parse("/roll 1d20"), None);
        assert_eq!(LocalCommand::parse("bonjour"), None);
    }

    #[test]
    fn streamed_reply_joins_history() {
        let mut session = ChatSession::new();
        session.add_user_message("Salut".into());
        let generation = session.start_streaming();
        session.append(generation, "Bon");
        session.append(generation, "jour");
        assert_eq!(session.streaming(), Some("Bonjour"));
        session.finish_streaming(generation);
        assert!(!session.is_streaming());
        assert_eq!(
            session.messages(),
            &[ChatMessage::user("Salut"), ChatMessage::assistant("Bonjour")]
        );
    }

    #[test]
    fn failure_appends_apology() {
        let mut session = ChatSession::new();
        session.add_user_message("Salut".into());
        let generation = session.start_streaming();
        session.fail(generation);
        let last = session.messages().last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(last.content, APOLOGY);
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn request_carries_profile_only_when_set() {
        let mut session = ChatSession::new();
        session.add_user_message("Salut".into());
        assert!(session.request().casus.is_none());

        session.apply(LocalCommand::Mode(Some("joueur".into())));
        session.apply(LocalCommand::Univers(Some("Donjons".into())));
        let profile = session.request().casus.unwrap();
        assert_eq!(profile.mode.as_deref(), Some("joueur"));
        assert_eq!(profile.univers.as_deref(), Some("Donjons"));
    }

    #[test]
    fn unknown_mode_leaves_profile_untouched() {
        let mut session = ChatSession::new();
        session.apply(LocalCommand::Mode(Some("mj".into())));
        session.apply(LocalCommand::Mode(Some("arbitre".into())));
        assert_eq!(session.profile().mode.as_deref(), Some("mj"));
        assert!(session.notice().unwrap().contains("inconnu"));
    }

    #[test]
    fn reset_clears_history_but_keeps_profile() {
        let mut session = ChatSession::new();
        session.apply(LocalCommand::Style(Some("concis".into())));
        session.add_user_message("Salut".into());
        session.start_streaming();
        session.apply(LocalCommand::Reset);
        assert!(session.messages().is_empty());
        assert!(!session.is_streaming());
        assert_eq!(session.profile().style.as_deref(), Some("concis"));
    }

    #[test]
    fn reply_abandoned_by_reset_does_not_leak_into_next_one() {
        let mut session = ChatSession::new();
        session.add_user_message("Raconte une histoire".into());
        let abandoned = session.start_streaming();
        session.apply(LocalCommand::Reset);

        session.add_user_message("/roll 1d6".into());
        let current = session.start_streaming();

        session.append(abandoned, "une fois");
        session.finish_streaming(abandoned);
        session.fail(abandoned);
        assert_eq!(session.streaming(), Some(""));

        session.append(current, "Total : 4");
        session.finish_streaming(current);
        assert_eq!(
            session.messages(),
            &[
                ChatMessage::user("/roll 1d6"),
                ChatMessage::assistant("Total : 4")
            ]
        );
    }

    #[test]
    fn events_after_finish_are_ignored() {
        let mut session = ChatSession::new();
        session.add_user_message("Salut".into());
        let generation = session.start_streaming();
        session.append(generation, "Bonjour");
        session.finish_streaming(generation);
        session.fail(generation);
        assert_eq!(session.messages().len(), 2);
        assert!(!session.is_current(generation));
    }
}
