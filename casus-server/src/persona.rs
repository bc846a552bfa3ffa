use casus_shared::{CasusMode, CasusProfile, ChatMessage, MessageRole};

/// Phrase identifying the base persona inside an existing system message.
pub const PERSONA_MARKER: &str = "Tu es Casus";

const BASE_PERSONA: &str = "Tu es Casus, un assistant de jeu de rôle francophone. \
Tu aides à préparer et à faire vivre des parties : scénarios, personnages non joueurs, \
descriptions, règles et idées d'intrigue. Réponds toujours en français, de façon vivante \
mais concise. Les joueurs peuvent lancer des dés avec /roll et obtenir l'aide avec /help.";

const MODE_MJ: &str = "Mode : tu es le maître du jeu. Tu décris le monde, incarnes les \
personnages non joueurs et fais avancer l'intrigue en réagissant aux actions des joueurs.";

const MODE_JOUEUR: &str = "Mode : tu assistes un joueur. Tu l'aides à interpréter son \
personnage, à comprendre les règles et à choisir ses actions, sans prendre la place du maître du jeu.";

pub fn base_persona_message() -> ChatMessage {
    ChatMessage::system(BASE_PERSONA)
}

fn mode_line(mode: CasusMode) -> &'static str {
    match mode {
        CasusMode::Mj => MODE_MJ,
        CasusMode::Joueur => MODE_JOUEUR,
    }
}

/// System message carrying the per-request profile, `None` if every field is
/// absent or blank.
pub fn build_profile_message(profile: &CasusProfile) -> Option<ChatMessage> {
    let mut lines: Vec<String> = Vec::with_capacity(3);
    if let Some(mode) = profile.mode() {
        lines.push(mode_line(mode).to_string());
    }
    if let Some(univers) = profile.univers() {
        lines.push(format!("Univers et ton : {univers}"));
    }
    if let Some(style) = profile.style() {
        lines.push(format!("Contraintes de style : {style}"));
    }
    if lines.is_empty() {
        None
    } else {
        Some(ChatMessage::system(lines.join("\n")))
    }
}

fn is_persona(msg: &ChatMessage) -> bool {
    msg.role == MessageRole::System && msg.content.contains(PERSONA_MARKER)
}

/// Puts the base persona first unless the client already sent it, then the
/// profile message right after it.
pub fn compose_messages(
    mut messages: Vec<ChatMessage>,
    profile: Option<&CasusProfile>,
) -> Vec<ChatMessage> {
    let persona_at = match messages.iter().position(is_persona) {
        Some(i) => i,
        None => {
            messages.insert(0, base_persona_message());
            0
        }
    };
    if let Some(extra) = profile.and_then(build_profile_message) {
        messages.insert(persona_at + 1, extra);
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(mode: Option<&str>, univers: Option<&str>, style: Option<&str>) -> CasusProfile {
        CasusProfile {
            mode: mode.map(String::from),
            univers: univers.map(String::from),
            style: style.map(String::from),
        }
    }

    #[test]
    fn base_persona_contains_marker() {
        assert!(base_persona_message().content.contains(PERSONA_MARKER));
    }

    #[test]
    fn empty_profile_yields_no_message() {
        assert_eq!(build_profile_message(&CasusProfile::default()), None);
        assert_eq!(
            build_profile_message(&profile(Some(" "), Some("  "), Some(""))),
            None
        );
    }

    #[test]
    fn profile_lines_follow_fixed_order() {
        let msg = build_profile_message(&profile(
            Some("joueur"),
            Some(" Cyberpunk, sombre "),
            Some("phrases courtes"),
        ))
        .unwrap();
        assert_eq!(msg.role, MessageRole::System);
        let lines: Vec<&str> = msg.content.lines().collect();
        assert_eq!(
            lines,
            vec![
                MODE_JOUEUR,
                "Univers et ton : Cyberpunk, sombre",
                "Contraintes de style : phrases courtes",
            ]
        );
    }

    #[test]
    fn only_provided_fields_produce_lines() {
        let msg = build_profile_message(&profile(None, None, Some("tutoiement"))).unwrap();
        assert_eq!(msg.content, "Contraintes de style : tutoiement");

        let msg = build_profile_message(&profile(Some("MJ"), None, None)).unwrap();
        assert_eq!(msg.content, MODE_MJ);
    }

    #[test]
    fn persona_is_inserted_first() {
        let composed = compose_messages(vec![ChatMessage::user("salut")], None);
        assert_eq!(composed, vec![base_persona_message(), ChatMessage::user("salut")]);
    }

    #[test]
    fn existing_persona_is_not_duplicated() {
        let existing = ChatMessage::system("Tu es Casus, version du client.");
        let messages = vec![
            ChatMessage::user("avant"),
            existing.clone(),
            ChatMessage::user("après"),
        ];
        let composed = compose_messages(messages, Some(&profile(Some("mj"), None, None)));
        assert_eq!(
            composed,
            vec![
                ChatMessage::user("avant"),
                existing,
                ChatMessage::system(MODE_MJ),
                ChatMessage::user("après"),
            ]
        );
    }

    #[test]
    fn marker_in_user_message_does_not_count() {
        let composed = compose_messages(vec![ChatMessage::user("Tu es Casus ?")], None);
        assert_eq!(composed.len(), 2);
        assert_eq!(composed[0], base_persona_message());
    }

    #[test]
    fn profile_follows_inserted_persona() {
        let composed = compose_messages(
            vec![ChatMessage::user("go")],
            Some(&profile(None, Some("Donjons"), None)),
        );
        assert_eq!(composed[0], base_persona_message());
        assert_eq!(composed[1], ChatMessage::system("Univers et ton : Donjons"));
        assert_eq!(composed[2], ChatMessage::user("go"));
    }
}
