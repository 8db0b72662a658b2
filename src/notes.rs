//! Builds the assistant's system prompt from lecture-note text.
//!
//! Note storage and editing live outside this crate; callers hand in the
//! plain text of whatever notes are open and get back the system prompt for
//! a [`ConversationContext`](crate::session::context::ConversationContext).

/// Upper bound on note text forwarded to the backend. Longer notes are
/// truncated so the request stays within the model's context window.
const MAX_NOTE_CHARS: usize = 8_000;

/// Build the study-assistant system prompt for a set of notes.
pub fn build_study_prompt(title: &str, note_text: &str) -> String {
    let trimmed = note_text.trim();
    let body: String = if trimmed.chars().count() > MAX_NOTE_CHARS {
        let mut truncated: String = trimmed.chars().take(MAX_NOTE_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        trimmed.to_owned()
    };

    format!(
        "You are a study assistant helping a student with their lecture notes on \"{title}\".\n\
         Answer questions using the notes below as the primary source. When the notes \
         do not cover something, say so before answering from general knowledge. Keep \
         explanations clear and encouraging.\n\n\
         NOTES:\n{body}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_the_topic_and_includes_notes() {
        let prompt = build_study_prompt("Ancient Egypt", "The pharaoh ruled everything.");
        assert!(prompt.contains("Ancient Egypt"));
        assert!(prompt.contains("The pharaoh ruled everything."));
    }

    #[test]
    fn long_notes_are_truncated() {
        let notes = "x".repeat(MAX_NOTE_CHARS * 2);
        let prompt = build_study_prompt("Topic", &notes);
        assert!(prompt.len() < notes.len());
        assert!(prompt.contains("..."));
    }

    #[test]
    fn surrounding_whitespace_is_stripped() {
        let prompt = build_study_prompt("Topic", "\n\n  content  \n");
        assert!(prompt.ends_with("content"));
    }
}
