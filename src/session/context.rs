//! Conversation state carried across exchanges.
//!
//! [`ConversationContext`] holds the system prompt derived from the active
//! notes and the ordered turn history. Changing the system prompt means the
//! topic changed, so the history is cleared. History is only ever extended
//! in user/assistant pairs by a completed exchange, so its length stays even.

use serde::{Deserialize, Serialize};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The student asking.
    User,
    /// The assistant answering.
    Assistant,
}

/// One turn of the conversation, in wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Turn author.
    pub role: Role,
    /// Turn text.
    pub content: String,
}

/// System prompt plus paired turn history for one topic.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    system_prompt: String,
    history: Vec<Turn>,
    max_turns: usize,
}

impl ConversationContext {
    /// Create an empty context retaining at most `max_turns` question/answer
    /// pairs (0 = unlimited).
    pub fn new(max_turns: usize) -> Self {
        Self {
            system_prompt: String::new(),
            history: Vec::new(),
            max_turns,
        }
    }

    /// Returns the current system prompt.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Set the system prompt for a new topic.
    ///
    /// History from the previous topic would corrupt answers about the new
    /// one, so it is cleared.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
        self.history.clear();
    }

    /// Returns the turn history, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Number of completed question/answer exchanges.
    pub fn exchange_count(&self) -> usize {
        self.history.len() / 2
    }

    /// Append one completed question/answer pair.
    ///
    /// Called only after the backend signalled completion; partial answers
    /// are never committed.
    pub fn commit_exchange(&mut self, question: &str, answer: &str) {
        self.history.push(Turn {
            role: Role::User,
            content: question.to_owned(),
        });
        self.history.push(Turn {
            role: Role::Assistant,
            content: answer.to_owned(),
        });
        self.trim();
    }

    /// Drop oldest pairs beyond the retention limit, never splitting a pair.
    fn trim(&mut self) {
        if self.max_turns == 0 {
            return;
        }
        let max_entries = self.max_turns.saturating_mul(2);
        if self.history.len() > max_entries {
            let drain_end = self.history.len() - max_entries;
            self.history.drain(..drain_end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let ctx = ConversationContext::new(10);
        assert!(ctx.system_prompt().is_empty());
        assert!(ctx.history().is_empty());
        assert_eq!(ctx.exchange_count(), 0);
    }

    #[test]
    fn commit_appends_one_pair() {
        let mut ctx = ConversationContext::new(10);
        ctx.commit_exchange("What is a pharaoh?", "A ruler of ancient Egypt.");

        assert_eq!(ctx.history().len(), 2);
        assert_eq!(ctx.history()[0].role, Role::User);
        assert_eq!(ctx.history()[0].content, "What is a pharaoh?");
        assert_eq!(ctx.history()[1].role, Role::Assistant);
        assert_eq!(ctx.history()[1].content, "A ruler of ancient Egypt.");
        assert_eq!(ctx.exchange_count(), 1);
    }

    #[test]
    fn history_length_stays_even() {
        let mut ctx = ConversationContext::new(10);
        for i in 0..5 {
            ctx.commit_exchange(&format!("q{i}"), &format!("a{i}"));
            assert_eq!(ctx.history().len() % 2, 0);
        }
    }

    #[test]
    fn setting_system_prompt_clears_history() {
        let mut ctx = ConversationContext::new(10);
        ctx.set_system_prompt("Notes about Egypt");
        ctx.commit_exchange("q", "a");
        assert_eq!(ctx.history().len(), 2);

        ctx.set_system_prompt("Notes about asymptotics");
        assert_eq!(ctx.system_prompt(), "Notes about asymptotics");
        assert!(ctx.history().is_empty());
    }

    #[test]
    fn trims_oldest_pairs_beyond_retention() {
        let mut ctx = ConversationContext::new(2);
        ctx.commit_exchange("q0", "a0");
        ctx.commit_exchange("q1", "a1");
        ctx.commit_exchange("q2", "a2");

        assert_eq!(ctx.history().len(), 4);
        assert_eq!(ctx.history()[0].content, "q1");
        assert_eq!(ctx.history()[3].content, "a2");
    }

    #[test]
    fn zero_retention_is_unlimited() {
        let mut ctx = ConversationContext::new(0);
        for i in 0..50 {
            ctx.commit_exchange(&format!("q{i}"), &format!("a{i}"));
        }
        assert_eq!(ctx.history().len(), 100);
    }

    #[test]
    fn turns_serialize_to_wire_shape() {
        let turn = Turn {
            role: Role::Assistant,
            content: "hello".to_owned(),
        };
        let json = serde_json::to_string(&turn).unwrap_or_default();
        assert_eq!(json, r#"{"role":"assistant","content":"hello"}"#);
    }
}
