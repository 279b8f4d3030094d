//! Conversation context for one model session.
//!
//! The transcript is a single growing string: the preamble for the active
//! model followed by every completed `User:`/`AI:` exchange. It is resent in
//! full with every request and is never truncated.

use std::collections::HashMap;

use tracing::{info, warn};

/// System instruction prepended to every transcript unless configured otherwise.
pub const DEFAULT_PREAMBLE: &str = "You are a universal AI tutor with expert knowledge in all subjects \
including science, math, medicine, engineering, history, arts, law, and technology. \
Explain clearly and accurately.\n\n";

/// Preamble text per model, with a shared fallback.
#[derive(Debug, Clone)]
pub struct Preambles {
    default: String,
    overrides: HashMap<String, String>,
}

impl Preambles {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, model: impl Into<String>, text: impl Into<String>) -> Self {
        self.overrides.insert(model.into(), text.into());
        self
    }

    pub fn for_model(&self, model: &str) -> &str {
        self.overrides
            .get(model)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }
}

impl Default for Preambles {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE)
    }
}

/// Snapshot of a send that has been started but not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub model: String,
    pub user_text: String,
    pub prompt: String,
    epoch: u64,
}

#[derive(Debug, Clone)]
pub struct Session {
    model: String,
    transcript: String,
    preambles: Preambles,
    turns: usize,
    epoch: u64,
}

impl Session {
    pub fn new(model: impl Into<String>, preambles: Preambles) -> Self {
        let model = model.into();
        let transcript = preambles.for_model(&model).to_string();
        Self {
            model,
            transcript,
            preambles,
            turns: 0,
            epoch: 0,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn preamble(&self) -> &str {
        self.preambles.for_model(&self.model)
    }

    /// Number of turns appended since the last reset.
    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Switch to `model` and drop every prior turn.
    pub fn reset(&mut self, model: &str) {
        info!(from = %self.model, to = %model, "resetting session");
        self.model = model.to_string();
        self.transcript = self.preambles.for_model(model).to_string();
        self.turns = 0;
        self.epoch += 1;
    }

    pub fn append_turn(&mut self, user_text: &str, reply_text: &str) {
        self.transcript.push_str("User: ");
        self.transcript.push_str(user_text);
        self.transcript.push_str("\nAI: ");
        self.transcript.push_str(reply_text);
        self.transcript.push('\n');
        self.turns += 1;
    }

    /// Full prompt for the next request: transcript plus an open `AI:` marker.
    pub fn prompt_for(&self, user_text: &str) -> String {
        format!("{}User: {}\nAI:", self.transcript, user_text)
    }

    pub fn start_turn(&self, user_text: &str) -> Turn {
        Turn {
            model: self.model.clone(),
            user_text: user_text.to_string(),
            prompt: self.prompt_for(user_text),
            epoch: self.epoch,
        }
    }

    /// Append a finished turn. Returns false, leaving the transcript alone,
    /// when the session was reset after the turn started.
    pub fn commit(&mut self, turn: &Turn, reply: &str) -> bool {
        if turn.epoch != self.epoch || turn.model != self.model {
            warn!(model = %turn.model, "discarding reply for a session that was reset");
            return false;
        }
        self.append_turn(&turn.user_text, reply);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("llama3", Preambles::default())
    }

    #[test]
    fn test_new_session_starts_with_preamble() {
        let session = session();
        assert_eq!(session.transcript(), DEFAULT_PREAMBLE);
        assert_eq!(session.model(), "llama3");
        assert_eq!(session.turns(), 0);
    }

    #[test]
    fn test_append_turn_format() {
        let mut session = session();
        session.append_turn("What is 2+2?", "4");
        assert_eq!(
            session.transcript(),
            format!("{}User: What is 2+2?\nAI: 4\n", DEFAULT_PREAMBLE)
        );
        assert_eq!(session.turns(), 1);
    }

    #[test]
    fn test_prompt_for_leaves_ai_marker_open() {
        let mut session = session();
        session.append_turn("hi", "hello");
        let prompt = session.prompt_for("how are you?");
        assert_eq!(
            prompt,
            format!("{}User: hi\nAI: hello\nUser: how are you?\nAI:", DEFAULT_PREAMBLE)
        );
        // Building a prompt never touches the transcript.
        assert!(!session.transcript().contains("how are you?"));
    }

    #[test]
    fn test_reset_discards_turns() {
        let mut session = session();
        session.append_turn("a", "b");
        session.reset("phi3");
        assert_eq!(session.model(), "phi3");
        assert_eq!(session.transcript(), DEFAULT_PREAMBLE);
        assert_eq!(session.turns(), 0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut once = session();
        once.append_turn("a", "b");
        once.reset("phi3");

        let mut twice = session();
        twice.append_turn("a", "b");
        twice.reset("phi3");
        twice.reset("phi3");

        assert_eq!(once.transcript(), twice.transcript());
        assert_eq!(once.model(), twice.model());
    }

    #[test]
    fn test_reset_uses_model_preamble() {
        let preambles = Preambles::default().with_override("phi3", "You are terse.\n\n");
        let mut session = Session::new("llama3", preambles);
        session.append_turn("a", "b");
        session.reset("phi3");
        assert_eq!(session.transcript(), "You are terse.\n\n");
        assert_eq!(session.preamble(), "You are terse.\n\n");

        session.reset("llama3");
        assert_eq!(session.transcript(), DEFAULT_PREAMBLE);
    }

    #[test]
    fn test_commit_appends_turn() {
        let mut session = session();
        let turn = session.start_turn("hello");
        assert!(session.commit(&turn, "hi there"));
        assert!(session.transcript().ends_with("User: hello\nAI: hi there\n"));
    }

    #[test]
    fn test_commit_after_reset_is_discarded() {
        let mut session = session();
        let turn = session.start_turn("hello");
        session.reset("llama3");
        let before = session.transcript().to_string();

        assert!(!session.commit(&turn, "stale"));
        assert_eq!(session.transcript(), before);
    }
}
