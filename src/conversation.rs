use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum number of turns retained in memory.
const HISTORY_CAP: usize = 5;

/// Number of trailing turns rendered into the translation prompt.
const PROMPT_WINDOW: usize = 3;

/// One completed question/SQL exchange within a conversation. Only
/// successful turns are recorded; failed translations or executions leave
/// the history untouched.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub question: String,
    pub sql: String,
    pub row_count: usize,
    pub visualization_type: Option<String>,
    pub asked_at: DateTime<Utc>,
}

/// Ordered conversation history, oldest turn first. Lives for the process
/// lifetime unless explicitly reset. The orchestrator owns the single
/// instance and serializes all access to it.
#[derive(Debug, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);

        // Cap history to prevent prompt context overflow
        if self.turns.len() > HISTORY_CAP {
            let excess = self.turns.len() - HISTORY_CAP;
            self.turns.drain(..excess);
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Renders the last few turns for the translation prompt so follow-up
    /// questions can resolve against the preceding SQL.
    pub fn to_prompt(&self) -> String {
        let start = self.turns.len().saturating_sub(PROMPT_WINDOW);
        self.turns[start..]
            .iter()
            .map(|turn| format!("Question: {}\nSQL: {}", turn.question, turn.sql))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
