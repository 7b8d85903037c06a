//! Session domain types and the store trait.
//!
//! A session is the ordered, per-conversation-key history of turns,
//! persisted across messages. The agent loop appends exactly two turns per
//! processed message (the user content and the final assistant content) and
//! saves the session once it reaches a final state — never mid-iteration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Who produced a persisted conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One persisted conversation turn. Appended, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The per-key conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The conversation key, `<channel>:<chat_id>`
    pub key: String,

    /// Ordered turns
    turns: Vec<Turn>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn to the history.
    pub fn append(&mut self, role: TurnRole, content: impl Into<String>) {
        self.updated_at = Utc::now();
        self.turns.push(Turn {
            role,
            content: content.into(),
            timestamp: self.updated_at,
        });
    }

    /// The ordered history.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// The session persistence contract.
///
/// Owned externally; the agent loop only references sessions by key.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session for `key`, creating an empty one if absent.
    async fn get_or_create(&self, key: &str) -> std::result::Result<Session, SessionError>;

    /// Persist the session.
    async fn save(&self, session: &Session) -> std::result::Result<(), SessionError>;
}
