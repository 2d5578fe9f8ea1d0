use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::message::Turn;

/// Title every session starts with until it is derived from the first user turn.
pub const NEW_CHAT_TITLE: &str = "New Chat";

/// Maximum number of characters kept from the first user turn when deriving a title.
pub const TITLE_MAX_CHARS: usize = 32;

const TITLE_ELLIPSIS: char = '…';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    title: String,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            title: NEW_CHAT_TITLE.into(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn has_derived_title(&self) -> bool {
        self.title != NEW_CHAT_TITLE
    }

    /// Append-only: turns are never edited or removed once pushed.
    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Sets the title from the first non-empty user turn while the title is
    /// still the sentinel. Returns true when the title changed.
    pub fn derive_title_if_needed(&mut self) -> bool {
        if self.has_derived_title() {
            return false;
        }
        let first = self
            .turns
            .iter()
            .find(|t| t.is_user() && !t.content().is_empty());
        match first {
            Some(turn) => {
                self.title = title_from(turn.content());
                true
            }
            None => false,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps up to 32 characters; longer text gets the first 32 plus an ellipsis.
pub fn title_from(content: &str) -> String {
    if content.chars().count() <= TITLE_MAX_CHARS {
        return content.to_string();
    }
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    title.push(TITLE_ELLIPSIS);
    title
}

/// All sessions of the running client plus the active selection.
///
/// The registry is never empty and `active_index` always points at an
/// existing session.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    active_index: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: vec![Session::new()],
            active_index: 0,
        }
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn active(&self) -> &Session {
        &self.sessions[self.active_index]
    }

    pub fn active_id(&self) -> SessionId {
        self.active().id()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    pub fn index_of(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == id)
    }

    pub fn create_session(&mut self) -> SessionId {
        let session = Session::new();
        let id = session.id();
        self.sessions.push(session);
        self.active_index = self.sessions.len() - 1;
        id
    }

    /// Out-of-range indices are ignored. Returns true when the index was valid.
    pub fn select_session(&mut self, index: usize) -> bool {
        if index < self.sessions.len() {
            self.active_index = index;
            true
        } else {
            false
        }
    }

    pub fn append_turn(&mut self, id: SessionId, turn: Turn) -> bool {
        match self.get_mut(id) {
            Some(session) => {
                session.push_turn(turn);
                true
            }
            None => false,
        }
    }

    pub fn derive_title_if_needed(&mut self, id: SessionId) -> bool {
        self.get_mut(id)
            .map(Session::derive_title_if_needed)
            .unwrap_or(false)
    }

    /// Title as shown in a session list; empty titles fall back to `Chat <n>`.
    pub fn display_title(&self, index: usize) -> Option<String> {
        self.sessions.get(index).map(|s| {
            if s.title().is_empty() {
                format!("Chat {}", index + 1)
            } else {
                s.title().to_string()
            }
        })
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
