//! Conversation memory
//!
//! Process-local, per-session interaction history. Nothing is persisted;
//! sessions live until cleared or until the process exits.

pub mod types;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::MemoryConfig;
use crate::rag::decision::DecisionKind;
use crate::rag::entities::EntityBag;

pub use types::*;

/// Sessions keyed by id. Appends to one session are serialized by the
/// map's shard lock; different sessions do not wait on each other
/// unless they hash to the same shard.
pub struct ConversationMemory {
    config: MemoryConfig,
    sessions: DashMap<String, SessionMemory>,
}

impl ConversationMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    /// Record one turn, creating the session on first use.
    pub fn append(
        &self,
        session_id: &str,
        query: &str,
        response: &str,
        intent: &str,
        entities: EntityBag,
        decision: DecisionKind,
        in_scope: bool,
    ) {
        let interaction = Interaction::new(query, response, intent, entities, decision, in_scope);
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "Creating conversation session");
                SessionMemory::new(self.config.capacity, self.config.summary_window)
            });
        session.push(interaction);
        debug!(
            session_id,
            turns = session.len(),
            summary = session.topic_summary(),
            "Interaction recorded"
        );
    }

    /// Recent context for `session_id`; an unknown id yields an empty context.
    pub fn get_context(&self, session_id: &str) -> ConversationContext {
        self.sessions
            .get(session_id)
            .map(|s| s.context(self.config.context_window))
            .unwrap_or_default()
    }

    /// Full stored history of a session, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<Interaction> {
        self.sessions
            .get(session_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop one session, or every session when `session_id` is `None`.
    pub fn clear(&self, session_id: Option<&str>) {
        match session_id {
            Some(id) => {
                self.sessions.remove(id);
                info!(session_id = id, "Conversation memory cleared");
            }
            None => {
                let count = self.sessions.len();
                self.sessions.clear();
                info!(sessions = count, "All conversation memory cleared");
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
