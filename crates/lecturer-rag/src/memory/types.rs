//! Type definitions for conversation memory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::rag::decision::DecisionKind;
use crate::rag::entities::{EntityBag, EntityKind};
use crate::rag::topics;

/// Unique identifier for a stored interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub Uuid);

/// One query/response turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub query: String,
    pub response: String,
    pub intent: String,
    pub entities: EntityBag,
    pub decision: DecisionKind,
    pub timestamp: DateTime<Utc>,
    /// Whether the query was inside the assistant's domain.
    pub in_scope: bool,
}

impl Interaction {
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        intent: impl Into<String>,
        entities: EntityBag,
        decision: DecisionKind,
        in_scope: bool,
    ) -> Self {
        Self {
            id: InteractionId(Uuid::new_v4()),
            query: query.into(),
            response: response.into(),
            intent: intent.into(),
            entities,
            decision,
            timestamp: Utc::now(),
            in_scope,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// No interaction recorded yet.
    New,
    Lecturer,
}

/// What the rest of the pipeline sees of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Most recent interactions, oldest first.
    pub history: Vec<Interaction>,
    pub topic_summary: String,
    pub user_interests: Vec<String>,
    pub session_kind: SessionKind,
}

impl ConversationContext {
    pub fn empty() -> Self {
        Self {
            history: Vec::new(),
            topic_summary: String::new(),
            user_interests: Vec::new(),
            session_kind: SessionKind::New,
        }
    }

    pub fn last_query(&self) -> Option<&str> {
        self.history.last().map(|i| i.query.as_str())
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::empty()
    }
}

/// Bounded history of one session plus its derived summary and interests.
#[derive(Debug, Clone)]
pub struct SessionMemory {
    history: VecDeque<Interaction>,
    capacity: usize,
    summary_window: usize,
    topic_summary: String,
    user_interests: Vec<String>,
}

impl SessionMemory {
    pub fn new(capacity: usize, summary_window: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            summary_window,
            topic_summary: String::new(),
            user_interests: Vec::new(),
        }
    }

    pub fn push(&mut self, interaction: Interaction) {
        for kind in [EntityKind::Major, EntityKind::Department] {
            if let Some(value) = interaction.entities.value(kind) {
                if !self.user_interests.iter().any(|v| v == value) {
                    self.user_interests.push(value.to_string());
                }
            }
        }

        self.history.push_back(interaction);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        let start = self.history.len().saturating_sub(self.summary_window);
        self.topic_summary =
            topics::summarize(self.history.range(start..).map(|i| i.query.as_str())).to_string();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn topic_summary(&self) -> &str {
        &self.topic_summary
    }

    pub fn user_interests(&self) -> &[String] {
        &self.user_interests
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.history.iter()
    }

    /// Context view over the last `window` interactions.
    pub fn context(&self, window: usize) -> ConversationContext {
        let start = self.history.len().saturating_sub(window);
        ConversationContext {
            history: self.history.range(start..).cloned().collect(),
            topic_summary: self.topic_summary.clone(),
            user_interests: self.user_interests.clone(),
            session_kind: SessionKind::Lecturer,
        }
    }
}
