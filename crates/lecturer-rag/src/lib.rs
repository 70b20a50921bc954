//! Question answering core for a university lecturer assistant.
//!
//! A query is normalized, classified, matched against the knowledge base,
//! and run through a confidence-gated decision policy that either answers
//! from the knowledge base, elaborates through a text generator, asks for
//! clarification, routes to a department, or declines. Conversation memory
//! keeps per-session context for follow-ups.

pub mod assistant;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod rag;
pub mod search;
pub mod types;

// Re-export primary types for convenience
pub use assistant::{AssistantBuilder, LecturerAssistant};
pub use config::AssistantConfig;
pub use error::{AssistError, AssistResult, QueryRejection};
pub use knowledge::{KnowledgeRecord, KnowledgeSource, SourcePriority};
pub use memory::{ConversationContext, ConversationMemory};
pub use rag::{DecisionKind, DecisionPayload, IntentResult, StrategyKind};
pub use search::{KnowledgeIndex, SearchHit};
pub use types::{AssistantStatus, QueryResponse, SourceRef};
