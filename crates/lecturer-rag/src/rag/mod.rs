//! Query understanding and response planning: intent, entities, the
//! confidence-gated decision policy, dialogue strategies and prompts.

pub mod decision;
pub mod entities;
pub mod intent;
pub mod prompts;
pub mod strategy;
pub mod topics;

pub use decision::{
    route_department, ClarificationReason, ConfidenceTier, DecisionContext, DecisionEngine,
    DecisionKind, DecisionPayload, DepartmentRoute, Retrieval,
};
pub use entities::{
    Complexity, Entity, EntityBag, EntityExtractor, EntityKind, QuerySignals, Sentiment, Urgency,
};
pub use intent::{
    default_catalog, ClassifierMode, IntentCategory, IntentClassifier, IntentResult, QueryAnalysis,
};
pub use strategy::{
    GenerationProfile, ResponseStrategySelector, StrategyKind, StrategyProfile, StrategyTable,
};
