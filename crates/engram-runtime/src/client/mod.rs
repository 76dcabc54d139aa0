mod admin;
mod capsules;
mod consolidation;
mod context;
mod decisions;
mod edits;
mod events;
mod handoffs;
mod workspace;

pub use admin::AdminOps;
pub use capsules::CapsuleOps;
pub use consolidation::ConsolidationOps;
pub use context::ContextOps;
pub use decisions::DecisionOps;
pub use edits::EditOps;
pub use events::EventOps;
pub use handoffs::HandoffOps;
pub use workspace::Engram;
