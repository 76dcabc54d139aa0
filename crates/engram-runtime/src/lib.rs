// Internal modules (not exposed to external crates)
pub(crate) mod audit;
pub(crate) mod services;

mod config;
mod deadline;
mod error;
mod scheduler;
mod summarizer;

// Public client interface
pub mod client;

// Main facade and operation groups
pub use client::{
    AdminOps, CapsuleOps, ConsolidationOps, ContextOps, DecisionOps, EditOps, Engram, EventOps,
    HandoffOps,
};

// Data types used as inputs/outputs in public APIs
pub use config::{Config, ConsolidationConfig, DeadlineConfig, RetrievalConfig, SecretPolicy};
pub use deadline::Deadline;
pub use error::{Error, Result};
pub use scheduler::SchedulerHandle;
pub use services::acb::AcbRequest;
pub use services::capsules::CreateCapsuleRequest;
pub use services::decisions::CreateDecisionRequest;
pub use services::edits::ProposeEditRequest;
pub use services::handoffs::{CreateHandoffRequest, ExportFormat, WakeUpContext};
pub use services::ingest::{IngestReceipt, RecordEventRequest};
pub use services::retrieval::SearchRequest;
pub use summarizer::{ExtractiveSummarizer, Summarizer, SummaryMode};
