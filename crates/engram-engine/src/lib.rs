// Engine module - pure domain logic (overlay, scoring, packing, redaction)
// This layer sits between stored rows (store) and the service surface
// (runtime); nothing here performs I/O

mod acb;
mod chunking;
mod identity;
mod modes;
mod overlay;
mod packing;
mod redact;
mod scoring;

pub use acb::{
    Acb, ItemBody, Omission, OmissionReason, Provenance, ProvenanceFilters, ScoringSummary,
    Section, SectionItem,
};
pub use chunking::{extract_chunk_text, truncate_utf8};
pub use identity::{
    bucket_becoming_statements, compose_wake_up_greeting, ThemeBucket, THEME_MIN_MEMBERS,
};
pub use modes::{detect_mode, section_budgets, Mode, SectionBudgets};
pub use overlay::{apply_chunk_overlay, apply_decision_overlay, ReadContext};
pub use packing::pack_section;
pub use redact::{scan_and_redact, SECRET_PLACEHOLDER};
pub use scoring::{rank_candidates, Candidate, ScoredChunk, ScoringWeights};
