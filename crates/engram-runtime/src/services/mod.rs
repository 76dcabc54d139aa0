pub mod acb;
pub mod capsules;
pub mod consolidation;
pub mod decisions;
pub mod edits;
pub mod handoffs;
pub mod ingest;
pub mod retrieval;
