use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{HandoffId, NoteId, TenantId};

/// How far a handoff has been compressed by consolidation.
///
/// full → summary (~500 tokens, >30 days) → quick_ref (~100 tokens,
/// >90 days) → integrated (≥180 days, folded into a knowledge note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    Full,
    Summary,
    QuickRef,
    Integrated,
}

impl CompressionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionLevel::Full => "full",
            CompressionLevel::Summary => "summary",
            CompressionLevel::QuickRef => "quick_ref",
            CompressionLevel::Integrated => "integrated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(CompressionLevel::Full),
            "summary" => Some(CompressionLevel::Summary),
            "quick_ref" => Some(CompressionLevel::QuickRef),
            "integrated" => Some(CompressionLevel::Integrated),
            _ => None,
        }
    }
}

/// Meaning-preserving end-of-session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub id: HandoffId,
    pub tenant_id: TenantId,

    pub experienced: String,
    pub noticed: String,
    pub learned: String,
    pub remember: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
    /// Identity-thread statement; the agent's trajectory is the ordered
    /// sequence of these
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub becoming: Option<String>,

    pub significance: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub compression_level: CompressionLevel,
    /// Compacted content written by consolidation; the narrative fields are
    /// discarded once the first compression runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact: Option<String>,
    pub with_whom: String,
    pub created_at: DateTime<Utc>,

    /// Knowledge note this handoff's becoming statement was merged into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrated_into: Option<NoteId>,
}

/// One row of the identity thread (handoffs with a non-empty becoming).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub handoff_id: HandoffId,
    pub becoming: String,
    pub created_at: DateTime<Utc>,
    pub significance: f64,
}

/// Durable insight extracted across many handoffs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNote {
    pub id: NoteId,
    pub tenant_id: TenantId,
    pub title: String,
    pub content: String,
    pub source_handoffs: Vec<HandoffId>,
    pub confidence: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Periodic synthesis record written by consolidation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub id: crate::id::ReflectionId,
    pub tenant_id: TenantId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub session_count: u32,
    pub summary: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    pub identity_evolution: String,
    #[serde(default)]
    pub source_handoffs: Vec<HandoffId>,
    pub created_at: DateTime<Utc>,
}
