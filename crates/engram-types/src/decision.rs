use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{DecisionId, TenantId};

/// Decision lifecycle status.
///
/// `Archived` is a consolidation-derived status distinct from `Superseded`:
/// superseded decisions were replaced by a newer decision, archived ones
/// simply aged out of the active view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Active,
    Superseded,
    Archived,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Active => "active",
            DecisionStatus::Superseded => "superseded",
            DecisionStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DecisionStatus::Active),
            "superseded" => Some(DecisionStatus::Superseded),
            "archived" => Some(DecisionStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionScope {
    Project,
    User,
    Global,
}

impl DecisionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionScope::Project => "project",
            DecisionScope::User => "user",
            DecisionScope::Global => "global",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(DecisionScope::Project),
            "user" => Some(DecisionScope::User),
            "global" => Some(DecisionScope::Global),
            _ => None,
        }
    }
}

/// First-class governance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub tenant_id: TenantId,
    pub status: DecisionStatus,
    pub scope: DecisionScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    pub decision: String,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub consequences: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,

    /// Events/chunks justifying this decision
    #[serde(default)]
    pub refs: Vec<String>,

    /// Set on the old decision when a new one supersedes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<DecisionId>,

    pub ts: DateTime<Utc>,
}
