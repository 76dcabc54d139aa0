use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ArtifactId, CapsuleId, ChunkId, DecisionId, TenantId};
use crate::decision::DecisionScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapsuleStatus {
    Active,
    Expired,
    Revoked,
}

impl CapsuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapsuleStatus::Active => "active",
            CapsuleStatus::Expired => "expired",
            CapsuleStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CapsuleStatus::Active),
            "expired" => Some(CapsuleStatus::Expired),
            "revoked" => Some(CapsuleStatus::Revoked),
            _ => None,
        }
    }
}

/// Manifest of items a capsule shares with its audience.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapsuleItems {
    #[serde(default)]
    pub chunk_ids: Vec<ChunkId>,
    #[serde(default)]
    pub decision_ids: Vec<DecisionId>,
    #[serde(default)]
    pub artifact_ids: Vec<ArtifactId>,
}

impl CapsuleItems {
    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty() && self.decision_ids.is_empty() && self.artifact_ids.is_empty()
    }
}

/// Time-bounded curated memory package, scoped to an audience of agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capsule {
    pub id: CapsuleId,
    pub tenant_id: TenantId,
    pub author_agent_id: String,
    pub subject_type: String,
    pub subject_id: String,
    pub scope: DecisionScope,
    pub audience_agent_ids: Vec<String>,
    pub items: CapsuleItems,
    #[serde(default)]
    pub risks: Vec<String>,
    pub ttl_days: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: CapsuleStatus,
}

impl Capsule {
    /// Effective expiry check at a given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CapsuleStatus::Expired || now >= self.expires_at
    }
}
