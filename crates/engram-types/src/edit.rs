use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ChunkId, DecisionId, EditId, TenantId};
use crate::Channel;

// NOTE: The overlay is polymorphic over target and operation. Both axes are
// tagged enums rather than trait objects: overlay application has to be a
// pure function over (ground-truth item, edit list), and edits have to
// round-trip through storage unchanged.

/// What a memory edit targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target_type", content = "target_id")]
#[serde(rename_all = "snake_case")]
pub enum TargetRef {
    Chunk(ChunkId),
    Decision(DecisionId),
}

impl TargetRef {
    pub fn type_str(&self) -> &'static str {
        match self {
            TargetRef::Chunk(_) => "chunk",
            TargetRef::Decision(_) => "decision",
        }
    }

    pub fn id_str(&self) -> &str {
        match self {
            TargetRef::Chunk(id) => id.as_str(),
            TargetRef::Decision(id) => id.as_str(),
        }
    }
}

/// Governance operation applied at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "patch")]
#[serde(rename_all = "snake_case")]
pub enum EditOp {
    /// Item is omitted from all results; direct get returns NotFound
    Retract,

    /// Replace text and/or importance in the overlay (ground truth untouched)
    Amend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        importance: Option<f64>,
    },

    /// Omit from auto-retrieval unless the read opts in
    Quarantine,

    /// Reduce importance by a delta, clamped to >= 0
    Attenuate { importance_delta: f64 },

    /// Omit when the reading request is on the given channel
    Block { channel: Channel },
}

impl EditOp {
    pub fn name(&self) -> &'static str {
        match self {
            EditOp::Retract => "retract",
            EditOp::Amend { .. } => "amend",
            EditOp::Quarantine => "quarantine",
            EditOp::Attenuate { .. } => "attenuate",
            EditOp::Block { .. } => "block",
        }
    }

    /// Whether this operation needs an approver before taking effect.
    pub fn requires_approval(&self) -> bool {
        matches!(self, EditOp::Retract | EditOp::Block { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    Pending,
    Approved,
    Rejected,
}

impl EditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditStatus::Pending => "pending",
            EditStatus::Approved => "approved",
            EditStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EditStatus::Pending),
            "approved" => Some(EditStatus::Approved),
            "rejected" => Some(EditStatus::Rejected),
            _ => None,
        }
    }
}

/// Governance overlay entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEdit {
    pub id: EditId,
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub target: TargetRef,
    #[serde(flatten)]
    pub op: EditOp,
    pub reason: String,
    pub status: EditStatus,
    pub proposed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_tagging() {
        let op = EditOp::Attenuate {
            importance_delta: 0.3,
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "attenuate");
        assert_eq!(json["patch"]["importance_delta"], 0.3);

        let retract = EditOp::Retract;
        let json = serde_json::to_value(&retract).unwrap();
        assert_eq!(json["op"], "retract");
    }

    #[test]
    fn test_approval_requirements() {
        assert!(EditOp::Retract.requires_approval());
        assert!(EditOp::Block {
            channel: Channel::Public
        }
        .requires_approval());
        assert!(!EditOp::Quarantine.requires_approval());
        assert!(!EditOp::Amend {
            text: None,
            importance: Some(0.5)
        }
        .requires_approval());
    }

    #[test]
    fn test_target_round_trip() {
        let target = TargetRef::Chunk(ChunkId::generate());
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["target_type"], "chunk");
        let back: TargetRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, target);
    }
}
