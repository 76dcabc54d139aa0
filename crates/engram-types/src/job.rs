use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{JobId, TenantId};

/// Consolidation job kinds.
///
/// The scheduled kinds (daily/weekly/monthly) fan out to the concrete
/// operations; the operation kinds can also be run directly on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Daily,
    Weekly,
    Monthly,
    HandoffCompression,
    DecisionArchival,
    IdentitySynthesis,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Daily => "daily",
            JobType::Weekly => "weekly",
            JobType::Monthly => "monthly",
            JobType::HandoffCompression => "handoff_compression",
            JobType::DecisionArchival => "decision_archival",
            JobType::IdentitySynthesis => "identity_synthesis",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(JobType::Daily),
            "weekly" => Some(JobType::Weekly),
            "monthly" => Some(JobType::Monthly),
            "handoff_compression" => Some(JobType::HandoffCompression),
            "decision_archival" => Some(JobType::DecisionArchival),
            "identity_synthesis" => Some(JobType::IdentitySynthesis),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Audit row for one consolidation engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationJob {
    pub id: JobId,
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    pub status: JobStatus,
    pub items_processed: u32,
    pub items_affected: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
