mod audit;
mod capsule;
mod chunk;
mod decision;
mod edit;
mod error;
mod event;
mod handoff;
mod id;
mod job;
mod policy;
mod principal;
mod token;

pub use audit::{AuditAction, AuditOutcome, AuditRecord};
pub use capsule::{Capsule, CapsuleItems, CapsuleStatus};
pub use chunk::Chunk;
pub use decision::{Decision, DecisionScope, DecisionStatus};
pub use edit::{EditOp, EditStatus, MemoryEdit, TargetRef};
pub use error::{Error, Result};
pub use event::{Actor, ActorType, Event, EventContent, TaskStatus};
pub use handoff::{CompressionLevel, Handoff, IdentityEntry, KnowledgeNote, Reflection};
pub use id::{
    AcbId, ArtifactId, CapsuleId, ChunkId, DecisionId, EditId, EventId, HandoffId, JobId, NoteId,
    ReflectionId, TenantId,
};
pub use job::{ConsolidationJob, JobStatus, JobType};
pub use policy::{allowed_sensitivities, base_importance};
pub use principal::{Principal, Role};
pub use token::estimate_tokens;

use serde::{Deserialize, Serialize};

/// Privacy channel an event was recorded on.
///
/// The channel decides which sensitivity levels may ever be read back
/// (see [`allowed_sensitivities`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Private,
    Public,
    Team,
    Agent,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Private => "private",
            Channel::Public => "public",
            Channel::Team => "team",
            Channel::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Channel::Private),
            "public" => Some(Channel::Public),
            "team" => Some(Channel::Team),
            "agent" => Some(Channel::Agent),
            _ => None,
        }
    }
}

/// Sensitivity classification of an event and its derived chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    None,
    Low,
    High,
    Secret,
}

impl Sensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::None => "none",
            Sensitivity::Low => "low",
            Sensitivity::High => "high",
            Sensitivity::Secret => "secret",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Sensitivity::None),
            "low" => Some(Sensitivity::Low),
            "high" => Some(Sensitivity::High),
            "secret" => Some(Sensitivity::Secret),
            _ => None,
        }
    }
}

/// Kind of ground-truth event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    ToolCall,
    ToolResult,
    Decision,
    TaskUpdate,
    Artifact,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::Decision => "decision",
            EventKind::TaskUpdate => "task_update",
            EventKind::Artifact => "artifact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message" => Some(EventKind::Message),
            "tool_call" => Some(EventKind::ToolCall),
            "tool_result" => Some(EventKind::ToolResult),
            "decision" => Some(EventKind::Decision),
            "task_update" => Some(EventKind::TaskUpdate),
            "artifact" => Some(EventKind::Artifact),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_round_trip() {
        for channel in [Channel::Private, Channel::Public, Channel::Team, Channel::Agent] {
            assert_eq!(Channel::parse(channel.as_str()), Some(channel));
        }
        assert_eq!(Channel::parse("secret"), None);
    }

    #[test]
    fn test_sensitivity_ordering() {
        assert!(Sensitivity::None < Sensitivity::Low);
        assert!(Sensitivity::Low < Sensitivity::High);
        assert!(Sensitivity::High < Sensitivity::Secret);
    }

    #[test]
    fn test_event_kind_serde_snake_case() {
        let json = serde_json::to_string(&EventKind::ToolResult).unwrap();
        assert_eq!(json, "\"tool_result\"");
    }
}
