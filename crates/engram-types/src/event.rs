use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ArtifactId, EventId, TenantId};
use crate::{Channel, EventKind, Sensitivity};

// NOTE: Schema Design Goals
//
// 1. Ground truth: events are append-only; payload and classification are
//    immutable once written. All later governance happens in the edit
//    overlay, never by rewriting rows.
// 2. Tenancy: tenant_id is part of every event and is always taken from the
//    authenticated principal, never from a request body.
// 3. Ordering: ts is monotonic within a session; insert order breaks ties so
//    readers observe a total order per session.

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Human,
    Agent,
    Tool,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Human => "human",
            ActorType::Agent => "agent",
            ActorType::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(ActorType::Human),
            "agent" => Some(ActorType::Agent),
            "tool" => Some(ActorType::Tool),
            _ => None,
        }
    }
}

/// Event originator (type + stable identifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub id: String,
}

/// Task progress state carried by task_update events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }
}

/// Event payload variants, one per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
#[serde(rename_all = "snake_case")]
pub enum EventContent {
    /// Conversational message text
    Message { text: String },

    /// Tool invocation request
    ToolCall {
        tool: String,
        arguments: serde_json::Value,
    },

    /// Tool output; large payloads are offloaded to an artifact and the
    /// excerpt is capped at a configured byte limit
    ToolResult {
        tool: String,
        excerpt_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_range: Option<(u32, u32)>,
        #[serde(default)]
        truncated: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact_id: Option<ArtifactId>,
    },

    /// Inline decision statement (the Decision record is created separately;
    /// this event cites it via refs)
    Decision { decision: String, rationale: Vec<String> },

    /// Task progress update
    TaskUpdate {
        task: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// Standalone artifact registration
    Artifact {
        artifact_id: ArtifactId,
        description: String,
    },
}

impl EventContent {
    /// The kind this payload variant corresponds to.
    pub fn kind(&self) -> EventKind {
        match self {
            EventContent::Message { .. } => EventKind::Message,
            EventContent::ToolCall { .. } => EventKind::ToolCall,
            EventContent::ToolResult { .. } => EventKind::ToolResult,
            EventContent::Decision { .. } => EventKind::Decision,
            EventContent::TaskUpdate { .. } => EventKind::TaskUpdate,
            EventContent::Artifact { .. } => EventKind::Artifact,
        }
    }
}

/// Ground-truth interaction event.
/// Maps 1:1 to a database row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    pub channel: Channel,
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub tags: Vec<String>,

    pub actor: Actor,
    pub ts: DateTime<Utc>,

    #[serde(flatten)]
    pub content: EventContent,

    /// IDs of other events/chunks/decisions this event cites
    #[serde(default)]
    pub refs: Vec<String>,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.content.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(content: EventContent) -> Event {
        Event {
            id: EventId::generate(),
            tenant_id: TenantId::parse("t1").unwrap(),
            session_id: "s1".to_string(),
            project_id: None,
            subject_type: None,
            subject_id: None,
            channel: Channel::Private,
            sensitivity: Sensitivity::Low,
            tags: vec![],
            actor: Actor {
                actor_type: ActorType::Human,
                id: "u1".to_string(),
            },
            ts: Utc::now(),
            content,
            refs: vec![],
        }
    }

    #[test]
    fn test_content_serialization_tagging() {
        let event = sample_event(EventContent::Message {
            text: "hello".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["content"]["text"], "hello");

        let back: Event = serde_json::from_value(json).unwrap();
        match back.content {
            EventContent::Message { text } => assert_eq!(text, "hello"),
            _ => panic!("wrong payload type"),
        }
    }

    #[test]
    fn test_tool_result_defaults() {
        let json = serde_json::json!({
            "type": "tool_result",
            "content": {"tool": "bash", "excerpt_text": "ok"}
        });
        let content: EventContent = serde_json::from_value(json).unwrap();
        match content {
            EventContent::ToolResult {
                truncated,
                artifact_id,
                ..
            } => {
                assert!(!truncated);
                assert!(artifact_id.is_none());
            }
            _ => panic!("wrong payload type"),
        }
    }

    #[test]
    fn test_kind_matches_variant() {
        let event = sample_event(EventContent::TaskUpdate {
            task: "t".to_string(),
            status: TaskStatus::Blocked,
            detail: None,
        });
        assert_eq!(event.kind(), EventKind::TaskUpdate);
    }
}
