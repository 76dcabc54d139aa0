use chrono::{DateTime, Utc};

use engram_engine::{extract_chunk_text, scan_and_redact, truncate_utf8};
use engram_store::Database;
use engram_types::{
    base_importance, estimate_tokens, Actor, ArtifactId, AuditAction, AuditOutcome, Channel,
    Chunk, ChunkId, Event, EventContent, EventId, Principal, Sensitivity,
};

use crate::audit;
use crate::config::{Config, SecretPolicy};
use crate::deadline::Deadline;
use crate::{Error, Result};

const MAX_SESSION_ID_LEN: usize = 256;
const MAX_ACTOR_ID_LEN: usize = 256;
const MAX_TAG_LEN: usize = 64;
const MAX_TAGS: usize = 32;
const MAX_REFS: usize = 64;
const MAX_SCOPE_FIELD_LEN: usize = 256;
const MAX_TEXT_LEN: usize = 1024 * 1024;

/// Caller request for one event write. The tenant is deliberately absent:
/// it always comes from the authenticated principal.
#[derive(Debug, Clone)]
pub struct RecordEventRequest {
    pub session_id: String,
    pub channel: Channel,
    pub sensitivity: Sensitivity,
    pub actor: Actor,
    pub content: EventContent,
    pub tags: Vec<String>,
    pub project_id: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    /// Omitted: stamped at ingest; supplied: must not precede the session's
    /// latest event
    pub ts: Option<DateTime<Utc>>,
    pub refs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub event_id: EventId,
    pub chunk_ids: Vec<ChunkId>,
}

pub struct IngestService<'a> {
    db: &'a mut Database,
    config: &'a Config,
}

impl<'a> IngestService<'a> {
    pub fn new(db: &'a mut Database, config: &'a Config) -> Self {
        Self { db, config }
    }

    pub fn record_event(
        &mut self,
        principal: &Principal,
        request: RecordEventRequest,
        deadline: Deadline,
    ) -> Result<IngestReceipt> {
        validate_request(&request)?;
        deadline.check()?;

        let tenant_id = principal.tenant_id.clone();

        // ts is monotonic within a session
        let latest = self.db.latest_session_ts(&tenant_id, &request.session_id)?;
        let ts = match (request.ts, latest) {
            (Some(ts), Some(latest)) if ts < latest => {
                return Err(Error::Invalid(format!(
                    "event ts {} precedes the session's latest event",
                    ts
                )));
            }
            (Some(ts), _) => ts,
            (None, Some(latest)) => {
                // stamped timestamps advance strictly so readers see commit
                // order even when the clock has not moved a full tick
                let now = Utc::now();
                if now > latest {
                    now
                } else {
                    latest + chrono::Duration::microseconds(1)
                }
            }
            (None, None) => Utc::now(),
        };

        let (content, redactions) = self.apply_secret_policy(&request)?;
        let (content, artifact) = self.offload_tool_result(content)?;

        let event = Event {
            id: EventId::generate(),
            tenant_id: tenant_id.clone(),
            session_id: request.session_id.clone(),
            project_id: request.project_id.clone(),
            subject_type: request.subject_type.clone(),
            subject_id: request.subject_id.clone(),
            channel: request.channel,
            sensitivity: request.sensitivity,
            tags: request.tags.clone(),
            actor: request.actor.clone(),
            ts,
            content,
            refs: request.refs.clone(),
        };

        // zero chunks is legal: the event is still ground truth
        let chunks = derive_chunks(&event);
        let chunk_ids: Vec<ChunkId> = chunks.iter().map(|c| c.id.clone()).collect();

        deadline.check()?;
        self.db.insert_event_bundle(
            &event,
            &chunks,
            artifact.as_ref().map(|(id, bytes)| (id, bytes.as_slice())),
        )?;

        audit::append(
            self.db,
            principal,
            "data.write",
            "event",
            event.id.as_str(),
            AuditAction::Write,
            AuditOutcome::Ok,
            serde_json::json!({
                "kind": event.kind().as_str(),
                "chunks": chunk_ids.len(),
                "redactions": redactions,
                "artifact": artifact.is_some(),
            }),
        );

        Ok(IngestReceipt {
            event_id: event.id,
            chunk_ids,
        })
    }

    /// Scan every text field for secret patterns. Content classified
    /// `secret` is never persisted as text; below that, matches are
    /// redacted or rejected per configured policy.
    fn apply_secret_policy(
        &self,
        request: &RecordEventRequest,
    ) -> Result<(EventContent, usize)> {
        if request.sensitivity == Sensitivity::Secret && content_has_text(&request.content) {
            return Err(Error::SensitiveContent(
                "content classified secret cannot be persisted as text".to_string(),
            ));
        }

        let (content, count) = redact_content(&request.content);
        if count > 0 && self.config.secret_policy == SecretPolicy::Reject {
            return Err(Error::SensitiveContent(format!(
                "{} secret pattern(s) detected",
                count
            )));
        }

        Ok((content, count))
    }

    /// Cap tool-result excerpts at the configured byte limit; overflow
    /// moves the full payload to an artifact.
    fn offload_tool_result(
        &self,
        content: EventContent,
    ) -> Result<(EventContent, Option<(ArtifactId, Vec<u8>)>)> {
        let EventContent::ToolResult {
            tool,
            excerpt_text,
            line_range,
            truncated,
            artifact_id,
        } = content
        else {
            return Ok((content, None));
        };

        let cap = self.config.tool_result_excerpt_bytes_max;
        if excerpt_text.len() <= cap {
            return Ok((
                EventContent::ToolResult {
                    tool,
                    excerpt_text,
                    line_range,
                    truncated,
                    artifact_id,
                },
                None,
            ));
        }

        let new_artifact_id = ArtifactId::generate();
        let full_bytes = excerpt_text.clone().into_bytes();
        let excerpt = truncate_utf8(&excerpt_text, cap).to_string();

        Ok((
            EventContent::ToolResult {
                tool,
                excerpt_text: excerpt,
                line_range,
                truncated: true,
                artifact_id: Some(new_artifact_id.clone()),
            },
            Some((new_artifact_id, full_bytes)),
        ))
    }
}

fn validate_request(request: &RecordEventRequest) -> Result<()> {
    if request.session_id.is_empty() || request.session_id.len() > MAX_SESSION_ID_LEN {
        return Err(Error::Invalid("session_id length out of range".to_string()));
    }
    if request.actor.id.is_empty() || request.actor.id.len() > MAX_ACTOR_ID_LEN {
        return Err(Error::Invalid("actor.id length out of range".to_string()));
    }
    if request.tags.len() > MAX_TAGS {
        return Err(Error::Invalid("too many tags".to_string()));
    }
    if request.tags.iter().any(|t| t.is_empty() || t.len() > MAX_TAG_LEN) {
        return Err(Error::Invalid("tag length out of range".to_string()));
    }
    if request.refs.len() > MAX_REFS {
        return Err(Error::Invalid("too many refs".to_string()));
    }
    for field in [&request.project_id, &request.subject_type, &request.subject_id]
        .into_iter()
        .flatten()
    {
        if field.is_empty() || field.len() > MAX_SCOPE_FIELD_LEN {
            return Err(Error::Invalid("scope field length out of range".to_string()));
        }
    }

    // uniform cap for inline text; tool results offload instead
    match &request.content {
        EventContent::Message { text } if text.len() > MAX_TEXT_LEN => {
            Err(Error::Invalid("message text exceeds maximum length".to_string()))
        }
        _ => Ok(()),
    }
}

fn content_has_text(content: &EventContent) -> bool {
    match content {
        EventContent::Message { text } => !text.is_empty(),
        EventContent::ToolResult { excerpt_text, .. } => !excerpt_text.is_empty(),
        EventContent::Decision { .. } | EventContent::TaskUpdate { .. } => true,
        EventContent::ToolCall { .. } | EventContent::Artifact { .. } => false,
    }
}

/// Redact every text field; returns the total match count.
fn redact_content(content: &EventContent) -> (EventContent, usize) {
    match content {
        EventContent::Message { text } => {
            let (redacted, count) = scan_and_redact(text);
            (EventContent::Message { text: redacted }, count)
        }
        EventContent::ToolResult {
            tool,
            excerpt_text,
            line_range,
            truncated,
            artifact_id,
        } => {
            let (redacted, count) = scan_and_redact(excerpt_text);
            (
                EventContent::ToolResult {
                    tool: tool.clone(),
                    excerpt_text: redacted,
                    line_range: *line_range,
                    truncated: *truncated,
                    artifact_id: artifact_id.clone(),
                },
                count,
            )
        }
        EventContent::Decision {
            decision,
            rationale,
        } => {
            let (decision_text, mut count) = scan_and_redact(decision);
            let rationale: Vec<String> = rationale
                .iter()
                .map(|r| {
                    let (redacted, c) = scan_and_redact(r);
                    count += c;
                    redacted
                })
                .collect();
            (
                EventContent::Decision {
                    decision: decision_text,
                    rationale,
                },
                count,
            )
        }
        EventContent::TaskUpdate {
            task,
            status,
            detail,
        } => {
            let (task_text, mut count) = scan_and_redact(task);
            let detail = detail.as_ref().map(|d| {
                let (redacted, c) = scan_and_redact(d);
                count += c;
                redacted
            });
            (
                EventContent::TaskUpdate {
                    task: task_text,
                    status: *status,
                    detail,
                },
                count,
            )
        }
        other => (other.clone(), 0),
    }
}

fn derive_chunks(event: &Event) -> Vec<Chunk> {
    let Some(text) = extract_chunk_text(&event.content) else {
        return Vec::new();
    };

    vec![Chunk {
        id: ChunkId::generate(),
        event_id: event.id.clone(),
        tenant_id: event.tenant_id.clone(),
        session_id: event.session_id.clone(),
        token_est: estimate_tokens(&text).max(1),
        importance: base_importance(event.kind(), &event.tags),
        channel: event.channel,
        sensitivity: event.sensitivity,
        kind: event.kind(),
        tags: event.tags.clone(),
        ts: event.ts,
        text,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::{ActorType, TenantId};

    fn service_parts() -> (Database, Config) {
        (Database::open_in_memory().unwrap(), Config::default())
    }

    fn principal() -> Principal {
        Principal::new(TenantId::parse("t1").unwrap()).with_user("u1")
    }

    fn message_request(text: &str) -> RecordEventRequest {
        RecordEventRequest {
            session_id: "s1".to_string(),
            channel: Channel::Private,
            sensitivity: Sensitivity::Low,
            actor: Actor {
                actor_type: ActorType::Human,
                id: "u1".to_string(),
            },
            content: EventContent::Message {
                text: text.to_string(),
            },
            tags: vec![],
            project_id: None,
            subject_type: None,
            subject_id: None,
            ts: None,
            refs: vec![],
        }
    }

    #[test]
    fn test_record_then_get_round_trips() {
        let (mut db, config) = service_parts();
        let receipt = IngestService::new(&mut db, &config)
            .record_event(&principal(), message_request("hello engram"), Deadline::after_secs(30))
            .unwrap();

        assert_eq!(receipt.chunk_ids.len(), 1);
        let event = db
            .get_event(&principal().tenant_id, &receipt.event_id)
            .unwrap()
            .unwrap();
        match event.content {
            EventContent::Message { text } => assert_eq!(text, "hello engram"),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn test_secret_is_redacted_and_counted() {
        let (mut db, config) = service_parts();
        let receipt = IngestService::new(&mut db, &config)
            .record_event(
                &principal(),
                message_request("Bearer sk-abc123def456 please use this"),
                Deadline::after_secs(30),
            )
            .unwrap();

        let event = db
            .get_event(&principal().tenant_id, &receipt.event_id)
            .unwrap()
            .unwrap();
        match &event.content {
            EventContent::Message { text } => {
                assert!(!text.contains("sk-abc123def456"));
                assert!(text.contains(engram_engine::SECRET_PLACEHOLDER));
            }
            _ => panic!("wrong payload"),
        }

        let audit = db.read_audit(&principal().tenant_id, 10).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].details["redactions"], 1);
    }

    #[test]
    fn test_reject_policy_refuses_secrets() {
        let (mut db, mut config) = service_parts();
        config.secret_policy = SecretPolicy::Reject;

        let result = IngestService::new(&mut db, &config).record_event(
            &principal(),
            message_request("password: hunter2"),
            Deadline::after_secs(30),
        );
        assert!(matches!(result, Err(Error::SensitiveContent(_))));
    }

    #[test]
    fn test_secret_sensitivity_never_persisted_as_text() {
        let (mut db, config) = service_parts();
        let mut request = message_request("the launch code is 0000");
        request.sensitivity = Sensitivity::Secret;

        let result =
            IngestService::new(&mut db, &config).record_event(&principal(), request, Deadline::after_secs(30));
        assert!(matches!(result, Err(Error::SensitiveContent(_))));
    }

    #[test]
    fn test_tool_result_at_cap_not_truncated() {
        let (mut db, config) = service_parts();
        let mut request = message_request("");
        request.content = EventContent::ToolResult {
            tool: "bash".to_string(),
            excerpt_text: "x".repeat(64 * 1024),
            line_range: None,
            truncated: false,
            artifact_id: None,
        };

        let receipt = IngestService::new(&mut db, &config)
            .record_event(&principal(), request, Deadline::after_secs(30))
            .unwrap();

        let event = db
            .get_event(&principal().tenant_id, &receipt.event_id)
            .unwrap()
            .unwrap();
        match &event.content {
            EventContent::ToolResult {
                truncated,
                artifact_id,
                excerpt_text,
                ..
            } => {
                assert!(!truncated);
                assert!(artifact_id.is_none());
                assert_eq!(excerpt_text.len(), 64 * 1024);
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn test_tool_result_over_cap_offloads_artifact() {
        let (mut db, config) = service_parts();
        let payload = "y".repeat(200 * 1024);
        let mut request = message_request("");
        request.content = EventContent::ToolResult {
            tool: "bash".to_string(),
            excerpt_text: payload.clone(),
            line_range: None,
            truncated: false,
            artifact_id: None,
        };

        let receipt = IngestService::new(&mut db, &config)
            .record_event(&principal(), request, Deadline::after_secs(30))
            .unwrap();

        let event = db
            .get_event(&principal().tenant_id, &receipt.event_id)
            .unwrap()
            .unwrap();
        match &event.content {
            EventContent::ToolResult {
                truncated,
                artifact_id,
                excerpt_text,
                ..
            } => {
                assert!(truncated);
                assert!(excerpt_text.len() <= 64 * 1024);
                let artifact = db
                    .get_artifact(&principal().tenant_id, artifact_id.as_ref().unwrap())
                    .unwrap()
                    .unwrap();
                assert_eq!(artifact.len(), 200 * 1024);
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn test_out_of_order_ts_rejected() {
        let (mut db, config) = service_parts();
        let mut first = message_request("first");
        first.ts = Some(Utc::now());
        IngestService::new(&mut db, &config)
            .record_event(&principal(), first, Deadline::after_secs(30))
            .unwrap();

        let mut stale = message_request("stale");
        stale.ts = Some(Utc::now() - chrono::Duration::hours(1));
        let result =
            IngestService::new(&mut db, &config).record_event(&principal(), stale, Deadline::after_secs(30));
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_empty_text_creates_event_without_chunks() {
        let (mut db, config) = service_parts();
        let mut request = message_request("");
        request.content = EventContent::ToolCall {
            tool: "bash".to_string(),
            arguments: serde_json::json!({"command": "true"}),
        };

        let receipt = IngestService::new(&mut db, &config)
            .record_event(&principal(), request, Deadline::after_secs(30))
            .unwrap();
        assert!(receipt.chunk_ids.is_empty());
        assert!(db
            .get_event(&principal().tenant_id, &receipt.event_id)
            .unwrap()
            .is_some());
    }
}
