use chrono::Utc;

use engram_engine::compose_wake_up_greeting;
use engram_store::Database;
use engram_types::{
    AuditAction, AuditOutcome, CompressionLevel, DecisionStatus, Handoff, HandoffId,
    IdentityEntry, Principal,
};

use crate::audit;
use crate::deadline::Deadline;
use crate::{Error, Result};

const MAX_FIELD_LEN: usize = 16 * 1024;
const WAKE_UP_BECOMING_TOP_K: usize = 3;

#[derive(Debug, Clone)]
pub struct CreateHandoffRequest {
    pub experienced: String,
    pub noticed: String,
    pub learned: String,
    pub remember: String,
    pub story: Option<String>,
    pub becoming: Option<String>,
    pub significance: f64,
    pub tags: Vec<String>,
    pub with_whom: String,
}

/// Wake-up context assembled for a returning agent. Pure read.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WakeUpContext {
    pub greeting_context: String,
    pub last_handoff: Option<Handoff>,
    pub identity_thread: Vec<IdentityEntry>,
    pub recent_decisions_count: usize,
    pub knowledge_notes_count: usize,
}

pub struct HandoffService<'a> {
    db: &'a mut Database,
}

impl<'a> HandoffService<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }

    pub fn create(
        &mut self,
        principal: &Principal,
        request: CreateHandoffRequest,
        deadline: Deadline,
    ) -> Result<Handoff> {
        validate(&request)?;
        deadline.check()?;

        let handoff = Handoff {
            id: HandoffId::generate(),
            tenant_id: principal.tenant_id.clone(),
            experienced: request.experienced,
            noticed: request.noticed,
            learned: request.learned,
            remember: request.remember,
            story: request.story,
            becoming: request.becoming,
            significance: request.significance,
            tags: request.tags,
            compression_level: CompressionLevel::Full,
            compact: None,
            with_whom: request.with_whom,
            created_at: Utc::now(),
            integrated_into: None,
        };

        self.db.insert_handoff(&handoff)?;

        audit::append(
            self.db,
            principal,
            "handoff.create",
            "handoff",
            handoff.id.as_str(),
            AuditAction::Write,
            AuditOutcome::Ok,
            serde_json::json!({"with_whom": handoff.with_whom}),
        );

        Ok(handoff)
    }

    pub fn last(
        &self,
        principal: &Principal,
        with_whom: Option<&str>,
    ) -> Result<Option<Handoff>> {
        Ok(self.db.last_handoff(&principal.tenant_id, with_whom)?)
    }

    pub fn identity_thread(&self, principal: &Principal) -> Result<Vec<IdentityEntry>> {
        Ok(self.db.identity_thread(&principal.tenant_id)?)
    }

    /// Compose wake-up context: greeting narrative, last handoff, identity
    /// thread, and counts. No mutation, no summarizer call.
    pub fn wake_up(
        &mut self,
        principal: &Principal,
        with_whom: &str,
        deadline: Deadline,
    ) -> Result<WakeUpContext> {
        if with_whom.is_empty() {
            return Err(Error::Invalid("with_whom is required".to_string()));
        }
        deadline.check()?;

        let last_handoff = self.db.last_handoff(&principal.tenant_id, Some(with_whom))?;
        let identity_thread = self.db.identity_thread(&principal.tenant_id)?;
        deadline.check()?;
        let recent_decisions_count = self
            .db
            .count_decisions(&principal.tenant_id, DecisionStatus::Active)?;
        let knowledge_notes_count = self.db.count_notes(&principal.tenant_id)?;

        let greeting_context = compose_wake_up_greeting(
            with_whom,
            last_handoff.as_ref(),
            &identity_thread[..identity_thread.len().min(WAKE_UP_BECOMING_TOP_K)],
            recent_decisions_count,
            knowledge_notes_count,
        );

        audit::append(
            self.db,
            principal,
            "handoff.wake_up",
            "handoff",
            "*",
            AuditAction::Read,
            AuditOutcome::Ok,
            serde_json::json!({"with_whom": with_whom}),
        );

        Ok(WakeUpContext {
            greeting_context,
            last_handoff,
            identity_thread,
            recent_decisions_count,
            knowledge_notes_count,
        })
    }

    /// Export the identity thread and knowledge notes as JSON or markdown.
    pub fn export_identity(&self, principal: &Principal, format: ExportFormat) -> Result<String> {
        let thread = self.db.identity_thread(&principal.tenant_id)?;
        let notes = self.db.list_notes(&principal.tenant_id)?;

        match format {
            ExportFormat::Json => {
                let payload = serde_json::json!({
                    "identity_thread": thread,
                    "knowledge_notes": notes,
                });
                serde_json::to_string_pretty(&payload)
                    .map_err(|e| Error::Invalid(format!("export serialization failed: {}", e)))
            }
            ExportFormat::Markdown => {
                let mut out = String::from("# Identity\n\n## Becoming\n\n");
                for entry in &thread {
                    out.push_str(&format!(
                        "- {} ({}, significance {:.2})\n",
                        entry.becoming,
                        entry.created_at.format("%Y-%m-%d"),
                        entry.significance
                    ));
                }
                out.push_str("\n## Knowledge notes\n\n");
                for note in &notes {
                    out.push_str(&format!("### {}\n\n{}\n\n", note.title, note.content));
                }
                Ok(out)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "markdown" => Ok(ExportFormat::Markdown),
            other => Err(Error::Invalid(format!("unknown export format '{}'", other))),
        }
    }
}

fn validate(request: &CreateHandoffRequest) -> Result<()> {
    for (name, value) in [
        ("experienced", &request.experienced),
        ("noticed", &request.noticed),
        ("learned", &request.learned),
        ("remember", &request.remember),
    ] {
        if value.is_empty() {
            return Err(Error::Invalid(format!("{} is required", name)));
        }
        if value.len() > MAX_FIELD_LEN {
            return Err(Error::Invalid(format!("{} exceeds maximum length", name)));
        }
    }
    if !(0.0..=1.0).contains(&request.significance) {
        return Err(Error::Invalid("significance out of [0, 1]".to_string()));
    }
    if request.with_whom.is_empty() {
        return Err(Error::Invalid("with_whom is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::TenantId;

    fn principal() -> Principal {
        Principal::new(TenantId::parse("t1").unwrap()).with_user("u1")
    }

    fn request(becoming: Option<&str>) -> CreateHandoffRequest {
        CreateHandoffRequest {
            experienced: "shipped the retrieval engine".to_string(),
            noticed: "scoring ties were unstable".to_string(),
            learned: "pin the tie-break".to_string(),
            remember: "document scoring weights".to_string(),
            story: None,
            becoming: becoming.map(|s| s.to_string()),
            significance: 0.7,
            tags: vec![],
            with_whom: "casey".to_string(),
        }
    }

    #[test]
    fn test_wake_up_composes_counts_and_thread() {
        let mut db = Database::open_in_memory().unwrap();
        let p = principal();

        HandoffService::new(&mut db)
            .create(&p, request(Some("more rigorous")), Deadline::after_secs(30))
            .unwrap();

        let context = HandoffService::new(&mut db)
            .wake_up(&p, "casey", Deadline::after_secs(30))
            .unwrap();

        assert!(context.last_handoff.is_some());
        assert_eq!(context.identity_thread.len(), 1);
        assert!(context.greeting_context.contains("casey"));
        assert!(context.greeting_context.contains("more rigorous"));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let mut req = request(None);
        req.learned = String::new();
        let result =
            HandoffService::new(&mut db).create(&principal(), req, Deadline::after_secs(30));
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_markdown_export_lists_becoming() {
        let mut db = Database::open_in_memory().unwrap();
        let p = principal();
        HandoffService::new(&mut db)
            .create(&p, request(Some("more curious")), Deadline::after_secs(30))
            .unwrap();

        let markdown = HandoffService::new(&mut db)
            .export_identity(&p, ExportFormat::Markdown)
            .unwrap();
        assert!(markdown.contains("## Becoming"));
        assert!(markdown.contains("more curious"));
    }
}
