use chrono::Utc;

use engram_store::{Database, DecisionFilters};
use engram_types::{
    AuditAction, AuditOutcome, Decision, DecisionId, DecisionScope, DecisionStatus, EditOp,
    Principal, TenantId,
};

use crate::audit;
use crate::deadline::Deadline;
use crate::{Error, Result};

const MAX_DECISION_LEN: usize = 8 * 1024;
const MAX_LIST_ITEMS: usize = 64;

#[derive(Debug, Clone)]
pub struct CreateDecisionRequest {
    pub scope: DecisionScope,
    pub project_id: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub decision: String,
    pub rationale: Vec<String>,
    pub constraints: Vec<String>,
    pub alternatives: Vec<String>,
    pub consequences: Vec<String>,
    pub tags: Vec<String>,
    pub refs: Vec<String>,
}

pub struct DecisionService<'a> {
    db: &'a mut Database,
}

impl<'a> DecisionService<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }

    pub fn create(
        &mut self,
        principal: &Principal,
        request: CreateDecisionRequest,
        deadline: Deadline,
    ) -> Result<Decision> {
        validate(&request)?;
        deadline.check()?;

        let decision = build_decision(principal, request);
        self.db.insert_decision(&decision)?;

        audit::append(
            self.db,
            principal,
            "decision.create",
            "decision",
            decision.id.as_str(),
            AuditAction::Write,
            AuditOutcome::Ok,
            serde_json::json!({"scope": decision.scope.as_str()}),
        );

        Ok(decision)
    }

    /// Create a replacement decision and flip the prior one to superseded,
    /// atomically.
    pub fn supersede(
        &mut self,
        principal: &Principal,
        prior: &DecisionId,
        request: CreateDecisionRequest,
        deadline: Deadline,
    ) -> Result<Decision> {
        validate(&request)?;
        deadline.check()?;

        let existing = self
            .db
            .get_decision(&principal.tenant_id, prior)?
            .ok_or_else(|| Error::NotFound(format!("decision {}", prior)))?;
        if existing.status != DecisionStatus::Active {
            return Err(Error::Conflict(format!(
                "decision {} is {}, only active decisions can be superseded",
                prior,
                existing.status.as_str()
            )));
        }

        let decision = build_decision(principal, request);
        self.db.insert_superseding_decision(&decision, prior)?;

        audit::append(
            self.db,
            principal,
            "decision.supersede",
            "decision",
            prior.as_str(),
            AuditAction::Write,
            AuditOutcome::Ok,
            serde_json::json!({"superseded_by": decision.id.as_str()}),
        );

        Ok(decision)
    }

    /// Direct read. Overlay semantics: a retracted decision reads as
    /// NotFound, amendments replace the text; quarantine and block only
    /// affect auto-retrieval, not explicit gets.
    pub fn get(
        &mut self,
        principal: &Principal,
        decision_id: &DecisionId,
    ) -> Result<Decision> {
        let decision = self
            .db
            .get_decision(&principal.tenant_id, decision_id)?
            .ok_or_else(|| Error::NotFound(format!("decision {}", decision_id)))?;
        let decision =
            apply_direct_read_edits(self.db, &principal.tenant_id, decision)?
                .ok_or_else(|| Error::NotFound(format!("decision {}", decision_id)))?;

        audit::append(
            self.db,
            principal,
            "decision.read",
            "decision",
            decision_id.as_str(),
            AuditAction::Read,
            AuditOutcome::Ok,
            serde_json::Value::Null,
        );

        Ok(decision)
    }

    pub fn list(
        &mut self,
        principal: &Principal,
        filters: DecisionFilters,
        limit: usize,
    ) -> Result<Vec<Decision>> {
        let mut decisions = Vec::new();
        for decision in self.db.list_decisions(&principal.tenant_id, &filters, limit)? {
            if let Some(decision) =
                apply_direct_read_edits(self.db, &principal.tenant_id, decision)?
            {
                decisions.push(decision);
            }
        }

        audit::append(
            self.db,
            principal,
            "decision.list",
            "decision",
            "*",
            AuditAction::Read,
            AuditOutcome::Ok,
            serde_json::json!({"returned": decisions.len()}),
        );

        Ok(decisions)
    }
}

/// Retract and amend are the only overlay operations that reach explicit
/// decision reads; `None` means retracted.
fn apply_direct_read_edits(
    db: &Database,
    tenant_id: &TenantId,
    mut decision: Decision,
) -> Result<Option<Decision>> {
    let edits = db.approved_edits_for_targets(tenant_id, "decision", &[decision.id.as_str()])?;
    for edit in &edits {
        match &edit.op {
            EditOp::Retract => return Ok(None),
            EditOp::Amend { text: Some(text), .. } => decision.decision = text.clone(),
            _ => {}
        }
    }
    Ok(Some(decision))
}

fn validate(request: &CreateDecisionRequest) -> Result<()> {
    if request.decision.is_empty() || request.decision.len() > MAX_DECISION_LEN {
        return Err(Error::Invalid("decision text length out of range".to_string()));
    }
    for list in [
        &request.rationale,
        &request.constraints,
        &request.alternatives,
        &request.consequences,
    ] {
        if list.len() > MAX_LIST_ITEMS {
            return Err(Error::Invalid("decision list field too long".to_string()));
        }
    }
    if request.scope == DecisionScope::Project && request.project_id.is_none() {
        return Err(Error::Invalid(
            "project-scoped decisions require a project_id".to_string(),
        ));
    }
    Ok(())
}

fn build_decision(principal: &Principal, request: CreateDecisionRequest) -> Decision {
    Decision {
        id: DecisionId::generate(),
        tenant_id: principal.tenant_id.clone(),
        status: DecisionStatus::Active,
        scope: request.scope,
        project_id: request.project_id,
        subject_type: request.subject_type,
        subject_id: request.subject_id,
        decision: request.decision,
        rationale: request.rationale,
        constraints: request.constraints,
        alternatives: request.alternatives,
        consequences: request.consequences,
        tags: request.tags,
        refs: request.refs,
        superseded_by: None,
        ts: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::TenantId;

    fn principal() -> Principal {
        Principal::new(TenantId::parse("t1").unwrap()).with_user("u1")
    }

    fn request(text: &str) -> CreateDecisionRequest {
        CreateDecisionRequest {
            scope: DecisionScope::Global,
            project_id: None,
            subject_type: None,
            subject_id: None,
            decision: text.to_string(),
            rationale: vec![],
            constraints: vec![],
            alternatives: vec![],
            consequences: vec![],
            tags: vec![],
            refs: vec![],
        }
    }

    #[test]
    fn test_supersede_requires_active_prior() {
        let mut db = Database::open_in_memory().unwrap();
        let p = principal();

        let first = DecisionService::new(&mut db)
            .create(&p, request("v1"), Deadline::after_secs(30))
            .unwrap();
        let second = DecisionService::new(&mut db)
            .supersede(&p, &first.id, request("v2"), Deadline::after_secs(30))
            .unwrap();

        // prior now superseded: a second supersession conflicts
        let result = DecisionService::new(&mut db).supersede(
            &p,
            &first.id,
            request("v3"),
            Deadline::after_secs(30),
        );
        assert!(matches!(result, Err(Error::Conflict(_))));

        let loaded = DecisionService::new(&mut db).get(&p, &first.id).unwrap();
        assert_eq!(loaded.superseded_by, Some(second.id));
    }

    #[test]
    fn test_cross_tenant_get_is_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let p = principal();
        let created = DecisionService::new(&mut db)
            .create(&p, request("mine"), Deadline::after_secs(30))
            .unwrap();

        let other = Principal::new(TenantId::parse("t2").unwrap());
        let result = DecisionService::new(&mut db).get(&other, &created.id);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_project_scope_requires_project() {
        let mut db = Database::open_in_memory().unwrap();
        let mut req = request("needs project");
        req.scope = DecisionScope::Project;
        let result = DecisionService::new(&mut db).create(&principal(), req, Deadline::after_secs(30));
        assert!(matches!(result, Err(Error::Invalid(_))));
    }
}
