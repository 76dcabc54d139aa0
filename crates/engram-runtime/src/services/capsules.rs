use chrono::{Duration, Utc};

use engram_store::Database;
use engram_types::{
    AuditAction, AuditOutcome, Capsule, CapsuleId, CapsuleItems, CapsuleStatus, DecisionScope,
    Principal,
};

use crate::audit;
use crate::deadline::Deadline;
use crate::{Error, Result};

const MAX_AUDIENCE: usize = 64;
const MAX_TTL_DAYS: u32 = 365;

#[derive(Debug, Clone)]
pub struct CreateCapsuleRequest {
    pub author_agent_id: String,
    pub subject_type: String,
    pub subject_id: String,
    pub scope: DecisionScope,
    pub audience_agent_ids: Vec<String>,
    pub items: CapsuleItems,
    pub risks: Vec<String>,
    pub ttl_days: u32,
}

pub struct CapsuleService<'a> {
    db: &'a mut Database,
}

impl<'a> CapsuleService<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }

    pub fn create(
        &mut self,
        principal: &Principal,
        request: CreateCapsuleRequest,
        deadline: Deadline,
    ) -> Result<Capsule> {
        validate(&request)?;
        deadline.check()?;

        let created_at = Utc::now();
        let capsule = Capsule {
            id: CapsuleId::generate(),
            tenant_id: principal.tenant_id.clone(),
            author_agent_id: request.author_agent_id,
            subject_type: request.subject_type,
            subject_id: request.subject_id,
            scope: request.scope,
            audience_agent_ids: request.audience_agent_ids,
            items: request.items,
            risks: request.risks,
            ttl_days: request.ttl_days,
            created_at,
            expires_at: created_at + Duration::days(i64::from(request.ttl_days)),
            status: CapsuleStatus::Active,
        };

        self.db.insert_capsule(&capsule)?;

        audit::append(
            self.db,
            principal,
            "capsule.create",
            "capsule",
            capsule.id.as_str(),
            AuditAction::Write,
            AuditOutcome::Ok,
            serde_json::json!({"audience": capsule.audience_agent_ids.len()}),
        );

        Ok(capsule)
    }

    /// Fetch a capsule; expiry is access-time checked, so a stale `active`
    /// row past its TTL surfaces as Expired.
    pub fn get(
        &mut self,
        principal: &Principal,
        capsule_id: &CapsuleId,
    ) -> Result<Capsule> {
        let capsule = self
            .db
            .get_capsule(&principal.tenant_id, capsule_id)?
            .ok_or_else(|| Error::NotFound(format!("capsule {}", capsule_id)))?;

        if capsule.status == CapsuleStatus::Revoked {
            return Err(Error::NotFound(format!("capsule {}", capsule_id)));
        }
        if capsule.is_expired_at(Utc::now()) {
            return Err(Error::Expired(format!("capsule {}", capsule_id)));
        }

        audit::append(
            self.db,
            principal,
            "capsule.read",
            "capsule",
            capsule_id.as_str(),
            AuditAction::Read,
            AuditOutcome::Ok,
            serde_json::Value::Null,
        );

        Ok(capsule)
    }

    pub fn revoke(
        &mut self,
        principal: &Principal,
        capsule_id: &CapsuleId,
        deadline: Deadline,
    ) -> Result<()> {
        deadline.check()?;

        let capsule = self
            .db
            .get_capsule(&principal.tenant_id, capsule_id)?
            .ok_or_else(|| Error::NotFound(format!("capsule {}", capsule_id)))?;
        if capsule.status == CapsuleStatus::Revoked {
            return Err(Error::Conflict(format!(
                "capsule {} already revoked",
                capsule_id
            )));
        }

        self.db
            .update_capsule_status(&principal.tenant_id, capsule_id, CapsuleStatus::Revoked)?;

        audit::append(
            self.db,
            principal,
            "capsule.revoke",
            "capsule",
            capsule_id.as_str(),
            AuditAction::Revoke,
            AuditOutcome::Ok,
            serde_json::Value::Null,
        );

        Ok(())
    }

    /// Active, unexpired capsules addressed to an agent.
    pub fn list_for_agent(&self, principal: &Principal, agent_id: &str) -> Result<Vec<Capsule>> {
        Ok(self
            .db
            .active_capsules_for_agent(&principal.tenant_id, agent_id, Utc::now())?)
    }
}

fn validate(request: &CreateCapsuleRequest) -> Result<()> {
    if request.author_agent_id.is_empty() {
        return Err(Error::Invalid("author_agent_id is required".to_string()));
    }
    if request.subject_type.is_empty() || request.subject_id.is_empty() {
        return Err(Error::Invalid("subject is required".to_string()));
    }
    if request.audience_agent_ids.is_empty() || request.audience_agent_ids.len() > MAX_AUDIENCE {
        return Err(Error::Invalid("audience size out of range".to_string()));
    }
    if request.ttl_days == 0 || request.ttl_days > MAX_TTL_DAYS {
        return Err(Error::Invalid("ttl_days out of range".to_string()));
    }
    if request.items.is_empty() {
        return Err(Error::Invalid("capsule items are empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::{ChunkId, TenantId};

    fn principal() -> Principal {
        Principal::new(TenantId::parse("t1").unwrap()).with_user("author")
    }

    fn request(ttl_days: u32) -> CreateCapsuleRequest {
        CreateCapsuleRequest {
            author_agent_id: "agent-a".to_string(),
            subject_type: "repo".to_string(),
            subject_id: "engram".to_string(),
            scope: DecisionScope::Project,
            audience_agent_ids: vec!["agent-b".to_string()],
            items: CapsuleItems {
                chunk_ids: vec![ChunkId::generate()],
                decision_ids: vec![],
                artifact_ids: vec![],
            },
            risks: vec!["context may age out".to_string()],
            ttl_days,
        }
    }

    #[test]
    fn test_revoked_capsule_reads_as_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let p = principal();
        let capsule = CapsuleService::new(&mut db)
            .create(&p, request(7), Deadline::after_secs(30))
            .unwrap();

        CapsuleService::new(&mut db)
            .revoke(&p, &capsule.id, Deadline::after_secs(30))
            .unwrap();

        let result = CapsuleService::new(&mut db).get(&p, &capsule.id);
        assert!(matches!(result, Err(Error::NotFound(_))));

        // double revoke conflicts
        let result = CapsuleService::new(&mut db).revoke(&p, &capsule.id, Deadline::after_secs(30));
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let mut req = request(7);
        req.items = CapsuleItems::default();
        let result =
            CapsuleService::new(&mut db).create(&principal(), req, Deadline::after_secs(30));
        assert!(matches!(result, Err(Error::Invalid(_))));
    }
}
