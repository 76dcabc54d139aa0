use chrono::Utc;

use engram_store::Database;
use engram_types::{
    AuditAction, AuditOutcome, EditId, EditOp, EditStatus, MemoryEdit, Principal, Role, TargetRef,
};

use crate::audit;
use crate::deadline::Deadline;
use crate::{Error, Result};

const MAX_REASON_LEN: usize = 2048;

#[derive(Debug, Clone)]
pub struct ProposeEditRequest {
    pub target: TargetRef,
    pub op: EditOp,
    pub reason: String,
}

pub struct EditService<'a> {
    db: &'a mut Database,
}

impl<'a> EditService<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }

    /// Propose a governance edit. Operations that do not require approval
    /// are approved and applied immediately; retract and block stay pending
    /// until an approver confirms them.
    pub fn propose(
        &mut self,
        principal: &Principal,
        request: ProposeEditRequest,
        deadline: Deadline,
    ) -> Result<MemoryEdit> {
        if request.reason.is_empty() || request.reason.len() > MAX_REASON_LEN {
            return Err(Error::Invalid("reason length out of range".to_string()));
        }
        validate_patch(&request.op)?;
        deadline.check()?;

        self.ensure_target_exists(principal, &request.target)?;

        let now = Utc::now();
        let auto_apply = !request.op.requires_approval();
        let edit = MemoryEdit {
            id: EditId::generate(),
            tenant_id: principal.tenant_id.clone(),
            target: request.target,
            op: request.op,
            reason: request.reason,
            status: if auto_apply {
                EditStatus::Approved
            } else {
                EditStatus::Pending
            },
            proposed_by: principal.actor_id().to_string(),
            approved_by: auto_apply.then(|| principal.actor_id().to_string()),
            created_at: now,
            applied_at: auto_apply.then_some(now),
        };

        self.db.insert_edit(&edit)?;

        audit::append(
            self.db,
            principal,
            "edit.propose",
            edit.target.type_str(),
            edit.target.id_str(),
            AuditAction::Write,
            AuditOutcome::Ok,
            serde_json::json!({"op": edit.op.name(), "auto_applied": auto_apply}),
        );

        Ok(edit)
    }

    /// Approve a pending edit. Requires the approver role; re-approving an
    /// already-approved edit is a no-op so approval is idempotent.
    pub fn approve(
        &mut self,
        principal: &Principal,
        edit_id: &EditId,
        deadline: Deadline,
    ) -> Result<MemoryEdit> {
        if !principal.has_role(Role::Approver) && !principal.has_role(Role::Admin) {
            audit::append(
                self.db,
                principal,
                "edit.approve",
                "edit",
                edit_id.as_str(),
                AuditAction::Approve,
                AuditOutcome::Denied,
                serde_json::Value::Null,
            );
            return Err(Error::Forbidden("approver role required".to_string()));
        }
        deadline.check()?;

        let edit = self
            .db
            .get_edit(&principal.tenant_id, edit_id)?
            .ok_or_else(|| Error::NotFound(format!("edit {}", edit_id)))?;

        match edit.status {
            EditStatus::Approved => return Ok(edit),
            EditStatus::Rejected => {
                return Err(Error::Conflict(format!(
                    "edit {} was already rejected",
                    edit_id
                )));
            }
            EditStatus::Pending => {}
        }

        self.db.update_edit_status(
            &principal.tenant_id,
            edit_id,
            EditStatus::Approved,
            Some(principal.actor_id()),
            Some(Utc::now()),
        )?;

        audit::append(
            self.db,
            principal,
            "edit.approve",
            edit.target.type_str(),
            edit.target.id_str(),
            AuditAction::Approve,
            AuditOutcome::Ok,
            serde_json::json!({"op": edit.op.name()}),
        );

        self.db
            .get_edit(&principal.tenant_id, edit_id)?
            .ok_or_else(|| Error::NotFound(format!("edit {}", edit_id)))
    }

    pub fn reject(
        &mut self,
        principal: &Principal,
        edit_id: &EditId,
        deadline: Deadline,
    ) -> Result<MemoryEdit> {
        if !principal.has_role(Role::Approver) && !principal.has_role(Role::Admin) {
            return Err(Error::Forbidden("approver role required".to_string()));
        }
        deadline.check()?;

        let edit = self
            .db
            .get_edit(&principal.tenant_id, edit_id)?
            .ok_or_else(|| Error::NotFound(format!("edit {}", edit_id)))?;
        if edit.status != EditStatus::Pending {
            return Err(Error::Conflict(format!(
                "edit {} is not pending",
                edit_id
            )));
        }

        self.db.update_edit_status(
            &principal.tenant_id,
            edit_id,
            EditStatus::Rejected,
            Some(principal.actor_id()),
            None,
        )?;

        audit::append(
            self.db,
            principal,
            "edit.reject",
            edit.target.type_str(),
            edit.target.id_str(),
            AuditAction::Approve,
            AuditOutcome::Ok,
            serde_json::Value::Null,
        );

        self.db
            .get_edit(&principal.tenant_id, edit_id)?
            .ok_or_else(|| Error::NotFound(format!("edit {}", edit_id)))
    }

    pub fn list(
        &mut self,
        principal: &Principal,
        status: Option<EditStatus>,
    ) -> Result<Vec<MemoryEdit>> {
        Ok(self.db.list_edits(&principal.tenant_id, status)?)
    }

    /// Unknown and cross-tenant targets are both NotFound: no disclosure.
    fn ensure_target_exists(&self, principal: &Principal, target: &TargetRef) -> Result<()> {
        let exists = match target {
            TargetRef::Chunk(id) => self.db.get_chunk(&principal.tenant_id, id)?.is_some(),
            TargetRef::Decision(id) => self.db.get_decision(&principal.tenant_id, id)?.is_some(),
        };
        if exists {
            Ok(())
        } else {
            Err(Error::NotFound(format!(
                "{} {}",
                target.type_str(),
                target.id_str()
            )))
        }
    }
}

fn validate_patch(op: &EditOp) -> Result<()> {
    match op {
        EditOp::Amend { text, importance } => {
            if text.is_none() && importance.is_none() {
                return Err(Error::Invalid("amend patch is empty".to_string()));
            }
            if let Some(importance) = importance
                && !(0.0..=1.0).contains(importance)
            {
                return Err(Error::Invalid("amend importance out of [0, 1]".to_string()));
            }
            Ok(())
        }
        EditOp::Attenuate { importance_delta } => {
            if *importance_delta <= 0.0 {
                return Err(Error::Invalid(
                    "attenuate importance_delta must be positive".to_string(),
                ));
            }
            Ok(())
        }
        EditOp::Retract | EditOp::Quarantine | EditOp::Block { .. } => Ok(()),
    }
}
