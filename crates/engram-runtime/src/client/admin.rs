use std::sync::{Arc, Mutex};

use engram_store::Database;
use engram_types::{AuditAction, AuditOutcome, AuditRecord, Principal, Role};

use crate::audit;
use crate::{Error, Result};

/// Tenant administration: audit log reads and physical purge. Every
/// operation requires the admin role.
pub struct AdminOps {
    db: Arc<Mutex<Database>>,
}

impl AdminOps {
    pub(crate) fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// The audit log is append-only and admin-readable only.
    pub fn read_audit(&self, principal: &Principal, limit: usize) -> Result<Vec<AuditRecord>> {
        let mut db = self.db.lock().unwrap();
        if !principal.has_role(Role::Admin) {
            audit::append(
                &mut db,
                principal,
                "audit.read",
                "audit_log",
                "*",
                AuditAction::Read,
                AuditOutcome::Denied,
                serde_json::Value::Null,
            );
            return Err(Error::Forbidden("admin role required".to_string()));
        }
        Ok(db.read_audit(&principal.tenant_id, limit)?)
    }

    /// Physical deletion of the caller's tenant: the only path that
    /// hard-deletes ground truth. The purge itself stays in the audit log.
    pub fn purge_tenant(&self, principal: &Principal) -> Result<u64> {
        let mut db = self.db.lock().unwrap();
        if !principal.has_role(Role::Admin) {
            audit::append(
                &mut db,
                principal,
                "tenant.purge",
                "tenant",
                principal.tenant_id.as_str(),
                AuditAction::Purge,
                AuditOutcome::Denied,
                serde_json::Value::Null,
            );
            return Err(Error::Forbidden("admin role required".to_string()));
        }

        let removed = db.purge_tenant(&principal.tenant_id)?;
        audit::append(
            &mut db,
            principal,
            "tenant.purge",
            "tenant",
            principal.tenant_id.as_str(),
            AuditAction::Purge,
            AuditOutcome::Ok,
            serde_json::json!({"rows_removed": removed}),
        );
        Ok(removed)
    }
}
