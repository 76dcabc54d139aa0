use chrono::Utc;
use engram_store::Database;
use engram_types::{AuditAction, AuditOutcome, AuditRecord, Principal};

// Every state-changing operation and every sensitive read appends exactly
// one record. An audit failure is logged but never fails the operation it
// describes; the write already happened.

pub(crate) fn append(
    db: &mut Database,
    principal: &Principal,
    event_type: &str,
    resource_type: &str,
    resource_id: &str,
    action: AuditAction,
    outcome: AuditOutcome,
    details: serde_json::Value,
) {
    let record = AuditRecord {
        ts: Utc::now(),
        tenant_id: principal.tenant_id.clone(),
        user_id: principal.user_id.clone(),
        event_type: event_type.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        action,
        outcome,
        details,
    };

    if let Err(err) = db.append_audit(&record) {
        tracing::warn!(
            tenant = %record.tenant_id,
            event_type = %record.event_type,
            error = %err,
            "failed to append audit record"
        );
    }
}
