use rusqlite::{params, Connection, Row};

use engram_types::{AuditAction, AuditOutcome, AuditRecord, TenantId};

use super::events::bad_id;
use crate::db::{fmt_ts, parse_ts};
use crate::{Error, Result};

pub fn append(conn: &Connection, record: &AuditRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO audit_log (
            ts, tenant_id, user_id, event_type, resource_type, resource_id,
            action, outcome, details
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            fmt_ts(record.ts),
            record.tenant_id.as_str(),
            &record.user_id,
            &record.event_type,
            &record.resource_type,
            &record.resource_id,
            record.action.as_str(),
            record.outcome.as_str(),
            serde_json::to_string(&record.details)?,
        ],
    )?;

    Ok(())
}

pub fn read(conn: &Connection, tenant_id: &TenantId, limit: usize) -> Result<Vec<AuditRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT ts, tenant_id, user_id, event_type, resource_type, resource_id,
               action, outcome, details
        FROM audit_log
        WHERE tenant_id = ?1
        ORDER BY seq DESC
        LIMIT ?2
        "#,
    )?;

    let mut rows = stmt.query(params![tenant_id.as_str(), limit as i64])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_record(row)?);
    }
    Ok(records)
}

/// Resource IDs of a given type with a read record since `since`. Used by
/// decision archival to keep recently-referenced decisions active.
pub fn read_resource_ids(
    conn: &Connection,
    tenant_id: &TenantId,
    resource_type: &str,
    since: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT DISTINCT resource_id FROM audit_log
        WHERE tenant_id = ?1 AND resource_type = ?2 AND action = 'read' AND ts >= ?3
        "#,
    )?;

    let mut rows = stmt.query(params![tenant_id.as_str(), resource_type, fmt_ts(since)])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

fn row_to_record(row: &Row<'_>) -> Result<AuditRecord> {
    let action_raw: String = row.get(6)?;
    let outcome_raw: String = row.get(7)?;
    let details_raw: String = row.get(8)?;

    let action = match action_raw.as_str() {
        "read" => AuditAction::Read,
        "write" => AuditAction::Write,
        "approve" => AuditAction::Approve,
        "revoke" => AuditAction::Revoke,
        "purge" => AuditAction::Purge,
        "run" => AuditAction::Run,
        other => return Err(Error::Query(format!("unknown audit action '{}'", other))),
    };
    let outcome = match outcome_raw.as_str() {
        "ok" => AuditOutcome::Ok,
        "denied" => AuditOutcome::Denied,
        "error" => AuditOutcome::Error,
        other => return Err(Error::Query(format!("unknown audit outcome '{}'", other))),
    };

    Ok(AuditRecord {
        ts: parse_ts(&row.get::<_, String>(0)?)?,
        tenant_id: TenantId::parse(row.get::<_, String>(1)?).map_err(bad_id)?,
        user_id: row.get(2)?,
        event_type: row.get(3)?,
        resource_type: row.get(4)?,
        resource_id: row.get(5)?,
        action,
        outcome,
        details: serde_json::from_str(&details_raw)?,
    })
}
