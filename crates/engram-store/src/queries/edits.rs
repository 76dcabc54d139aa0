use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use engram_types::{
    ChunkId, DecisionId, EditId, EditOp, EditStatus, MemoryEdit, TargetRef, TenantId,
};

use super::events::bad_id;
use crate::db::{fmt_ts, parse_ts};
use crate::{Error, Result};

// The op and its patch are stored as the serde-tagged JSON of EditOp
// ({"op": ..., "patch": ...}); the op column is duplicated for indexing.

pub fn insert(conn: &Connection, edit: &MemoryEdit) -> Result<()> {
    let op_json = serde_json::to_string(&edit.op)?;

    conn.execute(
        r#"
        INSERT INTO memory_edits (
            id, tenant_id, target_type, target_id, op, patch, reason, status,
            proposed_by, approved_by, created_at, applied_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            edit.id.as_str(),
            edit.tenant_id.as_str(),
            edit.target.type_str(),
            edit.target.id_str(),
            edit.op.name(),
            op_json,
            &edit.reason,
            edit.status.as_str(),
            &edit.proposed_by,
            &edit.approved_by,
            fmt_ts(edit.created_at),
            edit.applied_at.map(fmt_ts),
        ],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, tenant_id: &TenantId, edit_id: &EditId) -> Result<Option<MemoryEdit>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM memory_edits WHERE tenant_id = ?1 AND id = ?2",
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str(), edit_id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_edit(row)?)),
        None => Ok(None),
    }
}

pub fn list(
    conn: &Connection,
    tenant_id: &TenantId,
    status: Option<EditStatus>,
) -> Result<Vec<MemoryEdit>> {
    let (query, params): (String, Vec<Box<dyn rusqlite::ToSql>>) = match status {
        Some(status) => (
            format!(
                "SELECT {} FROM memory_edits WHERE tenant_id = ? AND status = ? \
                 ORDER BY created_at DESC",
                COLUMNS
            ),
            vec![
                Box::new(tenant_id.as_str().to_string()),
                Box::new(status.as_str().to_string()),
            ],
        ),
        None => (
            format!(
                "SELECT {} FROM memory_edits WHERE tenant_id = ? ORDER BY created_at DESC",
                COLUMNS
            ),
            vec![Box::new(tenant_id.as_str().to_string())],
        ),
    };

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt.query(param_refs.as_slice())?;

    let mut edits = Vec::new();
    while let Some(row) = rows.next()? {
        edits.push(row_to_edit(row)?);
    }
    Ok(edits)
}

pub fn update_status(
    conn: &Connection,
    tenant_id: &TenantId,
    edit_id: &EditId,
    status: EditStatus,
    approved_by: Option<&str>,
    applied_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE memory_edits SET status = ?3, approved_by = ?4, applied_at = ?5
        WHERE tenant_id = ?1 AND id = ?2
        "#,
        params![
            tenant_id.as_str(),
            edit_id.as_str(),
            status.as_str(),
            approved_by,
            applied_at.map(fmt_ts),
        ],
    )?;

    if updated == 0 {
        return Err(Error::Query(format!("edit {} not found", edit_id)));
    }
    Ok(())
}

/// Approved edits for a set of targets, ordered by when they took effect
/// (approval order; retract is terminal so later ops cannot resurrect).
pub fn approved_for_targets(
    conn: &Connection,
    tenant_id: &TenantId,
    target_type: &str,
    target_ids: &[&str],
) -> Result<Vec<MemoryEdit>> {
    if target_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; target_ids.len()].join(", ");
    let query = format!(
        r#"
        SELECT {} FROM memory_edits
        WHERE tenant_id = ? AND status = 'approved' AND target_type = ?
          AND target_id IN ({})
        ORDER BY applied_at ASC, rowid ASC
        "#,
        COLUMNS, placeholders
    );

    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(tenant_id.as_str().to_string()),
        Box::new(target_type.to_string()),
    ];
    for id in target_ids {
        params.push(Box::new(id.to_string()));
    }

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt.query(param_refs.as_slice())?;

    let mut edits = Vec::new();
    while let Some(row) = rows.next()? {
        edits.push(row_to_edit(row)?);
    }
    Ok(edits)
}

const COLUMNS: &str = "id, tenant_id, target_type, target_id, patch, reason, status, \
                       proposed_by, approved_by, created_at, applied_at";

fn row_to_edit(row: &Row<'_>) -> Result<MemoryEdit> {
    let target_type: String = row.get(2)?;
    let target_id: String = row.get(3)?;
    let op_json: String = row.get(4)?;
    let status_raw: String = row.get(6)?;
    let applied_at: Option<String> = row.get(10)?;

    let target = match target_type.as_str() {
        "chunk" => TargetRef::Chunk(ChunkId::parse(target_id).map_err(bad_id)?),
        "decision" => TargetRef::Decision(DecisionId::parse(target_id).map_err(bad_id)?),
        other => {
            return Err(Error::Query(format!("unknown edit target type '{}'", other)));
        }
    };

    let op: EditOp = serde_json::from_str(&op_json)?;

    Ok(MemoryEdit {
        id: EditId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
        tenant_id: TenantId::parse(row.get::<_, String>(1)?).map_err(bad_id)?,
        target,
        op,
        reason: row.get(5)?,
        status: EditStatus::parse(&status_raw)
            .ok_or_else(|| Error::Query(format!("unknown edit status '{}'", status_raw)))?,
        proposed_by: row.get(7)?,
        approved_by: row.get(8)?,
        created_at: parse_ts(&row.get::<_, String>(9)?)?,
        applied_at: applied_at.map(|s| parse_ts(&s)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn sample_edit(tenant: &TenantId, target: TargetRef, op: EditOp, status: EditStatus) -> MemoryEdit {
        MemoryEdit {
            id: EditId::generate(),
            tenant_id: tenant.clone(),
            target,
            op,
            reason: "cleanup".to_string(),
            status,
            proposed_by: "u1".to_string(),
            approved_by: None,
            created_at: Utc::now(),
            applied_at: None,
        }
    }

    #[test]
    fn test_round_trip_preserves_op_patch() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();
        let edit = sample_edit(
            &tenant,
            TargetRef::Chunk(ChunkId::generate()),
            EditOp::Amend {
                text: Some("corrected".to_string()),
                importance: None,
            },
            EditStatus::Approved,
        );
        db.insert_edit(&edit).unwrap();

        let loaded = db.get_edit(&tenant, &edit.id).unwrap().unwrap();
        assert_eq!(loaded.op, edit.op);
        assert_eq!(loaded.target, edit.target);
    }

    #[test]
    fn test_approved_for_targets_skips_pending() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();
        let chunk_id = ChunkId::generate();

        let approved = sample_edit(
            &tenant,
            TargetRef::Chunk(chunk_id.clone()),
            EditOp::Quarantine,
            EditStatus::Approved,
        );
        let pending = sample_edit(
            &tenant,
            TargetRef::Chunk(chunk_id.clone()),
            EditOp::Retract,
            EditStatus::Pending,
        );
        db.insert_edit(&approved).unwrap();
        db.insert_edit(&pending).unwrap();

        let edits = db
            .approved_edits_for_targets(&tenant, "chunk", &[chunk_id.as_str()])
            .unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].id, approved.id);
    }
}
