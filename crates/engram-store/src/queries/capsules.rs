use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use engram_types::{Capsule, CapsuleId, CapsuleStatus, DecisionScope, TenantId};

use super::events::bad_id;
use super::{from_json, to_json};
use crate::db::{fmt_ts, parse_ts};
use crate::{Error, Result};

pub fn insert(conn: &Connection, capsule: &Capsule) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO capsules (
            id, tenant_id, author_agent_id, subject_type, subject_id, scope,
            audience_agent_ids, items, risks, ttl_days, created_at, expires_at, status
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
        params![
            capsule.id.as_str(),
            capsule.tenant_id.as_str(),
            &capsule.author_agent_id,
            &capsule.subject_type,
            &capsule.subject_id,
            capsule.scope.as_str(),
            to_json(&capsule.audience_agent_ids)?,
            to_json(&capsule.items)?,
            to_json(&capsule.risks)?,
            capsule.ttl_days,
            fmt_ts(capsule.created_at),
            fmt_ts(capsule.expires_at),
            capsule.status.as_str(),
        ],
    )?;

    Ok(())
}

pub fn get(
    conn: &Connection,
    tenant_id: &TenantId,
    capsule_id: &CapsuleId,
) -> Result<Option<Capsule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM capsules WHERE tenant_id = ?1 AND id = ?2",
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str(), capsule_id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_capsule(row)?)),
        None => Ok(None),
    }
}

pub fn update_status(
    conn: &Connection,
    tenant_id: &TenantId,
    capsule_id: &CapsuleId,
    status: CapsuleStatus,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE capsules SET status = ?3 WHERE tenant_id = ?1 AND id = ?2",
        params![tenant_id.as_str(), capsule_id.as_str(), status.as_str()],
    )?;

    if updated == 0 {
        return Err(Error::Query(format!("capsule {} not found", capsule_id)));
    }
    Ok(())
}

/// Active, unexpired capsules whose audience contains the agent. Audience
/// membership is matched in Rust (the column is a JSON array).
pub fn active_for_agent(
    conn: &Connection,
    tenant_id: &TenantId,
    agent_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Capsule>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM capsules
        WHERE tenant_id = ?1 AND status = 'active' AND expires_at > ?2
        ORDER BY created_at DESC
        "#,
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str(), fmt_ts(now)])?;
    let mut capsules = Vec::new();
    while let Some(row) = rows.next()? {
        let capsule = row_to_capsule(row)?;
        if capsule.audience_agent_ids.iter().any(|a| a == agent_id) {
            capsules.push(capsule);
        }
    }
    Ok(capsules)
}

const COLUMNS: &str = "id, tenant_id, author_agent_id, subject_type, subject_id, scope, \
                       audience_agent_ids, items, risks, ttl_days, created_at, expires_at, status";

fn row_to_capsule(row: &Row<'_>) -> Result<Capsule> {
    let scope_raw: String = row.get(5)?;
    let status_raw: String = row.get(12)?;

    Ok(Capsule {
        id: CapsuleId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
        tenant_id: TenantId::parse(row.get::<_, String>(1)?).map_err(bad_id)?,
        author_agent_id: row.get(2)?,
        subject_type: row.get(3)?,
        subject_id: row.get(4)?,
        scope: DecisionScope::parse(&scope_raw)
            .ok_or_else(|| Error::Query(format!("unknown capsule scope '{}'", scope_raw)))?,
        audience_agent_ids: from_json(&row.get::<_, String>(6)?)?,
        items: from_json(&row.get::<_, String>(7)?)?,
        risks: from_json(&row.get::<_, String>(8)?)?,
        ttl_days: row.get(9)?,
        created_at: parse_ts(&row.get::<_, String>(10)?)?,
        expires_at: parse_ts(&row.get::<_, String>(11)?)?,
        status: CapsuleStatus::parse(&status_raw)
            .ok_or_else(|| Error::Query(format!("unknown capsule status '{}'", status_raw)))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Duration;
    use engram_types::CapsuleItems;

    fn sample_capsule(tenant: &TenantId, audience: &[&str], ttl_days: u32) -> Capsule {
        let created = Utc::now();
        Capsule {
            id: CapsuleId::generate(),
            tenant_id: tenant.clone(),
            author_agent_id: "agent-author".to_string(),
            subject_type: "repo".to_string(),
            subject_id: "engram".to_string(),
            scope: DecisionScope::Project,
            audience_agent_ids: audience.iter().map(|s| s.to_string()).collect(),
            items: CapsuleItems::default(),
            risks: vec![],
            ttl_days,
            created_at: created,
            expires_at: created + Duration::days(i64::from(ttl_days)),
            status: CapsuleStatus::Active,
        }
    }

    #[test]
    fn test_audience_filtering() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();
        let capsule = sample_capsule(&tenant, &["agent-a", "agent-b"], 7);
        db.insert_capsule(&capsule).unwrap();

        assert_eq!(
            db.active_capsules_for_agent(&tenant, "agent-a", Utc::now())
                .unwrap()
                .len(),
            1
        );
        assert!(db
            .active_capsules_for_agent(&tenant, "agent-z", Utc::now())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_expiry_and_revocation() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();
        let capsule = sample_capsule(&tenant, &["agent-a"], 7);
        db.insert_capsule(&capsule).unwrap();

        // past the TTL horizon: gone from the active view
        let later = Utc::now() + Duration::days(8);
        assert!(db
            .active_capsules_for_agent(&tenant, "agent-a", later)
            .unwrap()
            .is_empty());

        db.update_capsule_status(&tenant, &capsule.id, CapsuleStatus::Revoked)
            .unwrap();
        assert!(db
            .active_capsules_for_agent(&tenant, "agent-a", Utc::now())
            .unwrap()
            .is_empty());
    }
}
