use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use engram_types::{Decision, DecisionId, DecisionScope, DecisionStatus, TenantId};

use super::events::bad_id;
use super::{from_json, to_json};
use crate::db::{fmt_ts, parse_ts};
use crate::{Error, Result};

/// Listing filters. The default view hides superseded and archived rows;
/// both can be opted back in explicitly.
#[derive(Debug, Clone, Default)]
pub struct DecisionFilters {
    pub status: Option<DecisionStatus>,
    pub include_archived: bool,
    pub project_id: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    /// Substring match against the decision text, case-insensitive
    pub query: Option<String>,
    /// Restrict to decisions carrying this tag
    pub tag: Option<String>,
}

pub fn insert(conn: &Connection, decision: &Decision) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO decisions (
            id, tenant_id, status, scope, project_id, subject_type, subject_id,
            decision, rationale, constraints, alternatives, consequences, tags,
            refs, superseded_by, ts
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
        params![
            decision.id.as_str(),
            decision.tenant_id.as_str(),
            decision.status.as_str(),
            decision.scope.as_str(),
            &decision.project_id,
            &decision.subject_type,
            &decision.subject_id,
            &decision.decision,
            to_json(&decision.rationale)?,
            to_json(&decision.constraints)?,
            to_json(&decision.alternatives)?,
            to_json(&decision.consequences)?,
            to_json(&decision.tags)?,
            to_json(&decision.refs)?,
            decision.superseded_by.as_ref().map(|id| id.as_str().to_string()),
            fmt_ts(decision.ts),
        ],
    )?;

    Ok(())
}

pub fn get(
    conn: &Connection,
    tenant_id: &TenantId,
    decision_id: &DecisionId,
) -> Result<Option<Decision>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM decisions WHERE tenant_id = ?1 AND id = ?2",
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str(), decision_id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_decision(row)?)),
        None => Ok(None),
    }
}

pub fn list(
    conn: &Connection,
    tenant_id: &TenantId,
    filters: &DecisionFilters,
    limit: usize,
) -> Result<Vec<Decision>> {
    let mut where_clauses = vec!["tenant_id = ?".to_string()];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> =
        vec![Box::new(tenant_id.as_str().to_string())];

    match filters.status {
        Some(status) => {
            where_clauses.push("status = ?".to_string());
            params.push(Box::new(status.as_str().to_string()));
        }
        None if filters.include_archived => {
            where_clauses.push("status IN ('active', 'archived')".to_string());
        }
        None => {
            where_clauses.push("status = 'active'".to_string());
        }
    }

    if let Some(project_id) = &filters.project_id {
        // global-scope decisions apply to every project
        where_clauses.push("(project_id = ? OR scope = 'global')".to_string());
        params.push(Box::new(project_id.clone()));
    }

    if let Some(subject_type) = &filters.subject_type {
        where_clauses.push("subject_type = ?".to_string());
        params.push(Box::new(subject_type.clone()));
    }

    if let Some(subject_id) = &filters.subject_id {
        where_clauses.push("subject_id = ?".to_string());
        params.push(Box::new(subject_id.clone()));
    }

    if let Some(query) = &filters.query {
        where_clauses.push("LOWER(decision) LIKE ?".to_string());
        params.push(Box::new(format!("%{}%", query.to_lowercase())));
    }

    if let Some(tag) = &filters.tag {
        // tags column is a JSON array of strings
        where_clauses.push("tags LIKE ?".to_string());
        params.push(Box::new(format!("%\"{}\"%", tag)));
    }

    let query = format!(
        "SELECT {} FROM decisions WHERE {} ORDER BY ts DESC, id DESC LIMIT ?",
        COLUMNS,
        where_clauses.join(" AND ")
    );
    params.push(Box::new(limit as i64));

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt.query(param_refs.as_slice())?;

    let mut decisions = Vec::new();
    while let Some(row) = rows.next()? {
        decisions.push(row_to_decision(row)?);
    }
    Ok(decisions)
}

pub fn count_by_status(
    conn: &Connection,
    tenant_id: &TenantId,
    status: DecisionStatus,
) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM decisions WHERE tenant_id = ?1 AND status = ?2",
        params![tenant_id.as_str(), status.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn mark_superseded(
    conn: &Connection,
    tenant_id: &TenantId,
    decision_id: &DecisionId,
    superseded_by: &DecisionId,
) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE decisions SET status = 'superseded', superseded_by = ?3
        WHERE tenant_id = ?1 AND id = ?2 AND status = 'active'
        "#,
        params![
            tenant_id.as_str(),
            decision_id.as_str(),
            superseded_by.as_str()
        ],
    )?;

    if updated == 0 {
        return Err(Error::Query(format!(
            "decision {} is not active",
            decision_id
        )));
    }
    Ok(())
}

/// Flip stale active decisions to archived, skipping any in `excluded`
/// (decisions with a recent read reference stay active). Returns the
/// affected IDs so the job row can count them.
pub fn archive_older_than(
    conn: &Connection,
    tenant_id: &TenantId,
    cutoff: DateTime<Utc>,
    excluded: &[String],
) -> Result<Vec<DecisionId>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id FROM decisions
        WHERE tenant_id = ?1 AND status = 'active' AND ts < ?2
        "#,
    )?;

    let mut rows = stmt.query(params![tenant_id.as_str(), fmt_ts(cutoff)])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let id = DecisionId::parse(row.get::<_, String>(0)?).map_err(bad_id)?;
        if !excluded.iter().any(|e| e == id.as_str()) {
            ids.push(id);
        }
    }

    for id in &ids {
        conn.execute(
            "UPDATE decisions SET status = 'archived' WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id.as_str(), id.as_str()],
        )?;
    }

    Ok(ids)
}

const COLUMNS: &str = "id, tenant_id, status, scope, project_id, subject_type, subject_id, \
                       decision, rationale, constraints, alternatives, consequences, tags, \
                       refs, superseded_by, ts";

fn row_to_decision(row: &Row<'_>) -> Result<Decision> {
    let status_raw: String = row.get(2)?;
    let scope_raw: String = row.get(3)?;
    let superseded_by: Option<String> = row.get(14)?;

    Ok(Decision {
        id: DecisionId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
        tenant_id: TenantId::parse(row.get::<_, String>(1)?).map_err(bad_id)?,
        status: DecisionStatus::parse(&status_raw)
            .ok_or_else(|| Error::Query(format!("unknown decision status '{}'", status_raw)))?,
        scope: DecisionScope::parse(&scope_raw)
            .ok_or_else(|| Error::Query(format!("unknown decision scope '{}'", scope_raw)))?,
        project_id: row.get(4)?,
        subject_type: row.get(5)?,
        subject_id: row.get(6)?,
        decision: row.get(7)?,
        rationale: from_json(&row.get::<_, String>(8)?)?,
        constraints: from_json(&row.get::<_, String>(9)?)?,
        alternatives: from_json(&row.get::<_, String>(10)?)?,
        consequences: from_json(&row.get::<_, String>(11)?)?,
        tags: from_json(&row.get::<_, String>(12)?)?,
        refs: from_json(&row.get::<_, String>(13)?)?,
        superseded_by: superseded_by
            .map(DecisionId::parse)
            .transpose()
            .map_err(bad_id)?,
        ts: parse_ts(&row.get::<_, String>(15)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Duration;

    fn sample_decision(tenant: &TenantId, text: &str, ts: DateTime<Utc>) -> Decision {
        Decision {
            id: DecisionId::generate(),
            tenant_id: tenant.clone(),
            status: DecisionStatus::Active,
            scope: DecisionScope::Project,
            project_id: Some("proj-1".to_string()),
            subject_type: None,
            subject_id: None,
            decision: text.to_string(),
            rationale: vec!["because".to_string()],
            constraints: vec![],
            alternatives: vec![],
            consequences: vec![],
            tags: vec![],
            refs: vec![],
            superseded_by: None,
            ts,
        }
    }

    #[test]
    fn test_supersession_links_and_flips_status() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();
        let old = sample_decision(&tenant, "use sqlite", Utc::now());
        db.insert_decision(&old).unwrap();

        let new = sample_decision(&tenant, "use sqlite with wal", Utc::now());
        db.insert_superseding_decision(&new, &old.id).unwrap();

        let old_loaded = db.get_decision(&tenant, &old.id).unwrap().unwrap();
        assert_eq!(old_loaded.status, DecisionStatus::Superseded);
        assert_eq!(old_loaded.superseded_by, Some(new.id.clone()));

        // superseding an already-superseded decision is a conflict
        let again = sample_decision(&tenant, "third attempt", Utc::now());
        assert!(db.insert_superseding_decision(&again, &old.id).is_err());
    }

    #[test]
    fn test_default_view_hides_archived() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();
        let stale = sample_decision(&tenant, "old rule", Utc::now() - Duration::days(90));
        let fresh = sample_decision(&tenant, "new rule", Utc::now());
        db.insert_decision(&stale).unwrap();
        db.insert_decision(&fresh).unwrap();

        let archived = db
            .archive_decisions_older_than(&tenant, Utc::now() - Duration::days(60), &[])
            .unwrap();
        assert_eq!(archived, vec![stale.id.clone()]);

        let visible = db
            .list_decisions(&tenant, &DecisionFilters::default(), 10)
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, fresh.id);

        let with_archived = db
            .list_decisions(
                &tenant,
                &DecisionFilters {
                    include_archived: true,
                    ..Default::default()
                },
                10,
            )
            .unwrap();
        assert_eq!(with_archived.len(), 2);
    }
}
