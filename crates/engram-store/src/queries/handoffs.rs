use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use engram_types::{CompressionLevel, Handoff, HandoffId, IdentityEntry, NoteId, TenantId};

use super::events::bad_id;
use super::{from_json, to_json};
use crate::db::{fmt_ts, parse_ts};
use crate::{Error, Result};

pub fn insert(conn: &Connection, handoff: &Handoff) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO handoffs (
            id, tenant_id, experienced, noticed, learned, remember, story, becoming,
            significance, tags, compression_level, compact, with_whom, created_at,
            integrated_into
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            handoff.id.as_str(),
            handoff.tenant_id.as_str(),
            &handoff.experienced,
            &handoff.noticed,
            &handoff.learned,
            &handoff.remember,
            &handoff.story,
            &handoff.becoming,
            handoff.significance,
            to_json(&handoff.tags)?,
            handoff.compression_level.as_str(),
            &handoff.compact,
            &handoff.with_whom,
            fmt_ts(handoff.created_at),
            handoff.integrated_into.as_ref().map(|id| id.as_str().to_string()),
        ],
    )?;

    Ok(())
}

pub fn get(
    conn: &Connection,
    tenant_id: &TenantId,
    handoff_id: &HandoffId,
) -> Result<Option<Handoff>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM handoffs WHERE tenant_id = ?1 AND id = ?2",
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str(), handoff_id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_handoff(row)?)),
        None => Ok(None),
    }
}

pub fn last(
    conn: &Connection,
    tenant_id: &TenantId,
    with_whom: Option<&str>,
) -> Result<Option<Handoff>> {
    let (query, params): (String, Vec<Box<dyn rusqlite::ToSql>>) = match with_whom {
        Some(who) => (
            format!(
                "SELECT {} FROM handoffs WHERE tenant_id = ? AND with_whom = ? \
                 ORDER BY created_at DESC LIMIT 1",
                COLUMNS
            ),
            vec![
                Box::new(tenant_id.as_str().to_string()),
                Box::new(who.to_string()),
            ],
        ),
        None => (
            format!(
                "SELECT {} FROM handoffs WHERE tenant_id = ? \
                 ORDER BY created_at DESC LIMIT 1",
                COLUMNS
            ),
            vec![Box::new(tenant_id.as_str().to_string())],
        ),
    };

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt.query(param_refs.as_slice())?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_handoff(row)?)),
        None => Ok(None),
    }
}

/// The identity thread: handoffs with a non-empty becoming statement,
/// newest first.
pub fn identity_thread(conn: &Connection, tenant_id: &TenantId) -> Result<Vec<IdentityEntry>> {
    identity_entries(conn, tenant_id, false)
}

/// Identity entries not yet folded into a knowledge note; the input set for
/// identity synthesis, so reruns converge to zero work.
pub fn identity_thread_unintegrated(
    conn: &Connection,
    tenant_id: &TenantId,
) -> Result<Vec<IdentityEntry>> {
    identity_entries(conn, tenant_id, true)
}

fn identity_entries(
    conn: &Connection,
    tenant_id: &TenantId,
    only_unintegrated: bool,
) -> Result<Vec<IdentityEntry>> {
    let extra = if only_unintegrated {
        " AND integrated_into IS NULL"
    } else {
        ""
    };
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT id, becoming, created_at, significance
        FROM handoffs
        WHERE tenant_id = ?1 AND becoming IS NOT NULL AND becoming != ''{}
        ORDER BY created_at DESC
        "#,
        extra
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str()])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(IdentityEntry {
            handoff_id: HandoffId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
            becoming: row.get(1)?,
            created_at: parse_ts(&row.get::<_, String>(2)?)?,
            significance: row.get(3)?,
        });
    }
    Ok(entries)
}

/// Handoffs still at `level` and older than `cutoff`, oldest first so the
/// per-run cap drains the backlog in order.
pub fn eligible_for_compression(
    conn: &Connection,
    tenant_id: &TenantId,
    level: CompressionLevel,
    cutoff: DateTime<Utc>,
    cap: usize,
) -> Result<Vec<Handoff>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM handoffs
        WHERE tenant_id = ?1 AND compression_level = ?2 AND created_at < ?3
        ORDER BY created_at ASC
        LIMIT ?4
        "#,
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![
        tenant_id.as_str(),
        level.as_str(),
        fmt_ts(cutoff),
        cap.min(i64::MAX as usize) as i64
    ])?;

    let mut handoffs = Vec::new();
    while let Some(row) = rows.next()? {
        handoffs.push(row_to_handoff(row)?);
    }
    Ok(handoffs)
}

/// Write the compacted content and new level; the narrative source fields
/// are discarded (content is retained only at full compression).
pub fn apply_compression(
    conn: &Connection,
    tenant_id: &TenantId,
    handoff_id: &HandoffId,
    level: CompressionLevel,
    compact: &str,
) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE handoffs
        SET compression_level = ?3, compact = ?4,
            experienced = '', noticed = '', learned = '', remember = '', story = NULL
        WHERE tenant_id = ?1 AND id = ?2
        "#,
        params![
            tenant_id.as_str(),
            handoff_id.as_str(),
            level.as_str(),
            compact
        ],
    )?;

    if updated == 0 {
        return Err(Error::Query(format!("handoff {} not found", handoff_id)));
    }
    Ok(())
}

pub fn mark_integrated(
    conn: &Connection,
    tenant_id: &TenantId,
    handoff_id: &HandoffId,
    note_id: &NoteId,
) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE handoffs
        SET integrated_into = ?3, compression_level = 'integrated'
        WHERE tenant_id = ?1 AND id = ?2
        "#,
        params![tenant_id.as_str(), handoff_id.as_str(), note_id.as_str()],
    )?;

    if updated == 0 {
        return Err(Error::Query(format!("handoff {} not found", handoff_id)));
    }
    Ok(())
}

const COLUMNS: &str = "id, tenant_id, experienced, noticed, learned, remember, story, becoming, \
                       significance, tags, compression_level, compact, with_whom, created_at, \
                       integrated_into";

fn row_to_handoff(row: &Row<'_>) -> Result<Handoff> {
    let level_raw: String = row.get(10)?;
    let integrated_into: Option<String> = row.get(14)?;

    Ok(Handoff {
        id: HandoffId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
        tenant_id: TenantId::parse(row.get::<_, String>(1)?).map_err(bad_id)?,
        experienced: row.get(2)?,
        noticed: row.get(3)?,
        learned: row.get(4)?,
        remember: row.get(5)?,
        story: row.get(6)?,
        becoming: row.get(7)?,
        significance: row.get(8)?,
        tags: from_json(&row.get::<_, String>(9)?)?,
        compression_level: CompressionLevel::parse(&level_raw)
            .ok_or_else(|| Error::Query(format!("unknown compression level '{}'", level_raw)))?,
        compact: row.get(11)?,
        with_whom: row.get(12)?,
        created_at: parse_ts(&row.get::<_, String>(13)?)?,
        integrated_into: integrated_into
            .map(NoteId::parse)
            .transpose()
            .map_err(bad_id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Duration;

    pub(crate) fn sample_handoff(tenant: &TenantId, age_days: i64, becoming: Option<&str>) -> Handoff {
        Handoff {
            id: HandoffId::generate(),
            tenant_id: tenant.clone(),
            experienced: "worked through the migration".to_string(),
            noticed: "tests were brittle".to_string(),
            learned: "smaller steps land faster".to_string(),
            remember: "check the fixtures first".to_string(),
            story: Some("a long day".to_string()),
            becoming: becoming.map(|s| s.to_string()),
            significance: 0.6,
            tags: vec![],
            compression_level: CompressionLevel::Full,
            compact: None,
            with_whom: "casey".to_string(),
            created_at: Utc::now() - Duration::days(age_days),
            integrated_into: None,
        }
    }

    #[test]
    fn test_last_handoff_filters_by_partner() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();

        let mut with_casey = sample_handoff(&tenant, 2, None);
        with_casey.with_whom = "casey".to_string();
        let mut with_jude = sample_handoff(&tenant, 1, None);
        with_jude.with_whom = "jude".to_string();

        db.insert_handoff(&with_casey).unwrap();
        db.insert_handoff(&with_jude).unwrap();

        let latest = db.last_handoff(&tenant, None).unwrap().unwrap();
        assert_eq!(latest.id, with_jude.id);

        let casey = db.last_handoff(&tenant, Some("casey")).unwrap().unwrap();
        assert_eq!(casey.id, with_casey.id);
    }

    #[test]
    fn test_identity_thread_skips_empty_becoming() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();

        db.insert_handoff(&sample_handoff(&tenant, 3, Some("more deliberate"))).unwrap();
        db.insert_handoff(&sample_handoff(&tenant, 2, None)).unwrap();
        db.insert_handoff(&sample_handoff(&tenant, 1, Some(""))).unwrap();

        let thread = db.identity_thread(&tenant).unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].becoming, "more deliberate");
    }

    #[test]
    fn test_compression_discards_source_text() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();
        let handoff = sample_handoff(&tenant, 40, Some("steadier"));
        db.insert_handoff(&handoff).unwrap();

        db.apply_handoff_compression(
            &tenant,
            &handoff.id,
            CompressionLevel::Summary,
            "migration work; brittle tests; smaller steps",
        )
        .unwrap();

        let loaded = db.get_handoff(&tenant, &handoff.id).unwrap().unwrap();
        assert_eq!(loaded.compression_level, CompressionLevel::Summary);
        assert_eq!(
            loaded.compact.as_deref(),
            Some("migration work; brittle tests; smaller steps")
        );
        assert_eq!(loaded.experienced, "");
        assert!(loaded.story.is_none());
        // becoming survives compression; only integration consumes it
        assert_eq!(loaded.becoming.as_deref(), Some("steadier"));

        // a rerun with the same filter no longer sees it
        let eligible = db
            .handoffs_eligible_for_compression(
                &tenant,
                CompressionLevel::Full,
                Utc::now() - Duration::days(30),
                100,
            )
            .unwrap();
        assert!(eligible.is_empty());
    }
}
