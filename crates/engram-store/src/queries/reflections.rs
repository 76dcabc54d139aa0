use rusqlite::{params, Connection, Row};

use engram_types::{Reflection, ReflectionId, TenantId};

use super::events::bad_id;
use super::{from_json, to_json};
use crate::db::{fmt_ts, parse_ts};
use crate::Result;

pub fn insert(conn: &Connection, reflection: &Reflection) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO reflections (
            id, tenant_id, period_start, period_end, session_count, summary,
            key_insights, themes, identity_evolution, source_handoffs, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            reflection.id.as_str(),
            reflection.tenant_id.as_str(),
            fmt_ts(reflection.period_start),
            fmt_ts(reflection.period_end),
            reflection.session_count,
            &reflection.summary,
            to_json(&reflection.key_insights)?,
            to_json(&reflection.themes)?,
            &reflection.identity_evolution,
            to_json(&reflection.source_handoffs)?,
            fmt_ts(reflection.created_at),
        ],
    )?;

    Ok(())
}

pub fn list(conn: &Connection, tenant_id: &TenantId) -> Result<Vec<Reflection>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM reflections WHERE tenant_id = ?1 ORDER BY created_at DESC",
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str()])?;
    let mut reflections = Vec::new();
    while let Some(row) = rows.next()? {
        reflections.push(row_to_reflection(row)?);
    }
    Ok(reflections)
}

const COLUMNS: &str = "id, tenant_id, period_start, period_end, session_count, summary, \
                       key_insights, themes, identity_evolution, source_handoffs, created_at";

fn row_to_reflection(row: &Row<'_>) -> Result<Reflection> {
    Ok(Reflection {
        id: ReflectionId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
        tenant_id: TenantId::parse(row.get::<_, String>(1)?).map_err(bad_id)?,
        period_start: parse_ts(&row.get::<_, String>(2)?)?,
        period_end: parse_ts(&row.get::<_, String>(3)?)?,
        session_count: row.get(4)?,
        summary: row.get(5)?,
        key_insights: from_json(&row.get::<_, String>(6)?)?,
        themes: from_json(&row.get::<_, String>(7)?)?,
        identity_evolution: row.get(8)?,
        source_handoffs: from_json(&row.get::<_, String>(9)?)?,
        created_at: parse_ts(&row.get::<_, String>(10)?)?,
    })
}
