use rusqlite::{params, Connection, Row};

use engram_types::{KnowledgeNote, NoteId, TenantId};

use super::events::bad_id;
use super::{from_json, to_json};
use crate::db::{fmt_ts, parse_ts};
use crate::Result;

pub fn insert(conn: &Connection, note: &KnowledgeNote) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO knowledge_notes (
            id, tenant_id, title, content, source_handoffs, confidence, tags, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            note.id.as_str(),
            note.tenant_id.as_str(),
            &note.title,
            &note.content,
            to_json(&note.source_handoffs)?,
            note.confidence,
            to_json(&note.tags)?,
            fmt_ts(note.created_at),
        ],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, tenant_id: &TenantId, note_id: &NoteId) -> Result<Option<KnowledgeNote>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM knowledge_notes WHERE tenant_id = ?1 AND id = ?2",
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str(), note_id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_note(row)?)),
        None => Ok(None),
    }
}

pub fn list(conn: &Connection, tenant_id: &TenantId) -> Result<Vec<KnowledgeNote>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM knowledge_notes WHERE tenant_id = ?1 ORDER BY created_at DESC",
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str()])?;
    let mut notes = Vec::new();
    while let Some(row) = rows.next()? {
        notes.push(row_to_note(row)?);
    }
    Ok(notes)
}

pub fn count(conn: &Connection, tenant_id: &TenantId) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM knowledge_notes WHERE tenant_id = ?1",
        params![tenant_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

const COLUMNS: &str = "id, tenant_id, title, content, source_handoffs, confidence, tags, created_at";

fn row_to_note(row: &Row<'_>) -> Result<KnowledgeNote> {
    Ok(KnowledgeNote {
        id: NoteId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
        tenant_id: TenantId::parse(row.get::<_, String>(1)?).map_err(bad_id)?,
        title: row.get(2)?,
        content: row.get(3)?,
        source_handoffs: from_json(&row.get::<_, String>(4)?)?,
        confidence: row.get(5)?,
        tags: from_json(&row.get::<_, String>(6)?)?,
        created_at: parse_ts(&row.get::<_, String>(7)?)?,
    })
}
