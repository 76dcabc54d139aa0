use rusqlite::{params, Connection, Row};

use engram_types::{Channel, Chunk, ChunkId, EventId, EventKind, Sensitivity, TenantId};

use super::events::bad_id;
use super::{from_json, to_json};
use crate::db::{fmt_ts, parse_ts};
use crate::{Error, Result};

/// Read-side filters for chunk search; the sensitivity cut is non-optional.
#[derive(Debug, Clone)]
pub struct ChunkFilters {
    pub sensitivity_allowed: Vec<Sensitivity>,
    pub kinds: Option<Vec<EventKind>>,
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
}

impl ChunkFilters {
    pub fn for_sensitivities(allowed: &[Sensitivity]) -> Self {
        Self {
            sensitivity_allowed: allowed.to_vec(),
            kinds: None,
            session_id: None,
            project_id: None,
            subject_type: None,
            subject_id: None,
        }
    }
}

/// A candidate chunk with its full-text rank.
///
/// `rank` is the negated bm25 score: positive, larger is better, zero for
/// recency-only listings.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub rank: f64,
}

pub fn insert(conn: &Connection, chunk: &Chunk) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO chunks (
            id, event_id, tenant_id, session_id, text, token_est, importance,
            channel, sensitivity, kind, tags, ts
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            chunk.id.as_str(),
            chunk.event_id.as_str(),
            chunk.tenant_id.as_str(),
            &chunk.session_id,
            &chunk.text,
            chunk.token_est,
            chunk.importance,
            chunk.channel.as_str(),
            chunk.sensitivity.as_str(),
            chunk.kind.as_str(),
            to_json(&chunk.tags)?,
            fmt_ts(chunk.ts),
        ],
    )?;

    let rowid = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO chunks_fts (rowid, text) VALUES (?1, ?2)",
        params![rowid, &chunk.text],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, tenant_id: &TenantId, chunk_id: &ChunkId) -> Result<Option<Chunk>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM chunks c WHERE c.tenant_id = ?1 AND c.id = ?2",
        CHUNK_COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str(), chunk_id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_chunk(row)?)),
        None => Ok(None),
    }
}

pub fn for_event(
    conn: &Connection,
    tenant_id: &TenantId,
    event_id: &EventId,
) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM chunks c WHERE c.tenant_id = ?1 AND c.event_id = ?2",
        CHUNK_COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str(), event_id.as_str()])?;
    let mut chunks = Vec::new();
    while let Some(row) = rows.next()? {
        chunks.push(row_to_chunk(row)?);
    }
    Ok(chunks)
}

pub fn get_many(
    conn: &Connection,
    tenant_id: &TenantId,
    chunk_ids: &[ChunkId],
) -> Result<Vec<Chunk>> {
    if chunk_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; chunk_ids.len()].join(", ");
    let query = format!(
        "SELECT {} FROM chunks c WHERE c.tenant_id = ? AND c.id IN ({})",
        CHUNK_COLUMNS, placeholders
    );

    let mut params: Vec<Box<dyn rusqlite::ToSql>> =
        vec![Box::new(tenant_id.as_str().to_string())];
    for id in chunk_ids {
        params.push(Box::new(id.as_str().to_string()));
    }

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt.query(param_refs.as_slice())?;

    let mut chunks = Vec::new();
    while let Some(row) = rows.next()? {
        chunks.push(row_to_chunk(row)?);
    }
    Ok(chunks)
}

/// Ranked full-text search over the FTS5 index.
///
/// Candidates are ordered by rank, then ts, then chunk id (the documented
/// tie-break), capped at `limit_candidates`.
pub fn search(
    conn: &Connection,
    tenant_id: &TenantId,
    query_terms: &[String],
    filters: &ChunkFilters,
    limit_candidates: usize,
) -> Result<Vec<RankedChunk>> {
    let match_expr = build_match_expr(query_terms);
    if match_expr.is_empty() {
        return Ok(Vec::new());
    }

    let (filter_sql, mut filter_params) = build_filter_clauses(filters);

    let query = format!(
        r#"
        SELECT {}, -bm25(chunks_fts) AS rank
        FROM chunks_fts f
        JOIN chunks c ON c.rowid = f.rowid
        {}
        WHERE chunks_fts MATCH ? AND c.tenant_id = ?{}
        ORDER BY rank DESC, c.ts DESC, c.id DESC
        LIMIT ?
        "#,
        CHUNK_COLUMNS,
        subject_join(filters),
        filter_sql,
    );

    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(match_expr),
        Box::new(tenant_id.as_str().to_string()),
    ];
    params.append(&mut filter_params);
    params.push(Box::new(limit_candidates as i64));

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt.query(param_refs.as_slice())?;

    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        let rank: f64 = row.get(12)?;
        results.push(RankedChunk {
            chunk: row_to_chunk(row)?,
            rank,
        });
    }
    Ok(results)
}

/// Recency-ordered listing for query-less retrieval; rank is zero.
pub fn recent(
    conn: &Connection,
    tenant_id: &TenantId,
    filters: &ChunkFilters,
    limit: usize,
) -> Result<Vec<RankedChunk>> {
    let (filter_sql, mut filter_params) = build_filter_clauses(filters);

    let query = format!(
        r#"
        SELECT {}
        FROM chunks c
        {}
        WHERE c.tenant_id = ?{}
        ORDER BY c.ts DESC, c.id DESC
        LIMIT ?
        "#,
        CHUNK_COLUMNS,
        subject_join(filters),
        filter_sql,
    );

    let mut params: Vec<Box<dyn rusqlite::ToSql>> =
        vec![Box::new(tenant_id.as_str().to_string())];
    params.append(&mut filter_params);
    params.push(Box::new(limit as i64));

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt.query(param_refs.as_slice())?;

    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(RankedChunk {
            chunk: row_to_chunk(row)?,
            rank: 0.0,
        });
    }
    Ok(results)
}

const CHUNK_COLUMNS: &str = "c.id, c.event_id, c.tenant_id, c.session_id, c.text, c.token_est, \
                             c.importance, c.channel, c.sensitivity, c.kind, c.tags, c.ts";

/// Each term becomes a quoted FTS phrase (internal quotes doubled), joined
/// with OR. Raw FTS syntax from callers never reaches the engine.
fn build_match_expr(query_terms: &[String]) -> String {
    query_terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn subject_join(filters: &ChunkFilters) -> &'static str {
    if filters.project_id.is_some()
        || filters.subject_type.is_some()
        || filters.subject_id.is_some()
    {
        "JOIN events e ON e.id = c.event_id"
    } else {
        ""
    }
}

fn build_filter_clauses(filters: &ChunkFilters) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut sql = String::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    let sens_placeholders = vec!["?"; filters.sensitivity_allowed.len()].join(", ");
    sql.push_str(&format!(" AND c.sensitivity IN ({})", sens_placeholders));
    for s in &filters.sensitivity_allowed {
        params.push(Box::new(s.as_str().to_string()));
    }

    if let Some(kinds) = &filters.kinds {
        let kind_placeholders = vec!["?"; kinds.len()].join(", ");
        sql.push_str(&format!(" AND c.kind IN ({})", kind_placeholders));
        for k in kinds {
            params.push(Box::new(k.as_str().to_string()));
        }
    }

    if let Some(session_id) = &filters.session_id {
        sql.push_str(" AND c.session_id = ?");
        params.push(Box::new(session_id.clone()));
    }

    if let Some(project_id) = &filters.project_id {
        sql.push_str(" AND e.project_id = ?");
        params.push(Box::new(project_id.clone()));
    }

    if let Some(subject_type) = &filters.subject_type {
        sql.push_str(" AND e.subject_type = ?");
        params.push(Box::new(subject_type.clone()));
    }

    if let Some(subject_id) = &filters.subject_id {
        sql.push_str(" AND e.subject_id = ?");
        params.push(Box::new(subject_id.clone()));
    }

    (sql, params)
}

fn row_to_chunk(row: &Row<'_>) -> Result<Chunk> {
    let channel_raw: String = row.get(7)?;
    let sensitivity_raw: String = row.get(8)?;
    let kind_raw: String = row.get(9)?;

    Ok(Chunk {
        id: ChunkId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
        event_id: EventId::parse(row.get::<_, String>(1)?).map_err(bad_id)?,
        tenant_id: TenantId::parse(row.get::<_, String>(2)?).map_err(bad_id)?,
        session_id: row.get(3)?,
        text: row.get(4)?,
        token_est: row.get(5)?,
        importance: row.get(6)?,
        channel: Channel::parse(&channel_raw)
            .ok_or_else(|| Error::Query(format!("unknown channel '{}'", channel_raw)))?,
        sensitivity: Sensitivity::parse(&sensitivity_raw)
            .ok_or_else(|| Error::Query(format!("unknown sensitivity '{}'", sensitivity_raw)))?,
        kind: EventKind::parse(&kind_raw)
            .ok_or_else(|| Error::Query(format!("unknown kind '{}'", kind_raw)))?,
        tags: from_json(&row.get::<_, String>(10)?)?,
        ts: parse_ts(&row.get::<_, String>(11)?)?,
    })
}
