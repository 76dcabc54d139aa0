use rusqlite::Connection;

use crate::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 3;

// NOTE: Storage Design Rationale
//
// Why one table per entity, JSON columns for lists?
// - Row shape maps 1:1 to the typed structs in engram-types
// - tags/refs/rationale are opaque to SQL; retrieval filters never touch
//   their members except tags, which are matched in Rust after the
//   sensitivity cut
//
// Why an external-content FTS5 table for chunk text?
// - Ranked full-text search without a second storage engine
// - chunks_fts rows are written in the same transaction as the chunk row,
//   so the index can never drift from ground truth
//
// Why rowid-based tie-breaking for events?
// - ts is monotonic per session but ties are legal; rowid is insert order,
//   which is exactly the order writers committed

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            project_id TEXT,
            subject_type TEXT,
            subject_id TEXT,
            channel TEXT NOT NULL,
            sensitivity TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            actor_type TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            ts TEXT NOT NULL,
            content TEXT NOT NULL,
            refs TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            text TEXT NOT NULL,
            token_est INTEGER NOT NULL,
            importance REAL NOT NULL,
            channel TEXT NOT NULL,
            sensitivity TEXT NOT NULL,
            kind TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            ts TEXT NOT NULL,
            FOREIGN KEY (event_id) REFERENCES events(id)
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
            text,
            content='chunks',
            content_rowid='rowid'
        );

        CREATE TABLE IF NOT EXISTS artifacts (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            event_id TEXT,
            content BLOB NOT NULL,
            byte_len INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS decisions (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            status TEXT NOT NULL,
            scope TEXT NOT NULL,
            project_id TEXT,
            subject_type TEXT,
            subject_id TEXT,
            decision TEXT NOT NULL,
            rationale TEXT NOT NULL DEFAULT '[]',
            constraints TEXT NOT NULL DEFAULT '[]',
            alternatives TEXT NOT NULL DEFAULT '[]',
            consequences TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            refs TEXT NOT NULL DEFAULT '[]',
            superseded_by TEXT,
            ts TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS handoffs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            experienced TEXT NOT NULL,
            noticed TEXT NOT NULL,
            learned TEXT NOT NULL,
            remember TEXT NOT NULL,
            story TEXT,
            becoming TEXT,
            significance REAL NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            compression_level TEXT NOT NULL,
            compact TEXT,
            with_whom TEXT NOT NULL,
            created_at TEXT NOT NULL,
            integrated_into TEXT
        );

        CREATE TABLE IF NOT EXISTS knowledge_notes (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            source_handoffs TEXT NOT NULL DEFAULT '[]',
            confidence REAL NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memory_edits (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            target_type TEXT NOT NULL,
            target_id TEXT NOT NULL,
            op TEXT NOT NULL,
            patch TEXT,
            reason TEXT NOT NULL,
            status TEXT NOT NULL,
            proposed_by TEXT NOT NULL,
            approved_by TEXT,
            created_at TEXT NOT NULL,
            applied_at TEXT
        );

        CREATE TABLE IF NOT EXISTS capsules (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            author_agent_id TEXT NOT NULL,
            subject_type TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            scope TEXT NOT NULL,
            audience_agent_ids TEXT NOT NULL DEFAULT '[]',
            items TEXT NOT NULL,
            risks TEXT NOT NULL DEFAULT '[]',
            ttl_days INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            status TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS consolidation_jobs (
            id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            tenant_id TEXT,
            status TEXT NOT NULL,
            items_processed INTEGER NOT NULL DEFAULT 0,
            items_affected INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            error TEXT
        );

        CREATE TABLE IF NOT EXISTS reflections (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            period_start TEXT NOT NULL,
            period_end TEXT NOT NULL,
            session_count INTEGER NOT NULL,
            summary TEXT NOT NULL,
            key_insights TEXT NOT NULL DEFAULT '[]',
            themes TEXT NOT NULL DEFAULT '[]',
            identity_evolution TEXT NOT NULL,
            source_handoffs TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            user_id TEXT,
            event_type TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            action TEXT NOT NULL,
            outcome TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_events_session ON events(tenant_id, session_id, ts DESC);
        CREATE INDEX IF NOT EXISTS idx_chunks_tenant_ts ON chunks(tenant_id, ts DESC);
        CREATE INDEX IF NOT EXISTS idx_chunks_event ON chunks(event_id);
        CREATE INDEX IF NOT EXISTS idx_decisions_status ON decisions(tenant_id, status, ts DESC);
        CREATE INDEX IF NOT EXISTS idx_handoffs_created ON handoffs(tenant_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_edits_target ON memory_edits(target_type, target_id, status);
        CREATE INDEX IF NOT EXISTS idx_capsules_tenant ON capsules(tenant_id, status);
        CREATE INDEX IF NOT EXISTS idx_jobs_tenant ON consolidation_jobs(tenant_id, job_type, started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_audit_tenant ON audit_log(tenant_id, seq DESC);
        "#,
    )?;

    conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS chunks_fts;
        DROP TABLE IF EXISTS chunks;
        DROP TABLE IF EXISTS events;
        DROP TABLE IF EXISTS artifacts;
        DROP TABLE IF EXISTS decisions;
        DROP TABLE IF EXISTS handoffs;
        DROP TABLE IF EXISTS knowledge_notes;
        DROP TABLE IF EXISTS memory_edits;
        DROP TABLE IF EXISTS capsules;
        DROP TABLE IF EXISTS consolidation_jobs;
        DROP TABLE IF EXISTS reflections;
        DROP TABLE IF EXISTS audit_log;
        "#,
    )?;
    Ok(())
}
