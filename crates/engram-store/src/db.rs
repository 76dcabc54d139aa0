use rusqlite::Connection;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use engram_types::{
    ArtifactId, AuditRecord, Capsule, CapsuleId, CapsuleStatus, Chunk, ChunkId, CompressionLevel,
    ConsolidationJob, Decision, DecisionId, DecisionStatus, EditId, EditStatus, Event, EventId,
    Handoff, HandoffId, IdentityEntry, JobId, JobStatus, JobType, KnowledgeNote, MemoryEdit,
    NoteId, Reflection, TenantId,
};

use crate::queries;
use crate::queries::chunks::{ChunkFilters, RankedChunk};
use crate::queries::decisions::DecisionFilters;
use crate::schema;
use crate::{Error, Result};

/// Typed, transactional access to the storage engine.
///
/// One `Database` wraps one SQLite connection; services share it behind
/// `Arc<Mutex<Database>>`. Every read method takes the tenant as a
/// non-optional parameter and scopes the query at the SQL level.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    /// Run `f` inside a write transaction.
    ///
    /// A transient lock/serialization conflict is retried exactly once,
    /// after a sub-25ms jittered pause. Any other failure rolls back and
    /// surfaces unchanged.
    pub fn write_tx<T>(
        &mut self,
        f: impl Fn(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        match Self::try_tx(&mut self.conn, &f) {
            Err(err) if err.is_serialization_conflict() => {
                std::thread::sleep(jitter());
                Self::try_tx(&mut self.conn, &f)
            }
            other => other,
        }
    }

    fn try_tx<T>(
        conn: &mut Connection,
        f: &impl Fn(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // --- events ---

    /// Atomic insert of one event plus its derived chunks (all-or-nothing).
    pub fn insert_event_with_chunks(&mut self, event: &Event, chunks: &[Chunk]) -> Result<()> {
        self.write_tx(|tx| {
            queries::events::insert(tx, event)?;
            for chunk in chunks {
                queries::chunks::insert(tx, chunk)?;
            }
            Ok(())
        })
    }

    /// Atomic insert of an event, its chunks, and an offloaded artifact.
    /// A failure anywhere leaves no partial state.
    pub fn insert_event_bundle(
        &mut self,
        event: &Event,
        chunks: &[Chunk],
        artifact: Option<(&ArtifactId, &[u8])>,
    ) -> Result<()> {
        self.write_tx(|tx| {
            if let Some((artifact_id, content)) = artifact {
                queries::artifacts::insert(
                    tx,
                    &event.tenant_id,
                    artifact_id,
                    Some(&event.id),
                    content,
                    event.ts,
                )?;
            }
            queries::events::insert(tx, event)?;
            for chunk in chunks {
                queries::chunks::insert(tx, chunk)?;
            }
            Ok(())
        })
    }

    pub fn get_event(&self, tenant_id: &TenantId, event_id: &EventId) -> Result<Option<Event>> {
        queries::events::get(&self.conn, tenant_id, event_id)
    }

    /// Most recent events of a session, newest first; ties on ts break by
    /// insert order so readers observe commit order.
    pub fn recent_session_events(
        &self,
        tenant_id: &TenantId,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>> {
        queries::events::recent_for_session(&self.conn, tenant_id, session_id, limit)
    }

    pub fn latest_session_ts(
        &self,
        tenant_id: &TenantId,
        session_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        queries::events::latest_ts(&self.conn, tenant_id, session_id)
    }

    pub fn recent_task_updates(
        &self,
        tenant_id: &TenantId,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>> {
        queries::events::recent_task_updates(&self.conn, tenant_id, session_id, limit)
    }

    // --- chunks ---

    pub fn search_chunks(
        &self,
        tenant_id: &TenantId,
        query_terms: &[String],
        filters: &ChunkFilters,
        limit_candidates: usize,
    ) -> Result<Vec<RankedChunk>> {
        queries::chunks::search(&self.conn, tenant_id, query_terms, filters, limit_candidates)
    }

    /// Recency-ordered chunk listing for query-less retrieval.
    pub fn recent_chunks(
        &self,
        tenant_id: &TenantId,
        filters: &ChunkFilters,
        limit: usize,
    ) -> Result<Vec<RankedChunk>> {
        queries::chunks::recent(&self.conn, tenant_id, filters, limit)
    }

    pub fn get_chunk(&self, tenant_id: &TenantId, chunk_id: &ChunkId) -> Result<Option<Chunk>> {
        queries::chunks::get(&self.conn, tenant_id, chunk_id)
    }

    pub fn chunks_for_event(
        &self,
        tenant_id: &TenantId,
        event_id: &EventId,
    ) -> Result<Vec<Chunk>> {
        queries::chunks::for_event(&self.conn, tenant_id, event_id)
    }

    pub fn get_chunks_by_ids(
        &self,
        tenant_id: &TenantId,
        chunk_ids: &[ChunkId],
    ) -> Result<Vec<Chunk>> {
        queries::chunks::get_many(&self.conn, tenant_id, chunk_ids)
    }

    // --- artifacts ---

    pub fn insert_artifact(
        &mut self,
        tenant_id: &TenantId,
        artifact_id: &ArtifactId,
        event_id: Option<&EventId>,
        content: &[u8],
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        queries::artifacts::insert(&self.conn, tenant_id, artifact_id, event_id, content, created_at)
    }

    pub fn get_artifact(
        &self,
        tenant_id: &TenantId,
        artifact_id: &ArtifactId,
    ) -> Result<Option<Vec<u8>>> {
        queries::artifacts::get(&self.conn, tenant_id, artifact_id)
    }

    // --- decisions ---

    pub fn insert_decision(&mut self, decision: &Decision) -> Result<()> {
        queries::decisions::insert(&self.conn, decision)
    }

    pub fn get_decision(
        &self,
        tenant_id: &TenantId,
        decision_id: &DecisionId,
    ) -> Result<Option<Decision>> {
        queries::decisions::get(&self.conn, tenant_id, decision_id)
    }

    pub fn list_decisions(
        &self,
        tenant_id: &TenantId,
        filters: &DecisionFilters,
        limit: usize,
    ) -> Result<Vec<Decision>> {
        queries::decisions::list(&self.conn, tenant_id, filters, limit)
    }

    pub fn count_decisions(&self, tenant_id: &TenantId, status: DecisionStatus) -> Result<usize> {
        queries::decisions::count_by_status(&self.conn, tenant_id, status)
    }

    /// Supersession: mark the old decision and link it to its replacement,
    /// in the same transaction as the replacement insert.
    pub fn insert_superseding_decision(
        &mut self,
        new_decision: &Decision,
        supersedes: &DecisionId,
    ) -> Result<()> {
        self.write_tx(|tx| {
            queries::decisions::insert(tx, new_decision)?;
            queries::decisions::mark_superseded(
                tx,
                &new_decision.tenant_id,
                supersedes,
                &new_decision.id,
            )
        })
    }

    pub fn archive_decisions_older_than(
        &mut self,
        tenant_id: &TenantId,
        cutoff: DateTime<Utc>,
        excluded: &[String],
    ) -> Result<Vec<DecisionId>> {
        self.write_tx(|tx| queries::decisions::archive_older_than(tx, tenant_id, cutoff, excluded))
    }

    /// Decision IDs with an audit read record since `since`.
    pub fn recently_read_decision_ids(
        &self,
        tenant_id: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        queries::audit::read_resource_ids(&self.conn, tenant_id, "decision", since)
    }

    // --- handoffs / notes / reflections ---

    pub fn insert_handoff(&mut self, handoff: &Handoff) -> Result<()> {
        queries::handoffs::insert(&self.conn, handoff)
    }

    pub fn get_handoff(
        &self,
        tenant_id: &TenantId,
        handoff_id: &HandoffId,
    ) -> Result<Option<Handoff>> {
        queries::handoffs::get(&self.conn, tenant_id, handoff_id)
    }

    pub fn last_handoff(
        &self,
        tenant_id: &TenantId,
        with_whom: Option<&str>,
    ) -> Result<Option<Handoff>> {
        queries::handoffs::last(&self.conn, tenant_id, with_whom)
    }

    pub fn identity_thread(&self, tenant_id: &TenantId) -> Result<Vec<IdentityEntry>> {
        queries::handoffs::identity_thread(&self.conn, tenant_id)
    }

    pub fn identity_thread_unintegrated(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<IdentityEntry>> {
        queries::handoffs::identity_thread_unintegrated(&self.conn, tenant_id)
    }

    pub fn handoffs_eligible_for_compression(
        &self,
        tenant_id: &TenantId,
        level: CompressionLevel,
        cutoff: DateTime<Utc>,
        cap: usize,
    ) -> Result<Vec<Handoff>> {
        queries::handoffs::eligible_for_compression(&self.conn, tenant_id, level, cutoff, cap)
    }

    /// Write compacted content and the new compression level in one
    /// transaction, so a rerun that filters by level converges.
    pub fn apply_handoff_compression(
        &mut self,
        tenant_id: &TenantId,
        handoff_id: &HandoffId,
        level: CompressionLevel,
        compact: &str,
    ) -> Result<()> {
        self.write_tx(|tx| {
            queries::handoffs::apply_compression(tx, tenant_id, handoff_id, level, compact)
        })
    }

    /// Create the knowledge note and flip every merged handoff to
    /// integrated, atomically.
    pub fn integrate_handoffs_into_note(
        &mut self,
        note: &KnowledgeNote,
        handoff_ids: &[HandoffId],
    ) -> Result<()> {
        self.write_tx(|tx| {
            queries::notes::insert(tx, note)?;
            for handoff_id in handoff_ids {
                queries::handoffs::mark_integrated(tx, &note.tenant_id, handoff_id, &note.id)?;
            }
            Ok(())
        })
    }

    pub fn list_notes(&self, tenant_id: &TenantId) -> Result<Vec<KnowledgeNote>> {
        queries::notes::list(&self.conn, tenant_id)
    }

    pub fn get_note(&self, tenant_id: &TenantId, note_id: &NoteId) -> Result<Option<KnowledgeNote>> {
        queries::notes::get(&self.conn, tenant_id, note_id)
    }

    pub fn count_notes(&self, tenant_id: &TenantId) -> Result<usize> {
        queries::notes::count(&self.conn, tenant_id)
    }

    pub fn insert_reflection(&mut self, reflection: &Reflection) -> Result<()> {
        queries::reflections::insert(&self.conn, reflection)
    }

    pub fn list_reflections(&self, tenant_id: &TenantId) -> Result<Vec<Reflection>> {
        queries::reflections::list(&self.conn, tenant_id)
    }

    // --- memory edits ---

    pub fn insert_edit(&mut self, edit: &MemoryEdit) -> Result<()> {
        queries::edits::insert(&self.conn, edit)
    }

    pub fn get_edit(&self, tenant_id: &TenantId, edit_id: &EditId) -> Result<Option<MemoryEdit>> {
        queries::edits::get(&self.conn, tenant_id, edit_id)
    }

    pub fn list_edits(
        &self,
        tenant_id: &TenantId,
        status: Option<EditStatus>,
    ) -> Result<Vec<MemoryEdit>> {
        queries::edits::list(&self.conn, tenant_id, status)
    }

    pub fn update_edit_status(
        &mut self,
        tenant_id: &TenantId,
        edit_id: &EditId,
        status: EditStatus,
        approved_by: Option<&str>,
        applied_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        queries::edits::update_status(&self.conn, tenant_id, edit_id, status, approved_by, applied_at)
    }

    /// Approved edits for a set of targets, in approval order.
    pub fn approved_edits_for_targets(
        &self,
        tenant_id: &TenantId,
        target_type: &str,
        target_ids: &[&str],
    ) -> Result<Vec<MemoryEdit>> {
        queries::edits::approved_for_targets(&self.conn, tenant_id, target_type, target_ids)
    }

    // --- capsules ---

    pub fn insert_capsule(&mut self, capsule: &Capsule) -> Result<()> {
        queries::capsules::insert(&self.conn, capsule)
    }

    pub fn get_capsule(
        &self,
        tenant_id: &TenantId,
        capsule_id: &CapsuleId,
    ) -> Result<Option<Capsule>> {
        queries::capsules::get(&self.conn, tenant_id, capsule_id)
    }

    pub fn update_capsule_status(
        &mut self,
        tenant_id: &TenantId,
        capsule_id: &CapsuleId,
        status: CapsuleStatus,
    ) -> Result<()> {
        queries::capsules::update_status(&self.conn, tenant_id, capsule_id, status)
    }

    pub fn active_capsules_for_agent(
        &self,
        tenant_id: &TenantId,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Capsule>> {
        queries::capsules::active_for_agent(&self.conn, tenant_id, agent_id, now)
    }

    // --- consolidation jobs ---

    pub fn insert_job(&mut self, job: &ConsolidationJob) -> Result<()> {
        queries::jobs::insert(&self.conn, job)
    }

    pub fn finish_job(
        &mut self,
        job_id: &JobId,
        status: JobStatus,
        items_processed: u32,
        items_affected: u32,
        completed_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<()> {
        queries::jobs::finish(
            &self.conn,
            job_id,
            status,
            items_processed,
            items_affected,
            completed_at,
            error,
        )
    }

    pub fn running_job_exists(&self, tenant_id: &TenantId, job_type: JobType) -> Result<bool> {
        queries::jobs::running_exists(&self.conn, tenant_id, job_type)
    }

    pub fn list_jobs(&self, tenant_id: &TenantId, limit: usize) -> Result<Vec<ConsolidationJob>> {
        queries::jobs::list(&self.conn, tenant_id, limit)
    }

    // --- audit ---

    pub fn append_audit(&mut self, record: &AuditRecord) -> Result<()> {
        queries::audit::append(&self.conn, record)
    }

    pub fn read_audit(&self, tenant_id: &TenantId, limit: usize) -> Result<Vec<AuditRecord>> {
        queries::audit::read(&self.conn, tenant_id, limit)
    }

    /// Every tenant with any persisted state, for scheduler fan-out.
    pub fn known_tenants(&self) -> Result<Vec<TenantId>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT tenant_id FROM events
            UNION SELECT DISTINCT tenant_id FROM handoffs
            UNION SELECT DISTINCT tenant_id FROM decisions
            ORDER BY tenant_id
            "#,
        )?;

        let mut rows = stmt.query([])?;
        let mut tenants = Vec::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            tenants.push(
                TenantId::parse(raw).map_err(|e| Error::Query(format!("corrupt tenant id: {}", e)))?,
            );
        }
        Ok(tenants)
    }

    // --- tenant purge ---

    /// Physical deletion of every row belonging to a tenant. The only path
    /// that hard-deletes ground truth.
    pub fn purge_tenant(&mut self, tenant_id: &TenantId) -> Result<u64> {
        self.write_tx(|tx| queries::purge::purge_tenant(tx, tenant_id))
    }
}

fn jitter() -> std::time::Duration {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    std::time::Duration::from_millis(u64::from(nanos % 25))
}

/// Fixed-width UTC timestamp format so string comparison in SQL matches
/// chronological order.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Query(format!("bad timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_initialization() {
        let db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();
        let notes = db.list_notes(&tenant).unwrap();
        assert_eq!(notes.len(), 0);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engram.db");
        let db = Database::open(&path).unwrap();
        drop(db);
        // Reopen keeps the schema version, no drop/recreate
        Database::open(&path).unwrap();
    }

    #[test]
    fn test_ts_format_sorts_lexicographically() {
        use chrono::SubsecRound;

        let early = Utc::now();
        let late = early + chrono::Duration::microseconds(1);
        assert!(fmt_ts(early) < fmt_ts(late));
        assert_eq!(parse_ts(&fmt_ts(early)).unwrap(), early.trunc_subsecs(6));
    }
}
