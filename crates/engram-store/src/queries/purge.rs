use rusqlite::{params, Connection};

use engram_types::TenantId;

use crate::Result;

/// Physical deletion of every row belonging to a tenant.
///
/// The FTS index rows are removed first (they are keyed by chunk rowid and
/// would otherwise be orphaned), then all entity tables. The audit log is
/// deliberately retained: purge itself must stay auditable.
pub fn purge_tenant(conn: &Connection, tenant_id: &TenantId) -> Result<u64> {
    let tenant = tenant_id.as_str();
    let mut total: u64 = 0;

    // external-content FTS5 requires the special 'delete' insert form
    conn.execute(
        r#"
        INSERT INTO chunks_fts (chunks_fts, rowid, text)
        SELECT 'delete', c.rowid, c.text FROM chunks c WHERE c.tenant_id = ?1
        "#,
        params![tenant],
    )?;

    for table in [
        "chunks",
        "events",
        "artifacts",
        "decisions",
        "handoffs",
        "knowledge_notes",
        "memory_edits",
        "capsules",
        "reflections",
        "consolidation_jobs",
    ] {
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE tenant_id = ?1", table),
            params![tenant],
        )?;
        total += deleted as u64;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::chunks::ChunkFilters;
    use crate::Database;
    use chrono::Utc;
    use engram_types::*;

    #[test]
    fn test_purge_removes_all_tenant_rows() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("doomed").unwrap();
        let other = TenantId::parse("kept").unwrap();

        for t in [&tenant, &other] {
            let event = Event {
                id: EventId::generate(),
                tenant_id: t.clone(),
                session_id: "s1".to_string(),
                project_id: None,
                subject_type: None,
                subject_id: None,
                channel: Channel::Private,
                sensitivity: Sensitivity::Low,
                tags: vec![],
                actor: Actor {
                    actor_type: ActorType::Human,
                    id: "u1".to_string(),
                },
                ts: Utc::now(),
                content: EventContent::Message {
                    text: "purge target text".to_string(),
                },
                refs: vec![],
            };
            let chunk = Chunk {
                id: ChunkId::generate(),
                event_id: event.id.clone(),
                tenant_id: t.clone(),
                session_id: "s1".to_string(),
                text: "purge target text".to_string(),
                token_est: 5,
                importance: 0.0,
                channel: Channel::Private,
                sensitivity: Sensitivity::Low,
                kind: EventKind::Message,
                tags: vec![],
                ts: event.ts,
            };
            db.insert_event_with_chunks(&event, &[chunk]).unwrap();
        }

        let removed = db.purge_tenant(&tenant).unwrap();
        assert!(removed >= 2);

        let filters =
            ChunkFilters::for_sensitivities(&[Sensitivity::None, Sensitivity::Low]);
        assert!(db
            .search_chunks(&tenant, &["purge".to_string()], &filters, 10)
            .unwrap()
            .is_empty());
        // the other tenant is untouched
        assert_eq!(
            db.search_chunks(&other, &["purge".to_string()], &filters, 10)
                .unwrap()
                .len(),
            1
        );
    }
}
