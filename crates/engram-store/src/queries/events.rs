use rusqlite::{params, Connection, Row};

use engram_types::{Actor, ActorType, Channel, Event, EventContent, EventId, Sensitivity, TenantId};

use super::{from_json, to_json};
use crate::db::{fmt_ts, parse_ts};
use crate::{Error, Result};

pub fn insert(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO events (
            id, tenant_id, session_id, project_id, subject_type, subject_id,
            channel, sensitivity, tags, actor_type, actor_id, kind, ts, content, refs
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            event.id.as_str(),
            event.tenant_id.as_str(),
            &event.session_id,
            &event.project_id,
            &event.subject_type,
            &event.subject_id,
            event.channel.as_str(),
            event.sensitivity.as_str(),
            to_json(&event.tags)?,
            event.actor.actor_type.as_str(),
            &event.actor.id,
            event.kind().as_str(),
            fmt_ts(event.ts),
            to_json(&event.content)?,
            to_json(&event.refs)?,
        ],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, tenant_id: &TenantId, event_id: &EventId) -> Result<Option<Event>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, tenant_id, session_id, project_id, subject_type, subject_id,
               channel, sensitivity, tags, actor_type, actor_id, ts, content, refs
        FROM events
        WHERE tenant_id = ?1 AND id = ?2
        "#,
    )?;

    let mut rows = stmt.query(params![tenant_id.as_str(), event_id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_event(row)?)),
        None => Ok(None),
    }
}

/// Newest first; equal ts breaks by rowid (insert order) so readers observe
/// the order writers committed.
pub fn recent_for_session(
    conn: &Connection,
    tenant_id: &TenantId,
    session_id: &str,
    limit: usize,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, tenant_id, session_id, project_id, subject_type, subject_id,
               channel, sensitivity, tags, actor_type, actor_id, ts, content, refs
        FROM events
        WHERE tenant_id = ?1 AND session_id = ?2
        ORDER BY ts DESC, rowid DESC
        LIMIT ?3
        "#,
    )?;

    let mut rows = stmt.query(params![tenant_id.as_str(), session_id, limit as i64])?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(row_to_event(row)?);
    }
    Ok(events)
}

pub fn latest_ts(
    conn: &Connection,
    tenant_id: &TenantId,
    session_id: &str,
) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    let raw: Option<String> = conn.query_row(
        "SELECT MAX(ts) FROM events WHERE tenant_id = ?1 AND session_id = ?2",
        params![tenant_id.as_str(), session_id],
        |row| row.get(0),
    )?;

    raw.map(|s| parse_ts(&s)).transpose()
}

pub fn recent_task_updates(
    conn: &Connection,
    tenant_id: &TenantId,
    session_id: &str,
    limit: usize,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, tenant_id, session_id, project_id, subject_type, subject_id,
               channel, sensitivity, tags, actor_type, actor_id, ts, content, refs
        FROM events
        WHERE tenant_id = ?1 AND session_id = ?2 AND kind = 'task_update'
        ORDER BY ts DESC, rowid DESC
        LIMIT ?3
        "#,
    )?;

    let mut rows = stmt.query(params![tenant_id.as_str(), session_id, limit as i64])?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(row_to_event(row)?);
    }
    Ok(events)
}

fn row_to_event(row: &Row<'_>) -> Result<Event> {
    let channel_raw: String = row.get(6)?;
    let sensitivity_raw: String = row.get(7)?;
    let actor_type_raw: String = row.get(9)?;
    let ts_raw: String = row.get(11)?;
    let content_raw: String = row.get(12)?;

    let channel = Channel::parse(&channel_raw)
        .ok_or_else(|| Error::Query(format!("unknown channel '{}'", channel_raw)))?;
    let sensitivity = Sensitivity::parse(&sensitivity_raw)
        .ok_or_else(|| Error::Query(format!("unknown sensitivity '{}'", sensitivity_raw)))?;
    let actor_type = ActorType::parse(&actor_type_raw)
        .ok_or_else(|| Error::Query(format!("unknown actor type '{}'", actor_type_raw)))?;
    let content: EventContent = from_json(&content_raw)?;

    Ok(Event {
        id: EventId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
        tenant_id: TenantId::parse(row.get::<_, String>(1)?).map_err(bad_id)?,
        session_id: row.get(2)?,
        project_id: row.get(3)?,
        subject_type: row.get(4)?,
        subject_id: row.get(5)?,
        channel,
        sensitivity,
        tags: from_json(&row.get::<_, String>(8)?)?,
        actor: Actor {
            actor_type,
            id: row.get(10)?,
        },
        ts: parse_ts(&ts_raw)?,
        content,
        refs: from_json(&row.get::<_, String>(13)?)?,
    })
}

pub(crate) fn bad_id(err: engram_types::Error) -> Error {
    Error::Query(format!("corrupt id in row: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::{TimeZone, Utc};

    fn sample_event(tenant: &TenantId, session: &str, ts_secs: u32) -> Event {
        Event {
            id: EventId::generate(),
            tenant_id: tenant.clone(),
            session_id: session.to_string(),
            project_id: Some("proj-1".to_string()),
            subject_type: None,
            subject_id: None,
            channel: Channel::Private,
            sensitivity: Sensitivity::Low,
            tags: vec!["greeting".to_string()],
            actor: Actor {
                actor_type: ActorType::Human,
                id: "u1".to_string(),
            },
            ts: Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, ts_secs).unwrap(),
            content: EventContent::Message {
                text: format!("message at {}", ts_secs),
            },
            refs: vec![],
        }
    }

    #[test]
    fn test_insert_and_get_round_trip() -> Result<()> {
        let mut db = Database::open_in_memory()?;
        let tenant = TenantId::parse("t1").unwrap();
        let event = sample_event(&tenant, "s1", 0);

        db.insert_event_with_chunks(&event, &[])?;

        let loaded = db.get_event(&tenant, &event.id)?.expect("event exists");
        assert_eq!(loaded.id, event.id);
        assert_eq!(loaded.content, event.content);
        assert_eq!(loaded.channel, event.channel);
        assert_eq!(loaded.sensitivity, event.sensitivity);
        assert_eq!(loaded.tags, event.tags);
        assert_eq!(loaded.ts, event.ts);
        Ok(())
    }

    #[test]
    fn test_get_is_tenant_scoped() -> Result<()> {
        let mut db = Database::open_in_memory()?;
        let tenant_a = TenantId::parse("tenant-a").unwrap();
        let tenant_b = TenantId::parse("tenant-b").unwrap();
        let event = sample_event(&tenant_a, "s1", 0);

        db.insert_event_with_chunks(&event, &[])?;

        assert!(db.get_event(&tenant_a, &event.id)?.is_some());
        // indistinguishable from a missing row
        assert!(db.get_event(&tenant_b, &event.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_recent_orders_by_ts_then_insert() -> Result<()> {
        let mut db = Database::open_in_memory()?;
        let tenant = TenantId::parse("t1").unwrap();

        let first = sample_event(&tenant, "s1", 5);
        let tied_a = sample_event(&tenant, "s1", 10);
        let tied_b = sample_event(&tenant, "s1", 10);

        db.insert_event_with_chunks(&first, &[])?;
        db.insert_event_with_chunks(&tied_a, &[])?;
        db.insert_event_with_chunks(&tied_b, &[])?;

        let recent = db.recent_session_events(&tenant, "s1", 10)?;
        assert_eq!(recent.len(), 3);
        // equal ts: later insert wins the newest slot
        assert_eq!(recent[0].id, tied_b.id);
        assert_eq!(recent[1].id, tied_a.id);
        assert_eq!(recent[2].id, first.id);
        Ok(())
    }
}
