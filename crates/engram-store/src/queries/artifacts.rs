use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use engram_types::{ArtifactId, EventId, TenantId};

use crate::db::fmt_ts;
use crate::Result;

pub fn insert(
    conn: &Connection,
    tenant_id: &TenantId,
    artifact_id: &ArtifactId,
    event_id: Option<&EventId>,
    content: &[u8],
    created_at: DateTime<Utc>,
) -> Result<()> {
    let digest = format!("{:x}", Sha256::digest(content));

    conn.execute(
        r#"
        INSERT INTO artifacts (id, tenant_id, event_id, content, byte_len, sha256, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            artifact_id.as_str(),
            tenant_id.as_str(),
            event_id.map(|id| id.as_str().to_string()),
            content,
            content.len() as i64,
            digest,
            fmt_ts(created_at),
        ],
    )?;

    Ok(())
}

pub fn get(
    conn: &Connection,
    tenant_id: &TenantId,
    artifact_id: &ArtifactId,
) -> Result<Option<Vec<u8>>> {
    let result = conn
        .query_row(
            "SELECT content, sha256 FROM artifacts WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id.as_str(), artifact_id.as_str()],
            |row| {
                let content: Vec<u8> = row.get(0)?;
                let digest: String = row.get(1)?;
                Ok((content, digest))
            },
        )
        .optional()?;

    match result {
        Some((content, digest)) => {
            let recomputed = format!("{:x}", Sha256::digest(&content));
            if recomputed != digest {
                return Err(crate::Error::Query(format!(
                    "artifact {} failed digest verification",
                    artifact_id
                )));
            }
            Ok(Some(content))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn test_round_trip_with_digest() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant = TenantId::parse("t1").unwrap();
        let artifact_id = ArtifactId::generate();
        let payload = vec![0xAB; 200 * 1024];

        db.insert_artifact(&tenant, &artifact_id, None, &payload, Utc::now())
            .unwrap();

        let loaded = db.get_artifact(&tenant, &artifact_id).unwrap().unwrap();
        assert_eq!(loaded.len(), 200 * 1024);
        assert_eq!(loaded, payload);
    }

    #[test]
    fn test_tenant_scoped() {
        let mut db = Database::open_in_memory().unwrap();
        let tenant_a = TenantId::parse("tenant-a").unwrap();
        let tenant_b = TenantId::parse("tenant-b").unwrap();
        let artifact_id = ArtifactId::generate();

        db.insert_artifact(&tenant_a, &artifact_id, None, b"data", Utc::now())
            .unwrap();

        assert!(db.get_artifact(&tenant_b, &artifact_id).unwrap().is_none());
    }
}
