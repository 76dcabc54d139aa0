use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use engram_types::{ConsolidationJob, JobId, JobStatus, JobType, TenantId};

use super::events::bad_id;
use crate::db::{fmt_ts, parse_ts};
use crate::{Error, Result};

pub fn insert(conn: &Connection, job: &ConsolidationJob) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO consolidation_jobs (
            id, job_type, tenant_id, status, items_processed, items_affected,
            started_at, completed_at, error
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            job.id.as_str(),
            job.job_type.as_str(),
            job.tenant_id.as_ref().map(|t| t.as_str().to_string()),
            job.status.as_str(),
            job.items_processed,
            job.items_affected,
            fmt_ts(job.started_at),
            job.completed_at.map(fmt_ts),
            &job.error,
        ],
    )?;

    Ok(())
}

pub fn finish(
    conn: &Connection,
    job_id: &JobId,
    status: JobStatus,
    items_processed: u32,
    items_affected: u32,
    completed_at: DateTime<Utc>,
    error: Option<&str>,
) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE consolidation_jobs
        SET status = ?2, items_processed = ?3, items_affected = ?4,
            completed_at = ?5, error = ?6
        WHERE id = ?1
        "#,
        params![
            job_id.as_str(),
            status.as_str(),
            items_processed,
            items_affected,
            fmt_ts(completed_at),
            error,
        ],
    )?;

    if updated == 0 {
        return Err(Error::Query(format!("job {} not found", job_id)));
    }
    Ok(())
}

pub fn running_exists(conn: &Connection, tenant_id: &TenantId, job_type: JobType) -> Result<bool> {
    let count: i64 = conn.query_row(
        r#"
        SELECT COUNT(*) FROM consolidation_jobs
        WHERE tenant_id = ?1 AND job_type = ?2 AND status = 'running'
        "#,
        params![tenant_id.as_str(), job_type.as_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list(conn: &Connection, tenant_id: &TenantId, limit: usize) -> Result<Vec<ConsolidationJob>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM consolidation_jobs
        WHERE tenant_id = ?1
        ORDER BY started_at DESC
        LIMIT ?2
        "#,
        COLUMNS
    ))?;

    let mut rows = stmt.query(params![tenant_id.as_str(), limit as i64])?;
    let mut jobs = Vec::new();
    while let Some(row) = rows.next()? {
        jobs.push(row_to_job(row)?);
    }
    Ok(jobs)
}

const COLUMNS: &str = "id, job_type, tenant_id, status, items_processed, items_affected, \
                       started_at, completed_at, error";

fn row_to_job(row: &Row<'_>) -> Result<ConsolidationJob> {
    let type_raw: String = row.get(1)?;
    let tenant_raw: Option<String> = row.get(2)?;
    let status_raw: String = row.get(3)?;
    let completed_at: Option<String> = row.get(7)?;

    Ok(ConsolidationJob {
        id: JobId::parse(row.get::<_, String>(0)?).map_err(bad_id)?,
        job_type: JobType::parse(&type_raw)
            .ok_or_else(|| Error::Query(format!("unknown job type '{}'", type_raw)))?,
        tenant_id: tenant_raw.map(TenantId::parse).transpose().map_err(bad_id)?,
        status: JobStatus::parse(&status_raw)
            .ok_or_else(|| Error::Query(format!("unknown job status '{}'", status_raw)))?,
        items_processed: row.get(4)?,
        items_affected: row.get(5)?,
        started_at: parse_ts(&row.get::<_, String>(6)?)?,
        completed_at: completed_at.map(|s| parse_ts(&s)).transpose()?,
        error: row.get(8)?,
    })
}
