use chrono::{DateTime, Duration, Utc};

use engram_store::Database;
use engram_types::{
    AuditAction, AuditOutcome, CompressionLevel, ConsolidationJob, Handoff, JobId, JobStatus,
    JobType, KnowledgeNote, NoteId, Principal, Reflection, ReflectionId,
};

use engram_engine::{bucket_becoming_statements, ThemeBucket};

use crate::audit;
use crate::config::Config;
use crate::deadline::Deadline;
use crate::summarizer::{Summarizer, SummaryMode};
use crate::{Error, Result};

const DAILY_AGE_DAYS: i64 = 30;
const WEEKLY_AGE_DAYS: i64 = 90;
const MONTHLY_AGE_DAYS: i64 = 180;
const DECISION_ARCHIVAL_AGE_DAYS: i64 = 60;

const SUMMARY_TARGET_TOKENS: u32 = 500;
const QUICK_REF_TARGET_TOKENS: u32 = 100;
const INTEGRATED_TARGET_TOKENS: u32 = 50;
const NOTE_TARGET_TOKENS: u32 = 200;

/// Per-job deadline; a timed-out job checkpoints at the last completed
/// batch and is marked failed without blocking future runs.
const JOB_DEADLINE_SECS: u64 = 600;

struct RunCounters {
    processed: u32,
    affected: u32,
}

pub struct ConsolidationService<'a> {
    db: &'a mut Database,
    config: &'a Config,
    summarizer: &'a dyn Summarizer,
}

impl<'a> ConsolidationService<'a> {
    pub fn new(db: &'a mut Database, config: &'a Config, summarizer: &'a dyn Summarizer) -> Self {
        Self {
            db,
            config,
            summarizer,
        }
    }

    /// Run one consolidation job for a tenant. An overlapping run of the
    /// same job type on the same tenant is refused with Conflict (the
    /// advisory lock); any error inside the run lands on the job record,
    /// never on the caller.
    pub fn run(
        &mut self,
        principal: &Principal,
        job_type: JobType,
        now: DateTime<Utc>,
    ) -> Result<ConsolidationJob> {
        let tenant_id = principal.tenant_id.clone();

        if self.db.running_job_exists(&tenant_id, job_type)? {
            return Err(Error::Conflict(format!(
                "{} consolidation already running for tenant {}",
                job_type.as_str(),
                tenant_id
            )));
        }

        let job_id = JobId::generate();
        let job = ConsolidationJob {
            id: job_id.clone(),
            job_type,
            tenant_id: Some(tenant_id.clone()),
            status: JobStatus::Running,
            items_processed: 0,
            items_affected: 0,
            started_at: now,
            completed_at: None,
            error: None,
        };
        self.db.insert_job(&job)?;

        let deadline = Deadline::after_secs(JOB_DEADLINE_SECS);
        let mut counters = RunCounters {
            processed: 0,
            affected: 0,
        };

        let outcome = self.dispatch(principal, job_type, now, deadline, &mut counters);

        let (status, error) = match &outcome {
            Ok(()) => (JobStatus::Completed, None),
            Err(err) => (JobStatus::Failed, Some(err.to_string())),
        };
        self.db.finish_job(
            &job_id,
            status,
            counters.processed,
            counters.affected,
            Utc::now(),
            error.as_deref(),
        )?;

        audit::append(
            self.db,
            principal,
            "consolidation.run",
            "job",
            job_id.as_str(),
            AuditAction::Run,
            if outcome.is_ok() {
                AuditOutcome::Ok
            } else {
                AuditOutcome::Error
            },
            serde_json::json!({
                "type": job_type.as_str(),
                "processed": counters.processed,
                "affected": counters.affected,
            }),
        );

        if let Err(err) = outcome {
            tracing::warn!(
                tenant = %tenant_id,
                job = %job_id,
                job_type = job_type.as_str(),
                error = %err,
                "consolidation job failed"
            );
        }

        Ok(ConsolidationJob {
            id: job_id,
            job_type,
            tenant_id: Some(tenant_id),
            status,
            items_processed: counters.processed,
            items_affected: counters.affected,
            started_at: now,
            completed_at: Some(Utc::now()),
            error,
        })
    }

    fn dispatch(
        &mut self,
        principal: &Principal,
        job_type: JobType,
        now: DateTime<Utc>,
        deadline: Deadline,
        counters: &mut RunCounters,
    ) -> Result<()> {
        match job_type {
            JobType::Daily | JobType::HandoffCompression => self.compress_handoffs(
                principal,
                CompressionLevel::Full,
                CompressionLevel::Summary,
                now - Duration::days(DAILY_AGE_DAYS),
                self.config.consolidation.handoffs_per_run_daily,
                SUMMARY_TARGET_TOKENS,
                SummaryMode::Summary,
                deadline,
                counters,
            ),
            JobType::Weekly => {
                self.compress_handoffs(
                    principal,
                    CompressionLevel::Summary,
                    CompressionLevel::QuickRef,
                    now - Duration::days(WEEKLY_AGE_DAYS),
                    self.config.consolidation.handoffs_per_run_weekly,
                    QUICK_REF_TARGET_TOKENS,
                    SummaryMode::QuickRef,
                    deadline,
                    counters,
                )?;
                self.archive_decisions(principal, now, deadline, counters)
            }
            JobType::DecisionArchival => self.archive_decisions(principal, now, deadline, counters),
            JobType::Monthly => {
                self.compress_handoffs(
                    principal,
                    CompressionLevel::QuickRef,
                    CompressionLevel::Integrated,
                    now - Duration::days(MONTHLY_AGE_DAYS),
                    usize::MAX,
                    INTEGRATED_TARGET_TOKENS,
                    SummaryMode::Integrated,
                    deadline,
                    counters,
                )?;
                self.synthesize_identity(principal, deadline, counters)
            }
            JobType::IdentitySynthesis => self.synthesize_identity(principal, deadline, counters),
        }
    }

    /// Compress eligible handoffs one level down, in checkpointed batches.
    /// Each handoff's content and level flip together, so a rerun filtered
    /// by level skips everything already done.
    #[allow(clippy::too_many_arguments)]
    fn compress_handoffs(
        &mut self,
        principal: &Principal,
        from: CompressionLevel,
        to: CompressionLevel,
        cutoff: DateTime<Utc>,
        cap: usize,
        target_tokens: u32,
        mode: SummaryMode,
        deadline: Deadline,
        counters: &mut RunCounters,
    ) -> Result<()> {
        let eligible =
            self.db
                .handoffs_eligible_for_compression(&principal.tenant_id, from, cutoff, cap)?;

        for batch in eligible.chunks(self.config.consolidation.batch_size) {
            deadline.check()?;
            for handoff in batch {
                counters.processed += 1;
                let source = compression_source(handoff);
                if source.is_empty() {
                    continue;
                }
                let compact = self.summarizer.summarize(&source, target_tokens, mode)?;
                self.db
                    .apply_handoff_compression(&principal.tenant_id, &handoff.id, to, &compact)?;
                counters.affected += 1;
            }
        }
        Ok(())
    }

    /// Archive active decisions past the age threshold that nobody has read
    /// within the same window.
    fn archive_decisions(
        &mut self,
        principal: &Principal,
        now: DateTime<Utc>,
        deadline: Deadline,
        counters: &mut RunCounters,
    ) -> Result<()> {
        deadline.check()?;
        let cutoff = now - Duration::days(DECISION_ARCHIVAL_AGE_DAYS);
        let recently_read = self
            .db
            .recently_read_decision_ids(&principal.tenant_id, cutoff)?;
        let archived =
            self.db
                .archive_decisions_older_than(&principal.tenant_id, cutoff, &recently_read)?;
        counters.processed += archived.len() as u32;
        counters.affected += archived.len() as u32;
        Ok(())
    }

    /// Identity synthesis: bucket unintegrated becoming statements by theme
    /// and fold every bucket of ten or more into one knowledge note. A run
    /// that merged anything also writes one reflection row covering the
    /// integrated period.
    fn synthesize_identity(
        &mut self,
        principal: &Principal,
        deadline: Deadline,
        counters: &mut RunCounters,
    ) -> Result<()> {
        deadline.check()?;
        let entries = self
            .db
            .identity_thread_unintegrated(&principal.tenant_id)?;
        counters.processed += entries.len() as u32;

        let buckets = bucket_becoming_statements(&entries);
        let mut themes = Vec::new();
        let mut key_insights = Vec::new();
        let mut merged_handoffs = Vec::new();

        for bucket in &buckets {
            deadline.check()?;
            let note = self.build_note(principal, bucket)?;
            let handoff_ids: Vec<_> = bucket
                .entries
                .iter()
                .map(|e| e.handoff_id.clone())
                .collect();
            self.db.integrate_handoffs_into_note(&note, &handoff_ids)?;
            counters.affected += handoff_ids.len() as u32;

            tracing::info!(
                tenant = %principal.tenant_id,
                theme = %bucket.theme,
                merged = handoff_ids.len(),
                note = %note.id,
                "identity theme synthesized"
            );

            themes.push(bucket.theme.clone());
            key_insights.push(note.content.clone());
            merged_handoffs.extend(handoff_ids);
        }

        if !merged_handoffs.is_empty() {
            let integrated: Vec<_> = buckets.iter().flat_map(|b| b.entries.iter()).collect();
            let period_start = integrated
                .iter()
                .map(|e| e.created_at)
                .min()
                .unwrap_or_else(Utc::now);
            let period_end = integrated
                .iter()
                .map(|e| e.created_at)
                .max()
                .unwrap_or_else(Utc::now);

            let reflection = Reflection {
                id: ReflectionId::generate(),
                tenant_id: principal.tenant_id.clone(),
                period_start,
                period_end,
                session_count: merged_handoffs.len() as u32,
                summary: self.summarizer.summarize(
                    &key_insights.join(" "),
                    NOTE_TARGET_TOKENS,
                    SummaryMode::Identity,
                )?,
                key_insights,
                identity_evolution: format!(
                    "{} becoming statements converged on: {}",
                    merged_handoffs.len(),
                    themes.join(", ")
                ),
                themes,
                source_handoffs: merged_handoffs,
                created_at: Utc::now(),
            };
            self.db.insert_reflection(&reflection)?;
        }
        Ok(())
    }

    fn build_note(&self, principal: &Principal, bucket: &ThemeBucket) -> Result<KnowledgeNote> {
        let statements: Vec<&str> = bucket.entries.iter().map(|e| e.becoming.as_str()).collect();
        let content = self.summarizer.summarize(
            &statements.join(". "),
            NOTE_TARGET_TOKENS,
            SummaryMode::Identity,
        )?;

        Ok(KnowledgeNote {
            id: NoteId::generate(),
            tenant_id: principal.tenant_id.clone(),
            title: bucket.theme.clone(),
            content,
            source_handoffs: bucket.entries.iter().map(|e| e.handoff_id.clone()).collect(),
            confidence: (bucket.entries.len() as f64 / 20.0).min(1.0),
            tags: vec!["identity".to_string()],
            created_at: Utc::now(),
        })
    }

    pub fn list_jobs(&self, principal: &Principal, limit: usize) -> Result<Vec<ConsolidationJob>> {
        Ok(self.db.list_jobs(&principal.tenant_id, limit)?)
    }

    pub fn list_reflections(&self, principal: &Principal) -> Result<Vec<Reflection>> {
        Ok(self.db.list_reflections(&principal.tenant_id)?)
    }
}

/// Source text for the next compression level. Only full-level handoffs
/// still carry their narrative fields; below that the compact text is all
/// that remains.
fn compression_source(handoff: &Handoff) -> String {
    if handoff.compression_level == CompressionLevel::Full {
        let mut parts = vec![
            handoff.experienced.as_str(),
            handoff.noticed.as_str(),
            handoff.learned.as_str(),
            handoff.remember.as_str(),
        ];
        if let Some(story) = &handoff.story {
            parts.push(story.as_str());
        }
        parts.join(". ")
    } else {
        handoff.compact.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::ExtractiveSummarizer;
    use engram_types::TenantId;

    fn principal() -> Principal {
        Principal::new(TenantId::parse("t1").unwrap()).with_user("scheduler")
    }

    fn seed_handoff(db: &mut Database, age_days: i64, becoming: Option<&str>) -> Handoff {
        let handoff = Handoff {
            id: engram_types::HandoffId::generate(),
            tenant_id: principal().tenant_id,
            experienced: "long stretch of refactoring work across the storage layer".to_string(),
            noticed: "the schema migrations were the risky part".to_string(),
            learned: "always stage schema changes behind a version gate".to_string(),
            remember: "revisit the index on chunk timestamps".to_string(),
            story: None,
            becoming: becoming.map(|s| s.to_string()),
            significance: 0.5,
            tags: vec![],
            compression_level: CompressionLevel::Full,
            compact: None,
            with_whom: "casey".to_string(),
            created_at: Utc::now() - Duration::days(age_days),
            integrated_into: None,
        };
        db.insert_handoff(&handoff).unwrap();
        handoff
    }

    #[test]
    fn test_daily_compression_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let config = Config::default();
        let summarizer = ExtractiveSummarizer;
        let p = principal();

        seed_handoff(&mut db, 45, None);
        seed_handoff(&mut db, 5, None); // too young

        let first = ConsolidationService::new(&mut db, &config, &summarizer)
            .run(&p, JobType::Daily, Utc::now())
            .unwrap();
        assert_eq!(first.status, JobStatus::Completed);
        assert_eq!(first.items_affected, 1);

        let second = ConsolidationService::new(&mut db, &config, &summarizer)
            .run(&p, JobType::Daily, Utc::now())
            .unwrap();
        assert_eq!(second.items_affected, 0);
    }

    #[test]
    fn test_identity_synthesis_links_sources_and_converges() {
        let mut db = Database::open_in_memory().unwrap();
        let config = Config::default();
        let summarizer = ExtractiveSummarizer;
        let p = principal();

        let seeded: Vec<Handoff> = (0..15)
            .map(|i| {
                seed_handoff(
                    &mut db,
                    10 + i,
                    Some(&format!("finding clarity in how memory systems age {}", i)),
                )
            })
            .collect();

        let job = ConsolidationService::new(&mut db, &config, &summarizer)
            .run(&p, JobType::IdentitySynthesis, Utc::now())
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.items_affected, 15);

        let notes = db.list_notes(&p.tenant_id).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].source_handoffs.len(), 15);

        for handoff in &seeded {
            let loaded = db.get_handoff(&p.tenant_id, &handoff.id).unwrap().unwrap();
            assert_eq!(loaded.integrated_into, Some(notes[0].id.clone()));
            assert_eq!(loaded.compression_level, CompressionLevel::Integrated);
        }

        // a second run finds nothing unintegrated
        let rerun = ConsolidationService::new(&mut db, &config, &summarizer)
            .run(&p, JobType::IdentitySynthesis, Utc::now())
            .unwrap();
        assert_eq!(rerun.items_affected, 0);
        assert_eq!(db.list_notes(&p.tenant_id).unwrap().len(), 1);
    }

    #[test]
    fn test_weekly_archives_stale_unread_decisions() {
        let mut db = Database::open_in_memory().unwrap();
        let config = Config::default();
        let summarizer = ExtractiveSummarizer;
        let p = principal();

        let stale = engram_types::Decision {
            id: engram_types::DecisionId::generate(),
            tenant_id: p.tenant_id.clone(),
            status: engram_types::DecisionStatus::Active,
            scope: engram_types::DecisionScope::Global,
            project_id: None,
            subject_type: None,
            subject_id: None,
            decision: "an old rule".to_string(),
            rationale: vec![],
            constraints: vec![],
            alternatives: vec![],
            consequences: vec![],
            tags: vec![],
            refs: vec![],
            superseded_by: None,
            ts: Utc::now() - Duration::days(120),
        };
        db.insert_decision(&stale).unwrap();

        let job = ConsolidationService::new(&mut db, &config, &summarizer)
            .run(&p, JobType::Weekly, Utc::now())
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let loaded = db.get_decision(&p.tenant_id, &stale.id).unwrap().unwrap();
        assert_eq!(loaded.status, engram_types::DecisionStatus::Archived);
    }
}
