use std::sync::{Arc, Mutex};

use chrono::Utc;

use engram_store::Database;
use engram_types::{ConsolidationJob, JobType, Principal};

use crate::config::Config;
use crate::services::consolidation::ConsolidationService;
use crate::summarizer::Summarizer;
use crate::Result;

/// On-demand consolidation runs and job history.
pub struct ConsolidationOps {
    db: Arc<Mutex<Database>>,
    config: Arc<Config>,
    summarizer: Arc<dyn Summarizer>,
}

impl ConsolidationOps {
    pub(crate) fn new(
        db: Arc<Mutex<Database>>,
        config: Arc<Config>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            db,
            config,
            summarizer,
        }
    }

    /// Run one consolidation job now for the caller's tenant. Refuses with
    /// Conflict if the same job type is already running there.
    pub fn run(&self, principal: &Principal, job_type: JobType) -> Result<ConsolidationJob> {
        let mut db = self.db.lock().unwrap();
        ConsolidationService::new(&mut db, &self.config, self.summarizer.as_ref()).run(
            principal,
            job_type,
            Utc::now(),
        )
    }

    pub fn list_jobs(&self, principal: &Principal, limit: usize) -> Result<Vec<ConsolidationJob>> {
        let mut db = self.db.lock().unwrap();
        ConsolidationService::new(&mut db, &self.config, self.summarizer.as_ref())
            .list_jobs(principal, limit)
    }

    pub fn list_reflections(
        &self,
        principal: &Principal,
    ) -> Result<Vec<engram_types::Reflection>> {
        let mut db = self.db.lock().unwrap();
        ConsolidationService::new(&mut db, &self.config, self.summarizer.as_ref())
            .list_reflections(principal)
    }
}
