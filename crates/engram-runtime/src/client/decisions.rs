use std::sync::{Arc, Mutex};

use engram_store::{Database, DecisionFilters};
use engram_types::{Decision, DecisionId, Principal};

use crate::config::Config;
use crate::deadline::Deadline;
use crate::services::decisions::{CreateDecisionRequest, DecisionService};
use crate::Result;

/// Decision lifecycle: create, supersede, read, list.
pub struct DecisionOps {
    db: Arc<Mutex<Database>>,
    config: Arc<Config>,
}

impl DecisionOps {
    pub(crate) fn new(db: Arc<Mutex<Database>>, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub fn create(
        &self,
        principal: &Principal,
        request: CreateDecisionRequest,
    ) -> Result<Decision> {
        let deadline = Deadline::after_secs(self.config.deadlines.write_s);
        let mut db = self.db.lock().unwrap();
        DecisionService::new(&mut db).create(principal, request, deadline)
    }

    pub fn supersede(
        &self,
        principal: &Principal,
        prior: &DecisionId,
        request: CreateDecisionRequest,
    ) -> Result<Decision> {
        let deadline = Deadline::after_secs(self.config.deadlines.write_s);
        let mut db = self.db.lock().unwrap();
        DecisionService::new(&mut db).supersede(principal, prior, request, deadline)
    }

    pub fn get(&self, principal: &Principal, decision_id: &DecisionId) -> Result<Decision> {
        let mut db = self.db.lock().unwrap();
        DecisionService::new(&mut db).get(principal, decision_id)
    }

    /// Archived decisions stay reachable through
    /// `filters.include_archived`; the default view is active-only.
    pub fn list(
        &self,
        principal: &Principal,
        filters: DecisionFilters,
        limit: usize,
    ) -> Result<Vec<Decision>> {
        let mut db = self.db.lock().unwrap();
        DecisionService::new(&mut db).list(principal, filters, limit)
    }
}
