use std::sync::{Arc, Mutex};

use engram_store::Database;
use engram_types::{Handoff, IdentityEntry, KnowledgeNote, Principal};

use crate::config::Config;
use crate::deadline::Deadline;
use crate::services::handoffs::{
    CreateHandoffRequest, ExportFormat, HandoffService, WakeUpContext,
};
use crate::Result;

/// Session handoffs, the identity thread, and wake-up composition.
pub struct HandoffOps {
    db: Arc<Mutex<Database>>,
    config: Arc<Config>,
}

impl HandoffOps {
    pub(crate) fn new(db: Arc<Mutex<Database>>, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub fn create(&self, principal: &Principal, request: CreateHandoffRequest) -> Result<Handoff> {
        let deadline = Deadline::after_secs(self.config.deadlines.write_s);
        let mut db = self.db.lock().unwrap();
        HandoffService::new(&mut db).create(principal, request, deadline)
    }

    pub fn last(&self, principal: &Principal, with_whom: Option<&str>) -> Result<Option<Handoff>> {
        let mut db = self.db.lock().unwrap();
        HandoffService::new(&mut db).last(principal, with_whom)
    }

    pub fn identity_thread(&self, principal: &Principal) -> Result<Vec<IdentityEntry>> {
        let mut db = self.db.lock().unwrap();
        HandoffService::new(&mut db).identity_thread(principal)
    }

    pub fn wake_up(&self, principal: &Principal, with_whom: &str) -> Result<WakeUpContext> {
        let deadline = Deadline::after_secs(self.config.deadlines.acb_fast_s);
        let mut db = self.db.lock().unwrap();
        HandoffService::new(&mut db).wake_up(principal, with_whom, deadline)
    }

    pub fn export_identity(&self, principal: &Principal, format: ExportFormat) -> Result<String> {
        let mut db = self.db.lock().unwrap();
        HandoffService::new(&mut db).export_identity(principal, format)
    }

    pub fn knowledge_notes(&self, principal: &Principal) -> Result<Vec<KnowledgeNote>> {
        let db = self.db.lock().unwrap();
        Ok(db.list_notes(&principal.tenant_id)?)
    }
}
