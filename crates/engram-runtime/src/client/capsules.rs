use std::sync::{Arc, Mutex};

use engram_store::Database;
use engram_types::{Capsule, CapsuleId, Principal};

use crate::config::Config;
use crate::deadline::Deadline;
use crate::services::capsules::{CapsuleService, CreateCapsuleRequest};
use crate::Result;

/// Capsule lifecycle: create, read, revoke, audience listing.
pub struct CapsuleOps {
    db: Arc<Mutex<Database>>,
    config: Arc<Config>,
}

impl CapsuleOps {
    pub(crate) fn new(db: Arc<Mutex<Database>>, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub fn create(&self, principal: &Principal, request: CreateCapsuleRequest) -> Result<Capsule> {
        let deadline = Deadline::after_secs(self.config.deadlines.write_s);
        let mut db = self.db.lock().unwrap();
        CapsuleService::new(&mut db).create(principal, request, deadline)
    }

    pub fn get(&self, principal: &Principal, capsule_id: &CapsuleId) -> Result<Capsule> {
        let mut db = self.db.lock().unwrap();
        CapsuleService::new(&mut db).get(principal, capsule_id)
    }

    pub fn revoke(&self, principal: &Principal, capsule_id: &CapsuleId) -> Result<()> {
        let deadline = Deadline::after_secs(self.config.deadlines.write_s);
        let mut db = self.db.lock().unwrap();
        CapsuleService::new(&mut db).revoke(principal, capsule_id, deadline)
    }

    pub fn list_for_agent(&self, principal: &Principal, agent_id: &str) -> Result<Vec<Capsule>> {
        let mut db = self.db.lock().unwrap();
        CapsuleService::new(&mut db).list_for_agent(principal, agent_id)
    }
}
