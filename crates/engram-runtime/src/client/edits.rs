use std::sync::{Arc, Mutex};

use engram_store::Database;
use engram_types::{EditId, EditStatus, MemoryEdit, Principal};

use crate::config::Config;
use crate::deadline::Deadline;
use crate::services::edits::{EditService, ProposeEditRequest};
use crate::Result;

/// Memory surgery: propose, approve, reject, and list governance edits.
pub struct EditOps {
    db: Arc<Mutex<Database>>,
    config: Arc<Config>,
}

impl EditOps {
    pub(crate) fn new(db: Arc<Mutex<Database>>, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub fn propose(&self, principal: &Principal, request: ProposeEditRequest) -> Result<MemoryEdit> {
        let deadline = Deadline::after_secs(self.config.deadlines.write_s);
        let mut db = self.db.lock().unwrap();
        EditService::new(&mut db).propose(principal, request, deadline)
    }

    pub fn approve(&self, principal: &Principal, edit_id: &EditId) -> Result<MemoryEdit> {
        let deadline = Deadline::after_secs(self.config.deadlines.write_s);
        let mut db = self.db.lock().unwrap();
        EditService::new(&mut db).approve(principal, edit_id, deadline)
    }

    pub fn reject(&self, principal: &Principal, edit_id: &EditId) -> Result<MemoryEdit> {
        let deadline = Deadline::after_secs(self.config.deadlines.write_s);
        let mut db = self.db.lock().unwrap();
        EditService::new(&mut db).reject(principal, edit_id, deadline)
    }

    pub fn list(&self, principal: &Principal, status: Option<EditStatus>) -> Result<Vec<MemoryEdit>> {
        let mut db = self.db.lock().unwrap();
        EditService::new(&mut db).list(principal, status)
    }
}
