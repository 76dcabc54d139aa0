use std::sync::{Arc, Mutex};

use engram_engine::Acb;
use engram_store::Database;
use engram_types::Principal;

use crate::config::Config;
use crate::deadline::Deadline;
use crate::services::acb::{AcbRequest, AcbService};
use crate::Result;

/// Active context bundle assembly.
pub struct ContextOps {
    db: Arc<Mutex<Database>>,
    config: Arc<Config>,
}

impl ContextOps {
    pub(crate) fn new(db: Arc<Mutex<Database>>, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Assemble a budgeted, mode-aware context bundle. Requests without
    /// query text take the fast-path deadline; retrieval-backed requests
    /// get the longer one.
    pub fn build_acb(&self, principal: &Principal, request: &AcbRequest) -> Result<Acb> {
        let deadline = if request.query_text.is_some() {
            Deadline::after_secs(self.config.deadlines.acb_retrieval_s)
        } else {
            Deadline::after_secs(self.config.deadlines.acb_fast_s)
        };

        let mut db = self.db.lock().unwrap();
        AcbService::new(&mut db, &self.config).build(principal, request, deadline)
    }
}
