use std::sync::{Arc, Mutex};

use chrono::Utc;

use engram_engine::ScoredChunk;
use engram_store::Database;
use engram_types::{ArtifactId, Event, EventId, Principal};

use crate::config::Config;
use crate::deadline::Deadline;
use crate::services::ingest::{IngestReceipt, IngestService, RecordEventRequest};
use crate::services::retrieval::{RetrievalService, SearchRequest};
use crate::{Error, Result};

/// Event write/read surface: ingest, ground-truth reads, artifact fetch,
/// and chunk search.
pub struct EventOps {
    db: Arc<Mutex<Database>>,
    config: Arc<Config>,
}

impl EventOps {
    pub(crate) fn new(db: Arc<Mutex<Database>>, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub fn record(
        &self,
        principal: &Principal,
        request: RecordEventRequest,
    ) -> Result<IngestReceipt> {
        let deadline = Deadline::after_secs(self.config.deadlines.write_s);
        let mut db = self.db.lock().unwrap();
        IngestService::new(&mut db, &self.config).record_event(principal, request, deadline)
    }

    /// Ground truth read; returns the event exactly as persisted (after
    /// ingest-time redaction). Retraction hides chunks, not events.
    pub fn get(&self, principal: &Principal, event_id: &EventId) -> Result<Event> {
        let db = self.db.lock().unwrap();
        db.get_event(&principal.tenant_id, event_id)?
            .ok_or_else(|| Error::NotFound(format!("event {}", event_id)))
    }

    pub fn get_artifact(&self, principal: &Principal, artifact_id: &ArtifactId) -> Result<Vec<u8>> {
        let db = self.db.lock().unwrap();
        db.get_artifact(&principal.tenant_id, artifact_id)?
            .ok_or_else(|| Error::NotFound(format!("artifact {}", artifact_id)))
    }

    /// Ranked chunk search with all channel/sensitivity filters and the
    /// edit overlay applied.
    pub fn search(
        &self,
        principal: &Principal,
        request: &SearchRequest,
    ) -> Result<Vec<ScoredChunk>> {
        let deadline = Deadline::after_secs(self.config.deadlines.acb_retrieval_s);
        let db = self.db.lock().unwrap();
        let outcome =
            RetrievalService::new(&db, &self.config).search(principal, request, deadline, Utc::now())?;
        Ok(outcome.scored)
    }
}
