use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ChunkId, EventId, TenantId};
use crate::{Channel, EventKind, Sensitivity};

/// Derived retrieval unit.
///
/// Owned by exactly one event; classification is copied from the parent at
/// creation time so retrieval filters never have to join back to the event
/// row. Chunks are fully recreatable from events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub event_id: EventId,
    pub tenant_id: TenantId,
    pub session_id: String,

    pub text: String,
    /// Deterministic token estimate, always >= 1
    pub token_est: u32,
    /// Retrieval weight in [0, 1]
    pub importance: f64,

    pub channel: Channel,
    pub sensitivity: Sensitivity,
    pub kind: EventKind,
    #[serde(default)]
    pub tags: Vec<String>,

    /// Copied from the parent event
    pub ts: DateTime<Utc>,
}
