use serde::{Deserialize, Serialize};

use engram_types::{AcbId, ArtifactId, DecisionId, Sensitivity};

use crate::modes::Mode;

/// Active context bundle: budgeted, sectioned, traceable context for the
/// next model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acb {
    pub acb_id: AcbId,
    pub budget_tokens: u32,
    pub token_used_est: u32,
    pub sections: Vec<Section>,
    pub omissions: Vec<Omission>,
    pub provenance: Provenance,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub items: Vec<SectionItem>,
    pub token_est: u32,
}

impl Section {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Vec::new(),
            token_est: 0,
        }
    }
}

/// One entry in a section; either inline text or a decision reference,
/// always carrying refs back to ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(flatten)]
    pub body: ItemBody,
    pub refs: Vec<String>,
    pub token_est: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemBody {
    Text { text: String },
    Decision { decision_id: DecisionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmissionReason {
    /// Did not fit the remaining section budget
    BudgetExhausted,
    /// Single item larger than the whole section budget
    Oversize,
    /// Sticky content could not be placed even after eviction
    BudgetExhaustedSticky,
    /// A non-fatal per-section read failure
    SectionError,
}

/// Record of an item dropped during assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Omission {
    pub reason: OmissionReason,
    pub candidates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<ArtifactId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Per-bundle record of how the bundle was assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub intent: String,
    pub mode: Mode,
    pub query_terms: Vec<String>,
    pub candidate_pool_size: usize,
    pub filters: ProvenanceFilters,
    pub scoring: ScoringSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceFilters {
    pub sensitivity_allowed: Vec<Sensitivity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}
