use std::collections::HashMap;

use chrono::{DateTime, Utc};

use engram_engine::{apply_chunk_overlay, rank_candidates, Candidate, ReadContext, ScoredChunk, ScoringWeights};
use engram_store::{ChunkFilters, Database, RankedChunk};
use engram_types::{allowed_sensitivities, Channel, EventKind, MemoryEdit, Principal};

use crate::config::Config;
use crate::deadline::Deadline;
use crate::{Error, Result};

const MAX_QUERY_TERMS: usize = 16;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query_text: Option<String>,
    pub channel: Channel,
    pub project_id: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub kinds: Option<Vec<EventKind>>,
    pub include_quarantined: bool,
    /// Final result cap; clamped to retrieval.scored_max
    pub limit: usize,
}

/// Outcome of one retrieval pass, with enough context for ACB provenance.
#[derive(Debug)]
pub struct RetrievalOutcome {
    pub scored: Vec<ScoredChunk>,
    pub query_terms: Vec<String>,
    pub candidate_pool_size: usize,
}

pub struct RetrievalService<'a> {
    db: &'a Database,
    config: &'a Config,
}

impl<'a> RetrievalService<'a> {
    pub fn new(db: &'a Database, config: &'a Config) -> Self {
        Self { db, config }
    }

    pub fn search(
        &self,
        principal: &Principal,
        request: &SearchRequest,
        deadline: Deadline,
        now: DateTime<Utc>,
    ) -> Result<RetrievalOutcome> {
        if request.limit == 0 {
            return Err(Error::Invalid("limit must be positive".to_string()));
        }
        deadline.check()?;

        let query_terms = tokenize_query(request.query_text.as_deref());

        let filters = ChunkFilters {
            sensitivity_allowed: allowed_sensitivities(request.channel).to_vec(),
            kinds: request.kinds.clone(),
            session_id: None,
            project_id: request.project_id.clone(),
            subject_type: request.subject_type.clone(),
            subject_id: request.subject_id.clone(),
        };

        let pool_max = self.config.retrieval.candidate_pool_max;
        let candidates: Vec<RankedChunk> = if query_terms.is_empty() {
            self.db
                .recent_chunks(&principal.tenant_id, &filters, pool_max)?
        } else {
            self.db
                .search_chunks(&principal.tenant_id, &query_terms, &filters, pool_max)?
        };
        let candidate_pool_size = candidates.len();

        deadline.check()?;
        let surviving = self.apply_overlay(principal, candidates, request)?;

        let scored_max = self.config.retrieval.scored_max.min(request.limit.max(1));
        let scored = rank_candidates(surviving, now, ScoringWeights::default(), scored_max);

        Ok(RetrievalOutcome {
            scored,
            query_terms,
            candidate_pool_size,
        })
    }

    /// Load approved edits for the whole candidate set in one query and
    /// apply them chunk by chunk.
    fn apply_overlay(
        &self,
        principal: &Principal,
        candidates: Vec<RankedChunk>,
        request: &SearchRequest,
    ) -> Result<Vec<Candidate>> {
        let ids: Vec<&str> = candidates.iter().map(|c| c.chunk.id.as_str()).collect();
        let edits = self
            .db
            .approved_edits_for_targets(&principal.tenant_id, "chunk", &ids)?;

        let mut by_target: HashMap<&str, Vec<&MemoryEdit>> = HashMap::new();
        for edit in &edits {
            by_target.entry(edit.target.id_str()).or_default().push(edit);
        }

        let ctx = ReadContext {
            channel: request.channel,
            include_quarantined: request.include_quarantined,
        };

        let mut surviving = Vec::new();
        for candidate in candidates {
            let chunk_edits: Vec<MemoryEdit> = by_target
                .get(candidate.chunk.id.as_str())
                .map(|edits| edits.iter().map(|e| (*e).clone()).collect())
                .unwrap_or_default();

            if let Some(chunk) = apply_chunk_overlay(&candidate.chunk, &chunk_edits, &ctx) {
                surviving.push(Candidate {
                    chunk,
                    rank: candidate.rank,
                });
            }
        }
        Ok(surviving)
    }
}

/// Split free text into FTS query terms: whitespace-separated words with
/// punctuation stripped, capped in count.
pub fn tokenize_query(query_text: Option<&str>) -> Vec<String> {
    let Some(text) = query_text else {
        return Vec::new();
    };

    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .take(MAX_QUERY_TERMS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation_and_caps() {
        let terms = tokenize_query(Some("What broke, the deploy-pipeline?"));
        assert_eq!(terms, vec!["what", "broke", "the", "deploy-pipeline"]);

        let long = (0..40).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        assert_eq!(tokenize_query(Some(&long)).len(), MAX_QUERY_TERMS);

        assert!(tokenize_query(None).is_empty());
        assert!(tokenize_query(Some("   ")).is_empty());
    }
}
