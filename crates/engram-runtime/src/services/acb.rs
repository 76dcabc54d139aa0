use std::collections::HashSet;

use chrono::Utc;

use engram_engine::{
    apply_chunk_overlay, apply_decision_overlay, detect_mode, pack_section, section_budgets, Acb,
    ItemBody, Omission, OmissionReason, Provenance, ProvenanceFilters, ReadContext,
    ScoringSummary, Section, SectionItem,
};
use engram_store::{ChunkFilters, Database, DecisionFilters};
use engram_types::{
    allowed_sensitivities, estimate_tokens, AcbId, AuditAction, AuditOutcome, Channel, Decision,
    Event, EventContent, Principal, TaskStatus,
};

use crate::audit;
use crate::config::Config;
use crate::deadline::Deadline;
use crate::services::retrieval::{tokenize_query, RetrievalService, SearchRequest};
use crate::{Error, Result};

const RULES_FETCH_LIMIT: usize = 100;
const RELEVANT_FETCH_LIMIT: usize = 50;
const TASK_STATE_FETCH_LIMIT: usize = 50;
const RECENT_WINDOW_FETCH_LIMIT: usize = 100;
const CORRECTION_LOOKBACK: usize = 20;

#[derive(Debug, Clone)]
pub struct AcbRequest {
    pub session_id: String,
    pub agent_id: String,
    pub channel: Channel,
    pub intent: String,
    pub query_text: Option<String>,
    pub scope: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
    pub include_capsules: bool,
    pub include_quarantined: bool,
    pub max_tokens: Option<u32>,
}

pub struct AcbService<'a> {
    db: &'a mut Database,
    config: &'a Config,
}

/// One section under assembly, carrying the effective budget it was packed
/// against so sticky insertion can never push it past that line.
struct PackedSection {
    section: Section,
    effective_budget: u32,
}

impl<'a> AcbService<'a> {
    pub fn new(db: &'a mut Database, config: &'a Config) -> Self {
        Self { db, config }
    }

    pub fn build(
        &mut self,
        principal: &Principal,
        request: &AcbRequest,
        deadline: Deadline,
    ) -> Result<Acb> {
        if request.session_id.is_empty() {
            return Err(Error::Invalid("session_id is required".to_string()));
        }
        if request.agent_id.is_empty() {
            return Err(Error::Invalid("agent_id is required".to_string()));
        }

        let mode = detect_mode(&request.intent);
        let budgets = section_budgets(mode);
        let max_tokens = request.max_tokens.unwrap_or(self.config.default_max_tokens);
        let allowed = allowed_sensitivities(request.channel);
        let now = Utc::now();

        let mut remaining = max_tokens;
        let mut packed: Vec<PackedSection> = Vec::new();
        let mut omissions: Vec<Omission> = Vec::new();
        let mut included_decisions: HashSet<String> = HashSet::new();

        let overlay_ctx = ReadContext {
            channel: request.channel,
            include_quarantined: request.include_quarantined,
        };

        // rules candidates are fetched once; the sticky pass reuses them
        deadline.check()?;
        let rule_decisions = if budgets.rules > 0 && remaining > 0 {
            let fetched = self.db.list_decisions(
                &principal.tenant_id,
                &DecisionFilters {
                    status: None,
                    include_archived: false,
                    project_id: request.project_id.clone(),
                    subject_type: None,
                    subject_id: None,
                    query: None,
                    tag: None,
                },
                RULES_FETCH_LIMIT,
            )?;
            self.overlay_decisions(principal, fetched, &overlay_ctx)?
        } else {
            Vec::new()
        };

        // identity
        let identity_items = self.identity_items(principal, remaining, budgets.identity)?;
        pack_into(&mut packed, &mut omissions, "identity", budgets.identity, identity_items, &mut remaining);

        // rules
        let rules_items: Vec<SectionItem> = rule_decisions.iter().map(decision_item).collect();
        pack_into(&mut packed, &mut omissions, "rules", budgets.rules, rules_items, &mut remaining);
        record_included_decisions(&packed, &mut included_decisions);

        // task_state
        deadline.check()?;
        let task_events = self.open_task_updates(principal, request)?;
        let task_items: Vec<SectionItem> = task_events.iter().map(task_item).collect();
        pack_into(&mut packed, &mut omissions, "task_state", budgets.task_state, task_items, &mut remaining);

        // relevant_decisions
        deadline.check()?;
        let relevant = if budgets.relevant_decisions > 0 && remaining > 0 {
            let fetched = self.db.list_decisions(
                &principal.tenant_id,
                &DecisionFilters {
                    status: None,
                    include_archived: false,
                    project_id: request.project_id.clone(),
                    subject_type: request.subject_type.clone(),
                    subject_id: request.subject_id.clone(),
                    query: request.query_text.clone(),
                    tag: None,
                },
                RELEVANT_FETCH_LIMIT,
            )?;
            self.overlay_decisions(principal, fetched, &overlay_ctx)?
        } else {
            Vec::new()
        };
        let relevant_items: Vec<SectionItem> = relevant
            .iter()
            .filter(|d| !included_decisions.contains(d.id.as_str()))
            .map(decision_item)
            .collect();
        pack_into(
            &mut packed,
            &mut omissions,
            "relevant_decisions",
            budgets.relevant_decisions,
            relevant_items,
            &mut remaining,
        );
        record_included_decisions(&packed, &mut included_decisions);

        // recent_window
        deadline.check()?;
        let recent_items =
            self.recent_window_items(principal, request, allowed, remaining, budgets.recent_window)?;
        pack_into(
            &mut packed,
            &mut omissions,
            "recent_window",
            budgets.recent_window,
            recent_items,
            &mut remaining,
        );

        // capsules: a failure here degrades to an empty section
        let capsule_items = if request.include_capsules && budgets.capsules > 0 && remaining > 0 {
            deadline.check()?;
            match self.capsule_items(principal, request, allowed) {
                Ok(items) => items,
                Err(Error::Backend(err)) => {
                    omissions.push(Omission {
                        reason: OmissionReason::SectionError,
                        candidates: vec!["capsules".to_string()],
                        artifact_id: None,
                        detail: Some(err.to_string()),
                    });
                    Vec::new()
                }
                Err(other) => return Err(other),
            }
        } else {
            Vec::new()
        };
        pack_into(&mut packed, &mut omissions, "capsules", budgets.capsules, capsule_items, &mut remaining);

        // retrieved_evidence
        deadline.check()?;
        let retrieval_request = SearchRequest {
            query_text: request.query_text.clone(),
            channel: request.channel,
            project_id: request.project_id.clone(),
            subject_type: request.subject_type.clone(),
            subject_id: request.subject_id.clone(),
            kinds: None,
            include_quarantined: request.include_quarantined,
            limit: self.config.retrieval.scored_max,
        };
        let (evidence_items, query_terms, candidate_pool_size) =
            if budgets.retrieved_evidence > 0 && remaining > 0 {
                let outcome = RetrievalService::new(self.db, self.config).search(
                    principal,
                    &retrieval_request,
                    deadline,
                    now,
                )?;
                let items = outcome
                    .scored
                    .iter()
                    .map(|scored| SectionItem {
                        item_type: "chunk".to_string(),
                        body: ItemBody::Text {
                            text: scored.chunk.text.clone(),
                        },
                        refs: vec![
                            scored.chunk.id.as_str().to_string(),
                            scored.chunk.event_id.as_str().to_string(),
                        ],
                        token_est: scored.chunk.token_est,
                    })
                    .collect();
                (items, outcome.query_terms, outcome.candidate_pool_size)
            } else {
                (Vec::new(), tokenize_query(request.query_text.as_deref()), 0)
            };
        pack_into(
            &mut packed,
            &mut omissions,
            "retrieved_evidence",
            budgets.retrieved_evidence,
            evidence_items,
            &mut remaining,
        );

        // sticky invariants override normal packing priorities
        deadline.check()?;
        self.enforce_sticky(
            principal,
            request,
            &rule_decisions,
            &relevant,
            &task_events,
            &mut packed,
            &mut omissions,
        )?;

        let sections: Vec<Section> = packed.into_iter().map(|p| p.section).collect();
        let token_used_est: u32 = sections.iter().map(|s| s.token_est).sum();

        let acb = Acb {
            acb_id: AcbId::generate(),
            budget_tokens: max_tokens,
            token_used_est,
            sections,
            omissions,
            provenance: Provenance {
                intent: request.intent.clone(),
                mode,
                query_terms,
                candidate_pool_size,
                filters: ProvenanceFilters {
                    sensitivity_allowed: allowed.to_vec(),
                    scope: request.scope.clone(),
                },
                scoring: ScoringSummary {
                    alpha: 0.6,
                    beta: 0.3,
                    gamma: 0.1,
                },
            },
            mode,
        };

        audit::append(
            self.db,
            principal,
            "context.build",
            "acb",
            acb.acb_id.as_str(),
            AuditAction::Read,
            AuditOutcome::Ok,
            serde_json::json!({
                "mode": mode,
                "token_used_est": acb.token_used_est,
                "sections": acb.sections.len(),
            }),
        );

        Ok(acb)
    }

    /// Apply approved decision edits for bundle assembly; retracted,
    /// quarantined (without opt-in), and channel-blocked decisions drop out.
    fn overlay_decisions(
        &self,
        principal: &Principal,
        decisions: Vec<Decision>,
        ctx: &ReadContext,
    ) -> Result<Vec<Decision>> {
        let ids: Vec<&str> = decisions.iter().map(|d| d.id.as_str()).collect();
        let edits = self
            .db
            .approved_edits_for_targets(&principal.tenant_id, "decision", &ids)?;

        Ok(decisions
            .into_iter()
            .filter_map(|decision| {
                let decision_edits: Vec<_> = edits
                    .iter()
                    .filter(|e| e.target.id_str() == decision.id.as_str())
                    .cloned()
                    .collect();
                apply_decision_overlay(&decision, &decision_edits, ctx)
            })
            .collect())
    }

    /// Identity section: the agent's trajectory, newest becoming statements
    /// first, cited back to their handoffs.
    fn identity_items(
        &self,
        principal: &Principal,
        remaining: u32,
        budget: u32,
    ) -> Result<Vec<SectionItem>> {
        if budget == 0 || remaining == 0 {
            return Ok(Vec::new());
        }

        let thread = self.db.identity_thread(&principal.tenant_id)?;
        Ok(thread
            .iter()
            .take(5)
            .map(|entry| SectionItem {
                item_type: "identity".to_string(),
                body: ItemBody::Text {
                    text: entry.becoming.clone(),
                },
                refs: vec![entry.handoff_id.as_str().to_string()],
                token_est: estimate_tokens(&entry.becoming).max(1),
            })
            .collect())
    }

    /// Most recent task updates for the session that are not done, oldest
    /// first so the narrative reads forward.
    fn open_task_updates(
        &self,
        principal: &Principal,
        request: &AcbRequest,
    ) -> Result<Vec<Event>> {
        let mut events = self.db.recent_task_updates(
            &principal.tenant_id,
            &request.session_id,
            TASK_STATE_FETCH_LIMIT,
        )?;
        events.retain(|e| {
            matches!(
                &e.content,
                EventContent::TaskUpdate { status, .. } if *status != TaskStatus::Done
            )
        });
        events.reverse();
        Ok(events)
    }

    /// Recent session window: chunks of the session in chronological order,
    /// post-overlay, sensitivity-filtered.
    fn recent_window_items(
        &self,
        principal: &Principal,
        request: &AcbRequest,
        allowed: &[engram_types::Sensitivity],
        remaining: u32,
        budget: u32,
    ) -> Result<Vec<SectionItem>> {
        if budget == 0 || remaining == 0 {
            return Ok(Vec::new());
        }

        let mut filters = ChunkFilters::for_sensitivities(allowed);
        filters.session_id = Some(request.session_id.clone());
        let candidates =
            self.db
                .recent_chunks(&principal.tenant_id, &filters, RECENT_WINDOW_FETCH_LIMIT)?;

        let ids: Vec<&str> = candidates.iter().map(|c| c.chunk.id.as_str()).collect();
        let edits = self
            .db
            .approved_edits_for_targets(&principal.tenant_id, "chunk", &ids)?;
        let ctx = ReadContext {
            channel: request.channel,
            include_quarantined: request.include_quarantined,
        };

        let mut surviving: Vec<_> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let chunk_edits: Vec<_> = edits
                    .iter()
                    .filter(|e| e.target.id_str() == candidate.chunk.id.as_str())
                    .cloned()
                    .collect();
                apply_chunk_overlay(&candidate.chunk, &chunk_edits, &ctx)
            })
            .collect();

        // chronological order within the window
        surviving.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id)));

        Ok(surviving
            .iter()
            .map(|chunk| SectionItem {
                item_type: "event".to_string(),
                body: ItemBody::Text {
                    text: chunk.text.clone(),
                },
                refs: vec![
                    chunk.event_id.as_str().to_string(),
                    chunk.id.as_str().to_string(),
                ],
                token_est: chunk.token_est,
            })
            .collect())
    }

    /// Capsules addressed to this agent, subject-matched, with their
    /// manifests enumerated and sensitivity-filtered.
    fn capsule_items(
        &self,
        principal: &Principal,
        request: &AcbRequest,
        allowed: &[engram_types::Sensitivity],
    ) -> Result<Vec<SectionItem>> {
        let capsules =
            self.db
                .active_capsules_for_agent(&principal.tenant_id, &request.agent_id, Utc::now())?;

        let mut items = Vec::new();
        for capsule in capsules {
            if let Some(subject_type) = &request.subject_type
                && capsule.subject_type != *subject_type
            {
                continue;
            }
            if let Some(subject_id) = &request.subject_id
                && capsule.subject_id != *subject_id
            {
                continue;
            }

            let chunks = self
                .db
                .get_chunks_by_ids(&principal.tenant_id, &capsule.items.chunk_ids)?;
            let visible: Vec<_> = chunks
                .iter()
                .filter(|c| allowed.contains(&c.sensitivity))
                .collect();

            let mut refs: Vec<String> = vec![capsule.id.as_str().to_string()];
            refs.extend(visible.iter().map(|c| c.id.as_str().to_string()));
            refs.extend(
                capsule
                    .items
                    .decision_ids
                    .iter()
                    .map(|d| d.as_str().to_string()),
            );

            let mut text = format!(
                "Capsule from {} on {}/{}: {} shared items",
                capsule.author_agent_id,
                capsule.subject_type,
                capsule.subject_id,
                refs.len() - 1,
            );
            if !capsule.risks.is_empty() {
                text.push_str(&format!(" (risks: {})", capsule.risks.join("; ")));
            }

            items.push(SectionItem {
                item_type: "capsule".to_string(),
                token_est: estimate_tokens(&text).max(1),
                body: ItemBody::Text { text },
                refs,
            });
        }
        Ok(items)
    }

    /// Sticky invariants: safety decisions, the latest correction, hard
    /// constraints covering the current subject, and blocking task errors
    /// must appear even if normal packing dropped them.
    #[allow(clippy::too_many_arguments)]
    fn enforce_sticky(
        &self,
        principal: &Principal,
        request: &AcbRequest,
        rule_decisions: &[Decision],
        relevant_decisions: &[Decision],
        task_events: &[Event],
        packed: &mut [PackedSection],
        omissions: &mut Vec<Omission>,
    ) -> Result<()> {
        let mut sticky_refs: HashSet<String> = HashSet::new();

        // 1. safety-tagged decisions, into rules
        let safety: Vec<&Decision> = rule_decisions
            .iter()
            .chain(relevant_decisions.iter())
            .filter(|d| d.tags.iter().any(|t| t == "safety"))
            .collect();
        for decision in safety {
            ensure_sticky_item(packed, "rules", decision_item(decision), &mut sticky_refs, omissions);
        }

        // 2. hard constraints covering the current subject, into relevant_decisions
        let constrained: Vec<&Decision> = rule_decisions
            .iter()
            .chain(relevant_decisions.iter())
            .filter(|d| !d.constraints.is_empty())
            .filter(|d| subject_covers(d, request))
            .collect();
        for decision in constrained {
            ensure_sticky_item(
                packed,
                "relevant_decisions",
                decision_item(decision),
                &mut sticky_refs,
                omissions,
            );
        }

        // 3. active blocking errors, into task_state
        for event in task_events {
            if matches!(
                &event.content,
                EventContent::TaskUpdate { status, .. } if *status == TaskStatus::Blocked
            ) {
                ensure_sticky_item(packed, "task_state", task_item(event), &mut sticky_refs, omissions);
            }
        }

        // 4. the most recent correction in the session, into recent_window.
        // A retracted correction stays gone: sticky status never overrides
        // the overlay.
        let recent = self.db.recent_session_events(
            &principal.tenant_id,
            &request.session_id,
            CORRECTION_LOOKBACK,
        )?;
        if let Some(correction) = recent
            .iter()
            .find(|e| e.tags.iter().any(|t| t == "correction"))
            && let Some(chunk) = self.surviving_chunk(principal, correction, request)?
        {
            let item = SectionItem {
                item_type: "event".to_string(),
                token_est: chunk.token_est,
                body: ItemBody::Text { text: chunk.text },
                refs: vec![correction.id.as_str().to_string()],
            };
            ensure_sticky_item(packed, "recent_window", item, &mut sticky_refs, omissions);
        }

        Ok(())
    }

    /// The event's chunk after the edit overlay, or None if every chunk was
    /// retracted, quarantined, or blocked for this read.
    fn surviving_chunk(
        &self,
        principal: &Principal,
        event: &Event,
        request: &AcbRequest,
    ) -> Result<Option<engram_types::Chunk>> {
        let chunks = self.db.chunks_for_event(&principal.tenant_id, &event.id)?;
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let edits = self
            .db
            .approved_edits_for_targets(&principal.tenant_id, "chunk", &ids)?;
        let ctx = ReadContext {
            channel: request.channel,
            include_quarantined: request.include_quarantined,
        };

        Ok(chunks.iter().find_map(|chunk| {
            let chunk_edits: Vec<_> = edits
                .iter()
                .filter(|e| e.target.id_str() == chunk.id.as_str())
                .cloned()
                .collect();
            apply_chunk_overlay(chunk, &chunk_edits, &ctx)
        }))
    }
}

/// Pack a section against the smaller of its mode budget and the remaining
/// global budget, then charge what it used.
fn pack_into(
    packed: &mut Vec<PackedSection>,
    omissions: &mut Vec<Omission>,
    name: &str,
    budget: u32,
    items: Vec<SectionItem>,
    remaining: &mut u32,
) {
    let effective_budget = budget.min(*remaining);
    let (section, mut section_omissions) = pack_section(name, effective_budget, items);
    *remaining -= section.token_est;
    omissions.append(&mut section_omissions);
    packed.push(PackedSection {
        section,
        effective_budget,
    });
}

fn record_included_decisions(packed: &[PackedSection], included: &mut HashSet<String>) {
    for p in packed {
        for item in &p.section.items {
            if item.item_type == "decision"
                && let Some(primary) = item.refs.first()
            {
                included.insert(primary.clone());
            }
        }
    }
}

fn decision_item(decision: &Decision) -> SectionItem {
    let mut refs = vec![decision.id.as_str().to_string()];
    refs.extend(decision.refs.iter().cloned());

    let text_est = {
        let mut text = decision.decision.clone();
        for constraint in &decision.constraints {
            text.push(' ');
            text.push_str(constraint);
        }
        estimate_tokens(&text).max(1)
    };

    SectionItem {
        item_type: "decision".to_string(),
        body: ItemBody::Decision {
            decision_id: decision.id.clone(),
        },
        refs,
        token_est: text_est,
    }
}

fn task_item(event: &Event) -> SectionItem {
    let text = match &event.content {
        EventContent::TaskUpdate {
            task,
            status,
            detail,
        } => match detail {
            Some(detail) => format!("[{}] {}: {}", status.as_str(), task, detail),
            None => format!("[{}] {}", status.as_str(), task),
        },
        _ => String::new(),
    };

    SectionItem {
        item_type: "task_update".to_string(),
        token_est: estimate_tokens(&text).max(1),
        body: ItemBody::Text { text },
        refs: vec![event.id.as_str().to_string()],
    }
}

fn subject_covers(decision: &Decision, request: &AcbRequest) -> bool {
    match (&decision.subject_type, &request.subject_type) {
        // a decision with no subject binds everything in scope
        (None, _) => true,
        (Some(_), None) => false,
        (Some(d), Some(r)) => {
            d == r
                && match (&decision.subject_id, &request.subject_id) {
                    (None, _) => true,
                    (Some(_), None) => false,
                    (Some(d), Some(r)) => d == r,
                }
        }
    }
}

/// Place a sticky item in its section, evicting non-sticky items from the
/// tail until it fits. If it cannot fit at all, record the failure.
fn ensure_sticky_item(
    packed: &mut [PackedSection],
    section_name: &str,
    item: SectionItem,
    sticky_refs: &mut HashSet<String>,
    omissions: &mut Vec<Omission>,
) {
    let primary_ref = item.refs.first().cloned().unwrap_or_default();

    // presence anywhere in the bundle satisfies the invariant; just protect
    // the existing copy from eviction
    for p in packed.iter() {
        if p.section
            .items
            .iter()
            .any(|i| i.refs.first() == item.refs.first())
        {
            sticky_refs.insert(primary_ref);
            return;
        }
    }

    let Some(target) = packed.iter_mut().find(|p| p.section.name == section_name) else {
        return;
    };

    if item.token_est > target.effective_budget {
        omissions.push(Omission {
            reason: OmissionReason::BudgetExhaustedSticky,
            candidates: vec![primary_ref],
            artifact_id: None,
            detail: Some(format!("section {}", section_name)),
        });
        return;
    }

    while target.section.token_est + item.token_est > target.effective_budget {
        let evictable = target
            .section
            .items
            .iter()
            .rposition(|i| i.refs.first().is_none_or(|r| !sticky_refs.contains(r)));
        match evictable {
            Some(pos) => {
                let evicted = target.section.items.remove(pos);
                target.section.token_est -= evicted.token_est;
                omissions.push(Omission {
                    reason: OmissionReason::BudgetExhausted,
                    candidates: vec![evicted
                        .refs
                        .first()
                        .cloned()
                        .unwrap_or_else(|| evicted.item_type.clone())],
                    artifact_id: None,
                    detail: Some(format!("evicted from {} for sticky content", section_name)),
                });
            }
            None => {
                omissions.push(Omission {
                    reason: OmissionReason::BudgetExhaustedSticky,
                    candidates: vec![primary_ref],
                    artifact_id: None,
                    detail: Some(format!("section {}", section_name)),
                });
                return;
            }
        }
    }

    target.section.token_est += item.token_est;
    sticky_refs.insert(primary_ref);
    target.section.items.push(item);
}
