use engram_types::{Channel, Chunk, Decision, EditOp, MemoryEdit};

// NOTE: Overlay application is a pure function over (ground-truth item,
// approved edit list). Edits arrive pre-sorted in approval order; retract is
// terminal, so nothing after it is consulted.

/// Read-side context the overlay needs to decide visibility.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext {
    pub channel: Channel,
    pub include_quarantined: bool,
}

/// Apply approved edits to a chunk. `None` means the chunk is invisible to
/// this read (retracted, quarantined without opt-in, or blocked on the
/// request channel).
pub fn apply_chunk_overlay(
    chunk: &Chunk,
    edits: &[MemoryEdit],
    ctx: &ReadContext,
) -> Option<Chunk> {
    let mut result = chunk.clone();

    for edit in edits {
        match &edit.op {
            EditOp::Retract => return None,
            EditOp::Amend { text, importance } => {
                if let Some(text) = text {
                    result.text = text.clone();
                    result.token_est = engram_types::estimate_tokens(text).max(1);
                }
                if let Some(importance) = importance {
                    result.importance = importance.clamp(0.0, 1.0);
                }
            }
            EditOp::Quarantine => {
                if !ctx.include_quarantined {
                    return None;
                }
            }
            EditOp::Attenuate { importance_delta } => {
                result.importance = (result.importance - importance_delta).max(0.0);
            }
            EditOp::Block { channel } => {
                if *channel == ctx.channel {
                    return None;
                }
            }
        }
    }

    Some(result)
}

/// Apply approved edits to a decision. Importance-only operations
/// (attenuate) have nothing to act on here and pass through.
pub fn apply_decision_overlay(
    decision: &Decision,
    edits: &[MemoryEdit],
    ctx: &ReadContext,
) -> Option<Decision> {
    let mut result = decision.clone();

    for edit in edits {
        match &edit.op {
            EditOp::Retract => return None,
            EditOp::Amend { text, .. } => {
                if let Some(text) = text {
                    result.decision = text.clone();
                }
            }
            EditOp::Quarantine => {
                if !ctx.include_quarantined {
                    return None;
                }
            }
            EditOp::Attenuate { .. } => {}
            EditOp::Block { channel } => {
                if *channel == ctx.channel {
                    return None;
                }
            }
        }
    }

    Some(result)
}
