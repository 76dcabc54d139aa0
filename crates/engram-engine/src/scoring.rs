use chrono::{DateTime, Utc};

use engram_types::Chunk;

/// Recency decay time constant: 14 days in seconds.
const TAU_SECS: f64 = 14.0 * 24.0 * 3600.0;

/// Documented scoring weights.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.3,
            gamma: 0.1,
        }
    }
}

/// A chunk with its raw full-text rank, post-overlay.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    /// Positive, larger is better; zero for recency-only candidates
    pub rank: f64,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Score and order candidates deterministically.
///
/// score = alpha * semantic_rank + beta * recency_decay + gamma * importance
///
/// - semantic_rank: raw rank normalized to 0..1 by the pool maximum
/// - recency_decay: exp(-Δt / τ), τ = 14 days, Δt from chunk ts to `now`
/// - importance: the chunk's post-overlay importance
///
/// Ties break by higher ts, then lexicographically larger chunk id, so the
/// ordering is stable across runs on identical data. At most `scored_max`
/// results are returned.
pub fn rank_candidates(
    candidates: Vec<Candidate>,
    now: DateTime<Utc>,
    weights: ScoringWeights,
    scored_max: usize,
) -> Vec<ScoredChunk> {
    let max_rank = candidates
        .iter()
        .map(|c| c.rank)
        .fold(0.0_f64, f64::max);

    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|c| {
            let semantic = if max_rank > 0.0 { c.rank / max_rank } else { 0.0 };
            let age_secs = (now - c.chunk.ts).num_seconds().max(0) as f64;
            let recency = (-age_secs / TAU_SECS).exp();
            let score =
                weights.alpha * semantic + weights.beta * recency + weights.gamma * c.chunk.importance;
            ScoredChunk {
                chunk: c.chunk,
                score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.chunk.ts.cmp(&a.chunk.ts))
            .then_with(|| b.chunk.id.cmp(&a.chunk.id))
    });

    scored.truncate(scored_max);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use engram_types::{Channel, ChunkId, EventId, EventKind, Sensitivity, TenantId};

    fn chunk_at(ts: DateTime<Utc>, importance: f64, id: &str) -> Chunk {
        Chunk {
            id: ChunkId::parse(format!("chk_{}", id)).unwrap(),
            event_id: EventId::generate(),
            tenant_id: TenantId::parse("t1").unwrap(),
            session_id: "s1".to_string(),
            text: "text".to_string(),
            token_est: 1,
            importance,
            channel: Channel::Private,
            sensitivity: Sensitivity::Low,
            kind: EventKind::Message,
            tags: vec![],
            ts,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_semantic_rank_normalized_by_pool_max() {
        let candidates = vec![
            Candidate {
                chunk: chunk_at(now(), 0.0, "aaa"),
                rank: 2.0,
            },
            Candidate {
                chunk: chunk_at(now(), 0.0, "bbb"),
                rank: 4.0,
            },
        ];
        let scored = rank_candidates(candidates, now(), ScoringWeights::default(), 10);
        assert_eq!(scored[0].chunk.id.as_str(), "chk_bbb");
        // best candidate: semantic = 1.0, recency = 1.0, importance = 0
        assert!((scored[0].score - (0.6 + 0.3)).abs() < 1e-9);
        // second: semantic = 0.5
        assert!((scored[1].score - (0.3 + 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_recency_decay_halves_after_two_weeks_over_e() {
        let fresh = Candidate {
            chunk: chunk_at(now(), 0.0, "fresh"),
            rank: 1.0,
        };
        let stale = Candidate {
            chunk: chunk_at(now() - Duration::days(14), 0.0, "stale"),
            rank: 1.0,
        };
        let scored = rank_candidates(vec![stale, fresh], now(), ScoringWeights::default(), 10);
        assert_eq!(scored[0].chunk.id.as_str(), "chk_fresh");
        // after exactly τ, recency contributes beta / e
        let expected_stale = 0.6 + 0.3 * (-1.0_f64).exp();
        assert!((scored[1].score - expected_stale).abs() < 1e-9);
    }

    #[test]
    fn test_tie_breaks_by_ts_then_id() {
        let ts = now();
        let older = Candidate {
            chunk: chunk_at(ts - Duration::seconds(0), 0.0, "aaa"),
            rank: 1.0,
        };
        let same_ts_larger_id = Candidate {
            chunk: chunk_at(ts, 0.0, "zzz"),
            rank: 1.0,
        };
        let scored = rank_candidates(
            vec![older, same_ts_larger_id],
            now(),
            ScoringWeights::default(),
            10,
        );
        // identical score and ts: lexicographically larger id wins
        assert_eq!(scored[0].chunk.id.as_str(), "chk_zzz");
    }

    #[test]
    fn test_scored_max_caps_results() {
        let candidates: Vec<Candidate> = (0..30)
            .map(|i| Candidate {
                chunk: chunk_at(now(), 0.0, &format!("{:03}", i)),
                rank: 1.0,
            })
            .collect();
        let scored = rank_candidates(candidates, now(), ScoringWeights::default(), 5);
        assert_eq!(scored.len(), 5);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let build = || {
            vec![
                Candidate {
                    chunk: chunk_at(now() - Duration::days(3), 0.7, "one"),
                    rank: 1.5,
                },
                Candidate {
                    chunk: chunk_at(now() - Duration::days(1), 0.2, "two"),
                    rank: 2.5,
                },
                Candidate {
                    chunk: chunk_at(now(), 0.0, "three"),
                    rank: 0.5,
                },
            ]
        };
        let a = rank_candidates(build(), now(), ScoringWeights::default(), 10);
        let b = rank_candidates(build(), now(), ScoringWeights::default(), 10);
        let ids_a: Vec<_> = a.iter().map(|s| s.chunk.id.as_str().to_string()).collect();
        let ids_b: Vec<_> = b.iter().map(|s| s.chunk.id.as_str().to_string()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
