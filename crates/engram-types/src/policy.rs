use crate::{Channel, EventKind, Sensitivity};

// NOTE: Channel → sensitivity projection (bit-exact for compatibility):
//
//   public  → {none, low}
//   private → {none, low, high}
//   team    → {none, low, high}
//   agent   → {none, low}
//   secret  → never loaded on any channel
//
// Applied at retrieval and to direct sources (decisions, capsules) alike.

/// Sensitivity levels readable on a channel.
///
/// `Secret` never appears in any return value of this function.
pub fn allowed_sensitivities(channel: Channel) -> &'static [Sensitivity] {
    match channel {
        Channel::Public | Channel::Agent => &[Sensitivity::None, Sensitivity::Low],
        Channel::Private | Channel::Team => {
            &[Sensitivity::None, Sensitivity::Low, Sensitivity::High]
        }
    }
}

/// Base importance assigned to a chunk at ingest.
///
/// Fixed table: decision 1.0, task_update 0.8, pinned-tagged 0.9, else 0.0.
/// The pinned tag wins over the kind default only when it is higher.
pub fn base_importance(kind: EventKind, tags: &[String]) -> f64 {
    let by_kind: f64 = match kind {
        EventKind::Decision => 1.0,
        EventKind::TaskUpdate => 0.8,
        _ => 0.0,
    };
    let pinned = tags.iter().any(|t| t == "pinned");
    if pinned { by_kind.max(0.9) } else { by_kind }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_never_allowed() {
        for channel in [Channel::Private, Channel::Public, Channel::Team, Channel::Agent] {
            assert!(!allowed_sensitivities(channel).contains(&Sensitivity::Secret));
        }
    }

    #[test]
    fn test_public_projection() {
        let allowed = allowed_sensitivities(Channel::Public);
        assert_eq!(allowed, &[Sensitivity::None, Sensitivity::Low]);
    }

    #[test]
    fn test_private_allows_high() {
        assert!(allowed_sensitivities(Channel::Private).contains(&Sensitivity::High));
        assert!(!allowed_sensitivities(Channel::Agent).contains(&Sensitivity::High));
    }

    #[test]
    fn test_importance_table() {
        assert_eq!(base_importance(EventKind::Decision, &[]), 1.0);
        assert_eq!(base_importance(EventKind::TaskUpdate, &[]), 0.8);
        assert_eq!(base_importance(EventKind::Message, &[]), 0.0);
        assert_eq!(
            base_importance(EventKind::Message, &["pinned".to_string()]),
            0.9
        );
        // pinned never lowers a decision
        assert_eq!(
            base_importance(EventKind::Decision, &["pinned".to_string()]),
            1.0
        );
    }
}
