use serde::{Deserialize, Serialize};

/// Assembly mode, detected from the request intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Task,
    Exploration,
    Debugging,
    Learning,
    General,
}

/// Fixed intent → mode table; anything unmapped falls back to GENERAL.
pub fn detect_mode(intent: &str) -> Mode {
    match intent.trim().to_lowercase().as_str() {
        "task" | "implement" | "fix" => Mode::Task,
        "explore" | "think" | "brainstorm" => Mode::Exploration,
        "debug" | "error" | "trace" => Mode::Debugging,
        "teach" | "explain" | "how" => Mode::Learning,
        _ => Mode::General,
    }
}

/// Per-section token budgets for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionBudgets {
    pub identity: u32,
    pub rules: u32,
    pub task_state: u32,
    pub recent_window: u32,
    pub relevant_decisions: u32,
    pub retrieved_evidence: u32,
    pub capsules: u32,
}

impl SectionBudgets {
    pub fn total(&self) -> u32 {
        self.identity
            + self.rules
            + self.task_state
            + self.recent_window
            + self.relevant_decisions
            + self.retrieved_evidence
            + self.capsules
    }
}

/// Fixed per-mode budget table. Totals stay under the 65000-token default
/// budget, leaving the documented reserve per mode.
pub fn section_budgets(mode: Mode) -> SectionBudgets {
    match mode {
        Mode::General => SectionBudgets {
            identity: 1200,
            rules: 6000,
            task_state: 3000,
            recent_window: 8000,
            relevant_decisions: 4000,
            retrieved_evidence: 28000,
            capsules: 4000,
        },
        Mode::Task => SectionBudgets {
            identity: 1200,
            rules: 10000,
            task_state: 5000,
            recent_window: 2000,
            relevant_decisions: 4000,
            retrieved_evidence: 28000,
            capsules: 4000,
        },
        Mode::Exploration => SectionBudgets {
            identity: 1200,
            rules: 3000,
            task_state: 1000,
            recent_window: 15000,
            relevant_decisions: 6000,
            retrieved_evidence: 35000,
            capsules: 2000,
        },
        Mode::Debugging => SectionBudgets {
            identity: 1200,
            rules: 5000,
            task_state: 4000,
            recent_window: 12000,
            relevant_decisions: 3000,
            retrieved_evidence: 25000,
            capsules: 0,
        },
        Mode::Learning => SectionBudgets {
            identity: 1200,
            rules: 8000,
            task_state: 0,
            recent_window: 2000,
            relevant_decisions: 8000,
            retrieved_evidence: 40000,
            capsules: 2000,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_mapping() {
        assert_eq!(detect_mode("implement"), Mode::Task);
        assert_eq!(detect_mode("Fix"), Mode::Task);
        assert_eq!(detect_mode("brainstorm"), Mode::Exploration);
        assert_eq!(detect_mode("trace"), Mode::Debugging);
        assert_eq!(detect_mode("how"), Mode::Learning);
        assert_eq!(detect_mode("anything else"), Mode::General);
        assert_eq!(detect_mode(""), Mode::General);
    }

    #[test]
    fn test_budgets_leave_reserve_under_default_max() {
        let minimum_reserve = [
            (Mode::General, 8800),
            (Mode::Task, 10800),
            (Mode::Exploration, 1800),
            (Mode::Debugging, 14800),
            (Mode::Learning, 3800),
        ];
        for (mode, reserve) in minimum_reserve {
            assert!(
                65000 - section_budgets(mode).total() >= reserve,
                "reserve too small for {:?}",
                mode
            );
        }
    }

    #[test]
    fn test_mode_serializes_upper() {
        assert_eq!(
            serde_json::to_string(&Mode::Exploration).unwrap(),
            "\"EXPLORATION\""
        );
    }
}
