use crate::acb::{Omission, OmissionReason, Section, SectionItem};

/// Pack items into a section without ever fragmenting one.
///
/// Items are taken in the order given (already ranked). An item that does
/// not fit the remaining budget is skipped, not split; an item larger than
/// the entire section budget is recorded as `oversize`, everything else that
/// misses out as `budget_exhausted`. Skipped items with no refs fall back to
/// their type name in the omission candidates list.
pub fn pack_section(name: &str, budget: u32, items: Vec<SectionItem>) -> (Section, Vec<Omission>) {
    let mut section = Section::empty(name);
    let mut skipped_budget: Vec<String> = Vec::new();
    let mut omissions = Vec::new();

    for item in items {
        if item.token_est > budget {
            omissions.push(Omission {
                reason: OmissionReason::Oversize,
                candidates: vec![candidate_label(&item)],
                artifact_id: None,
                detail: Some(format!("section {}", name)),
            });
            continue;
        }

        if section.token_est + item.token_est <= budget {
            section.token_est += item.token_est;
            section.items.push(item);
        } else {
            skipped_budget.push(candidate_label(&item));
        }
    }

    if !skipped_budget.is_empty() {
        omissions.push(Omission {
            reason: OmissionReason::BudgetExhausted,
            candidates: skipped_budget,
            artifact_id: None,
            detail: Some(format!("section {}", name)),
        });
    }

    (section, omissions)
}

fn candidate_label(item: &SectionItem) -> String {
    item.refs
        .first()
        .cloned()
        .unwrap_or_else(|| item.item_type.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acb::ItemBody;

    fn item(token_est: u32, reference: &str) -> SectionItem {
        SectionItem {
            item_type: "chunk".to_string(),
            body: ItemBody::Text {
                text: "x".repeat(token_est as usize),
            },
            refs: vec![reference.to_string()],
            token_est,
        }
    }

    #[test]
    fn test_packs_until_budget() {
        let items = vec![item(40, "a"), item(40, "b"), item(40, "c")];
        let (section, omissions) = pack_section("rules", 100, items);

        assert_eq!(section.items.len(), 2);
        assert_eq!(section.token_est, 80);
        assert_eq!(omissions.len(), 1);
        assert_eq!(omissions[0].reason, OmissionReason::BudgetExhausted);
        assert_eq!(omissions[0].candidates, vec!["c".to_string()]);
    }

    #[test]
    fn test_never_fragments_but_keeps_scanning() {
        // the 60-token item does not fit after the first two, but the
        // 15-token one after it still does
        let items = vec![item(50, "a"), item(30, "b"), item(60, "c"), item(15, "d")];
        let (section, omissions) = pack_section("evidence", 100, items);

        let packed: Vec<_> = section.items.iter().map(|i| i.refs[0].clone()).collect();
        assert_eq!(packed, vec!["a", "b", "d"]);
        assert_eq!(section.token_est, 95);
        assert_eq!(omissions[0].candidates, vec!["c".to_string()]);
    }

    #[test]
    fn test_oversize_item_recorded() {
        let items = vec![item(500, "huge"), item(10, "small")];
        let (section, omissions) = pack_section("evidence", 100, items);

        assert_eq!(section.items.len(), 1);
        assert_eq!(omissions.len(), 1);
        assert_eq!(omissions[0].reason, OmissionReason::Oversize);
        assert_eq!(omissions[0].candidates, vec!["huge".to_string()]);
    }

    #[test]
    fn test_zero_budget_yields_empty_section() {
        let items = vec![item(1, "a")];
        let (section, omissions) = pack_section("identity", 0, items);

        assert!(section.items.is_empty());
        assert_eq!(section.token_est, 0);
        // with a zero budget every item is oversize
        assert_eq!(omissions[0].reason, OmissionReason::Oversize);
    }
}
