//! Snapshot of the assembled bundle's shape: mode detection, section order,
//! and provenance scoring weights.

use engram_runtime::AcbRequest;
use engram_testing::TestWorld;
use engram_types::Channel;

#[test]
fn test_acb_shape_snapshot() {
    let world = TestWorld::new();
    let principal = world.principal("tenant-a");
    world.seed_message(&principal, "s1", "alpha beta gamma");

    let acb = world
        .service()
        .context()
        .build_acb(
            &principal,
            &AcbRequest {
                session_id: "s1".to_string(),
                agent_id: "agent-main".to_string(),
                channel: Channel::Private,
                intent: "implement".to_string(),
                query_text: None,
                scope: None,
                subject_type: None,
                subject_id: None,
                project_id: None,
                include_capsules: false,
                include_quarantined: false,
                max_tokens: None,
            },
        )
        .unwrap();

    let section_names: Vec<&str> = acb.sections.iter().map(|s| s.name.as_str()).collect();
    let shape = format!(
        "mode={:?}\nbudget_tokens={}\nsections={}\nomissions={}\nscoring={}/{}/{}",
        acb.mode,
        acb.budget_tokens,
        section_names.join(","),
        acb.omissions.len(),
        acb.provenance.scoring.alpha,
        acb.provenance.scoring.beta,
        acb.provenance.scoring.gamma,
    );

    insta::assert_snapshot!("acb_shape", shape);
}
