//! End-to-end scenarios over the full service surface.

use engram_runtime::{
    AcbRequest, Config, Error, ProposeEditRequest, SearchRequest, SecretPolicy,
};
use engram_testing::{message_request, TestWorld};
use engram_types::{
    Channel, EditOp, EventContent, JobType, Sensitivity, TargetRef,
};

fn acb_request(session_id: &str, channel: Channel, query: Option<&str>) -> AcbRequest {
    AcbRequest {
        session_id: session_id.to_string(),
        agent_id: "agent-main".to_string(),
        channel,
        intent: "task".to_string(),
        query_text: query.map(|s| s.to_string()),
        scope: None,
        subject_type: None,
        subject_id: None,
        project_id: None,
        include_capsules: false,
        include_quarantined: false,
        max_tokens: None,
    }
}

// S1: content recorded on a private channel at high sensitivity never
// surfaces on a public-channel read.
#[test]
fn test_public_channel_suppression() {
    let world = TestWorld::new();
    let principal = world.principal("tenant-a");

    let mut private = message_request("s1", "customer phone: 555-0100");
    private.sensitivity = Sensitivity::High;
    private.tags = vec!["contact".to_string()];
    let private_receipt = world.seed_event(&principal, private);

    let mut public = message_request("s1", "general status update");
    public.channel = Channel::Public;
    public.sensitivity = Sensitivity::None;
    world.seed_event(&principal, public);

    let acb = world
        .service()
        .context()
        .build_acb(
            &principal,
            &acb_request("s1", Channel::Public, Some("customer phone")),
        )
        .unwrap();

    let private_ref = private_receipt.event_id.as_str();
    for section in &acb.sections {
        for item in &section.items {
            assert!(
                !item.refs.iter().any(|r| r == private_ref),
                "private event leaked into section {}",
                section.name
            );
        }
    }
    assert_eq!(
        acb.provenance.filters.sensitivity_allowed,
        vec![Sensitivity::None, Sensitivity::Low]
    );
}

// S2: a retracted chunk disappears from retrieval while the ground-truth
// event stays readable.
#[test]
fn test_retract_before_read() {
    let world = TestWorld::new();
    let principal = world.principal("tenant-a");
    let approver = world.approver("tenant-a");

    let receipt = world.seed_message(&principal, "s1", "internal only, do not expose");
    let chunk_id = receipt.chunk_ids[0].clone();

    let edit = world
        .service()
        .edits()
        .propose(
            &principal,
            ProposeEditRequest {
                target: TargetRef::Chunk(chunk_id),
                op: EditOp::Retract,
                reason: "should never have been recorded".to_string(),
            },
        )
        .unwrap();
    world.service().edits().approve(&approver, &edit.id).unwrap();

    let results = world
        .service()
        .events()
        .search(
            &principal,
            &SearchRequest {
                query_text: Some("internal only".to_string()),
                channel: Channel::Private,
                project_id: None,
                subject_type: None,
                subject_id: None,
                kinds: None,
                include_quarantined: false,
                limit: 10,
            },
        )
        .unwrap();
    assert!(results.is_empty());

    let event = world
        .service()
        .events()
        .get(&principal, &receipt.event_id)
        .unwrap();
    match event.content {
        EventContent::Message { text } => assert_eq!(text, "internal only, do not expose"),
        _ => panic!("wrong payload"),
    }
}

// S3: budgets hold under a large backlog; dropped chunks land in omissions.
#[test]
fn test_budget_enforcement_under_backlog() {
    let world = TestWorld::new();
    let principal = world.principal("tenant-a");

    let filler = "memory pressure ".repeat(250); // ~1000 tokens
    for i in 0..120 {
        world.seed_message(&principal, "s1", &format!("{} item {}", filler, i));
    }

    let mut request = acb_request("s1", Channel::Private, Some("memory pressure"));
    request.intent = "explore".to_string();
    let acb = world.service().context().build_acb(&principal, &request).unwrap();

    assert!(acb.token_used_est <= 65000);
    for section in &acb.sections {
        let expected = match section.name.as_str() {
            "retrieved_evidence" => 35000,
            "recent_window" => 15000,
            _ => continue,
        };
        assert!(
            section.token_est <= expected,
            "section {} over budget: {}",
            section.name,
            section.token_est
        );
    }
    assert!(!acb.omissions.is_empty());
}

// S4: secrets are redacted at ingest and the audit trail records the count.
#[test]
fn test_secret_redaction_end_to_end() {
    let world = TestWorld::new();
    let principal = world.principal("tenant-a");
    let admin = world.admin("tenant-a");

    let receipt = world.seed_message(&principal, "s1", "Bearer sk-abc123def456 please use this");

    let event = world
        .service()
        .events()
        .get(&principal, &receipt.event_id)
        .unwrap();
    match &event.content {
        EventContent::Message { text } => {
            assert!(!text.contains("sk-abc123def456"));
            assert!(text.contains("[SECRET_REDACTED]"));
        }
        _ => panic!("wrong payload"),
    }

    let audit = world.service().admin().read_audit(&admin, 10).unwrap();
    let write_record = audit
        .iter()
        .find(|r| r.event_type == "data.write")
        .expect("ingest audit record exists");
    assert_eq!(write_record.details["redactions"], 1);
}

// S5: identity consolidation merges themed becoming statements into one
// note and is idempotent.
#[test]
fn test_identity_consolidation() {
    let world = TestWorld::new();
    let principal = world.principal("tenant-a");

    for i in 0..15 {
        // every statement shares the "clarity" keyword; the second halves
        // differ so no other keyword dominates
        let becoming = if i % 2 == 0 {
            format!("seeking clarity through refactoring {}", i)
        } else {
            format!("seeking clarity with patience {}", i)
        };
        world.seed_handoff(&principal, "casey", Some(&becoming));
    }

    let job = world
        .service()
        .consolidation()
        .run(&principal, JobType::IdentitySynthesis)
        .unwrap();
    assert_eq!(job.items_affected, 15);

    let notes = world.service().handoffs().knowledge_notes(&principal).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].source_handoffs.len(), 15);
    assert_eq!(notes[0].title, "clarity");

    let rerun = world
        .service()
        .consolidation()
        .run(&principal, JobType::IdentitySynthesis)
        .unwrap();
    assert_eq!(rerun.items_affected, 0);
    assert_eq!(
        world.service().handoffs().knowledge_notes(&principal).unwrap().len(),
        1
    );
}

// S6: an oversized tool result is offloaded to an artifact that reads back
// byte-identical.
#[test]
fn test_tool_result_offload() {
    let world = TestWorld::new();
    let principal = world.principal("tenant-a");

    let mut request = message_request("s1", "");
    request.content = EventContent::ToolResult {
        tool: "bash".to_string(),
        excerpt_text: "z".repeat(200 * 1024),
        line_range: None,
        truncated: false,
        artifact_id: None,
    };
    let receipt = world.seed_event(&principal, request);

    let event = world
        .service()
        .events()
        .get(&principal, &receipt.event_id)
        .unwrap();
    let EventContent::ToolResult {
        truncated,
        artifact_id,
        excerpt_text,
        ..
    } = &event.content
    else {
        panic!("wrong payload");
    };

    assert!(truncated);
    assert!(excerpt_text.len() <= 64 * 1024);
    let artifact = world
        .service()
        .events()
        .get_artifact(&principal, artifact_id.as_ref().unwrap())
        .unwrap();
    assert_eq!(artifact.len(), 200 * 1024);
}

#[test]
fn test_reject_policy_is_configurable() {
    let mut config = Config::default();
    config.secret_policy = SecretPolicy::Reject;
    let world = TestWorld::with_config(config);
    let principal = world.principal("tenant-a");

    let result = world.service().events().record(
        &principal,
        message_request("s1", "password: hunter2"),
    );
    assert!(matches!(result, Err(Error::SensitiveContent(_))));
}
