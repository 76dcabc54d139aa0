//! TestWorld pattern for declarative integration test setup.
//!
//! Provides a fluent interface for:
//! - Creating isolated in-memory service instances
//! - Building principals with the right roles
//! - Seeding events, decisions, and handoffs

use engram_runtime::{
    Config, CreateDecisionRequest, CreateHandoffRequest, Engram, IngestReceipt,
    RecordEventRequest,
};
use engram_types::{
    Actor, ActorType, Channel, DecisionScope, EventContent, Principal, Role, Sensitivity, TenantId,
};

/// Declarative test environment around an in-memory service.
///
/// # Example
/// ```no_run
/// use engram_testing::TestWorld;
///
/// let world = TestWorld::new();
/// let principal = world.principal("tenant-a");
/// world.seed_message(&principal, "s1", "hello");
/// ```
pub struct TestWorld {
    service: Engram,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            service: Engram::open_in_memory().expect("in-memory service opens"),
        }
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            service: Engram::open_in_memory()
                .expect("in-memory service opens")
                .with_config(config)
                .expect("config is valid"),
        }
    }

    pub fn service(&self) -> &Engram {
        &self.service
    }

    /// A member principal for the given tenant.
    pub fn principal(&self, tenant: &str) -> Principal {
        Principal::new(TenantId::parse(tenant).expect("valid tenant id")).with_user("tester")
    }

    /// A principal that can approve retract/block edits.
    pub fn approver(&self, tenant: &str) -> Principal {
        self.principal(tenant).with_role(Role::Approver)
    }

    /// A tenant administrator.
    pub fn admin(&self, tenant: &str) -> Principal {
        self.principal(tenant).with_role(Role::Admin)
    }

    /// Record a plain private message event; panics on failure.
    pub fn seed_message(
        &self,
        principal: &Principal,
        session_id: &str,
        text: &str,
    ) -> IngestReceipt {
        self.seed_event(principal, message_request(session_id, text))
    }

    pub fn seed_event(&self, principal: &Principal, request: RecordEventRequest) -> IngestReceipt {
        self.service
            .events()
            .record(principal, request)
            .expect("seed event records")
    }

    pub fn seed_decision(&self, principal: &Principal, text: &str, tags: &[&str]) {
        self.service
            .decisions()
            .create(
                principal,
                CreateDecisionRequest {
                    scope: DecisionScope::Global,
                    project_id: None,
                    subject_type: None,
                    subject_id: None,
                    decision: text.to_string(),
                    rationale: vec!["seeded for test".to_string()],
                    constraints: vec![],
                    alternatives: vec![],
                    consequences: vec![],
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    refs: vec![],
                },
            )
            .expect("seed decision records");
    }

    pub fn seed_handoff(&self, principal: &Principal, with_whom: &str, becoming: Option<&str>) {
        self.service
            .handoffs()
            .create(
                principal,
                CreateHandoffRequest {
                    experienced: "a seeded session".to_string(),
                    noticed: "nothing unusual".to_string(),
                    learned: "fixtures are useful".to_string(),
                    remember: "keep tests fast".to_string(),
                    story: None,
                    becoming: becoming.map(|s| s.to_string()),
                    significance: 0.5,
                    tags: vec![],
                    with_whom: with_whom.to_string(),
                },
            )
            .expect("seed handoff records");
    }
}

/// A private-channel message request with low sensitivity.
pub fn message_request(session_id: &str, text: &str) -> RecordEventRequest {
    RecordEventRequest {
        session_id: session_id.to_string(),
        channel: Channel::Private,
        sensitivity: Sensitivity::Low,
        actor: Actor {
            actor_type: ActorType::Human,
            id: "tester".to_string(),
        },
        content: EventContent::Message {
            text: text.to_string(),
        },
        tags: vec![],
        project_id: None,
        subject_type: None,
        subject_id: None,
        ts: None,
        refs: vec![],
    }
}
