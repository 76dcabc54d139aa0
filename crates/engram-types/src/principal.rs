use serde::{Deserialize, Serialize};

use crate::id::TenantId;

/// Roles recognized by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full tenant administration, audit reads, purge
    Admin,
    /// May approve retract/block edits
    Approver,
    /// Standard read/write access
    Member,
}

/// Authenticated caller identity attached to every request.
///
/// Built by the transport/auth boundary, never from request bodies. The
/// tenant on the principal is the only tenant the core will ever touch for
/// the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Principal {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            user_id: None,
            roles: vec![Role::Member],
            scopes: Vec::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Actor identifier for audit rows.
    pub fn actor_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or("system")
    }
}
