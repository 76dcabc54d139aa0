use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

// NOTE: ID Design
//
// All identifiers are opaque strings with a type prefix (evt_, chk_, dec_, ...)
// followed by a lowercase hex UUID body. The prefix makes IDs self-describing
// across API boundaries and log lines; the charset restriction keeps them safe
// to embed in SQL, URLs, and filenames without escaping.
//
// Tenant IDs are caller-supplied (they come from the authenticated principal,
// not from this service), so they are validated for charset only, not prefix.

fn validate_body(id: &str, prefix: &str) -> Result<()> {
    let Some(body) = id.strip_prefix(prefix) else {
        return Err(Error::InvalidId(format!(
            "expected prefix '{}': {}",
            prefix, id
        )));
    };
    if body.is_empty() || body.len() > 64 {
        return Err(Error::InvalidId(format!("bad id length: {}", id)));
    }
    if !body
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::InvalidId(format!("bad id charset: {}", id)));
    }
    Ok(())
}

macro_rules! prefixed_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a fresh random ID.
            pub fn generate() -> Self {
                Self(format!("{}{}", $prefix, Uuid::new_v4().simple()))
            }

            /// Validate prefix and charset of a caller-supplied ID.
            pub fn parse(id: impl Into<String>) -> Result<Self> {
                let id = id.into();
                validate_body(&id, $prefix)?;
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

prefixed_id!(
    /// Ground-truth event ID.
    EventId,
    "evt_"
);
prefixed_id!(
    /// Derived chunk ID.
    ChunkId,
    "chk_"
);
prefixed_id!(
    /// Offloaded artifact ID.
    ArtifactId,
    "art_"
);
prefixed_id!(
    /// Decision record ID.
    DecisionId,
    "dec_"
);
prefixed_id!(
    /// Capsule ID.
    CapsuleId,
    "cap_"
);
prefixed_id!(
    /// Knowledge note ID.
    NoteId,
    "kn_"
);
prefixed_id!(
    /// Memory edit ID.
    EditId,
    "edit_"
);
prefixed_id!(
    /// Active context bundle ID.
    AcbId,
    "acb_"
);
prefixed_id!(
    /// Session handoff ID.
    HandoffId,
    "sh_"
);
prefixed_id!(
    /// Reflection ID.
    ReflectionId,
    "refl_"
);
prefixed_id!(
    /// Consolidation job ID.
    JobId,
    "job_"
);

/// Tenant identifier.
///
/// Unlike the prefixed IDs, tenants are named by the caller's auth layer;
/// only the charset is enforced here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > 64 {
            return Err(Error::InvalidId(format!("bad tenant id length: {}", id)));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::InvalidId(format!("bad tenant id charset: {}", id)));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_has_prefix() {
        let id = EventId::generate();
        assert!(id.as_str().starts_with("evt_"));
    }

    #[test]
    fn test_parse_accepts_generated() {
        let id = ChunkId::generate();
        assert_eq!(ChunkId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_wrong_prefix() {
        assert!(EventId::parse("chk_0123abcd").is_err());
        assert!(EventId::parse("evt_").is_err());
        assert!(EventId::parse("evt_UPPER").is_err());
        assert!(EventId::parse("evt_ok; DROP TABLE events").is_err());
    }

    #[test]
    fn test_tenant_charset() {
        assert!(TenantId::parse("acme-corp").is_ok());
        assert!(TenantId::parse("t_01").is_ok());
        assert!(TenantId::parse("").is_err());
        assert!(TenantId::parse("bad tenant").is_err());
    }
}
