use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::did::Did;
use crate::id::AccountId;

/// One (platform, handle) identity claimed by an account.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlatformBinding {
    pub platform: String,
    pub handle: String,
}

impl PlatformBinding {
    pub fn new(platform: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            handle: handle.into(),
        }
    }
}

/// Derived per-account counters. Recomputed by projections.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    pub message_count: u64,
    pub thread_count: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A local account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub did: Option<Did>,
    pub display_name: String,
    pub bindings: BTreeSet<PlatformBinding>,
    #[serde(with = "crate::time::rfc3339_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stats: AccountStats,
}

/// Normalized input for account creation.
///
/// The account identifier is derived from the first binding, so at least one
/// binding is required.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInput {
    pub display_name: String,
    pub did: Option<Did>,
    pub bindings: Vec<PlatformBinding>,
    pub created_at: Option<DateTime<Utc>>,
}

impl AccountInput {
    pub fn new(display_name: impl Into<String>, binding: PlatformBinding) -> Self {
        Self {
            display_name: display_name.into(),
            did: None,
            bindings: vec![binding],
            created_at: None,
        }
    }

    pub fn with_did(mut self, did: Did) -> Self {
        self.did = Some(did);
        self
    }

    pub fn with_binding(mut self, binding: PlatformBinding) -> Self {
        self.bindings.push(binding);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_order_by_platform_then_handle() {
        let mut set = BTreeSet::new();
        set.insert(PlatformBinding::new("slack", "bob"));
        set.insert(PlatformBinding::new("email", "zed@example.com"));
        set.insert(PlatformBinding::new("slack", "alice"));
        let handles: Vec<_> = set.iter().map(|b| b.handle.as_str()).collect();
        assert_eq!(handles, vec!["zed@example.com", "alice", "bob"]);
    }

    #[test]
    fn input_builder_accumulates_bindings() {
        let input = AccountInput::new("Ada", PlatformBinding::new("email", "ada@example.com"))
            .with_binding(PlatformBinding::new("matrix", "@ada:example.org"));
        assert_eq!(input.bindings.len(), 2);
        assert_eq!(input.bindings[0].platform, "email");
    }
}
