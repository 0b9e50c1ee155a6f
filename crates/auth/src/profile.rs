use std::collections::HashSet;
use std::sync::Arc;

use billforge_core::ProfileId;

use crate::Permission;

/// A role: a named bundle of granted permissions.
///
/// Profiles are read-only from the authorization core's perspective; they are
/// created and edited by administrative workflows and handed over fully
/// loaded (no lazy fetching once a profile reaches a gate).
pub trait Profile: core::fmt::Debug + Send + Sync {
    fn id(&self) -> ProfileId;

    fn name(&self) -> &str;

    /// Every granted permission, in no particular order.
    fn permissions(&self) -> Vec<Permission>;

    /// Whether any granted permission [`matches`](Permission::matches) `requested`.
    fn has_permission(&self, requested: &Permission) -> bool;
}

/// Profiles travel between the cache and concurrent requests behind an `Arc`.
pub type SharedProfile = Arc<dyn Profile>;

/// Wildcard-aware membership test shared by every `Profile` implementation.
pub fn grants<'a>(granted: impl IntoIterator<Item = &'a Permission>, requested: &Permission) -> bool {
    granted.into_iter().any(|perm| perm.matches(requested))
}

/// In-memory profile, for tests and static wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticProfile {
    id: ProfileId,
    name: String,
    permissions: HashSet<Permission>,
}

impl StaticProfile {
    pub fn new(
        id: ProfileId,
        name: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn shared(self) -> SharedProfile {
        Arc::new(self)
    }
}

impl Profile for StaticProfile {
    fn id(&self) -> ProfileId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn permissions(&self) -> Vec<Permission> {
        self.permissions.iter().cloned().collect()
    }

    fn has_permission(&self, requested: &Permission) -> bool {
        grants(&self.permissions, requested)
    }
}
