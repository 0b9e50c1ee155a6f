use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use billforge_auth::{grants, Permission, Profile, ProfileResolver, ResolveError, SharedProfile};
use billforge_core::{ProfileId, UserId};

use super::{ProfileRecord, ProfileStore};

/// A profile loaded from a [`ProfileStore`], permissions preloaded.
#[derive(Debug, Clone)]
pub struct StoredProfile {
    id: ProfileId,
    name: String,
    permissions: HashSet<Permission>,
}

impl From<ProfileRecord> for StoredProfile {
    fn from(record: ProfileRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            permissions: record.permissions.into_iter().collect(),
        }
    }
}

impl Profile for StoredProfile {
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

/// Resolves a user's profile straight from the store (one query per call).
///
/// Wrap it in a `CachedResolver` before handing it to a gate.
#[derive(Debug, Clone)]
pub struct StoreProfileResolver<S> {
    store: S,
}

impl<S: ProfileStore> StoreProfileResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: ProfileStore> ProfileResolver<UserId> for StoreProfileResolver<S> {
    async fn resolve(&self, subject: &UserId) -> Result<Option<SharedProfile>, ResolveError> {
        let record = self.store.user_profile(*subject).await?;
        Ok(record.map(|record| Arc::new(StoredProfile::from(record)) as SharedProfile))
    }
}
