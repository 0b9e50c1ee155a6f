use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::{SharedProfile, Subject};

/// Failure to look up a subject's profile.
///
/// This is an infrastructure failure, never a denial: callers must not treat
/// it as "no profile".
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The subject does not exist in the backing store.
    #[error("subject not found")]
    SubjectNotFound,

    /// The backing store failed (connection lost, query error, ...).
    #[error("profile lookup failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ResolveError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Maps a subject to its profile.
///
/// `Ok(None)` means the subject exists but has no role assigned, a valid
/// deny-leaning state distinct from `Err(_)`.
#[async_trait]
pub trait ProfileResolver<S: Subject>: Send + Sync {
    async fn resolve(&self, subject: &S) -> Result<Option<SharedProfile>, ResolveError>;
}

#[async_trait]
impl<S, R> ProfileResolver<S> for Arc<R>
where
    S: Subject,
    R: ProfileResolver<S> + ?Sized,
{
    async fn resolve(&self, subject: &S) -> Result<Option<SharedProfile>, ResolveError> {
        (**self).resolve(subject).await
    }
}

/// In-memory subject → profile table, for tests and static wiring.
///
/// Unknown subjects resolve to `Ok(None)`.
#[derive(Debug)]
pub struct StaticResolver<S> {
    profiles: RwLock<HashMap<S, SharedProfile>>,
}

impl<S: Subject> StaticResolver<S> {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Assign `profile` to `subject`, replacing any previous assignment.
    pub fn set(&self, subject: S, profile: SharedProfile) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subject, profile);
    }

    pub fn remove(&self, subject: &S) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(subject);
    }
}

impl<S: Subject> Default for StaticResolver<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: Subject> ProfileResolver<S> for StaticResolver<S> {
    async fn resolve(&self, subject: &S) -> Result<Option<SharedProfile>, ResolveError> {
        let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
        Ok(profiles.get(subject).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, Permission, StaticProfile};
    use billforge_core::ProfileId;

    #[tokio::test]
    async fn resolves_assigned_profiles() {
        let resolver = StaticResolver::<u64>::new();
        let profile =
            StaticProfile::new(ProfileId::new(), "viewer", [Permission::new("product", Action::VIEW)]);
        resolver.set(1, profile.shared());

        let resolved = resolver.resolve(&1).await.unwrap().expect("profile");
        assert_eq!(resolved.name(), "viewer");
    }

    #[tokio::test]
    async fn unknown_subject_has_no_profile() {
        let resolver = StaticResolver::<u64>::new();
        assert!(resolver.resolve(&999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn arc_forwards_to_inner_resolver() {
        let resolver = Arc::new(StaticResolver::<u64>::new());
        resolver.set(4, StaticProfile::new(ProfileId::new(), "a", []).shared());
        resolver.remove(&4);

        let as_dyn: Arc<dyn ProfileResolver<u64>> = resolver;
        assert!(as_dyn.resolve(&4).await.unwrap().is_none());
    }

    #[test]
    fn backend_errors_keep_their_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "db down");
        let err = ResolveError::backend(io);
        assert!(err.to_string().contains("db down"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
