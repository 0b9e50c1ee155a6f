//! TTL cache in front of a [`ProfileResolver`].
//!
//! Hits are served under a shared read lock. A miss calls the inner resolver
//! with no lock held (it may block on I/O), then stores the result under the
//! write lock. Concurrent misses for the same subject may each reach the inner
//! resolver; the last writer wins. Resolver errors are returned as-is and never
//! cached, while `Ok(None)` ("no profile assigned") is cached like any profile.
//!
//! There is no reverse index from profile to subjects: after editing a
//! profile's permissions, callers must use [`CachedResolver::invalidate_all`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{ProfileResolver, ResolveError, SharedProfile, Subject};

#[derive(Debug, Clone)]
struct CacheEntry {
    profile: Option<SharedProfile>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub struct CachedResolver<S, R> {
    inner: R,
    ttl: Duration,
    entries: RwLock<HashMap<S, CacheEntry>>,
}

impl<S, R> CachedResolver<S, R>
where
    S: Subject,
    R: ProfileResolver<S>,
{
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Drop the cached profile of one subject.
    ///
    /// Call after changing which profile `subject` is assigned to.
    pub fn invalidate(&self, subject: &S) {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(subject)
            .is_some();
        tracing::info!(?subject, removed, "profile cache entry invalidated");
    }

    /// Drop every cached profile.
    ///
    /// Call after editing a profile's permission set.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        tracing::info!(count, "profile cache cleared");
    }

    /// Remove entries whose TTL has elapsed. Returns how many were dropped.
    ///
    /// Expired entries are never served either way; this only bounds memory.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
    }

    /// Number of entries currently held, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh(&self, subject: &S) -> Option<Option<SharedProfile>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(subject)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.profile.clone())
    }

    fn store(&self, subject: &S, profile: Option<SharedProfile>) {
        let entry = CacheEntry {
            profile,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subject.clone(), entry);
    }
}

#[async_trait]
impl<S, R> ProfileResolver<S> for CachedResolver<S, R>
where
    S: Subject,
    R: ProfileResolver<S>,
{
    async fn resolve(&self, subject: &S) -> Result<Option<SharedProfile>, ResolveError> {
        if let Some(profile) = self.fresh(subject) {
            tracing::trace!(?subject, "profile cache hit");
            return Ok(profile);
        }

        tracing::debug!(?subject, "profile cache miss");
        let profile = self.inner.resolve(subject).await?;
        self.store(subject, profile.clone());
        Ok(profile)
    }
}

impl<S, R> core::fmt::Debug for CachedResolver<S, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let len = self
            .entries
            .read()
            .map(|entries| entries.len())
            .unwrap_or_default();
        f.debug_struct("CachedResolver")
            .field("ttl", &self.ttl)
            .field("entries", &len)
            .finish_non_exhaustive()
    }
}
