use std::sync::Arc;

use async_trait::async_trait;

use crate::{Action, Permission, ProfileResolver, Subject};

/// A concrete resource instance handed to a [`Policy`].
///
/// The only thing the built-in policies need from a resource is who owns it.
/// Types that do not override [`Resource::owner`] are un-ownable and are
/// denied by [`OwnershipPolicy`].
pub trait Resource<S>: Send + Sync {
    fn owner(&self) -> Option<&S> {
        None
    }
}

/// Per-resource-type predicate over a specific resource instance.
///
/// `resource` is `None` when the caller is acting on the type as a whole
/// (listing, creating); policies decide what that means for them.
#[async_trait]
pub trait Policy<S: Subject>: Send + Sync {
    async fn can_act(
        &self,
        subject: &S,
        action: &Action,
        resource: Option<&dyn Resource<S>>,
    ) -> bool;
}

#[async_trait]
impl<S, P> Policy<S> for Arc<P>
where
    S: Subject,
    P: Policy<S> + ?Sized,
{
    async fn can_act(
        &self,
        subject: &S,
        action: &Action,
        resource: Option<&dyn Resource<S>>,
    ) -> bool {
        (**self).can_act(subject, action, resource).await
    }
}

pub type SharedPolicy<S> = Arc<dyn Policy<S>>;

/// Allows a subject to act only on resources it owns.
///
/// With no resource the policy allows, leaving the decision to role gating.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipPolicy;

#[async_trait]
impl<S: Subject> Policy<S> for OwnershipPolicy {
    async fn can_act(
        &self,
        subject: &S,
        action: &Action,
        resource: Option<&dyn Resource<S>>,
    ) -> bool {
        let Some(resource) = resource else {
            return true;
        };
        match resource.owner() {
            Some(owner) => owner == subject,
            None => {
                tracing::warn!(%action, "ownership policy applied to a resource without an owner");
                false
            }
        }
    }
}

/// "Is this subject an administrator?" predicate used by [`AdminBypassPolicy`].
#[async_trait]
pub trait AdminCheck<S: Subject>: Send + Sync {
    async fn is_admin(&self, subject: &S) -> bool;
}

#[async_trait]
impl<S, F> AdminCheck<S> for F
where
    S: Subject,
    F: Fn(&S) -> bool + Send + Sync,
{
    async fn is_admin(&self, subject: &S) -> bool {
        self(subject)
    }
}

/// Treats subjects whose profile grants `*:*` as administrators.
///
/// A resolver failure or a missing profile is "not an admin".
pub struct SuperAdminCheck<R> {
    resolver: R,
}

impl<R> SuperAdminCheck<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<S, R> AdminCheck<S> for SuperAdminCheck<R>
where
    S: Subject,
    R: ProfileResolver<S>,
{
    async fn is_admin(&self, subject: &S) -> bool {
        match self.resolver.resolve(subject).await {
            Ok(Some(profile)) => profile.has_permission(&Permission::SUPER_ADMIN),
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(?subject, error = %err, "admin check could not resolve profile");
                false
            }
        }
    }
}

/// Lets administrators through unconditionally and delegates everyone else to
/// the wrapped policy.
pub struct AdminBypassPolicy<S> {
    inner: SharedPolicy<S>,
    is_admin: Arc<dyn AdminCheck<S>>,
}

impl<S: Subject> AdminBypassPolicy<S> {
    pub fn new(inner: impl Policy<S> + 'static, is_admin: impl AdminCheck<S> + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            is_admin: Arc::new(is_admin),
        }
    }
}

#[async_trait]
impl<S: Subject> Policy<S> for AdminBypassPolicy<S> {
    async fn can_act(
        &self,
        subject: &S,
        action: &Action,
        resource: Option<&dyn Resource<S>>,
    ) -> bool {
        if self.is_admin.is_admin(subject).await {
            tracing::debug!(?subject, %action, "admin bypass");
            return true;
        }
        self.inner.can_act(subject, action, resource).await
    }
}
