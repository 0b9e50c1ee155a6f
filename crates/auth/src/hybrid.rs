use std::sync::Arc;

use crate::gate::PolicyRegistry;
use crate::{
    Action, AuthzError, Decision, DenialKind, Permission, Policy, ProfileResolver, ProfileSummary,
    Resource, SharedProfile, Subject,
};

/// Role check first, then an optional per-instance policy.
///
/// A subject is authorized when its profile grants `resource_type:action`
/// and, if a resource instance is given and a policy is registered for the
/// type, that policy agrees. Unlike [`Gate`](crate::Gate), a missing policy
/// is not an error here: the role check alone decides.
pub struct HybridGate<S, R> {
    resolver: R,
    registry: PolicyRegistry<S>,
}

impl<S, R> HybridGate<S, R>
where
    S: Subject,
    R: ProfileResolver<S>,
{
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            registry: PolicyRegistry::new(),
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Register `policy` for `resource_type`, replacing any earlier one.
    pub fn register(&self, resource_type: impl Into<String>, policy: impl Policy<S> + 'static) {
        self.registry.register(resource_type, Arc::new(policy));
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.registry.resource_types()
    }

    /// Run the full check and report why it came out the way it did.
    pub async fn explain(
        &self,
        subject: &S,
        action: &Action,
        resource_type: &str,
        resource: Option<&dyn Resource<S>>,
    ) -> Decision {
        let required = Permission::new(resource_type, action);
        match self.evaluate(subject, action, resource_type, &required, resource).await {
            Verdict::Granted { profile, by_policy } => {
                let reason = if by_policy {
                    format!("profile '{}' grants '{required}' and the policy allows this instance", profile.name())
                } else {
                    format!("profile '{}' grants '{required}'", profile.name())
                };
                Decision::granted(required, Some(ProfileSummary::of(profile.as_ref())), reason)
            }
            Verdict::Denied { kind, profile } => {
                let summary = profile.map(|profile| ProfileSummary::of(profile.as_ref()));
                Decision::denied(required, summary, kind)
            }
        }
    }

    /// Allow or deny. Every denial category collapses to
    /// [`AuthzError::Unauthorized`]; use [`explain`](Self::explain) to tell
    /// them apart.
    pub async fn authorize(
        &self,
        subject: &S,
        action: &Action,
        resource_type: &str,
        resource: Option<&dyn Resource<S>>,
    ) -> Result<(), AuthzError> {
        let required = Permission::new(resource_type, action);
        match self.evaluate(subject, action, resource_type, &required, resource).await {
            Verdict::Granted { .. } => Ok(()),
            Verdict::Denied { .. } => Err(AuthzError::Unauthorized),
        }
    }

    pub async fn can(
        &self,
        subject: &S,
        action: &Action,
        resource_type: &str,
        resource: Option<&dyn Resource<S>>,
    ) -> bool {
        self.authorize(subject, action, resource_type, resource)
            .await
            .is_ok()
    }

    /// Role-only check: does the subject's profile grant `resource_type:action`?
    ///
    /// Policies are never consulted. Meant for list/create endpoints and UI
    /// affordances where there is no instance yet.
    pub async fn can_profile(&self, subject: &S, action: &Action, resource_type: &str) -> bool {
        if subject.is_zero() {
            return false;
        }
        let required = Permission::new(resource_type, action);
        match self.resolver.resolve(subject).await {
            Ok(Some(profile)) => profile.has_permission(&required),
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(?subject, permission = %required, error = %err, "profile resolution failed");
                false
            }
        }
    }

    async fn evaluate(
        &self,
        subject: &S,
        action: &Action,
        resource_type: &str,
        required: &Permission,
        resource: Option<&dyn Resource<S>>,
    ) -> Verdict {
        if subject.is_zero() {
            tracing::debug!(permission = %required, denial = %DenialKind::NoSubject, "authorization denied");
            return Verdict::denied(DenialKind::NoSubject, None);
        }

        let profile = match self.resolver.resolve(subject).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::debug!(?subject, permission = %required, denial = %DenialKind::NoProfile, "authorization denied");
                return Verdict::denied(DenialKind::NoProfile, None);
            }
            Err(err) => {
                tracing::warn!(?subject, permission = %required, error = %err, "profile resolution failed");
                return Verdict::denied(DenialKind::ResolverFailed, None);
            }
        };

        if !profile.has_permission(required) {
            tracing::debug!(
                ?subject,
                profile = profile.name(),
                permission = %required,
                denial = %DenialKind::MissingPermission,
                "authorization denied"
            );
            return Verdict::denied(DenialKind::MissingPermission, Some(profile));
        }

        let policy = resource.and_then(|_| self.registry.get(resource_type));
        if let Some(policy) = &policy {
            if !policy.can_act(subject, action, resource).await {
                tracing::debug!(
                    ?subject,
                    permission = %required,
                    denial = %DenialKind::PolicyDenied,
                    "authorization denied"
                );
                return Verdict::denied(DenialKind::PolicyDenied, Some(profile));
            }
        }

        Verdict::Granted {
            by_policy: policy.is_some(),
            profile,
        }
    }
}

/// Outcome of the checks, before it is turned into a [`Decision`] or a
/// plain allow/deny.
enum Verdict {
    Granted { profile: SharedProfile, by_policy: bool },
    Denied { kind: DenialKind, profile: Option<SharedProfile> },
}

impl Verdict {
    fn denied(kind: DenialKind, profile: Option<SharedProfile>) -> Self {
        Self::Denied { kind, profile }
    }
}
