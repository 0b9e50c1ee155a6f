use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::{Action, AuthzError, Policy, Resource, SharedPolicy, Subject};

/// Resource type → policy map shared by [`Gate`] and
/// [`HybridGate`](crate::HybridGate).
///
/// Written at wiring time, read by every request. Lookups clone the `Arc`
/// out so no lock is held while a policy runs.
pub(crate) struct PolicyRegistry<S> {
    policies: RwLock<HashMap<String, SharedPolicy<S>>>,
}

impl<S: Subject> PolicyRegistry<S> {
    pub(crate) fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
        }
    }

    /// Returns true when an existing registration was replaced.
    pub(crate) fn register(&self, resource_type: impl Into<String>, policy: SharedPolicy<S>) -> bool {
        let resource_type = resource_type.into();
        let replaced = self
            .policies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource_type.clone(), policy)
            .is_some();
        tracing::debug!(%resource_type, replaced, "policy registered");
        replaced
    }

    pub(crate) fn get(&self, resource_type: &str) -> Option<SharedPolicy<S>> {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource_type)
            .cloned()
    }

    pub(crate) fn resource_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }
}

/// Policy-only gate for contexts without profiles.
///
/// Every resource type that is checked must have a registered policy;
/// checking an unknown type yields [`AuthzError::NoPolicyDefined`].
pub struct Gate<S> {
    registry: PolicyRegistry<S>,
}

impl<S: Subject> Gate<S> {
    pub fn new() -> Self {
        Self {
            registry: PolicyRegistry::new(),
        }
    }

    /// Register `policy` for `resource_type`, replacing any earlier one.
    pub fn register(&self, resource_type: impl Into<String>, policy: impl Policy<S> + 'static) {
        self.registry.register(resource_type, Arc::new(policy));
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.registry.resource_types()
    }

    pub async fn authorize(
        &self,
        subject: &S,
        action: &Action,
        resource_type: &str,
        resource: Option<&dyn Resource<S>>,
    ) -> Result<(), AuthzError> {
        if subject.is_zero() {
            tracing::debug!(%action, resource_type, "denied: no subject");
            return Err(AuthzError::Unauthorized);
        }

        let Some(policy) = self.registry.get(resource_type) else {
            tracing::warn!(resource_type, "no policy defined for resource type");
            return Err(AuthzError::NoPolicyDefined(resource_type.to_string()));
        };

        if policy.can_act(subject, action, resource).await {
            Ok(())
        } else {
            tracing::debug!(?subject, %action, resource_type, "denied by policy");
            Err(AuthzError::Unauthorized)
        }
    }

    /// [`authorize`](Self::authorize) reduced to a boolean.
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
}

impl<S: Subject> Default for Gate<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::OwnershipPolicy;

    /// A claims-style subject, to exercise the gate with a non-integer type.
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Claims {
        user: String,
        team: String,
    }

    impl Subject for Claims {
        fn is_zero(&self) -> bool {
            self.user.is_empty()
        }
    }

    /// Owned by its team lead; anyone on the lead's team may act on it.
    struct Board {
        lead: Claims,
    }

    impl Resource<Claims> for Board {
        fn owner(&self) -> Option<&Claims> {
            Some(&self.lead)
        }
    }

    struct Unowned;

    impl Resource<Claims> for Unowned {}

    struct SameTeam;

    #[async_trait]
    impl Policy<Claims> for SameTeam {
        async fn can_act(
            &self,
            subject: &Claims,
            _action: &Action,
            resource: Option<&dyn Resource<Claims>>,
        ) -> bool {
            match resource.and_then(|resource| resource.owner()) {
                Some(owner) => owner.team == subject.team,
                None => resource.is_none(),
            }
        }
    }

    struct Note {
        owner: u64,
    }

    impl Resource<u64> for Note {
        fn owner(&self) -> Option<&u64> {
            Some(&self.owner)
        }
    }

    #[tokio::test]
    async fn zero_subject_is_always_denied() {
        let gate = Gate::<u64>::new();
        gate.register("note", OwnershipPolicy);
        let err = gate.authorize(&0, &Action::VIEW, "note", None).await.unwrap_err();
        assert_eq!(err, AuthzError::Unauthorized);
    }

    #[tokio::test]
    async fn unregistered_type_reports_missing_policy() {
        let gate = Gate::<u64>::new();
        let err = gate.authorize(&1, &Action::VIEW, "note", None).await.unwrap_err();
        assert_eq!(err, AuthzError::NoPolicyDefined("note".into()));
        assert!(!gate.can(&1, &Action::VIEW, "note", None).await);
    }

    #[tokio::test]
    async fn policy_verdict_is_final() {
        let gate = Gate::<u64>::new();
        gate.register("note", OwnershipPolicy);
        let note = Note { owner: 1 };

        assert!(gate.authorize(&1, &Action::UPDATE, "note", Some(&note)).await.is_ok());
        assert_eq!(
            gate.authorize(&2, &Action::UPDATE, "note", Some(&note)).await,
            Err(AuthzError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn re_registering_overwrites() {
        struct DenyAll;

        #[async_trait]
        impl Policy<u64> for DenyAll {
            async fn can_act(&self, _: &u64, _: &Action, _: Option<&dyn Resource<u64>>) -> bool {
                false
            }
        }

        let gate = Gate::<u64>::new();
        gate.register("note", DenyAll);
        assert!(!gate.can(&1, &Action::LIST, "note", None).await);

        gate.register("note", OwnershipPolicy);
        assert!(gate.can(&1, &Action::LIST, "note", None).await);
        assert_eq!(gate.registered_types(), vec!["note".to_string()]);
    }

    #[tokio::test]
    async fn works_with_claims_subjects() {
        let gate = Gate::<Claims>::new();
        gate.register("board", SameTeam);
        let board = Board {
            lead: Claims {
                user: "lee".into(),
                team: "core".into(),
            },
        };

        let insider = Claims {
            user: "ana".into(),
            team: board.lead.team.clone(),
        };
        let outsider = Claims {
            user: "bo".into(),
            team: "ops".into(),
        };
        let anonymous = Claims {
            user: String::new(),
            team: "core".into(),
        };

        assert!(gate.can(&insider, &Action::VIEW, "board", Some(&board)).await);
        assert!(!gate.can(&outsider, &Action::VIEW, "board", Some(&board)).await);
        assert!(!gate.can(&anonymous, &Action::VIEW, "board", None).await);
        assert!(gate.can(&outsider, &Action::LIST, "board", None).await);
        assert!(!gate.can(&insider, &Action::VIEW, "board", Some(&Unowned)).await);
    }
}
