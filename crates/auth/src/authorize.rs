use serde::Serialize;
use thiserror::Error;

use billforge_core::ProfileId;

use crate::{Permission, Profile};

/// Denial categories returned by [`Gate`](crate::Gate) and
/// [`HybridGate`](crate::HybridGate).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// Authoritative denial: no subject, missing permission, or a policy said no.
    #[error("unauthorized")]
    Unauthorized,

    /// A resource type was checked against a gate with no policy for it.
    /// This is missing wiring, not a legitimate denial.
    #[error("no policy defined for resource type '{0}'")]
    NoPolicyDefined(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Why an authorization check came out the way it did.
///
/// Callers that only need allow/deny use `authorize`, which collapses every
/// denial into [`AuthzError::Unauthorized`]. The explanation keeps the
/// categories apart for logs and the admin "explain" endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub granted: bool,

    /// `"resource_type:action"` that was checked.
    pub required_permission: Permission,

    /// The resolved profile, when there was one.
    pub profile: Option<ProfileSummary>,

    /// Set exactly when `granted` is false.
    pub denial: Option<DenialKind>,

    /// Human-readable reason for the decision.
    pub reason: String,
}

impl Decision {
    pub(crate) fn granted(
        required_permission: Permission,
        profile: Option<ProfileSummary>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            granted: true,
            required_permission,
            profile,
            denial: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn denied(
        required_permission: Permission,
        profile: Option<ProfileSummary>,
        kind: DenialKind,
    ) -> Self {
        let reason = match kind {
            DenialKind::NoSubject => "no authenticated subject".to_string(),
            DenialKind::NoProfile => "subject has no profile assigned".to_string(),
            DenialKind::ResolverFailed => "profile lookup failed".to_string(),
            DenialKind::MissingPermission => {
                format!("profile does not grant '{required_permission}'")
            }
            DenialKind::PolicyDenied => format!(
                "policy for '{}' denied access to this instance",
                required_permission.resource_type()
            ),
        };
        Self {
            granted: false,
            required_permission,
            profile,
            denial: Some(kind),
            reason,
        }
    }

    /// Collapse into the allow/deny result returned by `authorize`.
    pub fn into_result(self) -> Result<(), AuthzError> {
        if self.granted {
            Ok(())
        } else {
            Err(AuthzError::Unauthorized)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    NoSubject,
    NoProfile,
    ResolverFailed,
    MissingPermission,
    PolicyDenied,
}

impl DenialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSubject => "no_subject",
            Self::NoProfile => "no_profile",
            Self::ResolverFailed => "resolver_failed",
            Self::MissingPermission => "missing_permission",
            Self::PolicyDenied => "policy_denied",
        }
    }
}

impl core::fmt::Display for DenialKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a profile for audit output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub id: ProfileId,
    pub name: String,
    /// Sorted for readability.
    pub permissions: Vec<Permission>,
    pub has_wildcard: bool,
}

impl ProfileSummary {
    pub fn of(profile: &dyn Profile) -> Self {
        let mut permissions = profile.permissions();
        permissions.sort();
        Self {
            id: profile.id(),
            name: profile.name().to_string(),
            has_wildcard: permissions.iter().any(Permission::is_super_admin),
            permissions,
        }
    }
}
