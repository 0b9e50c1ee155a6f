//! Storage for profiles, the permission catalog, and user → profile
//! assignments.
//!
//! The authorization core only ever reads a user's profile (through
//! [`StoreProfileResolver`]); everything else here serves the admin
//! workflows that edit roles. Those workflows must invalidate the profile
//! cache after a successful mutation.

pub mod in_memory;
pub mod postgres;
pub mod resolver;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use billforge_auth::{Permission, ResolveError};
use billforge_core::{DomainError, ProfileId, UserId};

pub use in_memory::InMemoryProfileStore;
pub use postgres::PostgresProfileStore;
pub use resolver::{StoreProfileResolver, StoredProfile};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,

    #[error("profile not found")]
    ProfileNotFound,

    #[error("a profile named '{0}' already exists")]
    DuplicateName(String),

    #[error("a user with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("system profiles cannot be deleted")]
    SystemProfile,

    #[error("profile is still assigned to {0} user(s)")]
    ProfileInUse(usize),

    #[error("permission '{0}' is not in the catalog")]
    UnknownPermission(Permission),

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound => ResolveError::SubjectNotFound,
            other => ResolveError::backend(other),
        }
    }
}

/// A catalog entry: one `resource_type:action` pair that profiles may grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub resource_type: String,
    pub action: String,
    pub description: String,
}

impl PermissionRecord {
    pub fn new(
        resource_type: impl Into<String>,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            action: action.into(),
            description: description.into(),
        }
    }

    pub fn permission(&self) -> Permission {
        Permission::new(&self.resource_type, &self.action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileRecord {
    pub id: ProfileId,
    pub name: String,
    pub description: String,
    pub is_system: bool,
    /// Granted permissions, sorted.
    pub permissions: Vec<Permission>,
    pub user_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub profile_id: Option<ProfileId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_system: bool,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Profile, catalog and user-assignment storage.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The profile assigned to `user`, with its permissions loaded.
    ///
    /// `Ok(None)` when the user exists without a profile;
    /// [`StoreError::UserNotFound`] when the user does not exist.
    async fn user_profile(&self, user: UserId) -> Result<Option<ProfileRecord>, StoreError>;

    async fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StoreError>;

    async fn get_profile(&self, id: ProfileId) -> Result<ProfileRecord, StoreError>;

    async fn find_profile_by_name(&self, name: &str) -> Result<Option<ProfileRecord>, StoreError>;

    async fn create_profile(&self, new: NewProfile) -> Result<ProfileRecord, StoreError>;

    async fn update_profile(
        &self,
        id: ProfileId,
        changes: ProfileChanges,
    ) -> Result<ProfileRecord, StoreError>;

    /// Fails for system profiles and for profiles that still have users.
    async fn delete_profile(&self, id: ProfileId) -> Result<(), StoreError>;

    /// Replace the profile's permission set. Every entry must exist in the
    /// catalog.
    async fn set_permissions(
        &self,
        id: ProfileId,
        permissions: Vec<Permission>,
    ) -> Result<ProfileRecord, StoreError>;

    /// The catalog, ordered by `(resource_type, action)`.
    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, StoreError>;

    /// Insert a catalog entry if missing. Existing entries are left as-is.
    async fn ensure_permission(&self, record: PermissionRecord) -> Result<(), StoreError>;

    /// Create a user, optionally holding `profile` from the start.
    ///
    /// Nothing is written when the email is taken or `profile` does not exist.
    async fn create_user(
        &self,
        email: &str,
        profile: Option<ProfileId>,
    ) -> Result<UserRecord, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    /// Assign (or with `None`, clear) the user's profile.
    async fn assign_profile(
        &self,
        user: UserId,
        profile: Option<ProfileId>,
    ) -> Result<UserRecord, StoreError>;
}

#[async_trait]
impl<S> ProfileStore for Arc<S>
where
    S: ProfileStore + ?Sized,
{
    async fn user_profile(&self, user: UserId) -> Result<Option<ProfileRecord>, StoreError> {
        (**self).user_profile(user).await
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StoreError> {
        (**self).list_profiles().await
    }

    async fn get_profile(&self, id: ProfileId) -> Result<ProfileRecord, StoreError> {
        (**self).get_profile(id).await
    }

    async fn find_profile_by_name(&self, name: &str) -> Result<Option<ProfileRecord>, StoreError> {
        (**self).find_profile_by_name(name).await
    }

    async fn create_profile(&self, new: NewProfile) -> Result<ProfileRecord, StoreError> {
        (**self).create_profile(new).await
    }

    async fn update_profile(
        &self,
        id: ProfileId,
        changes: ProfileChanges,
    ) -> Result<ProfileRecord, StoreError> {
        (**self).update_profile(id, changes).await
    }

    async fn delete_profile(&self, id: ProfileId) -> Result<(), StoreError> {
        (**self).delete_profile(id).await
    }

    async fn set_permissions(
        &self,
        id: ProfileId,
        permissions: Vec<Permission>,
    ) -> Result<ProfileRecord, StoreError> {
        (**self).set_permissions(id, permissions).await
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        (**self).list_permissions().await
    }

    async fn ensure_permission(&self, record: PermissionRecord) -> Result<(), StoreError> {
        (**self).ensure_permission(record).await
    }

    async fn create_user(
        &self,
        email: &str,
        profile: Option<ProfileId>,
    ) -> Result<UserRecord, StoreError> {
        (**self).create_user(email, profile).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        (**self).find_user_by_email(email).await
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        (**self).list_users().await
    }

    async fn assign_profile(
        &self,
        user: UserId,
        profile: Option<ProfileId>,
    ) -> Result<UserRecord, StoreError> {
        (**self).assign_profile(user, profile).await
    }
}

pub(crate) fn validate_email(email: &str) -> Result<String, DomainError> {
    let email = billforge_core::require_non_blank("email", email)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(email.to_ascii_lowercase())
        }
        _ => Err(DomainError::validation("email is not a valid address")),
    }
}
