use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use billforge_auth::Permission;
use billforge_core::{require_non_blank, ProfileId, UserId};

use super::{
    validate_email, NewProfile, PermissionRecord, ProfileChanges, ProfileRecord, ProfileStore,
    StoreError, UserRecord,
};

#[derive(Debug, Clone)]
struct ProfileRow {
    name: String,
    description: String,
    is_system: bool,
    permissions: BTreeSet<Permission>,
}

#[derive(Debug, Default)]
struct State {
    profiles: HashMap<ProfileId, ProfileRow>,
    /// `(resource_type, action)` → description
    catalog: BTreeMap<(String, String), String>,
    users: HashMap<UserId, UserRecord>,
}

impl State {
    fn record(&self, id: ProfileId, row: &ProfileRow) -> ProfileRecord {
        ProfileRecord {
            id,
            name: row.name.clone(),
            description: row.description.clone(),
            is_system: row.is_system,
            permissions: row.permissions.iter().cloned().collect(),
            user_count: self.user_count(id),
        }
    }

    fn profile(&self, id: ProfileId) -> Result<ProfileRecord, StoreError> {
        self.profiles
            .get(&id)
            .map(|row| self.record(id, row))
            .ok_or(StoreError::ProfileNotFound)
    }

    fn user_count(&self, id: ProfileId) -> usize {
        self.users
            .values()
            .filter(|user| user.profile_id == Some(id))
            .count()
    }

    fn name_taken(&self, name: &str, except: Option<ProfileId>) -> bool {
        self.profiles
            .iter()
            .any(|(id, row)| row.name == name && Some(*id) != except)
    }

    fn in_catalog(&self, permission: &Permission) -> bool {
        let (resource_type, action) = permission.parse();
        self.catalog
            .contains_key(&(resource_type.to_string(), action.to_string()))
    }
}

/// In-memory profile store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    state: RwLock<State>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn user_profile(&self, user: UserId) -> Result<Option<ProfileRecord>, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let user = state.users.get(&user).ok_or(StoreError::UserNotFound)?;
        match user.profile_id {
            Some(id) => state.profile(id).map(Some),
            None => Ok(None),
        }
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut profiles: Vec<ProfileRecord> = state
            .profiles
            .iter()
            .map(|(id, row)| state.record(*id, row))
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    async fn get_profile(&self, id: ProfileId) -> Result<ProfileRecord, StoreError> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .profile(id)
    }

    async fn find_profile_by_name(&self, name: &str) -> Result<Option<ProfileRecord>, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .profiles
            .iter()
            .find(|(_, row)| row.name == name)
            .map(|(id, row)| state.record(*id, row)))
    }

    async fn create_profile(&self, new: NewProfile) -> Result<ProfileRecord, StoreError> {
        let name = require_non_blank("name", &new.name)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.name_taken(&name, None) {
            return Err(StoreError::DuplicateName(name));
        }

        let id = ProfileId::new();
        state.profiles.insert(
            id,
            ProfileRow {
                name,
                description: new.description.trim().to_string(),
                is_system: new.is_system,
                permissions: BTreeSet::new(),
            },
        );
        state.profile(id)
    }

    async fn update_profile(
        &self,
        id: ProfileId,
        changes: ProfileChanges,
    ) -> Result<ProfileRecord, StoreError> {
        let name = changes
            .name
            .as_deref()
            .map(|name| require_non_blank("name", name))
            .transpose()?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.profiles.contains_key(&id) {
            return Err(StoreError::ProfileNotFound);
        }
        if let Some(name) = &name {
            if state.name_taken(name, Some(id)) {
                return Err(StoreError::DuplicateName(name.clone()));
            }
        }

        if let Some(row) = state.profiles.get_mut(&id) {
            if let Some(name) = name {
                row.name = name;
            }
            if let Some(description) = changes.description {
                row.description = description.trim().to_string();
            }
        }
        state.profile(id)
    }

    async fn delete_profile(&self, id: ProfileId) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let row = state.profiles.get(&id).ok_or(StoreError::ProfileNotFound)?;
        if row.is_system {
            return Err(StoreError::SystemProfile);
        }
        let users = state.user_count(id);
        if users > 0 {
            return Err(StoreError::ProfileInUse(users));
        }
        state.profiles.remove(&id);
        Ok(())
    }

    async fn set_permissions(
        &self,
        id: ProfileId,
        permissions: Vec<Permission>,
    ) -> Result<ProfileRecord, StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.profiles.contains_key(&id) {
            return Err(StoreError::ProfileNotFound);
        }
        if let Some(unknown) = permissions.iter().find(|perm| !state.in_catalog(perm)) {
            return Err(StoreError::UnknownPermission(unknown.clone()));
        }

        if let Some(row) = state.profiles.get_mut(&id) {
            row.permissions = permissions.into_iter().collect();
        }
        state.profile(id)
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .catalog
            .iter()
            .map(|((resource_type, action), description)| {
                PermissionRecord::new(resource_type, action, description)
            })
            .collect())
    }

    async fn ensure_permission(&self, record: PermissionRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .catalog
            .entry((record.resource_type, record.action))
            .or_insert(record.description);
        Ok(())
    }

    async fn create_user(
        &self,
        email: &str,
        profile: Option<ProfileId>,
    ) -> Result<UserRecord, StoreError> {
        let email = validate_email(email)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.users.values().any(|user| user.email == email) {
            return Err(StoreError::DuplicateEmail(email));
        }
        if let Some(profile) = profile {
            if !state.profiles.contains_key(&profile) {
                return Err(StoreError::ProfileNotFound);
            }
        }

        let user = UserRecord {
            id: UserId::new(),
            email,
            profile_id: profile,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let email = email.trim().to_ascii_lowercase();
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.users.values().find(|user| user.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut users: Vec<UserRecord> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn assign_profile(
        &self,
        user: UserId,
        profile: Option<ProfileId>,
    ) -> Result<UserRecord, StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(profile) = profile {
            if !state.profiles.contains_key(&profile) {
                return Err(StoreError::ProfileNotFound);
            }
        }
        let record = state.users.get_mut(&user).ok_or(StoreError::UserNotFound)?;
        record.profile_id = profile;
        Ok(record.clone())
    }
}
