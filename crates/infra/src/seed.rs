//! Default permission catalog and system profiles.

use billforge_auth::{Action, Permission, WILDCARD};

use crate::profile_store::{NewProfile, PermissionRecord, ProfileStore, StoreError, UserRecord};

pub const ADMIN_PROFILE: &str = "admin";
pub const VIEWER_PROFILE: &str = "viewer";
pub const ACCOUNTANT_PROFILE: &str = "accountant";

/// `(resource_type, label)`; each gets a `resource:*` entry plus the actions
/// returned by [`actions_for`].
const RESOURCES: &[(&str, &str)] = &[
    ("product", "products"),
    ("invoice", "invoices"),
    ("client", "clients"),
    ("company", "company settings"),
    ("user", "users"),
    ("profile", "profiles"),
    ("product_type", "product types"),
    ("unit_type", "unit types"),
];

fn actions_for(resource_type: &str) -> Vec<Action> {
    match resource_type {
        "company" => vec![Action::VIEW, Action::UPDATE],
        "user" => vec![Action::LIST, Action::VIEW, Action::UPDATE],
        "invoice" => vec![
            Action::LIST,
            Action::VIEW,
            Action::CREATE,
            Action::UPDATE,
            Action::DELETE,
            Action::new("finalize"),
        ],
        _ => vec![
            Action::LIST,
            Action::VIEW,
            Action::CREATE,
            Action::UPDATE,
            Action::DELETE,
        ],
    }
}

/// The full permission catalog installed by [`seed_defaults`].
pub fn default_catalog() -> Vec<PermissionRecord> {
    let mut catalog = vec![PermissionRecord::new(WILDCARD, WILDCARD, "Full system access")];
    for (resource_type, label) in RESOURCES {
        catalog.push(PermissionRecord::new(
            *resource_type,
            WILDCARD,
            format!("All actions on {label}"),
        ));
        for action in actions_for(resource_type) {
            catalog.push(PermissionRecord::new(
                *resource_type,
                action.as_str(),
                format!("{} {label}", capitalize(action.as_str())),
            ));
        }
    }
    catalog
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

struct DefaultProfile {
    name: &'static str,
    description: &'static str,
    permissions: &'static [&'static str],
}

const DEFAULT_PROFILES: &[DefaultProfile] = &[
    DefaultProfile {
        name: ADMIN_PROFILE,
        description: "Full system administrator with all permissions",
        permissions: &["*:*"],
    },
    DefaultProfile {
        name: VIEWER_PROFILE,
        description: "Read-only access to all business resources",
        permissions: &[
            "product:list",
            "product:view",
            "invoice:list",
            "invoice:view",
            "client:list",
            "client:view",
            "company:view",
            "product_type:list",
            "product_type:view",
            "unit_type:list",
            "unit_type:view",
        ],
    },
    DefaultProfile {
        name: ACCOUNTANT_PROFILE,
        description: "Manage invoices and clients, view products",
        permissions: &[
            "invoice:*",
            "client:*",
            "product:list",
            "product:view",
            "company:view",
        ],
    },
];

/// Install the permission catalog and the system profiles.
///
/// Safe to run on every start: missing entries are created and system
/// profiles get their default permission set back.
pub async fn seed_defaults<S>(store: &S) -> Result<(), StoreError>
where
    S: ProfileStore + ?Sized,
{
    let catalog = default_catalog();
    let catalog_size = catalog.len();
    for record in catalog {
        store.ensure_permission(record).await?;
    }

    for default in DEFAULT_PROFILES {
        let profile = match store.find_profile_by_name(default.name).await? {
            Some(existing) => existing,
            None => {
                store
                    .create_profile(NewProfile {
                        name: default.name.to_string(),
                        description: default.description.to_string(),
                        is_system: true,
                    })
                    .await?
            }
        };
        let permissions = default
            .permissions
            .iter()
            .map(|code| Permission::from_code(*code))
            .collect();
        store.set_permissions(profile.id, permissions).await?;
    }

    tracing::info!(
        permissions = catalog_size,
        profiles = DEFAULT_PROFILES.len(),
        "default authorization data seeded"
    );
    Ok(())
}

/// Make sure a user with `email` exists and holds the `admin` profile.
pub async fn bootstrap_admin<S>(store: &S, email: &str) -> Result<UserRecord, StoreError>
where
    S: ProfileStore + ?Sized,
{
    let admin = store
        .find_profile_by_name(ADMIN_PROFILE)
        .await?
        .ok_or(StoreError::ProfileNotFound)?;
    let user = match store.find_user_by_email(email).await? {
        Some(user) => user,
        None => store.create_user(email, None).await?,
    };
    let user = store.assign_profile(user.id, Some(admin.id)).await?;
    tracing::info!(user_id = %user.id, email = %user.email, "bootstrap admin ready");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_store::InMemoryProfileStore;

    #[test]
    fn catalog_covers_the_business_resources() {
        let codes: Vec<String> = default_catalog()
            .iter()
            .map(|record| record.permission().to_string())
            .collect();

        for expected in ["*:*", "product:*", "invoice:finalize", "company:update", "unit_type:delete"] {
            assert!(codes.iter().any(|code| code == expected), "missing {expected}");
        }
        assert!(!codes.iter().any(|code| code == "company:delete"));
        assert!(!codes.iter().any(|code| code == "user:delete"));
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = InMemoryProfileStore::new();
        seed_defaults(&store).await.unwrap();
        seed_defaults(&store).await.unwrap();

        let profiles = store.list_profiles().await.unwrap();
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![ACCOUNTANT_PROFILE, ADMIN_PROFILE, VIEWER_PROFILE]);
        assert!(profiles.iter().all(|p| p.is_system));
        assert_eq!(
            store.list_permissions().await.unwrap().len(),
            default_catalog().len()
        );
    }

    #[tokio::test]
    async fn seeded_profiles_grant_the_expected_permissions() {
        let store = InMemoryProfileStore::new();
        seed_defaults(&store).await.unwrap();

        let admin = store.find_profile_by_name(ADMIN_PROFILE).await.unwrap().unwrap();
        assert_eq!(admin.permissions, vec![Permission::SUPER_ADMIN]);

        let accountant = store
            .find_profile_by_name(ACCOUNTANT_PROFILE)
            .await
            .unwrap()
            .unwrap();
        assert!(accountant.permissions.contains(&Permission::from_code("invoice:*")));
        assert!(!accountant.permissions.contains(&Permission::from_code("product:create")));
    }

    #[tokio::test]
    async fn bootstrap_admin_is_repeatable() {
        let store = InMemoryProfileStore::new();
        seed_defaults(&store).await.unwrap();

        let first = bootstrap_admin(&store, "root@example.com").await.unwrap();
        let second = bootstrap_admin(&store, "root@example.com").await.unwrap();
        assert_eq!(first.id, second.id);

        let profile = store.user_profile(first.id).await.unwrap().unwrap();
        assert_eq!(profile.name, ADMIN_PROFILE);
    }
}
