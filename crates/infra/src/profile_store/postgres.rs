//! Postgres-backed profile store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation on `profiles.name`) | `23505` | `DuplicateName` |
//! | Database (unique violation on `users.email`) | `23505` | `DuplicateEmail` |
//! | Database (foreign key violation) | `23503` | `ProfileNotFound` / `UnknownPermission` |
//! | anything else | any | `Database` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use billforge_auth::Permission;
use billforge_core::{require_non_blank, ProfileId, UserId};

use super::{
    validate_email, NewProfile, PermissionRecord, ProfileChanges, ProfileRecord, ProfileStore,
    StoreError, UserRecord,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    is_system BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS permissions (
    resource_type TEXT NOT NULL,
    action TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (resource_type, action)
);

CREATE TABLE IF NOT EXISTS profile_permissions (
    profile_id UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    resource_type TEXT NOT NULL,
    action TEXT NOT NULL,
    PRIMARY KEY (profile_id, resource_type, action),
    FOREIGN KEY (resource_type, action) REFERENCES permissions(resource_type, action) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    profile_id UUID REFERENCES profiles(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS users_profile_id_idx ON users (profile_id)
"#;

const PROFILE_COLUMNS: &str = r#"
    p.id,
    p.name,
    p.description,
    p.is_system,
    (SELECT COUNT(*) FROM users u WHERE u.profile_id = p.id) AS user_count
"#;

/// Postgres-backed profile store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; the store can be
/// shared across request handlers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PostgresProfileStore {
    pool: Arc<PgPool>,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&*self.pool).await?;
        }
        Ok(())
    }

    async fn permissions_of(&self, id: Uuid) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT resource_type, action
            FROM profile_permissions
            WHERE profile_id = $1
            ORDER BY resource_type, action
            "#,
        )
        .bind(id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Permission, StoreError> {
                let resource_type: String = row.try_get("resource_type")?;
                let action: String = row.try_get("action")?;
                Ok(Permission::new(resource_type, action))
            })
            .collect()
    }

    async fn load_profile(&self, row: &PgRow) -> Result<ProfileRecord, StoreError> {
        let id: Uuid = row.try_get("id")?;
        let user_count: i64 = row.try_get("user_count")?;
        Ok(ProfileRecord {
            id: ProfileId::from_uuid(id),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_system: row.try_get("is_system")?,
            permissions: self.permissions_of(id).await?,
            user_count: usize::try_from(user_count).unwrap_or_default(),
        })
    }

    async fn find_profile(&self, id: ProfileId) -> Result<Option<ProfileRecord>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.id = $1");
        let row = sqlx::query(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&*self.pool)
            .await?;
        match row {
            Some(row) => self.load_profile(&row).await.map(Some),
            None => Ok(None),
        }
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let profile_id: Option<Uuid> = row.try_get("profile_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(UserRecord {
        id: UserId::from_uuid(id),
        email: row.try_get("email")?,
        profile_id: profile_id.map(ProfileId::from_uuid),
        created_at,
    })
}

fn error_code(err: &sqlx::Error) -> Option<String> {
    Some(err.as_database_error()?.code()?.into_owned())
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    #[instrument(skip(self), fields(user_id = %user), err)]
    async fn user_profile(&self, user: UserId) -> Result<Option<ProfileRecord>, StoreError> {
        let row = sqlx::query("SELECT profile_id FROM users WHERE id = $1")
            .bind(Uuid::from(user))
            .fetch_optional(&*self.pool)
            .await?
            .ok_or(StoreError::UserNotFound)?;

        let profile_id: Option<Uuid> = row.try_get("profile_id")?;
        match profile_id {
            Some(id) => self.find_profile(ProfileId::from_uuid(id)).await,
            None => Ok(None),
        }
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles p ORDER BY p.name");
        let rows = sqlx::query(&sql).fetch_all(&*self.pool).await?;
        let mut profiles = Vec::with_capacity(rows.len());
        for row in &rows {
            profiles.push(self.load_profile(row).await?);
        }
        Ok(profiles)
    }

    async fn get_profile(&self, id: ProfileId) -> Result<ProfileRecord, StoreError> {
        self.find_profile(id).await?.ok_or(StoreError::ProfileNotFound)
    }

    async fn find_profile_by_name(&self, name: &str) -> Result<Option<ProfileRecord>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&*self.pool)
            .await?;
        match row {
            Some(row) => self.load_profile(&row).await.map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, new), fields(name = %new.name), err)]
    async fn create_profile(&self, new: NewProfile) -> Result<ProfileRecord, StoreError> {
        let name = require_non_blank("name", &new.name)?;
        let id = ProfileId::new();

        sqlx::query(
            "INSERT INTO profiles (id, name, description, is_system) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::from(id))
        .bind(&name)
        .bind(new.description.trim())
        .bind(new.is_system)
        .execute(&*self.pool)
        .await
        .map_err(|err| match error_code(&err).as_deref() {
            Some(UNIQUE_VIOLATION) => StoreError::DuplicateName(name.clone()),
            _ => StoreError::Database(err),
        })?;

        self.get_profile(id).await
    }

    #[instrument(skip(self, changes), fields(profile_id = %id), err)]
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
        let description = changes.description.map(|d| d.trim().to_string());

        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET name = COALESCE($2, name),
                description = COALESCE($3, description)
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .bind(name.as_deref())
        .bind(description)
        .execute(&*self.pool)
        .await
        .map_err(|err| match error_code(&err).as_deref() {
            Some(UNIQUE_VIOLATION) => {
                StoreError::DuplicateName(name.clone().unwrap_or_default())
            }
            _ => StoreError::Database(err),
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProfileNotFound);
        }
        self.get_profile(id).await
    }

    #[instrument(skip(self), fields(profile_id = %id), err)]
    async fn delete_profile(&self, id: ProfileId) -> Result<(), StoreError> {
        let profile = self.get_profile(id).await?;
        if profile.is_system {
            return Err(StoreError::SystemProfile);
        }
        if profile.user_count > 0 {
            return Err(StoreError::ProfileInUse(profile.user_count));
        }

        sqlx::query("DELETE FROM profiles WHERE id = $1 AND is_system = FALSE")
            .bind(Uuid::from(id))
            .execute(&*self.pool)
            .await
            .map_err(|err| match error_code(&err).as_deref() {
                // A user was assigned between the check and the delete.
                Some(FOREIGN_KEY_VIOLATION) => StoreError::ProfileInUse(1),
                _ => StoreError::Database(err),
            })?;
        Ok(())
    }

    #[instrument(skip(self, permissions), fields(profile_id = %id, count = permissions.len()), err)]
    async fn set_permissions(
        &self,
        id: ProfileId,
        permissions: Vec<Permission>,
    ) -> Result<ProfileRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(Uuid::from(id))
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(StoreError::ProfileNotFound);
        }

        sqlx::query("DELETE FROM profile_permissions WHERE profile_id = $1")
            .bind(Uuid::from(id))
            .execute(&mut *tx)
            .await?;

        for permission in &permissions {
            let (resource_type, action) = permission.parse();
            sqlx::query(
                r#"
                INSERT INTO profile_permissions (profile_id, resource_type, action)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(Uuid::from(id))
            .bind(resource_type)
            .bind(action)
            .execute(&mut *tx)
            .await
            .map_err(|err| match error_code(&err).as_deref() {
                Some(FOREIGN_KEY_VIOLATION) => {
                    StoreError::UnknownPermission(permission.clone())
                }
                _ => StoreError::Database(err),
            })?;
        }

        tx.commit().await?;
        self.get_profile(id).await
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT resource_type, action, description FROM permissions ORDER BY resource_type, action",
        )
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PermissionRecord, StoreError> {
                Ok(PermissionRecord {
                    resource_type: row.try_get("resource_type")?,
                    action: row.try_get("action")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    async fn ensure_permission(&self, record: PermissionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO permissions (resource_type, action, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (resource_type, action) DO NOTHING
            "#,
        )
        .bind(&record.resource_type)
        .bind(&record.action)
        .bind(&record.description)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn create_user(
        &self,
        email: &str,
        profile: Option<ProfileId>,
    ) -> Result<UserRecord, StoreError> {
        let email = validate_email(email)?;
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, email, profile_id)
            VALUES ($1, $2, $3)
            RETURNING id, email, profile_id, created_at
            "#,
        )
        .bind(Uuid::from(UserId::new()))
        .bind(&email)
        .bind(profile.map(Uuid::from))
        .fetch_one(&*self.pool)
        .await
        .map_err(|err| match error_code(&err).as_deref() {
            Some(UNIQUE_VIOLATION) => StoreError::DuplicateEmail(email.clone()),
            Some(FOREIGN_KEY_VIOLATION) => StoreError::ProfileNotFound,
            _ => StoreError::Database(err),
        })?;
        user_from_row(&row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query("SELECT id, email, profile_id, created_at FROM users WHERE email = $1")
            .bind(email.trim().to_ascii_lowercase())
            .fetch_optional(&*self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let rows = sqlx::query("SELECT id, email, profile_id, created_at FROM users ORDER BY email")
            .fetch_all(&*self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    #[instrument(skip(self), fields(user_id = %user), err)]
    async fn assign_profile(
        &self,
        user: UserId,
        profile: Option<ProfileId>,
    ) -> Result<UserRecord, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE users SET profile_id = $2
            WHERE id = $1
            RETURNING id, email, profile_id, created_at
            "#,
        )
        .bind(Uuid::from(user))
        .bind(profile.map(Uuid::from))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|err| match error_code(&err).as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => StoreError::ProfileNotFound,
            _ => StoreError::Database(err),
        })?
        .ok_or(StoreError::UserNotFound)?;
        user_from_row(&row)
    }
}
