//! Admin routes for profiles, the permission catalog and user assignments.
//!
//! Everything here sits behind [`require_admin`]. Handlers that change what a
//! profile grants, or who holds which profile, invalidate the profile cache
//! once the store has committed the change.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use billforge_auth::{Action, Permission, Resource};
use billforge_core::{DomainError, ProfileId, RecordId, UserId};
use billforge_infra::{
    billing::{BillingRecord, Client, CompanySettings, Invoice, Product},
    profile_store::{NewProfile, ProfileChanges},
    ProfileStore, RecordStore,
};

use crate::app::errors::{self, domain_error_to_response, store_error_to_response};
use crate::app::services::AppServices;
use crate::authz::{require_admin, AuthGate};

// ─────────────────────────────────────────────────────────────────────────────
// Request DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPermissionsRequest {
    /// `"resource:action"` codes; each must exist in the catalog.
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default)]
    pub profile_id: Option<ProfileId>,
}

#[derive(Debug, Deserialize)]
pub struct AssignProfileRequest {
    /// `null` clears the assignment.
    pub profile_id: Option<ProfileId>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub user_id: UserId,
    pub resource_type: String,
    pub action: String,
    /// Check against this record (role + policy) instead of the role alone.
    #[serde(default)]
    pub record_id: Option<RecordId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router(gate: &Arc<AuthGate>) -> Router {
    Router::new()
        .route("/profiles", get(list_profiles).post(create_profile))
        .route(
            "/profiles/:id",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
        .route("/profiles/:id/permissions", put(set_permissions))
        .route("/permissions", get(list_permissions))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/profile", put(assign_profile))
        .route("/authz/explain", get(explain))
        .route_layer(middleware::from_fn_with_state(gate.clone(), require_admin))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/profiles
pub async fn list_profiles(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.profiles.list_profiles().await {
        Ok(profiles) => Json(profiles).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

/// POST /admin/profiles
pub async fn create_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateProfileRequest>,
) -> Response {
    let new = NewProfile {
        name: body.name,
        description: body.description,
        is_system: false,
    };
    match services.profiles.create_profile(new).await {
        Ok(profile) => {
            tracing::info!(profile_id = %profile.id, name = %profile.name, "profile created");
            (StatusCode::CREATED, Json(profile)).into_response()
        }
        Err(e) => store_error_to_response(e),
    }
}

/// GET /admin/profiles/:id
pub async fn get_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id::<ProfileId>(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match services.profiles.get_profile(id).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

/// PUT /admin/profiles/:id
pub async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<ProfileChanges>,
) -> Response {
    let id = match parse_id::<ProfileId>(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match services.profiles.update_profile(id, body).await {
        Ok(profile) => {
            services.gate.invalidate_all();
            Json(profile).into_response()
        }
        Err(e) => store_error_to_response(e),
    }
}

/// DELETE /admin/profiles/:id
pub async fn delete_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id::<ProfileId>(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match services.profiles.delete_profile(id).await {
        Ok(()) => {
            tracing::info!(profile_id = %id, "profile deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => store_error_to_response(e),
    }
}

/// PUT /admin/profiles/:id/permissions
pub async fn set_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<SetPermissionsRequest>,
) -> Response {
    let id = match parse_id::<ProfileId>(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let permissions = body
        .permissions
        .into_iter()
        .map(Permission::from_code)
        .collect();

    match services.profiles.set_permissions(id, permissions).await {
        Ok(profile) => {
            services.gate.invalidate_all();
            tracing::info!(
                profile_id = %profile.id,
                permissions = profile.permissions.len(),
                "profile permissions replaced"
            );
            Json(profile).into_response()
        }
        Err(e) => store_error_to_response(e),
    }
}

/// GET /admin/permissions
pub async fn list_permissions(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.profiles.list_permissions().await {
        Ok(catalog) => Json(catalog).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

/// GET /admin/users
pub async fn list_users(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.profiles.list_users().await {
        Ok(users) => Json(users).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

/// POST /admin/users
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateUserRequest>,
) -> Response {
    let user = match services.profiles.create_user(&body.email, body.profile_id).await {
        Ok(user) => user,
        Err(e) => return store_error_to_response(e),
    };

    tracing::info!(user_id = %user.id, email = %user.email, "user created");
    (StatusCode::CREATED, Json(user)).into_response()
}

/// PUT /admin/users/:id/profile
pub async fn assign_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<AssignProfileRequest>,
) -> Response {
    let user_id = match parse_id::<UserId>(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match services.profiles.assign_profile(user_id, body.profile_id).await {
        Ok(user) => {
            services.gate.invalidate_user(user.id);
            tracing::info!(user_id = %user.id, profile_id = ?user.profile_id, "profile assigned");
            Json(user).into_response()
        }
        Err(e) => store_error_to_response(e),
    }
}

/// GET /admin/authz/explain?user_id=..&resource_type=..&action=..[&record_id=..]
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ExplainQuery>,
) -> Response {
    let action = Action::new(query.action);
    let record = match query.record_id {
        Some(id) => match find_record(&services, &query.resource_type, id) {
            Some(record) => Some(record),
            None => return errors::not_found(&query.resource_type),
        },
        None => None,
    };

    let decision = services
        .gate
        .explain(query.user_id, &action, &query.resource_type, record.as_deref())
        .await;
    Json(decision).into_response()
}

fn find_record(
    services: &AppServices,
    resource_type: &str,
    id: RecordId,
) -> Option<Box<dyn Resource<UserId>>> {
    fn boxed<V: BillingRecord>(record: V) -> Box<dyn Resource<UserId>> {
        Box::new(record)
    }

    if resource_type == Product::RESOURCE_TYPE {
        services.products.get(id).map(boxed)
    } else if resource_type == Client::RESOURCE_TYPE {
        services.clients.get(id).map(boxed)
    } else if resource_type == Invoice::RESOURCE_TYPE {
        services.invoices.get(id).map(boxed)
    } else if resource_type == CompanySettings::RESOURCE_TYPE {
        services.companies.get(id).map(boxed)
    } else {
        None
    }
}

fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(domain_error_to_response)
}
