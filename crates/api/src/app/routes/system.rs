use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use billforge_auth::{Action, ProfileResolver, ProfileSummary, ResolveError, WILDCARD};
use billforge_infra::ProfileStore;

use crate::app::errors::{json_error, store_error_to_response};
use crate::app::services::AppServices;
use crate::context::CurrentUser;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /me: the caller and a summary of their profile (`null` when
/// unassigned).
pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(user)) = user else {
        return json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required");
    };

    let profile = match services.gate.cache().resolve(&user.user_id()).await {
        Ok(profile) => profile.map(|profile| ProfileSummary::of(profile.as_ref())),
        Err(ResolveError::SubjectNotFound) => None,
        Err(err) => {
            tracing::error!(user_id = %user.user_id(), error = %err, "profile lookup failed");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "authz_unavailable",
                "authorization is temporarily unavailable",
            );
        }
    };

    Json(serde_json::json!({
        "user_id": user.user_id(),
        "profile": profile,
    }))
    .into_response()
}

/// GET /me/capabilities: `{resource_type: {action: bool}}` for every
/// concrete catalog entry.
///
/// Role-only answers, for deciding which controls to show. Every mutation
/// is still checked against the record itself.
pub async fn capabilities(
    Extension(services): Extension<Arc<AppServices>>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(user)) = user else {
        return json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required");
    };

    let catalog = match services.profiles.list_permissions().await {
        Ok(catalog) => catalog,
        Err(e) => return store_error_to_response(e),
    };

    let mut answers: BTreeMap<String, BTreeMap<String, bool>> = BTreeMap::new();
    for entry in catalog {
        if entry.resource_type == WILDCARD || entry.action == WILDCARD {
            continue;
        }
        let action = Action::new(entry.action.clone());
        let allowed = services
            .gate
            .can_profile(Some(&user), &action, &entry.resource_type)
            .await;
        answers
            .entry(entry.resource_type)
            .or_default()
            .insert(entry.action, allowed);
    }

    Json(answers).into_response()
}
