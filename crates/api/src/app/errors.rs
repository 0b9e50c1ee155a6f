use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use billforge_auth::AuthzError;
use billforge_core::DomainError;
use billforge_infra::StoreError;

use crate::context::CurrentUser;

/// Denials are 401 without a signed-in user and 403 otherwise. A missing
/// policy is a wiring bug, so it is reported as a 500.
pub fn authz_error_to_response(user: Option<&CurrentUser>, err: AuthzError) -> axum::response::Response {
    match (user, err) {
        (_, AuthzError::NoPolicyDefined(resource_type)) => {
            tracing::error!(%resource_type, "no policy registered");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "policy_missing",
                format!("no policy defined for '{resource_type}'"),
            )
        }
        (None, AuthzError::Unauthorized) => {
            json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required")
        }
        (Some(_), AuthzError::Unauthorized) => {
            json_error(StatusCode::FORBIDDEN, "forbidden", "you are not allowed to do this")
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::UserNotFound => json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
        StoreError::ProfileNotFound => json_error(StatusCode::NOT_FOUND, "not_found", "profile not found"),
        StoreError::DuplicateName(_) => {
            json_error(StatusCode::CONFLICT, "name_already_exists", err.to_string())
        }
        StoreError::DuplicateEmail(_) => {
            json_error(StatusCode::CONFLICT, "email_already_exists", err.to_string())
        }
        StoreError::SystemProfile => json_error(
            StatusCode::FORBIDDEN,
            "cannot_delete_system_profile",
            err.to_string(),
        ),
        StoreError::ProfileInUse(_) => {
            json_error(StatusCode::CONFLICT, "profile_has_users", err.to_string())
        }
        StoreError::UnknownPermission(_) => {
            json_error(StatusCode::BAD_REQUEST, "unknown_permission", err.to_string())
        }
        StoreError::Validation(e) => domain_error_to_response(e),
        StoreError::Database(e) => {
            tracing::error!(error = %e, "profile store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage failure")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
    }
}

pub fn not_found(what: &str) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
