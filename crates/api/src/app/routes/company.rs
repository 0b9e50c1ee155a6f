//! The caller's company settings (one record per user).

use std::sync::Arc;

use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};

use billforge_auth::{Action, Resource};
use billforge_core::UserId;
use billforge_infra::{
    billing::{BillingRecord, CompanySettings, CompanySettingsInput},
    records::owned_by,
    RecordStore,
};

use crate::app::errors::{self, authz_error_to_response, domain_error_to_response};
use crate::app::services::AppServices;
use crate::authz::{guarded, AuthGate};
use crate::context::CurrentUser;

pub fn router(gate: &Arc<AuthGate>) -> Router {
    let resource_type = CompanySettings::RESOURCE_TYPE;
    Router::new()
        .route("/company", guarded(get(show), gate, resource_type, Action::VIEW))
        .route("/company", guarded(put(save), gate, resource_type, Action::UPDATE))
}

fn settings_of(services: &AppServices, user: UserId) -> Option<CompanySettings> {
    owned_by::<CompanySettings, _>(&services.companies, user)
        .into_iter()
        .next()
}

/// GET /company
pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
) -> Response {
    let Some(settings) = settings_of(&services, user.user_id()) else {
        return errors::not_found("company settings");
    };
    if let Err(e) = services
        .gate
        .authorize(
            Some(&user),
            &Action::VIEW,
            CompanySettings::RESOURCE_TYPE,
            Some(&settings as &dyn Resource<UserId>),
        )
        .await
    {
        return authz_error_to_response(Some(&user), e);
    }
    Json(settings).into_response()
}

/// PUT /company: create on first save, update afterwards.
pub async fn save(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CompanySettingsInput>,
) -> Response {
    let settings = match settings_of(&services, user.user_id()) {
        Some(mut existing) => {
            if let Err(e) = services
                .gate
                .authorize(
                    Some(&user),
                    &Action::UPDATE,
                    CompanySettings::RESOURCE_TYPE,
                    Some(&existing as &dyn Resource<UserId>),
                )
                .await
            {
                return authz_error_to_response(Some(&user), e);
            }
            existing.update(body).map(|()| existing)
        }
        None => CompanySettings::create(user.user_id(), body),
    };

    match settings {
        Ok(settings) => {
            services.companies.upsert(settings.clone());
            Json(settings).into_response()
        }
        Err(e) => domain_error_to_response(e),
    }
}
