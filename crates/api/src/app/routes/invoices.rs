use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use billforge_auth::Action;
use billforge_infra::{billing::Invoice, RecordStore};

use crate::app::errors::domain_error_to_response;
use crate::app::routes::records::{self, load_authorized};
use crate::app::services::AppServices;
use crate::authz::AuthGate;
use crate::context::CurrentUser;

pub fn router(gate: &Arc<AuthGate>) -> Router {
    records::router::<Invoice>(gate).route("/:id/finalize", post(finalize))
}

/// POST /invoices/:id/finalize
///
/// Requires `invoice:finalize` and ownership of the invoice.
pub async fn finalize(
    Extension(services): Extension<Arc<AppServices>>,
    user: Option<Extension<CurrentUser>>,
    Path(id): Path<String>,
) -> Response {
    let user = user.map(|Extension(user)| user);
    let finalize = Action::new("finalize");
    let mut invoice = match load_authorized::<Invoice>(&services, user.as_ref(), &id, &finalize).await {
        Ok(invoice) => invoice,
        Err(response) => return response,
    };

    if let Err(e) = invoice.finalize() {
        return domain_error_to_response(e);
    }

    services.invoices.upsert(invoice.clone());
    tracing::info!(invoice_id = %invoice.id, ttc_cents = invoice.totals.ttc_cents, "invoice finalized");
    Json(invoice).into_response()
}
