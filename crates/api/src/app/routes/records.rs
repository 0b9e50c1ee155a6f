//! CRUD handlers shared by the owned billing resources.
//!
//! Collection routes (`GET /`, `POST /`) carry no instance, so they are gated
//! by [`require_permission`]. Instance routes load the record first and run
//! the full role + ownership check against it.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;

use billforge_auth::{Action, Resource};
use billforge_core::{DomainError, DomainResult, Entity, RecordId, UserId};
use billforge_infra::{
    billing::{BillingRecord, Client, ClientInput, Invoice, InvoiceInput, Product, ProductInput},
    records::owned_by,
    InMemoryRecordStore, RecordStore,
};

use crate::app::errors::{self, authz_error_to_response, domain_error_to_response, json_error};
use crate::app::services::AppServices;
use crate::authz::{guarded, AuthGate};
use crate::context::CurrentUser;

/// A billing record exposed through the generic CRUD routes.
pub trait ManagedRecord: BillingRecord {
    type Input: DeserializeOwned + Send + 'static;

    fn records(services: &AppServices) -> &InMemoryRecordStore<Self>;

    fn create(owner: UserId, input: Self::Input) -> DomainResult<Self>;

    fn apply(&mut self, input: Self::Input) -> DomainResult<()>;

    /// Cross-record checks on input (e.g. referenced records must exist).
    fn check_input(_services: &AppServices, _owner: UserId, _input: &Self::Input) -> DomainResult<()> {
        Ok(())
    }
}

impl ManagedRecord for Product {
    type Input = ProductInput;

    fn records(services: &AppServices) -> &InMemoryRecordStore<Self> {
        &services.products
    }

    fn create(owner: UserId, input: ProductInput) -> DomainResult<Self> {
        Product::create(owner, input)
    }

    fn apply(&mut self, input: ProductInput) -> DomainResult<()> {
        self.update(input)
    }
}

impl ManagedRecord for Client {
    type Input = ClientInput;

    fn records(services: &AppServices) -> &InMemoryRecordStore<Self> {
        &services.clients
    }

    fn create(owner: UserId, input: ClientInput) -> DomainResult<Self> {
        Client::create(owner, input)
    }

    fn apply(&mut self, input: ClientInput) -> DomainResult<()> {
        self.update(input)
    }
}

impl ManagedRecord for Invoice {
    type Input = InvoiceInput;

    fn records(services: &AppServices) -> &InMemoryRecordStore<Self> {
        &services.invoices
    }

    fn create(owner: UserId, input: InvoiceInput) -> DomainResult<Self> {
        Invoice::create(owner, input)
    }

    fn apply(&mut self, input: InvoiceInput) -> DomainResult<()> {
        self.update(input)
    }

    /// Invoices may only bill one of the owner's own clients.
    fn check_input(services: &AppServices, owner: UserId, input: &InvoiceInput) -> DomainResult<()> {
        match services.clients.get(input.client_id) {
            Some(client) if client.owner_id == owner => Ok(()),
            _ => Err(DomainError::validation(
                "client_id does not reference one of your clients",
            )),
        }
    }
}

/// `GET /`, `POST /` and `GET/PUT/DELETE /:id` for `V`.
pub fn router<V: ManagedRecord>(gate: &Arc<AuthGate>) -> Router {
    Router::new()
        .route("/", guarded(get(list::<V>), gate, V::RESOURCE_TYPE, Action::LIST))
        .route("/", guarded(post(create::<V>), gate, V::RESOURCE_TYPE, Action::CREATE))
        .route("/:id", get(show::<V>).put(update::<V>).delete(remove::<V>))
}

/// The caller's own records.
pub async fn list<V: ManagedRecord>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
) -> Response {
    let records: Vec<V> = owned_by(V::records(&services), user.user_id());
    Json(records).into_response()
}

pub async fn create<V: ManagedRecord>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<V::Input>,
) -> Response {
    let owner = user.user_id();
    let record = match V::check_input(&services, owner, &body).and_then(|()| V::create(owner, body)) {
        Ok(record) => record,
        Err(e) => return domain_error_to_response(e),
    };

    V::records(&services).upsert(record.clone());
    tracing::info!(resource_type = V::RESOURCE_TYPE, id = %record.id(), owner = %owner, "record created");
    (StatusCode::CREATED, Json(record)).into_response()
}

pub async fn show<V: ManagedRecord>(
    Extension(services): Extension<Arc<AppServices>>,
    user: Option<Extension<CurrentUser>>,
    Path(id): Path<String>,
) -> Response {
    let user = user.map(|Extension(user)| user);
    match load_authorized::<V>(&services, user.as_ref(), &id, &Action::VIEW).await {
        Ok(record) => Json(record).into_response(),
        Err(response) => response,
    }
}

pub async fn update<V: ManagedRecord>(
    Extension(services): Extension<Arc<AppServices>>,
    user: Option<Extension<CurrentUser>>,
    Path(id): Path<String>,
    Json(body): Json<V::Input>,
) -> Response {
    let user = user.map(|Extension(user)| user);
    let mut record = match load_authorized::<V>(&services, user.as_ref(), &id, &Action::UPDATE).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    if let Err(e) = V::check_input(&services, record.owner_id(), &body).and_then(|()| record.apply(body)) {
        return domain_error_to_response(e);
    }

    V::records(&services).upsert(record.clone());
    Json(record).into_response()
}

pub async fn remove<V: ManagedRecord>(
    Extension(services): Extension<Arc<AppServices>>,
    user: Option<Extension<CurrentUser>>,
    Path(id): Path<String>,
) -> Response {
    let user = user.map(|Extension(user)| user);
    let record = match load_authorized::<V>(&services, user.as_ref(), &id, &Action::DELETE).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    V::records(&services).remove(*record.id());
    tracing::info!(resource_type = V::RESOURCE_TYPE, id = %record.id(), "record deleted");
    StatusCode::NO_CONTENT.into_response()
}

/// Load `id` and authorize `action` on it (role, then ownership).
///
/// Unauthenticated callers get 401 before anything is looked up.
pub async fn load_authorized<V: ManagedRecord>(
    services: &AppServices,
    user: Option<&CurrentUser>,
    id: &str,
    action: &Action,
) -> Result<V, Response> {
    let Some(user) = user else {
        return Err(json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "authentication required",
        ));
    };

    let id: RecordId = id.parse().map_err(domain_error_to_response)?;
    let record = V::records(services)
        .get(id)
        .ok_or_else(|| errors::not_found(V::RESOURCE_TYPE))?;

    services
        .gate
        .authorize(Some(user), action, V::RESOURCE_TYPE, Some(&record as &dyn Resource<UserId>))
        .await
        .map_err(|e| authz_error_to_response(Some(user), e))?;

    Ok(record)
}
