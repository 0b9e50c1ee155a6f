use std::sync::Arc;

use axum::{routing::get, Router};

use billforge_infra::billing::{Client, Product};

use crate::authz::AuthGate;

pub mod admin;
pub mod company;
pub mod invoices;
pub mod records;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router(gate: &Arc<AuthGate>) -> Router {
    Router::new()
        .route("/me", get(system::me))
        .route("/me/capabilities", get(system::capabilities))
        .nest("/products", records::router::<Product>(gate))
        .nest("/clients", records::router::<Client>(gate))
        .nest("/invoices", invoices::router(gate))
        .merge(company::router(gate))
        .nest("/admin", admin::router(gate))
}
