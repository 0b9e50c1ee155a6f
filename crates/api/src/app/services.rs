use std::sync::Arc;

use billforge_infra::{
    billing::{BillingRecord, Client, CompanySettings, Invoice, Product},
    seed, AppConfig, InMemoryProfileStore, InMemoryRecordStore, PostgresProfileStore, ProfileStore,
    StoreError, StoreProfileResolver,
};

use crate::authz::AuthGate;
use crate::middleware::TokenIssuer;

/// Resource types whose records are only visible to their owner (and admins).
pub const OWNED_RESOURCES: &[&str] = &[
    Product::RESOURCE_TYPE,
    Client::RESOURCE_TYPE,
    Invoice::RESOURCE_TYPE,
    CompanySettings::RESOURCE_TYPE,
];

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub profiles: Arc<dyn ProfileStore>,
    pub gate: Arc<AuthGate>,
    pub tokens: Arc<TokenIssuer>,
    pub products: InMemoryRecordStore<Product>,
    pub clients: InMemoryRecordStore<Client>,
    pub invoices: InMemoryRecordStore<Invoice>,
    pub companies: InMemoryRecordStore<CompanySettings>,
}

impl AppServices {
    /// Wire the gate over `profiles` and register the ownership policies.
    pub fn new(profiles: Arc<dyn ProfileStore>, config: &AppConfig) -> Self {
        let gate = Arc::new(AuthGate::new(
            StoreProfileResolver::new(profiles.clone()),
            config.profile_cache_ttl,
        ));
        for resource_type in OWNED_RESOURCES {
            gate.register_owned(*resource_type);
        }

        Self {
            profiles,
            gate,
            tokens: Arc::new(TokenIssuer::new(config.jwt_secret.as_bytes())),
            products: InMemoryRecordStore::new(),
            clients: InMemoryRecordStore::new(),
            invoices: InMemoryRecordStore::new(),
            companies: InMemoryRecordStore::new(),
        }
    }
}

/// Open the profile store named by `config`, seed it, and build the services.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let profiles: Arc<dyn ProfileStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresProfileStore::connect(url, config.database_max_connections).await?;
            store.ensure_schema().await?;
            tracing::info!(backend = "postgres", "profile store ready");
            Arc::new(store)
        }
        None => {
            tracing::info!(backend = "memory", "profile store ready");
            Arc::new(InMemoryProfileStore::new())
        }
    };

    if config.seed_defaults {
        seed::seed_defaults(profiles.as_ref()).await?;
    }
    if let Some(email) = &config.bootstrap_admin_email {
        seed::bootstrap_admin(profiles.as_ref(), email).await?;
    }

    Ok(AppServices::new(profiles, config))
}
