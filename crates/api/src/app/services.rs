//! Service wiring: stores, identity provider and the authorization services.

use std::sync::Arc;

use tracing::info;

use rostergate_auth::RouteTable;
use rostergate_infra::{
    ApprovalGate, CredentialStore, DocumentStore, IdentityProvider, InMemoryDocumentStore, LocalIdentityConfig,
    LocalIdentityProvider, RoleService, SessionManager, UserDirectory,
};

use crate::config::ApiConfig;

/// Everything a handler may need, shared behind an `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub sessions: SessionManager,
    pub approvals: ApprovalGate,
    pub roles: RoleService,
    pub directory: UserDirectory,
    pub routes: Arc<RouteTable>,
    pub cookies: super::cookies::CookiePolicy,
    pub trust_forwarded_for: bool,
}

impl AppServices {
    pub fn new(config: &ApiConfig, store: Arc<dyn DocumentStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            sessions: SessionManager::new(provider.clone(), store.clone(), config.session_ttl),
            approvals: ApprovalGate::new(store.clone()),
            roles: RoleService::new(store.clone()),
            directory: UserDirectory::new(store, provider),
            routes: Arc::new(RouteTable::standard()),
            cookies: super::cookies::CookiePolicy {
                secure: config.production,
                max_age: config.session_ttl,
            },
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }
}

/// Persistence shared by the document services and the identity provider.
struct Stores {
    documents: Arc<dyn DocumentStore>,
    credentials: Arc<dyn CredentialStore>,
}

/// Build the services for `config`, seeding the bootstrap admin if configured.
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let stores = build_stores(config).await?;
    let provider: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new(
        LocalIdentityConfig {
            secret: config.session_secret.clone(),
            hash_cost: config.password_hash_cost,
        },
        stores.credentials,
    ));
    let services = AppServices::new(config, stores.documents, provider);

    if let Some(admin) = &config.bootstrap_admin {
        let account = services.directory.seed_admin(&admin.email, &admin.password).await?;
        info!(uid = %account.uid, "bootstrap admin ready");
    }
    Ok(services)
}

#[cfg(feature = "postgres")]
async fn build_stores(config: &ApiConfig) -> anyhow::Result<Stores> {
    use rostergate_infra::store::PostgresDocumentStore;

    match &config.database_url {
        Some(url) => {
            let store = Arc::new(PostgresDocumentStore::connect(url).await?);
            store.ensure_schema().await?;
            info!("using postgres document store");
            Ok(Stores {
                documents: store.clone(),
                credentials: store,
            })
        }
        None => Ok(in_memory()),
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_stores(config: &ApiConfig) -> anyhow::Result<Stores> {
    if config.database_url.is_some() {
        tracing::warn!("persistent stores requested but the `postgres` feature is disabled; using in-memory stores");
    }
    Ok(in_memory())
}

fn in_memory() -> Stores {
    let store = Arc::new(InMemoryDocumentStore::new());
    Stores {
        documents: store.clone(),
        credentials: store,
    }
}
