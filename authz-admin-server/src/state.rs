use crate::api;
use crate::config::{CatalogConfig, Settings};
use crate::store::memory::InMemoryStore;
use crate::store::AccountStore;
use hal_engine::{ETag, ETagGenerator, HalState, Registry, RegistryError};
use std::sync::Arc;
use thiserror::Error;

/// Reasons the application state can't be assembled at start-up
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid catalogue: {0}")]
    Catalog(String),
    #[error("Failed to compute the catalogue entity tag: {0}")]
    CatalogETag(#[from] serde_json::Error),
    #[error("Invalid resource registry: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<Registry<AppState>>,
    pub store: Arc<dyn AccountStore>,
    /// Shared by every catalogue resource; the catalogue is fixed at start-up
    pub catalog_etag: ETag,
}

impl AppState {
    /// Creates the state with an in-memory store holding the required accounts
    pub fn new(settings: Settings) -> Result<Self, StartupError> {
        let store = InMemoryStore::with_accounts(&settings.catalog.required_accounts);
        Self::with_store(settings, Arc::new(store))
    }

    pub fn with_store(
        settings: Settings,
        store: Arc<dyn AccountStore>,
    ) -> Result<Self, StartupError> {
        settings.catalog.validate().map_err(StartupError::Catalog)?;
        let catalog_etag = catalog_etag(&settings.catalog)?;
        let registry = api::registry(&settings.hal)?;
        log::info!(
            "Serving {} roles, {} profiles and {} datasets",
            settings.catalog.roles.len(),
            settings.catalog.profiles.len(),
            settings.catalog.datasets.len()
        );
        Ok(Self {
            settings: Arc::new(settings),
            registry: Arc::new(registry),
            store,
            catalog_etag,
        })
    }

    pub fn catalog(&self) -> &CatalogConfig {
        &self.settings.catalog
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> bool {
        match self.store.health_check().await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Account store is unhealthy: {e}");
                false
            }
        }
    }
}

impl HalState for AppState {
    fn registry(&self) -> &Registry<Self> {
        &self.registry
    }
}

fn catalog_etag(catalog: &CatalogConfig) -> Result<ETag, serde_json::Error> {
    let mut generator = ETagGenerator::new();
    generator
        .update(&catalog.roles)?
        .update(&catalog.profiles)?
        .update(&catalog.datasets)?;
    Ok(generator.etag())
}
