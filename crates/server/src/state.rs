//! Application state shared across handlers.

use crate::auth::AccessGate;
use crate::service::RegistryService;
use depot_core::config::AppConfig;
use depot_storage::ModuleStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Version listings and download lookups.
    pub service: RegistryService,
    /// Access control for the module endpoints.
    pub gate: Arc<AccessGate>,
}

impl AppState {
    /// Create application state, building the access gate from the auth
    /// configuration.
    pub fn new(config: AppConfig, store: Arc<dyn ModuleStore>) -> Self {
        let gate = AccessGate::from_config(&config.auth);
        Self::with_gate(config, store, gate)
    }

    /// Create application state with an explicit provider chain.
    pub fn with_gate(config: AppConfig, store: Arc<dyn ModuleStore>, gate: AccessGate) -> Self {
        Self {
            config: Arc::new(config),
            service: RegistryService::new(store),
            gate: Arc::new(gate),
        }
    }
}
