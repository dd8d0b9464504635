pub mod config;
pub mod errors;
pub mod log;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use std::sync::Arc;

use config::AppConfig;
use providers::registry::ProviderRegistry;
use services::{
    admin_service::{AdminTrigger, AdminVerifier, HashedTokenVerifier},
    investment_service::InvestmentService,
    ledger_service::LedgerService,
    sync_service::MarketSyncService,
};
use storage::DocumentStore;

/// Main entry point for the Couples Finance core library.
///
/// Builds every service once over a shared document store; callers hold
/// this value (or clones of the `Arc`s it exposes) instead of globals.
#[must_use]
pub struct CouplesFinance {
    store: Arc<dyn DocumentStore>,
    ledger: Arc<LedgerService>,
    investments: InvestmentService,
    sync: Arc<MarketSyncService>,
    admin: AdminTrigger,
}

impl std::fmt::Debug for CouplesFinance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouplesFinance")
            .field("schedule", self.sync.schedule())
            .finish_non_exhaustive()
    }
}

impl CouplesFinance {
    /// Wire up the default providers and the hashed-token admin verifier.
    pub fn new(config: &AppConfig, store: Arc<dyn DocumentStore>) -> Self {
        let registry = ProviderRegistry::new_with_defaults(&config.providers);
        let verifier = Arc::new(HashedTokenVerifier::new(config.admin.token_hashes.clone()));
        Self::with_parts(config, store, registry, verifier)
    }

    /// Build with explicit providers and verifier.
    pub fn with_parts(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        registry: ProviderRegistry,
        verifier: Arc<dyn AdminVerifier>,
    ) -> Self {
        let ledger = Arc::new(LedgerService::new(store.clone()));
        let investments = InvestmentService::new(store.clone(), ledger.clone());
        let sync = Arc::new(MarketSyncService::new(
            store.clone(),
            registry,
            config.sync.clone(),
            config.schedule.clone(),
        ));
        let admin = AdminTrigger::new(verifier, sync.clone());
        Self {
            store,
            ledger,
            investments,
            sync,
            admin,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<LedgerService> {
        &self.ledger
    }

    pub fn investments(&self) -> &InvestmentService {
        &self.investments
    }

    pub fn sync(&self) -> &Arc<MarketSyncService> {
        &self.sync
    }

    pub fn admin(&self) -> &AdminTrigger {
        &self.admin
    }
}
