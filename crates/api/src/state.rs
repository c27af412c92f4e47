//! Application state

use sqlx::PgPool;
use std::sync::Arc;

use dukapo_billing::BillingService;
use dukapo_shared::Config;

use crate::auth::{AuthState, IdentityService, JwtManager};
use crate::catalog::CatalogService;
use crate::reports::ReportService;
use crate::sales::SalesService;
use crate::stock::StockService;
use crate::tenants::TenantService;

/// Shared application state
///
/// The pool and config are the only process-wide state; services are thin
/// handles over the pool and are constructed per use. No tenant-scoped
/// data is cached across requests.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let jwt_manager = JwtManager::new(&config.session_secret, config.session_ttl_hours);

        let billing = BillingService::from_config(&config, pool.clone())
            .map_err(|e| anyhow::anyhow!("billing init failed: {e}"))?;
        tracing::info!("Billing service initialized");

        Ok(Self {
            pool,
            config,
            jwt_manager,
            billing: Arc::new(billing),
        })
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            pool: self.pool.clone(),
        }
    }

    pub fn identity(&self) -> IdentityService {
        IdentityService::new(self.pool.clone(), self.jwt_manager.clone())
    }

    pub fn tenants(&self) -> TenantService {
        TenantService::new(self.pool.clone())
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.pool.clone())
    }

    pub fn stock(&self) -> StockService {
        StockService::new(self.pool.clone())
    }

    pub fn sales(&self) -> SalesService {
        SalesService::new(self.pool.clone())
    }

    pub fn reports(&self) -> ReportService {
        ReportService::new(self.pool.clone())
    }
}
