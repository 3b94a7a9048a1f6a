//! Service wiring: REST clients, mapping store, and the reconciliation service.

use std::sync::Arc;

use anyhow::Context;

use woosync_catalog::{DiffEngine, PriceTolerance, TrashedStatusPolicy};
use woosync_infra::external::{ErpNextClient, WooCommerceClient};
use woosync_infra::{ExecutorConfig, JsonFileMappingStore, ReconciliationService, SyncConfig};

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub reconciler: ReconciliationService,
}

impl AppServices {
    pub fn new(reconciler: ReconciliationService) -> Self {
        Self { reconciler }
    }
}

/// Wire production services from configuration.
pub fn build_services(config: &SyncConfig) -> anyhow::Result<AppServices> {
    let erp = ErpNextClient::new(&config.erp).context("failed to build ERPNext client")?;
    let wc = WooCommerceClient::new(&config.wc).context("failed to build WooCommerce client")?;
    let store = JsonFileMappingStore::new(&config.mapping_file);

    let tolerance = PriceTolerance::with_percent(config.price_tolerance_pct)?;
    let engine = DiffEngine::new(tolerance, Arc::new(TrashedStatusPolicy));
    let executor = ExecutorConfig {
        concurrency: config.concurrency,
        item_timeout: config.wc.timeout,
    };

    Ok(AppServices::new(ReconciliationService::new(
        Arc::new(erp),
        Arc::new(wc),
        Arc::new(store),
        engine,
        executor,
    )))
}
