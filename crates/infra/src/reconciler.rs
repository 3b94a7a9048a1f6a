//! Reconciliation service: one entry point per admin operation.
//!
//! Every pass fetches both catalogs fresh, loads the mapping, and diffs.
//! Passes are serialized by a pass lock; a second pass while one is running
//! is rejected rather than queued.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{Instrument, info, info_span, warn};

use woosync_catalog::{
    DiffEngine, ItemRecord, MappingDocument, MappingSet, PreviewResult, SyncAction, SyncPlan,
    SyncResult,
};
use woosync_core::{Entity, RunId};

use crate::executor::{CancelToken, ExecutorConfig, SyncExecutor};
use crate::fetch::{CatalogSnapshot, ErpCatalog, Storefront};
use crate::mapping_store::MappingStore;
use crate::trash::{EmptyTrashReport, TrashReconciler};
use crate::{SyncError, Upstream};

/// Preview of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub preview: PreviewResult,
}

/// Clears a flag when dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ReconciliationService {
    erp: Arc<dyn ErpCatalog>,
    storefront: Arc<dyn Storefront>,
    store: Arc<dyn MappingStore>,
    engine: DiffEngine,
    executor: SyncExecutor,
    trash: TrashReconciler,
    pass_lock: Mutex<()>,
    cancel: CancelToken,
    bulk_running: AtomicBool,
}

impl ReconciliationService {
    pub fn new(
        erp: Arc<dyn ErpCatalog>,
        storefront: Arc<dyn Storefront>,
        store: Arc<dyn MappingStore>,
        engine: DiffEngine,
        executor: ExecutorConfig,
    ) -> Self {
        let ghosts = engine.ghost_policy().clone();
        Self {
            executor: SyncExecutor::new(storefront.clone(), ghosts.clone(), executor),
            trash: TrashReconciler::new(storefront.clone(), ghosts),
            erp,
            storefront,
            store,
            engine,
            pass_lock: Mutex::new(()),
            cancel: CancelToken::default(),
            bulk_running: AtomicBool::new(false),
        }
    }

    pub async fn load_mapping(&self) -> Result<MappingDocument, SyncError> {
        Ok(self.store.load()?)
    }

    /// Replace the mapping document after validation. Nothing is persisted
    /// when validation fails.
    pub async fn save_mapping(&self, mut doc: MappingDocument) -> Result<MappingDocument, SyncError> {
        let _pass = self.pass_lock.try_lock().map_err(|_| SyncError::PassInProgress)?;
        doc.validate()?;
        // full validation of the override layer happens when building the set
        MappingSet::from_document(doc.clone())?;
        doc.generated_at = Some(Utc::now());
        self.store.save(&doc)?;
        info!(
            auto = doc.auto.len(),
            overrides = doc.overrides.len(),
            "mapping saved"
        );
        Ok(doc)
    }

    pub async fn preview(&self) -> Result<PreviewReport, SyncError> {
        let _pass = self.pass_lock.try_lock().map_err(|_| SyncError::PassInProgress)?;
        let run_id = RunId::new();
        self.preview_pass(run_id)
            .instrument(info_span!("preview", %run_id))
            .await
    }

    /// Run one bucket against a plan computed from a fresh snapshot.
    pub async fn execute(&self, action: SyncAction) -> Result<SyncResult, SyncError> {
        let _pass = self.pass_lock.try_lock().map_err(|_| SyncError::PassInProgress)?;
        let run_id = RunId::new();
        self.cancel.reset();
        self.execute_pass(action)
            .instrument(info_span!("sync", %run_id, %action))
            .await
    }

    /// Purge blocking ghost products. Never run implicitly.
    pub async fn empty_trash(&self) -> Result<EmptyTrashReport, SyncError> {
        let _pass = self.pass_lock.try_lock().map_err(|_| SyncError::PassInProgress)?;
        let run_id = RunId::new();

        self.trash
            .empty_trash()
            .instrument(info_span!("empty_trash", %run_id))
            .await
            .map_err(|source| SyncError::RemoteUnavailable {
                upstream: Upstream::WooCommerce,
                source,
            })
    }

    /// Ask the running bulk action to stop. Returns `false` when none is running.
    pub fn cancel(&self) -> bool {
        if !self.bulk_running.load(Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        info!("cancellation requested");
        true
    }

    async fn preview_pass(&self, run_id: RunId) -> Result<PreviewReport, SyncError> {
        let snapshot = self.snapshot().await?;
        let mapping = MappingSet::from_document(self.store.load()?)?;
        let preview = self
            .engine
            .plan(&snapshot.items, &snapshot.products, &mapping)
            .preview();

        let counts = preview.counts();
        info!(
            create = counts.create,
            update = counts.update,
            delete = counts.delete,
            collisions = preview.collisions.len(),
            "preview computed"
        );
        Ok(PreviewReport {
            run_id,
            generated_at: Utc::now(),
            preview,
        })
    }

    async fn execute_pass(&self, action: SyncAction) -> Result<SyncResult, SyncError> {
        info!("sync pass started");
        let snapshot = self.snapshot().await?;
        let mut mapping = MappingSet::from_document(self.store.load()?)?;
        let before = mapping.clone();

        let plan = self
            .engine
            .plan(&snapshot.items, &snapshot.products, &mapping);
        apply_housekeeping(&plan, &mut mapping);

        let result = {
            let _running = RunningGuard::set(&self.bulk_running);
            self.executor
                .execute(action, &plan, &snapshot.products, &mut mapping, &self.cancel)
                .await
        };

        // one commit per bucket, housekeeping included
        if mapping != before {
            self.store.save(&mapping.to_document(Utc::now()))?;
        }
        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            manual_delete = result.manual_delete.len(),
            "sync pass finished"
        );
        Ok(result)
    }

    async fn snapshot(&self) -> Result<CatalogSnapshot, SyncError> {
        let (items, products) = tokio::try_join!(
            async {
                self.erp
                    .fetch_items()
                    .await
                    .map_err(|source| SyncError::RemoteUnavailable {
                        upstream: Upstream::Erp,
                        source,
                    })
            },
            async {
                self.storefront
                    .fetch_products()
                    .await
                    .map_err(|source| SyncError::RemoteUnavailable {
                        upstream: Upstream::WooCommerce,
                        source,
                    })
            },
        )?;

        info!(items = items.len(), products = products.len(), "catalogs fetched");
        Ok(CatalogSnapshot {
            items: dedupe_items(items),
            products,
        })
    }
}

/// ERPNext item codes are unique; keep the first row if a listing repeats one.
fn dedupe_items(items: Vec<ItemRecord>) -> Vec<ItemRecord> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.id().clone());
            if !fresh {
                warn!(item_code = %item.item_code, "duplicate item code in ERP listing; ignoring repeat");
            }
            fresh
        })
        .collect()
}

/// Clear stale links, then record pairs matched without an entry.
fn apply_housekeeping(plan: &SyncPlan, mapping: &mut MappingSet) {
    if !plan.has_housekeeping() {
        return;
    }
    for code in &plan.stale_links {
        mapping.clear_link(code);
    }
    for adoption in &plan.adoptions {
        if let Err(e) = mapping.adopt(
            &adoption.item_code,
            adoption.sku.clone(),
            adoption.product_id,
            adoption.via_override,
        ) {
            warn!(item_code = %adoption.item_code, error = %e, "adoption skipped");
        }
    }
    info!(
        stale = plan.stale_links.len(),
        adopted = plan.adoptions.len(),
        "mapping housekeeping applied"
    );
}
