//! Sync executor: runs one bucket of a fresh plan against the storefront.
//!
//! Items run on a bounded pool of tokio tasks gated by a semaphore; each
//! remote call carries a timeout. Outcomes are collected in plan order and
//! applied to the mapping by a single aggregator.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use woosync_catalog::image::fingerprints;
use woosync_catalog::{
    CreatePlan, DeletePlan, GhostPolicy, ItemOutcome, MappingSet, Price, ProductRecord,
    SyncAction, SyncPlan, SyncResult, UpdatePlan,
};
use woosync_core::{ItemCode, Sku, WcProductId};

use crate::external::RemoteError;
use crate::fetch::Storefront;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum concurrent remote calls
    pub concurrency: usize,
    /// Per-item deadline
    pub item_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            item_timeout: Duration::from_secs(30),
        }
    }
}

/// Cooperative cancellation flag for a running bulk action.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One unit of work.
#[derive(Debug, Clone)]
enum Job {
    Create(CreatePlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
}

impl Job {
    /// Result key: the item code, or the SKU for deletes. A SKU shared by
    /// several orphans is suffixed with the product id (`SKU#id`).
    fn key(&self, shared_skus: &BTreeSet<Sku>) -> String {
        match self {
            Self::Create(c) => c.item.item_code.to_string(),
            Self::Update(u) => u.item.item_code.to_string(),
            Self::Delete(d) if shared_skus.contains(&d.sku) => {
                format!("{}#{}", d.sku, d.product_id)
            }
            Self::Delete(d) => d.sku.to_string(),
        }
    }
}

/// Mapping change implied by a successful item.
#[derive(Debug, Clone)]
enum Effect {
    Linked {
        code: ItemCode,
        sku: Option<Sku>,
        product_id: WcProductId,
        price: Option<Price>,
        image_fingerprints: Option<Vec<String>>,
        rebind: bool,
    },
    Unlinked(WcProductId),
}

type JobOutput = (ItemOutcome, Option<Effect>);

pub struct SyncExecutor {
    storefront: Arc<dyn Storefront>,
    ghosts: Arc<dyn GhostPolicy>,
    config: ExecutorConfig,
}

impl SyncExecutor {
    pub fn new(
        storefront: Arc<dyn Storefront>,
        ghosts: Arc<dyn GhostPolicy>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            storefront,
            ghosts,
            config,
        }
    }

    /// Run the `action` bucket of `plan`, applying outcomes to `mapping`.
    ///
    /// Per-item failures are recorded in the result, never returned.
    /// `products` is the snapshot the plan was computed from; it is used to
    /// recognise creates blocked by ghost products. A duplicate-SKU rejection
    /// for a SKU the snapshot does not show as a ghost is checked against the
    /// storefront trash before it is reported as a failure.
    pub async fn execute(
        &self,
        action: SyncAction,
        plan: &SyncPlan,
        products: &[ProductRecord],
        mapping: &mut MappingSet,
        cancel: &CancelToken,
    ) -> SyncResult {
        let jobs: Vec<Job> = match action {
            SyncAction::Create => plan.creates.iter().cloned().map(Job::Create).collect(),
            SyncAction::Update => plan.updates.iter().cloned().map(Job::Update).collect(),
            SyncAction::Delete => plan.deletes.iter().cloned().map(Job::Delete).collect(),
        };

        let mut seen = BTreeSet::new();
        let shared_skus: BTreeSet<Sku> = plan
            .deletes
            .iter()
            .filter(|d| !seen.insert(&d.sku))
            .map(|d| d.sku.clone())
            .collect();

        let ghost_skus: Arc<BTreeSet<Sku>> = Arc::new(
            products
                .iter()
                .filter(|p| self.ghosts.is_blocking_duplicate(p))
                .filter_map(|p| p.sku.clone())
                .collect(),
        );

        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(total);

        for job in jobs {
            if cancel.is_cancelled() {
                break;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            // re-check: the wait for a permit may have spanned a cancel request
            if cancel.is_cancelled() {
                break;
            }

            let key = job.key(&shared_skus);
            let storefront = self.storefront.clone();
            let ghosts = self.ghosts.clone();
            let ghost_skus = ghost_skus.clone();
            let timeout = self.config.item_timeout;
            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_job(storefront.as_ref(), ghosts.as_ref(), job, &ghost_skus, timeout).await
            });
            handles.push((key, handle));
        }

        let mut result = SyncResult::new(action);
        result.cancelled = handles.len() < total;

        let now = Utc::now();
        for (key, handle) in handles {
            let (outcome, effect) = match handle.await {
                Ok(output) => output,
                Err(e) => (ItemOutcome::Failed(format!("worker task failed: {e}")), None),
            };

            let outcome = match (outcome, effect) {
                (ItemOutcome::Succeeded, Some(effect)) => match apply(mapping, effect, now) {
                    Ok(()) => ItemOutcome::Succeeded,
                    Err(message) => ItemOutcome::Failed(message),
                },
                (outcome, _) => outcome,
            };

            match &outcome {
                ItemOutcome::Succeeded => debug!(key = %key, %action, "item synced"),
                ItemOutcome::Failed(message) => warn!(key = %key, %action, error = %message, "item failed"),
                ItemOutcome::ManualDelete(sku) => {
                    warn!(key = %key, sku = %sku, "create blocked by trashed product; purge the trash first")
                }
            }
            result.record(key, outcome);
        }

        info!(
            %action,
            planned = total,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            manual_delete = result.manual_delete.len(),
            cancelled = result.cancelled,
            "bulk action finished"
        );
        result
    }
}

fn apply(
    mapping: &mut MappingSet,
    effect: Effect,
    now: chrono::DateTime<Utc>,
) -> Result<(), String> {
    match effect {
        Effect::Linked {
            code,
            sku,
            product_id,
            price,
            image_fingerprints,
            rebind,
        } => mapping
            .record_push(&code, sku, product_id, price, image_fingerprints, now, rebind)
            .map_err(|e| format!("product {product_id} pushed but mapping rejected it: {e}")),
        Effect::Unlinked(product_id) => {
            mapping.record_deleted(product_id);
            Ok(())
        }
    }
}

async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, RemoteError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(RemoteError::Timeout(timeout)))
}

/// Whether a trashed product holding `sku` blocks creates.
async fn blocked_by_trash(
    storefront: &dyn Storefront,
    ghosts: &dyn GhostPolicy,
    sku: &Sku,
    timeout: Duration,
) -> bool {
    match with_timeout(timeout, storefront.fetch_trashed()).await {
        Ok(trashed) => trashed
            .iter()
            .any(|p| p.sku.as_ref() == Some(sku) && ghosts.is_blocking_duplicate(p)),
        Err(e) => {
            warn!(sku = %sku, error = %e, "could not list trashed products");
            false
        }
    }
}

async fn run_job(
    storefront: &dyn Storefront,
    ghosts: &dyn GhostPolicy,
    job: Job,
    ghost_skus: &BTreeSet<Sku>,
    timeout: Duration,
) -> JobOutput {
    match job {
        Job::Create(plan) => {
            if let Some(forced) = plan.reason.forced_product() {
                return (
                    ItemOutcome::Failed(format!(
                        "override forces product {forced}, which is not available; fix or clear the override"
                    )),
                    None,
                );
            }

            let draft = plan.item.to_draft();
            match with_timeout(timeout, storefront.create_product(&draft)).await {
                Ok(product) => (
                    ItemOutcome::Succeeded,
                    Some(Effect::Linked {
                        code: plan.item.item_code.clone(),
                        sku: Some(draft.sku.clone()),
                        product_id: product.product_id,
                        price: plan.item.price,
                        image_fingerprints: Some(fingerprints(&plan.item.image_refs)),
                        rebind: false,
                    }),
                ),
                Err(e) if e.is_duplicate_sku() => {
                    if ghost_skus.contains(&draft.sku)
                        || blocked_by_trash(storefront, ghosts, &draft.sku, timeout).await
                    {
                        (ItemOutcome::ManualDelete(draft.sku), None)
                    } else {
                        (ItemOutcome::Failed(e.to_string()), None)
                    }
                }
                Err(e) => (ItemOutcome::Failed(e.to_string()), None),
            }
        }
        Job::Update(plan) => {
            let draft = plan.item.to_draft();
            let images = plan.reason.images_changed;
            match with_timeout(timeout, storefront.update_product(plan.product_id, &draft, images)).await {
                Ok(_) => (
                    ItemOutcome::Succeeded,
                    Some(Effect::Linked {
                        code: plan.item.item_code.clone(),
                        sku: None,
                        product_id: plan.product_id,
                        price: plan.item.price,
                        image_fingerprints: images.then(|| fingerprints(&plan.item.image_refs)),
                        rebind: plan.via_override,
                    }),
                ),
                Err(e) => (ItemOutcome::Failed(e.to_string()), None),
            }
        }
        Job::Delete(plan) => match with_timeout(timeout, storefront.trash_product(plan.product_id)).await {
            // already gone counts as deleted
            Ok(()) => (ItemOutcome::Succeeded, Some(Effect::Unlinked(plan.product_id))),
            Err(e) if e.is_not_found() => (ItemOutcome::Succeeded, Some(Effect::Unlinked(plan.product_id))),
            Err(e) => (ItemOutcome::Failed(e.to_string()), None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStorefront;
    use woosync_catalog::{DiffEngine, ItemRecord, MappingStatus, ProductStatus, TrashedStatusPolicy};

    fn item(code: &str, price: &str) -> ItemRecord {
        ItemRecord {
            item_code: ItemCode::new(code).unwrap(),
            item_name: format!("Item {code}"),
            description: String::new(),
            short_description: None,
            price: Some(price.parse().unwrap()),
            image_refs: vec![],
            price_list: None,
        }
    }

    fn product(id: u64, sku: &str, price: &str, status: ProductStatus) -> ProductRecord {
        ProductRecord {
            product_id: WcProductId::new(id).unwrap(),
            sku: Some(Sku::new(sku).unwrap()),
            name: format!("Item {sku}"),
            price: Some(price.parse().unwrap()),
            description: String::new(),
            short_description: String::new(),
            image_urls: vec![],
            status,
        }
    }

    fn executor(shop: Arc<InMemoryStorefront>, config: ExecutorConfig) -> SyncExecutor {
        SyncExecutor::new(shop, Arc::new(TrashedStatusPolicy), config)
    }

    async fn run(
        shop: &Arc<InMemoryStorefront>,
        items: &[ItemRecord],
        action: SyncAction,
        mapping: &mut MappingSet,
        config: ExecutorConfig,
    ) -> SyncResult {
        let products = shop.fetch_products().await.unwrap();
        let plan = DiffEngine::default().plan(items, &products, mapping);
        executor(shop.clone(), config)
            .execute(action, &plan, &products, mapping, &CancelToken::default())
            .await
    }

    #[tokio::test]
    async fn create_records_mapping_entry() {
        let shop = InMemoryStorefront::arc(vec![product(1, "SKU1", "100", ProductStatus::Publish)]);
        let mut mapping = MappingSet::default();
        let items = [item("SKU1", "100"), item("SKU2", "50")];

        let result = run(&shop, &items, SyncAction::Create, &mut mapping, Default::default()).await;

        assert_eq!(result.succeeded, vec!["SKU2".to_string()]);
        let entry = mapping.entry(&ItemCode::new("SKU2").unwrap()).unwrap();
        assert!(entry.wc_product_id.is_some());
        assert_eq!(entry.status, MappingStatus::Matched);
        assert_eq!(entry.last_price, Some("50".parse().unwrap()));
        assert!(entry.last_synced.is_some());
        assert_eq!(entry.image_fingerprints, Some(vec![]));
    }

    #[tokio::test]
    async fn create_blocked_by_ghost_goes_to_manual_delete() {
        let shop = InMemoryStorefront::arc(vec![product(3, "SKU2", "50", ProductStatus::Trash)]);
        let mut mapping = MappingSet::default();

        let result = run(
            &shop,
            &[item("SKU2", "50")],
            SyncAction::Create,
            &mut mapping,
            ExecutorConfig::default(),
        )
        .await;

        assert!(result.succeeded.is_empty());
        assert!(result.failed.is_empty());
        assert_eq!(result.manual_delete, vec![Sku::new("SKU2").unwrap()]);
        assert!(mapping.entry(&ItemCode::new("SKU2").unwrap()).is_none());
    }

    #[tokio::test]
    async fn ghost_missing_from_listing_is_found_in_trash() {
        let shop = InMemoryStorefront::arc(vec![product(3, "SKU2", "50", ProductStatus::Trash)]);
        shop.hide_trash_from_listing(true);
        let mut mapping = MappingSet::default();

        let result = run(
            &shop,
            &[item("SKU2", "50")],
            SyncAction::Create,
            &mut mapping,
            ExecutorConfig::default(),
        )
        .await;

        assert!(result.failed.is_empty());
        assert_eq!(result.manual_delete, vec![Sku::new("SKU2").unwrap()]);
    }

    #[tokio::test]
    async fn duplicate_sku_without_ghost_is_a_failure() {
        let shop = InMemoryStorefront::arc(vec![]);
        let mut mapping = MappingSet::default();
        let products = shop.fetch_products().await.unwrap();
        let plan = DiffEngine::default().plan(&[item("SKU2", "50")], &products, &mapping);
        // a live product with the SKU appears after the snapshot was taken
        shop.insert(product(4, "SKU2", "50", ProductStatus::Publish));

        let result = executor(shop.clone(), ExecutorConfig::default())
            .execute(SyncAction::Create, &plan, &products, &mut mapping, &CancelToken::default())
            .await;

        assert!(result.manual_delete.is_empty());
        assert_eq!(result.failed, vec!["SKU2".to_string()]);
    }

    #[tokio::test]
    async fn failed_items_do_not_stop_the_batch() {
        let shop = InMemoryStorefront::arc(vec![]);
        shop.fail_sku(Sku::new("B").unwrap());
        let mut mapping = MappingSet::default();
        let items = [item("A", "1"), item("B", "2"), item("C", "3")];

        let result = run(&shop, &items, SyncAction::Create, &mut mapping, Default::default()).await;

        assert_eq!(result.succeeded, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(result.failed, vec!["B".to_string()]);
        assert!(result.errors["B"].contains("simulated failure"));
        assert!(mapping.entry(&ItemCode::new("B").unwrap()).is_none());
    }

    #[tokio::test]
    async fn update_pushes_price_and_marks_matched() {
        let shop = InMemoryStorefront::arc(vec![product(1, "SKU1", "100", ProductStatus::Publish)]);
        let mut mapping = MappingSet::default();

        let result = run(
            &shop,
            &[item("SKU1", "120")],
            SyncAction::Update,
            &mut mapping,
            ExecutorConfig::default(),
        )
        .await;

        assert_eq!(result.succeeded, vec!["SKU1".to_string()]);
        let pushed = shop.get(WcProductId::new(1).unwrap()).unwrap();
        assert_eq!(pushed.price, Some("120".parse().unwrap()));
        let entry = mapping.entry(&ItemCode::new("SKU1").unwrap()).unwrap();
        assert_eq!(entry.last_price, Some("120".parse().unwrap()));
        assert_eq!(entry.status, MappingStatus::Matched);
        // images were not pushed, so nothing is recorded for them
        assert_eq!(entry.image_fingerprints, None);
    }

    #[tokio::test]
    async fn delete_trashes_and_unlinks() {
        let shop = InMemoryStorefront::arc(vec![product(9, "OLD", "5", ProductStatus::Publish)]);
        let mut mapping = MappingSet::default();
        mapping
            .adopt(&ItemCode::new("OLD").unwrap(), None, WcProductId::new(9).unwrap(), false)
            .unwrap();

        let result = run(&shop, &[], SyncAction::Delete, &mut mapping, Default::default()).await;

        assert_eq!(result.succeeded, vec!["OLD".to_string()]);
        assert_eq!(shop.get(WcProductId::new(9).unwrap()).unwrap().status, ProductStatus::Trash);
        let entry = mapping.entry(&ItemCode::new("OLD").unwrap()).unwrap();
        assert_eq!(entry.wc_product_id, None);
        assert_eq!(entry.status, MappingStatus::Unmatched);
    }

    #[tokio::test]
    async fn orphans_sharing_a_sku_are_reported_separately() {
        let shop = InMemoryStorefront::arc(vec![
            product(9, "DUP", "5", ProductStatus::Publish),
            product(10, "DUP", "5", ProductStatus::Draft),
            product(11, "SOLO", "5", ProductStatus::Publish),
        ]);
        let mut mapping = MappingSet::default();

        let result = run(&shop, &[], SyncAction::Delete, &mut mapping, Default::default()).await;

        assert_eq!(
            result.succeeded,
            vec!["DUP#9".to_string(), "DUP#10".to_string(), "SOLO".to_string()]
        );
        assert!(shop.products().iter().all(|p| p.status == ProductStatus::Trash));
    }

    #[tokio::test]
    async fn slow_items_time_out() {
        let shop = InMemoryStorefront::arc(vec![]);
        shop.set_delay(Some(Duration::from_millis(500)));
        let mut mapping = MappingSet::default();
        let config = ExecutorConfig {
            concurrency: 2,
            item_timeout: Duration::from_millis(20),
        };

        let result = run(&shop, &[item("A", "1")], SyncAction::Create, &mut mapping, config).await;

        assert_eq!(result.failed, vec!["A".to_string()]);
        assert!(result.errors["A"].contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_action_leaves_unstarted_items_out() {
        let shop = InMemoryStorefront::arc(vec![]);
        shop.set_delay(Some(Duration::from_millis(50)));
        let items: Vec<_> = (0..6).map(|i| item(&format!("I{i}"), "1")).collect();
        let mut mapping = MappingSet::default();
        let products = shop.products();
        let plan = DiffEngine::default().plan(&items, &products, &mapping);

        let cancel = CancelToken::default();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let exec = executor(
            shop.clone(),
            ExecutorConfig {
                concurrency: 1,
                item_timeout: Duration::from_secs(5),
            },
        );
        let result = exec
            .execute(SyncAction::Create, &plan, &products, &mut mapping, &cancel)
            .await;

        assert!(result.cancelled);
        assert!(result.succeeded.len() + result.failed.len() < items.len());
        assert_eq!(shop.mutation_count(), result.succeeded.len() + result.failed.len());
    }

    #[tokio::test]
    async fn override_creates_are_refused() {
        use woosync_catalog::{MappingDocument, OverrideEntry};

        let shop = InMemoryStorefront::arc(vec![]);
        let mut mapping = MappingSet::from_document(MappingDocument {
            overrides: vec![OverrideEntry {
                erp_item_code: ItemCode::new("A").unwrap(),
                forced_wc_product_id: Some(WcProductId::new(42).unwrap()),
                note: None,
            }],
            ..MappingDocument::default()
        })
        .unwrap();

        let result = run(
            &shop,
            &[item("A", "1")],
            SyncAction::Create,
            &mut mapping,
            ExecutorConfig::default(),
        )
        .await;

        assert_eq!(result.failed, vec!["A".to_string()]);
        assert!(result.errors["A"].contains("override"));
        assert_eq!(shop.mutation_count(), 0);
    }
}
