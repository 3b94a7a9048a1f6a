//! Ghost/trash reconciler.
//!
//! Trashed WooCommerce products keep their SKU reserved, so a create for
//! the same SKU fails. Emptying the trash purges every product the ghost
//! policy classifies as blocking.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use woosync_catalog::GhostPolicy;
use woosync_core::WcProductId;

use crate::external::RemoteError;
use crate::fetch::Storefront;

/// Outcome of one empty-trash run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmptyTrashReport {
    pub removed: Vec<WcProductId>,
    pub failed: BTreeMap<WcProductId, String>,
}

pub struct TrashReconciler {
    storefront: Arc<dyn Storefront>,
    ghosts: Arc<dyn GhostPolicy>,
}

impl TrashReconciler {
    pub fn new(storefront: Arc<dyn Storefront>, ghosts: Arc<dyn GhostPolicy>) -> Self {
        Self { storefront, ghosts }
    }

    /// Permanently delete every blocking ghost product.
    ///
    /// Listing the trash must succeed; individual purge failures are
    /// reported per product.
    pub async fn empty_trash(&self) -> Result<EmptyTrashReport, RemoteError> {
        let trashed = self.storefront.fetch_trashed().await?;
        let mut report = EmptyTrashReport::default();

        for product in trashed.iter().filter(|p| self.ghosts.is_blocking_duplicate(p)) {
            match self.storefront.purge_product(product.product_id).await {
                Ok(()) => report.removed.push(product.product_id),
                Err(e) if e.is_not_found() => report.removed.push(product.product_id),
                Err(e) => {
                    warn!(product_id = %product.product_id, error = %e, "purge failed");
                    report.failed.insert(product.product_id, e.to_string());
                }
            }
        }

        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "trash emptied"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStorefront;
    use woosync_catalog::{ProductRecord, ProductStatus, TrashedStatusPolicy};
    use woosync_core::Sku;

    fn product(id: u64, sku: &str, status: ProductStatus) -> ProductRecord {
        ProductRecord {
            product_id: WcProductId::new(id).unwrap(),
            sku: Some(Sku::new(sku).unwrap()),
            name: sku.to_string(),
            price: None,
            description: String::new(),
            short_description: String::new(),
            image_urls: vec![],
            status,
        }
    }

    fn id(n: u64) -> WcProductId {
        WcProductId::new(n).unwrap()
    }

    #[tokio::test]
    async fn purges_only_trashed_products() {
        let shop = InMemoryStorefront::arc(vec![
            product(1, "LIVE", ProductStatus::Publish),
            product(2, "GHOST", ProductStatus::Trash),
            product(3, "DRAFT", ProductStatus::Draft),
        ]);
        let reconciler = TrashReconciler::new(shop.clone(), Arc::new(TrashedStatusPolicy));

        let report = reconciler.empty_trash().await.unwrap();

        assert_eq!(report.removed, vec![id(2)]);
        assert!(report.failed.is_empty());
        assert!(shop.get(id(2)).is_none());
        assert!(shop.get(id(1)).is_some());
        assert!(shop.get(id(3)).is_some());
    }

    #[tokio::test]
    async fn purge_failures_are_reported_per_product() {
        let shop = InMemoryStorefront::arc(vec![
            product(2, "GHOST", ProductStatus::Trash),
            product(4, "STUCK", ProductStatus::Trash),
        ]);
        shop.fail_sku(Sku::new("STUCK").unwrap());
        let reconciler = TrashReconciler::new(shop.clone(), Arc::new(TrashedStatusPolicy));

        let report = reconciler.empty_trash().await.unwrap();

        assert_eq!(report.removed, vec![id(2)]);
        assert!(report.failed[&id(4)].contains("simulated failure"));
        assert!(shop.get(id(4)).is_some());
    }

    #[tokio::test]
    async fn empty_trash_is_a_no_op_when_nothing_is_trashed() {
        let shop = InMemoryStorefront::arc(vec![product(1, "LIVE", ProductStatus::Publish)]);
        let reconciler = TrashReconciler::new(shop.clone(), Arc::new(TrashedStatusPolicy));

        let report = reconciler.empty_trash().await.unwrap();

        assert_eq!(report, EmptyTrashReport::default());
        assert_eq!(shop.mutation_count(), 0);
    }

    #[tokio::test]
    async fn listing_failure_is_an_error() {
        let shop = InMemoryStorefront::arc(vec![]);
        shop.set_unavailable(true);
        let reconciler = TrashReconciler::new(shop, Arc::new(TrashedStatusPolicy));

        assert!(reconciler.empty_trash().await.is_err());
    }

    #[test]
    fn report_serializes_ids_as_numbers_and_keys() {
        let mut report = EmptyTrashReport::default();
        report.removed.push(id(7));
        report.failed.insert(id(8), "boom".into());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["removed"], serde_json::json!([7]));
        assert_eq!(json["failed"]["8"], "boom");
    }
}
