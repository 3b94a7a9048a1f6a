//! Catalog fetcher seams.
//!
//! The reconciler only depends on these traits; the REST clients in
//! `external` and the in-memory fakes in `memory` implement them.

use woosync_catalog::{ItemRecord, ProductDraft, ProductRecord};
use woosync_core::WcProductId;

use crate::external::RemoteError;

/// Read side of ERPNext.
#[async_trait::async_trait]
pub trait ErpCatalog: Send + Sync {
    /// All sellable items with prices resolved against the active selling list.
    /// Pagination is fully drained.
    async fn fetch_items(&self) -> Result<Vec<ItemRecord>, RemoteError>;
}

/// WooCommerce product catalog.
#[async_trait::async_trait]
pub trait Storefront: Send + Sync {
    /// Every product in any status, trashed ones included.
    async fn fetch_products(&self) -> Result<Vec<ProductRecord>, RemoteError>;

    /// Products currently in the trash.
    async fn fetch_trashed(&self) -> Result<Vec<ProductRecord>, RemoteError>;

    async fn create_product(&self, draft: &ProductDraft) -> Result<ProductRecord, RemoteError>;

    /// Push `draft` onto an existing product. SKU is left as is; images are
    /// only replaced when `include_images` is set.
    async fn update_product(
        &self,
        id: WcProductId,
        draft: &ProductDraft,
        include_images: bool,
    ) -> Result<ProductRecord, RemoteError>;

    /// Soft delete: the product moves to the trash.
    async fn trash_product(&self, id: WcProductId) -> Result<(), RemoteError>;

    /// Permanent delete.
    async fn purge_product(&self, id: WcProductId) -> Result<(), RemoteError>;
}

/// Both catalogs as fetched at the start of a pass.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub items: Vec<ItemRecord>,
    pub products: Vec<ProductRecord>,
}
