//! In-memory ERP and storefront for tests/dev.
//!
//! The storefront mimics the WooCommerce behaviour the sync depends on:
//! trashed products keep their SKU reserved, deletes are soft unless forced.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use woosync_catalog::{ItemRecord, ProductDraft, ProductRecord, ProductStatus};
use woosync_core::{Sku, WcProductId};

use crate::external::RemoteError;
use crate::fetch::{ErpCatalog, Storefront};

fn unavailable() -> RemoteError {
    RemoteError::Network("connection refused".to_string())
}

/// In-memory ERPNext item catalog.
#[derive(Debug, Default)]
pub struct InMemoryErp {
    items: RwLock<Vec<ItemRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryErp {
    pub fn new(items: Vec<ItemRecord>) -> Self {
        Self {
            items: RwLock::new(items),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn arc(items: Vec<ItemRecord>) -> Arc<Self> {
        Arc::new(Self::new(items))
    }

    pub fn set_items(&self, items: Vec<ItemRecord>) {
        *self.items.write().unwrap_or_else(PoisonError::into_inner) = items;
    }

    /// Make every fetch fail as if ERPNext were down.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ErpCatalog for InMemoryErp {
    async fn fetch_items(&self) -> Result<Vec<ItemRecord>, RemoteError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.items.read().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// In-memory WooCommerce product catalog.
#[derive(Debug)]
pub struct InMemoryStorefront {
    products: RwLock<BTreeMap<WcProductId, ProductRecord>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    hides_trash: AtomicBool,
    failing_skus: RwLock<BTreeSet<Sku>>,
    delay: RwLock<Option<Duration>>,
    mutations: AtomicUsize,
}

impl Default for InMemoryStorefront {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InMemoryStorefront {
    pub fn new(products: Vec<ProductRecord>) -> Self {
        let next = products.iter().map(|p| p.product_id.get()).max().unwrap_or(0) + 1;
        Self {
            products: RwLock::new(products.into_iter().map(|p| (p.product_id, p)).collect()),
            next_id: AtomicU64::new(next.max(100)),
            unavailable: AtomicBool::new(false),
            hides_trash: AtomicBool::new(false),
            failing_skus: RwLock::new(BTreeSet::new()),
            delay: RwLock::new(None),
            mutations: AtomicUsize::new(0),
        }
    }

    pub fn arc(products: Vec<ProductRecord>) -> Arc<Self> {
        Arc::new(Self::new(products))
    }

    pub fn products(&self) -> Vec<ProductRecord> {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, id: WcProductId) -> Option<ProductRecord> {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn insert(&self, product: ProductRecord) {
        self.next_id.fetch_max(product.product_id.get() + 1, Ordering::SeqCst);
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product.product_id, product);
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Leave trashed products out of `fetch_products`, like a `status=any`
    /// listing on stock WordPress. `fetch_trashed` still sees them.
    pub fn hide_trash_from_listing(&self, hide: bool) {
        self.hides_trash.store(hide, Ordering::SeqCst);
    }

    /// Mutations touching this SKU answer HTTP 500.
    pub fn fail_sku(&self, sku: Sku) {
        self.failing_skus
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sku);
    }

    /// Delay every mutation (timeouts, cancellation).
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Number of mutation calls received, successful or not.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    async fn before_mutation(&self, sku: Option<&Sku>) -> Result<(), RemoteError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let failing = sku.is_some_and(|sku| {
            self.failing_skus
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(sku)
        });
        if failing {
            return Err(RemoteError::Api {
                status: 500,
                code: Some("internal_server_error".into()),
                message: "simulated failure".into(),
            });
        }
        Ok(())
    }

    fn not_found(id: WcProductId) -> RemoteError {
        RemoteError::Api {
            status: 404,
            code: Some("woocommerce_rest_product_invalid_id".into()),
            message: format!("Invalid ID {id}."),
        }
    }

    fn sku_of(&self, id: WcProductId) -> Option<Sku> {
        self.get(id).and_then(|p| p.sku)
    }
}

#[async_trait::async_trait]
impl Storefront for InMemoryStorefront {
    async fn fetch_products(&self) -> Result<Vec<ProductRecord>, RemoteError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let hide_trash = self.hides_trash.load(Ordering::SeqCst);
        Ok(self
            .products()
            .into_iter()
            .filter(|p| !(hide_trash && p.status == ProductStatus::Trash))
            .collect())
    }

    async fn fetch_trashed(&self) -> Result<Vec<ProductRecord>, RemoteError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .products()
            .into_iter()
            .filter(|p| p.status == ProductStatus::Trash)
            .collect())
    }

    async fn create_product(&self, draft: &ProductDraft) -> Result<ProductRecord, RemoteError> {
        self.before_mutation(Some(&draft.sku)).await?;

        let mut products = self.products.write().unwrap_or_else(PoisonError::into_inner);
        if products.values().any(|p| p.sku.as_ref() == Some(&draft.sku)) {
            return Err(RemoteError::Api {
                status: 400,
                code: Some("product_invalid_sku".into()),
                message: "Invalid or duplicated SKU.".into(),
            });
        }

        let id = WcProductId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        let product = ProductRecord {
            product_id: id,
            sku: Some(draft.sku.clone()),
            name: draft.name.clone(),
            price: draft.regular_price,
            description: draft.description.clone(),
            short_description: draft.short_description.clone().unwrap_or_default(),
            image_urls: draft.images.clone(),
            status: ProductStatus::Publish,
        };
        products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: WcProductId,
        draft: &ProductDraft,
        include_images: bool,
    ) -> Result<ProductRecord, RemoteError> {
        self.before_mutation(self.sku_of(id).as_ref()).await?;

        let mut products = self.products.write().unwrap_or_else(PoisonError::into_inner);
        let product = products.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        product.name = draft.name.clone();
        product.description = draft.description.clone();
        if let Some(short) = &draft.short_description {
            product.short_description = short.clone();
        }
        if draft.regular_price.is_some() {
            product.price = draft.regular_price;
        }
        if include_images {
            product.image_urls = draft.images.clone();
        }
        Ok(product.clone())
    }

    async fn trash_product(&self, id: WcProductId) -> Result<(), RemoteError> {
        self.before_mutation(self.sku_of(id).as_ref()).await?;

        let mut products = self.products.write().unwrap_or_else(PoisonError::into_inner);
        let product = products.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        product.status = ProductStatus::Trash;
        Ok(())
    }

    async fn purge_product(&self, id: WcProductId) -> Result<(), RemoteError> {
        self.before_mutation(self.sku_of(id).as_ref()).await?;

        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(id))
    }
}
