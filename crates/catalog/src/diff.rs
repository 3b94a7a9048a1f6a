//! Diff engine: classifies every ERP item and storefront product into the
//! create / update / delete buckets of one reconciliation pass.
//!
//! Matching precedence per ERP item:
//! 1. a non-null override binding;
//! 2. the product recorded in the item's auto mapping entry, if still live;
//! 3. a live product whose SKU equals the item code (lowest product id wins);
//! 4. otherwise the item is a create.
//!
//! A product is the target of at most one classification per pass. Products
//! in a blocking (ghost) state never enter a bucket.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use woosync_core::{Entity, ItemCode, Sku, WcProductId};

use crate::image;
use crate::mapping::{MappingSet, MappingStatus};
use crate::price::PriceTolerance;
use crate::record::{GhostPolicy, ItemRecord, ProductRecord, TrashedStatusPolicy};
use crate::text::same_text;

/// A compared field that differs between ERP and storefront.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    Name,
    Price,
    Description,
    ShortDescription,
}

/// Why an item is classified as an update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateReason {
    pub fields: Vec<ChangedField>,
    pub images_changed: bool,
}

impl UpdateReason {
    /// No content difference; the update only re-establishes the link.
    pub fn is_relink(&self) -> bool {
        self.fields.is_empty() && !self.images_changed
    }
}

/// Why an item is classified as a create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateReason {
    /// No override, no live link, no live SKU match.
    NoMatch,
    /// The override forces a product that is absent or not live.
    OverrideTargetMissing { product_id: WcProductId, trashed: bool },
    /// Another item's override already forces the same product.
    OverrideTargetClaimed { product_id: WcProductId },
    /// The recorded link points at a product that is gone.
    StaleLink { product_id: WcProductId },
    /// Live products carry the SKU but each is bound to another item.
    SkuClaimed { product_id: WcProductId },
}

impl CreateReason {
    /// Creates driven by an override are never executed as plain creates:
    /// a new product would contradict the forced binding.
    pub fn forced_product(&self) -> Option<WcProductId> {
        match self {
            Self::OverrideTargetMissing { product_id, .. }
            | Self::OverrideTargetClaimed { product_id } => Some(*product_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePlan {
    pub item: ItemRecord,
    pub reason: CreateReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub item: ItemRecord,
    pub product_id: WcProductId,
    pub reason: UpdateReason,
    /// Bound through an override (may rebind the mapping entry).
    pub via_override: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePlan {
    pub sku: Sku,
    pub product_id: WcProductId,
}

/// A matched pair whose mapping entry does not record the product yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adoption {
    pub item_code: ItemCode,
    pub sku: Option<Sku>,
    pub product_id: WcProductId,
    pub via_override: bool,
}

/// Full classification of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncPlan {
    pub creates: Vec<CreatePlan>,
    pub updates: Vec<UpdatePlan>,
    pub deletes: Vec<DeletePlan>,
    pub adoptions: Vec<Adoption>,
    /// Items whose recorded product link must be cleared.
    pub stale_links: Vec<ItemCode>,
    /// ERP SKU → live products carrying it that were not chosen as the match.
    pub collisions: BTreeMap<Sku, Vec<WcProductId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreviewReasons {
    pub update: BTreeMap<ItemCode, UpdateReason>,
    pub create: BTreeMap<ItemCode, CreateReason>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BucketCounts {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

/// Operator-facing view of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreviewResult {
    pub create: Vec<ItemCode>,
    pub update: Vec<ItemCode>,
    pub delete: Vec<Sku>,
    pub reasons: PreviewReasons,
    pub collisions: BTreeMap<Sku, Vec<WcProductId>>,
}

impl PreviewResult {
    pub fn counts(&self) -> BucketCounts {
        BucketCounts {
            create: self.create.len(),
            update: self.update.len(),
            delete: self.delete.len(),
        }
    }
}

impl SyncPlan {
    pub fn preview(&self) -> PreviewResult {
        let delete: BTreeSet<Sku> = self.deletes.iter().map(|d| d.sku.clone()).collect();
        PreviewResult {
            create: self.creates.iter().map(|c| c.item.item_code.clone()).collect(),
            update: self.updates.iter().map(|u| u.item.item_code.clone()).collect(),
            delete: delete.into_iter().collect(),
            reasons: PreviewReasons {
                update: self
                    .updates
                    .iter()
                    .map(|u| (u.item.item_code.clone(), u.reason.clone()))
                    .collect(),
                create: self
                    .creates
                    .iter()
                    .map(|c| (c.item.item_code.clone(), c.reason.clone()))
                    .collect(),
            },
            collisions: self.collisions.clone(),
        }
    }

    /// Whether housekeeping would change the mapping.
    pub fn has_housekeeping(&self) -> bool {
        !self.adoptions.is_empty() || !self.stale_links.is_empty()
    }
}

/// Stateless classifier; configured once and reused across passes.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    tolerance: PriceTolerance,
    ghosts: Arc<dyn GhostPolicy>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(PriceTolerance::default(), Arc::new(TrashedStatusPolicy))
    }
}

/// How an item got bound to a product.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Binding {
    Override,
    Link,
    Sku,
}

impl DiffEngine {
    pub fn new(tolerance: PriceTolerance, ghosts: Arc<dyn GhostPolicy>) -> Self {
        Self { tolerance, ghosts }
    }

    pub fn ghost_policy(&self) -> &Arc<dyn GhostPolicy> {
        &self.ghosts
    }

    /// Classify a fresh snapshot of both catalogs against the mapping.
    ///
    /// Pure and deterministic: output ordering never depends on input ordering.
    pub fn plan(
        &self,
        items: &[ItemRecord],
        products: &[ProductRecord],
        mapping: &MappingSet,
    ) -> SyncPlan {
        let items: BTreeMap<&ItemCode, &ItemRecord> =
            items.iter().map(|i| (&i.item_code, i)).collect();

        let by_id: HashMap<WcProductId, &ProductRecord> =
            products.iter().map(|p| (*p.id(), p)).collect();

        let mut live_by_sku: BTreeMap<&Sku, Vec<&ProductRecord>> = BTreeMap::new();
        for product in products.iter().filter(|p| self.ghosts.is_live(p)) {
            if let Some(sku) = &product.sku {
                live_by_sku.entry(sku).or_default().push(product);
            }
        }
        for group in live_by_sku.values_mut() {
            group.sort_by_key(|p| p.product_id);
            group.dedup_by_key(|p| p.product_id);
        }

        let forced = mapping.forced_targets();
        let override_targets: BTreeSet<WcProductId> = forced.values().copied().collect();

        let mut plan = SyncPlan::default();
        let mut claimed: BTreeSet<WcProductId> = BTreeSet::new();
        let mut pairs: Vec<(&ItemRecord, &ProductRecord, Binding)> = Vec::new();
        let mut pending: Vec<&ItemRecord> = Vec::new();
        let mut stale: BTreeMap<&ItemCode, WcProductId> = BTreeMap::new();

        // 1. overrides
        for (code, item) in &items {
            let Some(target) = forced.get(*code).copied() else {
                pending.push(*item);
                continue;
            };
            match by_id.get(&target) {
                Some(product) if self.ghosts.is_live(product) => {
                    if claimed.insert(target) {
                        pairs.push((*item, *product, Binding::Override));
                    } else {
                        plan.creates.push(CreatePlan {
                            item: (*item).clone(),
                            reason: CreateReason::OverrideTargetClaimed { product_id: target },
                        });
                    }
                }
                found => plan.creates.push(CreatePlan {
                    item: (*item).clone(),
                    reason: CreateReason::OverrideTargetMissing {
                        product_id: target,
                        trashed: found.is_some(),
                    },
                }),
            }
        }

        // 2. recorded links
        let mut unlinked: Vec<&ItemRecord> = Vec::new();
        for item in pending {
            let Some(linked) = mapping.linked_product(&item.item_code) else {
                unlinked.push(item);
                continue;
            };
            let usable = by_id
                .get(&linked)
                .filter(|p| self.ghosts.is_live(p))
                .filter(|_| !claimed.contains(&linked) && !override_targets.contains(&linked));
            match usable {
                Some(product) => {
                    claimed.insert(linked);
                    pairs.push((item, *product, Binding::Link));
                }
                None => {
                    stale.insert(&item.item_code, linked);
                    unlinked.push(item);
                }
            }
        }

        // 3. SKU matches
        for item in unlinked {
            let sku = item.item_code.to_sku();
            let group = live_by_sku.get(&sku).map(Vec::as_slice).unwrap_or_default();
            let free = group
                .iter()
                .find(|p| !claimed.contains(&p.product_id) && !override_targets.contains(&p.product_id))
                .copied();

            if let Some(product) = free {
                claimed.insert(product.product_id);
                pairs.push((item, product, Binding::Sku));
                continue;
            }

            let reason = match (group.first(), stale.get(&item.item_code)) {
                (Some(taken), _) => CreateReason::SkuClaimed {
                    product_id: taken.product_id,
                },
                (None, Some(old)) => CreateReason::StaleLink { product_id: *old },
                (None, None) => CreateReason::NoMatch,
            };
            plan.creates.push(CreatePlan {
                item: item.clone(),
                reason,
            });
        }

        // 4. leftover live products: collisions or deletes
        for (sku, group) in &live_by_sku {
            for product in group {
                let id = product.product_id;
                if claimed.contains(&id) || override_targets.contains(&id) {
                    continue;
                }
                if items.keys().any(|code| code.matches_sku(sku)) {
                    plan.collisions.entry((*sku).clone()).or_default().push(id);
                } else {
                    plan.deletes.push(DeletePlan {
                        sku: (*sku).clone(),
                        product_id: id,
                    });
                }
            }
        }

        // 5. matched pairs: update, relink or no-op, plus adoption
        for (item, product, binding) in pairs {
            let entry = mapping.entry(&item.item_code);
            let linked_here = entry.and_then(|e| e.wc_product_id) == Some(product.product_id);
            let via_override = binding == Binding::Override;

            if !linked_here {
                plan.adoptions.push(Adoption {
                    item_code: item.item_code.clone(),
                    sku: product.sku.clone(),
                    product_id: product.product_id,
                    via_override,
                });
            }

            let recorded = entry
                .filter(|_| linked_here)
                .and_then(|e| e.image_fingerprints.as_deref());
            let reason = self.compare(item, product, recorded);

            let needs_relink = entry.is_some_and(|e| e.status != MappingStatus::Matched);
            if !reason.is_relink() || needs_relink {
                plan.updates.push(UpdatePlan {
                    item: item.clone(),
                    product_id: product.product_id,
                    reason,
                    via_override,
                });
            }
        }

        plan.stale_links = stale.into_keys().cloned().collect();
        plan.creates.sort_by(|a, b| a.item.item_code.cmp(&b.item.item_code));
        plan.updates.sort_by(|a, b| a.item.item_code.cmp(&b.item.item_code));
        plan.adoptions.sort_by(|a, b| a.item_code.cmp(&b.item_code));
        plan.deletes.sort_by(|a, b| (&a.sku, a.product_id).cmp(&(&b.sku, b.product_id)));
        plan
    }

    fn compare(
        &self,
        item: &ItemRecord,
        product: &ProductRecord,
        recorded_images: Option<&[String]>,
    ) -> UpdateReason {
        let mut fields = Vec::new();
        if !same_text(&item.item_name, &product.name) {
            fields.push(ChangedField::Name);
        }
        if self.tolerance.differs(item.price, product.price) {
            fields.push(ChangedField::Price);
        }
        if !same_text(&item.description, &product.description) {
            fields.push(ChangedField::Description);
        }
        if let Some(short) = &item.short_description {
            if !same_text(short, &product.short_description) {
                fields.push(ChangedField::ShortDescription);
            }
        }
        UpdateReason {
            fields,
            images_changed: image::images_changed(
                &item.image_refs,
                recorded_images,
                product.image_urls.len(),
            ),
        }
    }
}
