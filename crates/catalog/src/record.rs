//! Per-pass catalog snapshots on both sides of the sync.

use serde::{Deserialize, Serialize};

use woosync_core::{Entity, ItemCode, Sku, ValueObject, WcProductId};

use crate::price::Price;

/// One image of an ERP item, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl ValueObject for ImageRef {}

/// ERPNext item, with its price resolved against the active selling list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_code: ItemCode,
    pub item_name: String,
    #[serde(default)]
    pub description: String,
    /// `None` leaves the storefront's short description unmanaged.
    #[serde(default)]
    pub short_description: Option<String>,
    /// `None` when the item has no row in the active price list.
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub image_refs: Vec<ImageRef>,
    #[serde(default)]
    pub price_list: Option<String>,
}

impl Entity for ItemRecord {
    type Id = ItemCode;

    fn id(&self) -> &Self::Id {
        &self.item_code
    }
}

impl ItemRecord {
    /// Desired storefront state for this item.
    pub fn to_draft(&self) -> ProductDraft {
        ProductDraft {
            sku: self.item_code.to_sku(),
            name: self.item_name.clone(),
            description: self.description.clone(),
            short_description: self.short_description.clone(),
            regular_price: self.price,
            images: self.image_refs.iter().map(|i| i.url.clone()).collect(),
        }
    }
}

/// WooCommerce product lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProductStatus {
    Publish,
    Draft,
    Pending,
    Private,
    Trash,
    Other(String),
}

impl ProductStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Publish => "publish",
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Private => "private",
            Self::Trash => "trash",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ProductStatus {
    fn from(value: &str) -> Self {
        match value {
            "publish" => Self::Publish,
            "draft" => Self::Draft,
            "pending" => Self::Pending,
            "private" => Self::Private,
            "trash" => Self::Trash,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ProductStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ProductStatus> for String {
    fn from(value: ProductStatus) -> Self {
        value.as_str().to_string()
    }
}

impl Serialize for ProductStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProductStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// WooCommerce product as fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: WcProductId,
    /// Products without a SKU are not managed by the sync.
    pub sku: Option<Sku>,
    pub name: String,
    pub price: Option<Price>,
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    pub image_urls: Vec<String>,
    pub status: ProductStatus,
}

impl Entity for ProductRecord {
    type Id = WcProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }
}

/// Product payload for create/update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub sku: Sku,
    pub name: String,
    pub description: String,
    /// Omitted from the payload when `None`.
    #[serde(default)]
    pub short_description: Option<String>,
    pub regular_price: Option<Price>,
    pub images: Vec<String>,
}

/// Decides which storefront products block a same-SKU create.
///
/// WooCommerce keeps SKUs of trashed products reserved, so a trashed product
/// is a "ghost": invisible in the shop but still rejecting new products with
/// its SKU. Blocking products never take part in matching.
pub trait GhostPolicy: Send + Sync + core::fmt::Debug {
    fn is_blocking_duplicate(&self, product: &ProductRecord) -> bool;

    fn is_live(&self, product: &ProductRecord) -> bool {
        !self.is_blocking_duplicate(product)
    }
}

/// Default policy: only trashed products are ghosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrashedStatusPolicy;

impl GhostPolicy for TrashedStatusPolicy {
    fn is_blocking_duplicate(&self, product: &ProductRecord) -> bool {
        product.status == ProductStatus::Trash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(status: &str) -> ProductRecord {
        ProductRecord {
            product_id: WcProductId::new(1).unwrap(),
            sku: Some(Sku::new("SKU1").unwrap()),
            name: "Chair".into(),
            price: None,
            description: String::new(),
            short_description: String::new(),
            image_urls: vec![],
            status: status.into(),
        }
    }

    #[test]
    fn status_round_trips_unknown_values() {
        let s: ProductStatus = serde_json::from_str("\"future\"").unwrap();
        assert_eq!(s, ProductStatus::Other("future".into()));
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"future\"");
        assert_eq!(ProductStatus::from("trash"), ProductStatus::Trash);
    }

    #[test]
    fn trashed_products_are_blocking_ghosts() {
        let policy = TrashedStatusPolicy;
        assert!(policy.is_blocking_duplicate(&product("trash")));
        assert!(policy.is_live(&product("draft")));
        assert!(policy.is_live(&product("private")));
    }

    #[test]
    fn draft_carries_item_fields() {
        let item = ItemRecord {
            item_code: ItemCode::new("SKU1").unwrap(),
            item_name: "Chair".into(),
            description: "Oak".into(),
            short_description: Some("Solid oak".into()),
            price: Some("10".parse().unwrap()),
            image_refs: vec![ImageRef {
                url: "https://erp/files/a.jpg".into(),
                content_hash: None,
            }],
            price_list: Some("Standard Selling".into()),
        };
        let draft = item.to_draft();
        assert_eq!(draft.sku.as_str(), "SKU1");
        assert_eq!(draft.images, vec!["https://erp/files/a.jpg".to_string()]);
        assert_eq!(draft.regular_price, item.price);
        assert_eq!(draft.short_description.as_deref(), Some("Solid oak"));
    }
}
