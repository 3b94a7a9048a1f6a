//! Persistent ERP item ↔ WooCommerce product correspondence.
//!
//! Two layers:
//! - `auto`: links discovered or created by the sync. Written only by the executor.
//! - `overrides`: operator-authored forced bindings. Always take precedence.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use woosync_core::{DomainError, DomainResult, Entity, ItemCode, Sku, WcProductId};

use crate::price::Price;

/// Current on-disk layout version.
pub const SCHEMA_VERSION: u32 = 3;

/// Link status of a mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum MappingStatus {
    Matched,
    #[default]
    Unmatched,
    MissingWc,
    Ghost,
    /// Diagnostic value this version does not interpret.
    Other(String),
}

impl MappingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::MissingWc => "missing_wc",
            Self::Ghost => "ghost",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for MappingStatus {
    fn from(value: &str) -> Self {
        match value {
            // older files recorded the last action instead of the link state
            "matched" | "created" | "updated" => Self::Matched,
            "unmatched" | "" => Self::Unmatched,
            "missing_wc" => Self::MissingWc,
            "ghost" => Self::Ghost,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for MappingStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MappingStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<String>::deserialize(deserializer)
            .map(|s| s.as_deref().map(Self::from).unwrap_or_default())
    }
}

/// One auto-detected (or sync-created) link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub erp_item_code: ItemCode,
    #[serde(default)]
    pub wc_sku: Option<Sku>,
    #[serde(default)]
    pub wc_product_id: Option<WcProductId>,
    #[serde(default)]
    pub status: MappingStatus,
    #[serde(default)]
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_price: Option<Price>,
    /// Fingerprints of the image list last pushed, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_fingerprints: Option<Vec<String>>,
}

impl MappingEntry {
    pub fn unmatched(erp_item_code: ItemCode) -> Self {
        Self {
            erp_item_code,
            wc_sku: None,
            wc_product_id: None,
            status: MappingStatus::Unmatched,
            last_synced: None,
            last_price: None,
            image_fingerprints: None,
        }
    }
}

impl Entity for MappingEntry {
    type Id = ItemCode;

    fn id(&self) -> &Self::Id {
        &self.erp_item_code
    }
}

/// Operator-forced binding. `forced_wc_product_id = None` means "fall back to auto-match".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOverrideEntry")]
pub struct OverrideEntry {
    pub erp_item_code: ItemCode,
    pub forced_wc_product_id: Option<WcProductId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Override row as typed by an operator (ids may arrive as numbers or strings).
#[derive(Debug, Deserialize)]
struct RawOverrideEntry {
    #[serde(default)]
    erp_item_code: String,
    #[serde(default)]
    forced_wc_product_id: Value,
    #[serde(default)]
    note: Option<String>,
}

impl TryFrom<RawOverrideEntry> for OverrideEntry {
    type Error = DomainError;

    fn try_from(raw: RawOverrideEntry) -> Result<Self, Self::Error> {
        let erp_item_code = ItemCode::new(raw.erp_item_code.trim())
            .map_err(|_| DomainError::validation("override row has an empty erp_item_code"))?;

        let invalid = |v: &Value| {
            DomainError::validation(format!(
                "override {erp_item_code}: forced_wc_product_id must be a positive integer or null, got {v}"
            ))
        };

        let forced_wc_product_id = match &raw.forced_wc_product_id {
            Value::Null => None,
            Value::Number(n) => {
                let id = n.as_u64().ok_or_else(|| invalid(&raw.forced_wc_product_id))?;
                Some(WcProductId::new(id).map_err(|_| invalid(&raw.forced_wc_product_id))?)
            }
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.parse().map_err(|_| invalid(&raw.forced_wc_product_id))?),
            other => return Err(invalid(other)),
        };

        Ok(Self {
            erp_item_code,
            forced_wc_product_id,
            note: raw.note.filter(|n| !n.trim().is_empty()),
        })
    }
}

/// The persisted mapping file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto: Vec<MappingEntry>,
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,
}

impl Default for MappingDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: None,
            auto: Vec::new(),
            overrides: Vec::new(),
        }
    }
}

impl MappingDocument {
    pub fn from_json_str(raw: &str) -> DomainResult<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| DomainError::validation(format!("mapping is not valid JSON: {e}")))?;
        Self::from_json_value(value)
    }

    /// Parse and validate a mapping document.
    ///
    /// Accepts the current layout and the legacy layout (a bare array of auto
    /// rows), which is migrated in memory.
    pub fn from_json_value(value: Value) -> DomainResult<Self> {
        let mut doc = match value {
            Value::Array(_) => {
                let auto: Vec<MappingEntry> = serde_json::from_value(value)
                    .map_err(|e| DomainError::validation(format!("legacy mapping row: {e}")))?;
                Self {
                    auto,
                    ..Self::default()
                }
            }
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| DomainError::validation(format!("mapping document: {e}")))?,
            other => {
                return Err(DomainError::validation(format!(
                    "mapping must be an object or an array, got {other}"
                )));
            }
        };

        doc.schema_version = SCHEMA_VERSION;
        doc.validate()?;
        Ok(doc)
    }

    /// Boundary checks that typing alone does not cover.
    pub fn validate(&self) -> DomainResult<()> {
        let mut seen = BTreeSet::new();
        for entry in &self.auto {
            if !seen.insert(&entry.erp_item_code) {
                return Err(DomainError::validation(format!(
                    "duplicate auto mapping for erp_item_code {}",
                    entry.erp_item_code
                )));
            }
        }
        Ok(())
    }
}

/// Working copy of the mapping for one pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MappingSet {
    entries: BTreeMap<ItemCode, MappingEntry>,
    overrides: Vec<OverrideEntry>,
}

impl MappingSet {
    pub fn from_document(doc: MappingDocument) -> DomainResult<Self> {
        doc.validate()?;
        Ok(Self {
            entries: doc
                .auto
                .into_iter()
                .map(|e| (e.id().clone(), e))
                .collect(),
            overrides: doc.overrides,
        })
    }

    pub fn to_document(&self, generated_at: DateTime<Utc>) -> MappingDocument {
        MappingDocument {
            schema_version: SCHEMA_VERSION,
            generated_at: Some(generated_at),
            auto: self.entries.values().cloned().collect(),
            overrides: self.overrides.clone(),
        }
    }

    pub fn entry(&self, code: &ItemCode) -> Option<&MappingEntry> {
        self.entries.get(code)
    }

    pub fn entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.values()
    }

    pub fn overrides(&self) -> &[OverrideEntry] {
        &self.overrides
    }

    /// Overrides collapsed per item code; later rows win.
    pub fn effective_overrides(&self) -> BTreeMap<ItemCode, Option<WcProductId>> {
        self.overrides
            .iter()
            .map(|o| (o.erp_item_code.clone(), o.forced_wc_product_id))
            .collect()
    }

    /// Item code → forced product, for overrides that still force something.
    pub fn forced_targets(&self) -> BTreeMap<ItemCode, WcProductId> {
        self.effective_overrides()
            .into_iter()
            .filter_map(|(code, id)| id.map(|id| (code, id)))
            .collect()
    }

    /// Recorded product link of an item, if any.
    pub fn linked_product(&self, code: &ItemCode) -> Option<WcProductId> {
        self.entries.get(code).and_then(|e| e.wc_product_id)
    }

    /// Link `code` to `product_id`.
    ///
    /// An existing link to a different product may only be replaced when the
    /// binding comes from an override (`rebind`).
    pub fn adopt(
        &mut self,
        code: &ItemCode,
        sku: Option<Sku>,
        product_id: WcProductId,
        rebind: bool,
    ) -> DomainResult<()> {
        let entry = self
            .entries
            .entry(code.clone())
            .or_insert_with(|| MappingEntry::unmatched(code.clone()));

        if let Some(existing) = entry.wc_product_id {
            if existing != product_id && !rebind {
                return Err(DomainError::invariant(format!(
                    "{code} is linked to product {existing}; refusing to relink to {product_id} without an override"
                )));
            }
        }

        entry.wc_product_id = Some(product_id);
        if sku.is_some() {
            entry.wc_sku = sku;
        }
        entry.status = MappingStatus::Matched;
        Ok(())
    }

    /// Record a successful create or update push.
    ///
    /// `image_fingerprints` is `None` when images were not part of the push;
    /// the previous record is then kept.
    pub fn record_push(
        &mut self,
        code: &ItemCode,
        sku: Option<Sku>,
        product_id: WcProductId,
        price: Option<Price>,
        image_fingerprints: Option<Vec<String>>,
        at: DateTime<Utc>,
        rebind: bool,
    ) -> DomainResult<()> {
        self.adopt(code, sku, product_id, rebind)?;
        if let Some(entry) = self.entries.get_mut(code) {
            entry.last_synced = Some(at);
            if price.is_some() {
                entry.last_price = price;
            }
            if image_fingerprints.is_some() {
                entry.image_fingerprints = image_fingerprints;
            }
        }
        Ok(())
    }

    /// Clear a stale link: the linked product is gone, trashed, or bound to
    /// another item by an override.
    pub fn clear_link(&mut self, code: &ItemCode) -> bool {
        match self.entries.get_mut(code) {
            Some(entry) if entry.wc_product_id.is_some() => {
                entry.wc_product_id = None;
                entry.status = MappingStatus::Unmatched;
                true
            }
            _ => false,
        }
    }

    /// Unlink every entry pointing at a product that was deleted.
    pub fn record_deleted(&mut self, product_id: WcProductId) -> Vec<ItemCode> {
        let mut cleared = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.wc_product_id == Some(product_id) {
                entry.wc_product_id = None;
                entry.status = MappingStatus::Unmatched;
                cleared.push(entry.erp_item_code.clone());
            }
        }
        cleared
    }
}
