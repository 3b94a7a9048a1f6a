//! Catalog reconciliation domain (ERPNext items vs WooCommerce products).
//!
//! This crate contains the business rules of the sync, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).
//!
//! - `record`, `price`, `text`, `image`: normalized per-pass snapshots and comparison rules
//! - `mapping`: persisted item ↔ product links and the operator override layer
//! - `diff`: classification into create / update / delete
//! - `result`: per-bulk-action outcome accounting

pub mod diff;
pub mod image;
pub mod mapping;
pub mod price;
pub mod record;
pub mod result;
pub mod text;

pub use diff::{
    Adoption, BucketCounts, ChangedField, CreatePlan, CreateReason, DeletePlan, DiffEngine,
    PreviewReasons, PreviewResult, SyncPlan, UpdatePlan, UpdateReason,
};
pub use mapping::{
    MappingDocument, MappingEntry, MappingSet, MappingStatus, OverrideEntry, SCHEMA_VERSION,
};
pub use price::{Price, PriceTolerance};
pub use record::{
    GhostPolicy, ImageRef, ItemRecord, ProductDraft, ProductRecord, ProductStatus,
    TrashedStatusPolicy,
};
pub use result::{ItemOutcome, SyncAction, SyncResult};
