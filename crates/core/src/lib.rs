//! `woosync-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the catalog model,
//! the infrastructure adapters and the admin API (no IO, no HTTP).

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ItemCode, RunId, Sku, WcProductId};
pub use value_object::ValueObject;
