//! Entity trait: identity + continuity across snapshots.

/// Entity marker + minimal interface.
///
/// Catalog records are re-fetched on every pass; the identifier is what ties a
/// record in one snapshot to the same record in the next.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
