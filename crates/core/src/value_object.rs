//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. In this
/// workspace prices and image references are value objects: two prices with the
/// same amount are the same price, regardless of which catalog reported them.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct ImageRef { url: String }
///
/// impl ValueObject for ImageRef {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
