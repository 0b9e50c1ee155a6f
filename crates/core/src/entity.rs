//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Billing records (products, clients, invoices) implement this so record
/// stores can key them without knowing their concrete type.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
