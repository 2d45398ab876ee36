//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Requisitions, purchase orders, GRNs, inventory records and dispatch lines
/// are all entities: two records with the same id are the same record, even
/// when their quantities differ.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Find an entity in a slice by id.
pub fn find_by_id<'a, E: Entity>(entities: &'a [E], id: &E::Id) -> Option<&'a E> {
    entities.iter().find(|e| e.id() == id)
}
