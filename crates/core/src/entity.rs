//! Entity trait: identity + continuity across state changes.
//!
//! Sub-entities owned by an aggregate (family relations, signatures, fiscal
//! periods) implement this so lookup inside the aggregate stays uniform.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Find a sub-entity by id within an aggregate-owned collection.
pub fn find_by_id<'a, E: Entity>(items: &'a [E], id: &E::Id) -> Option<&'a E> {
    items.iter().find(|e| e.id() == id)
}

/// Position of a sub-entity by id, for removal.
pub fn position_by_id<E: Entity>(items: &[E], id: &E::Id) -> Option<usize> {
    items.iter().position(|e| e.id() == id)
}
