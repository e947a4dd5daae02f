//! Entity handles and allocation.
//!
//! An [`Entity`] is an opaque `u64` identifier with no inherent data. Handles
//! are allocated monotonically by the owning world and are never reused while
//! that world lives. Components are entities too, which is what lets a prefab
//! or a parent appear inside another entity's type.

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Ordering is by numeric id. Types keep their component ids sorted by this
/// order, and row copying relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u64);

impl Entity {
    /// The null / invalid entity sentinel.
    pub const INVALID: Entity = Entity(0);

    /// Create an entity from a raw `u64` identifier.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) entity.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Returns the handle `n` positions after this one.
    #[must_use]
    pub const fn offset(self, n: u64) -> Self {
        Self(self.0 + n)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Allocates monotonically increasing entity IDs.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: u64,
}

impl EntityAllocator {
    /// Creates a new allocator. IDs start at 1 (0 is reserved for [`Entity::INVALID`]).
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocates a fresh entity ID.
    pub fn allocate(&mut self) -> Entity {
        let id = self.next_id;
        self.next_id += 1;
        Entity(id)
    }

    /// Allocates `count` contiguous IDs and returns the first one.
    pub fn allocate_range(&mut self, count: u64) -> Entity {
        let first = self.next_id;
        self.next_id += count;
        Entity(first)
    }

    /// Returns the number of entities allocated so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.next_id - 1
    }

    /// Returns `true` if `entity` was handed out by this allocator.
    #[must_use]
    pub fn is_allocated(&self, entity: Entity) -> bool {
        entity.is_valid() && entity.0 < self.next_id
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
