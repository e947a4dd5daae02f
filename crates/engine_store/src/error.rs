//! Storage error types.
//!
//! Every variant is a programming error on the caller's side. Absent
//! components and no-op mutations are reported as values, not errors.

use crate::entity::Entity;
use crate::types::TypeId;

/// Errors returned by world operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The handle is null or was never allocated by this world.
    #[error("invalid entity handle: {0}")]
    InvalidEntity(Entity),

    /// A structural operation was attempted while a merge is being applied.
    #[error("structural operation attempted while merging")]
    WhileMerging,

    /// A merge was requested while an iteration is still active.
    #[error("merge requested while an iteration is active")]
    MergeWhileIterating,

    /// An iteration was started while one is already active.
    #[error("an iteration is already active")]
    IterationActive,

    /// A stage operation was issued outside an iteration.
    #[error("no iteration is active")]
    NotIterating,

    /// The working stage index is out of range.
    #[error("working stage {stage} does not exist ({count} configured)")]
    NoSuchStage { stage: usize, count: usize },

    /// The type id was never interned.
    #[error("unknown type id: {0}")]
    UnknownType(TypeId),

    /// A single-component conversion was requested on a type that names
    /// zero or several components.
    #[error("{type_id} names {count} components, expected exactly one")]
    NotASingleComponent { type_id: TypeId, count: usize },

    /// A typed accessor was used before the component was registered.
    #[error("component '{0}' is not registered")]
    UnregisteredComponent(&'static str),

    /// A `set` payload does not match the component's registered size.
    #[error("size mismatch for {component}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        component: Entity,
        expected: usize,
        actual: usize,
    },

    /// A type names more than one direct prefab.
    #[error("type names more than one prefab: {first} and {second}")]
    MultiplePrefabs { first: Entity, second: Entity },

    /// A prefab chain revisits a prefab or exceeds the configured depth.
    #[error("prefab chain loops or is too deep at {0}")]
    PrefabCycle(Entity),
}
