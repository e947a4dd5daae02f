//! Stages and the execution mode that selects between them.
//!
//! The main stage holds committed state. While an iteration is active,
//! structural changes go to a working stage instead: its own index, its own
//! tables for staged rows, and a delta of components removed mid-iteration.
//! A merge folds a working stage back into the main stage.

use std::collections::HashMap;

use crate::entity::Entity;
use crate::index::EntityIndex;
use crate::table::TableStore;
use crate::types::TypeId;

/// Which stage a table or row lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRef {
    Main,
    Working(usize),
}

/// Addresses one table: the stage that owns it and its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub stage: StageRef,
    pub type_id: TypeId,
}

impl TableRef {
    #[must_use]
    pub const fn main(type_id: TypeId) -> Self {
        Self {
            stage: StageRef::Main,
            type_id,
        }
    }
}

/// What the world is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Structural changes apply to the main stage directly.
    #[default]
    Idle,
    /// An iteration is active; changes are staged in `stage`.
    Iterating { stage: usize },
    /// A merge is being applied. Structural operations are rejected.
    Merging,
}

impl ExecutionMode {
    #[must_use]
    pub fn is_iterating(self) -> bool {
        matches!(self, Self::Iterating { .. })
    }

    #[must_use]
    pub fn is_merging(self) -> bool {
        matches!(self, Self::Merging)
    }

    /// The stage structural changes are routed to.
    #[must_use]
    pub fn stage(self) -> StageRef {
        match self {
            Self::Iterating { stage } => StageRef::Working(stage),
            Self::Idle | Self::Merging => StageRef::Main,
        }
    }
}

/// Components removed from entities while staged.
///
/// The staged row only knows what was added during the iteration, so the
/// removals have to be remembered separately to compute the merged type.
#[derive(Debug, Default, Clone)]
pub struct StagingDelta {
    removed: HashMap<Entity, TypeId>,
}

impl StagingDelta {
    /// Components removed from `entity`, or the empty type.
    #[must_use]
    pub fn get(&self, entity: Entity) -> TypeId {
        self.removed.get(&entity).copied().unwrap_or(TypeId::EMPTY)
    }

    pub fn set(&mut self, entity: Entity, removed: TypeId) {
        if removed.is_empty() {
            self.removed.remove(&entity);
        } else {
            self.removed.insert(entity, removed);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.removed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }

    pub fn clear(&mut self) {
        self.removed.clear();
    }
}

/// One entity-index view plus the tables its rows live in.
#[derive(Debug, Default)]
pub struct Stage {
    pub index: EntityIndex,
    pub tables: TableStore,
    pub remove_delta: StagingDelta,
}

impl Stage {
    /// Returns `true` when there is nothing to merge.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.index.is_empty() && self.remove_delta.is_empty()
    }

    /// Forget all staged state.
    pub fn clear(&mut self) {
        self.index.clear();
        self.tables.clear();
        self.remove_delta.clear();
    }
}
