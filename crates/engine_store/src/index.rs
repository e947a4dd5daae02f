//! Entity → row mapping, one per stage.

use std::collections::HashMap;

use crate::entity::Entity;
use crate::types::TypeId;

/// An entity's position inside the table of its type.
///
/// A row index is invalidated by any operation that migrates or deletes the
/// row, so it must not be held across such calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Row {
    pub type_id: TypeId,
    pub index: usize,
}

impl Row {
    /// The null row. Working stages store it for entities whose staged type
    /// is empty but which still have pending state to merge.
    pub const NULL: Row = Row {
        type_id: TypeId::EMPTY,
        index: 0,
    };

    #[must_use]
    pub const fn new(type_id: TypeId, index: usize) -> Self {
        Self { type_id, index }
    }

    /// Returns `true` for a row that points at no table.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.type_id.is_empty()
    }
}

/// Maps entities to rows.
#[derive(Debug, Default, Clone)]
pub struct EntityIndex {
    rows: HashMap<Entity, Row>,
}

impl EntityIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity's row. Null entries read as absent.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<Row> {
        self.rows.get(&entity).copied().filter(|row| !row.is_null())
    }

    /// The raw entry, null rows included.
    #[must_use]
    pub fn entry(&self, entity: Entity) -> Option<Row> {
        self.rows.get(&entity).copied()
    }

    /// Returns `true` if the entity has an entry, even a null one.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.rows.contains_key(&entity)
    }

    pub fn set(&mut self, entity: Entity, row: Row) {
        self.rows.insert(entity, row);
    }

    pub fn remove(&mut self, entity: Entity) -> Option<Row> {
        self.rows.remove(&entity)
    }

    /// Every entry sorted by entity, so merges are deterministic.
    #[must_use]
    pub fn sorted_entries(&self) -> Vec<(Entity, Row)> {
        let mut entries: Vec<(Entity, Row)> =
            self.rows.iter().map(|(&e, &row)| (e, row)).collect();
        entries.sort_unstable_by_key(|&(e, _)| e);
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
