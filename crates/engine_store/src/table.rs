//! Column-oriented table storage.
//!
//! A [`Table`] stores every entity of one type in struct-of-arrays layout:
//! one [`Column`] per component, in the type's ascending component order,
//! plus a parallel entity column. Row `i` of every column belongs to
//! `entities[i]`. Tags keep a column slot with no backing bytes so column
//! positions always line up with the type's component list.

use std::collections::HashMap;
use std::ops::Range;

use bytemuck::Pod;
use tracing::debug;

use crate::component::ComponentRegistry;
use crate::copy::copy_row;
use crate::entity::Entity;
use crate::error::StoreError;
use crate::types::{TypeId, TypeStore};

/// A column in a table, storing components of a single type as raw bytes.
///
/// Each element is `item_size` bytes, laid out contiguously.
#[derive(Debug, Clone)]
pub struct Column {
    /// The component stored in this column.
    pub component: Entity,
    /// Size of a single component instance in bytes.
    pub item_size: usize,
    /// Raw byte storage. Length is always `item_size * row_count`.
    pub data: Vec<u8>,
}

impl Column {
    /// Create a new empty column for the given component.
    #[must_use]
    pub fn new(component: Entity, item_size: usize) -> Self {
        Self {
            component,
            item_size,
            data: Vec::new(),
        }
    }

    /// Returns `true` if this column is a tag (no backing storage).
    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.item_size == 0
    }

    /// Append one element from its raw bytes. Returns `false` and leaves the
    /// column unchanged when `bytes` is not exactly one element long.
    pub fn push_raw(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != self.item_size {
            return false;
        }
        self.data.extend_from_slice(bytes);
        true
    }

    /// Append `count` zeroed elements.
    pub fn push_zeroed(&mut self, count: usize) {
        self.data.resize(self.data.len() + count * self.item_size, 0);
    }

    /// Get a reference to the raw bytes of the component at `index`.
    ///
    /// Tags have no bytes and always return `None`.
    #[must_use]
    pub fn get_raw(&self, index: usize) -> Option<&[u8]> {
        if self.item_size == 0 {
            return None;
        }
        let start = index * self.item_size;
        self.data.get(start..start + self.item_size)
    }

    /// Get a mutable reference to the raw bytes of the component at `index`.
    #[must_use]
    pub fn get_raw_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        if self.item_size == 0 {
            return None;
        }
        let start = index * self.item_size;
        self.data.get_mut(start..start + self.item_size)
    }

    /// Read the component at `index` as `T`.
    ///
    /// Returns `None` when the row does not exist or `T` has the wrong size.
    #[must_use]
    pub fn get<T: Pod>(&self, index: usize) -> Option<T> {
        bytemuck::try_pod_read_unaligned(self.get_raw(index)?).ok()
    }

    /// Overwrite the component at `index` with `value`. Returns `false` when
    /// the row does not exist or `T` has the wrong size.
    pub fn set<T: Pod>(&mut self, index: usize, value: T) -> bool {
        let bytes = bytemuck::bytes_of(&value);
        match self.get_raw_mut(index) {
            Some(slot) if slot.len() == bytes.len() => {
                slot.copy_from_slice(bytes);
                true
            }
            _ => false,
        }
    }

    /// Write `bytes` into every row of `rows`.
    pub fn fill(&mut self, rows: Range<usize>, bytes: &[u8]) {
        for index in rows {
            if let Some(slot) = self.get_raw_mut(index) {
                slot.copy_from_slice(bytes);
            }
        }
    }

    fn copy_within(&mut self, dst: usize, src: usize) {
        if self.item_size == 0 || dst == src {
            return;
        }
        let size = self.item_size;
        self.data.copy_within(src * size..(src + 1) * size, dst * size);
    }

    fn swap_remove(&mut self, index: usize, last: usize) {
        if self.item_size == 0 {
            return;
        }
        self.copy_within(index, last);
        self.data.truncate(last * self.item_size);
    }
}

/// The physical storage for one type.
#[derive(Debug, Clone)]
pub struct Table {
    type_id: TypeId,
    components: Vec<Entity>,
    entities: Vec<Entity>,
    columns: Vec<Column>,
}

impl Table {
    /// Create a new, empty table. `components` must be ascending and
    /// `item_sizes` parallel to it.
    #[must_use]
    pub fn new(type_id: TypeId, components: Vec<Entity>, item_sizes: &[usize]) -> Self {
        let columns = components
            .iter()
            .zip(item_sizes.iter())
            .map(|(&component, &size)| Column::new(component, size))
            .collect();

        Self {
            type_id,
            components,
            entities: Vec::new(),
            columns,
        }
    }

    /// The type this table stores.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Ascending component ids, one per column.
    #[must_use]
    pub fn components(&self) -> &[Entity] {
        &self.components
    }

    /// Entity ids in row order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The entity stored at `index`.
    #[must_use]
    pub fn entity(&self, index: usize) -> Option<Entity> {
        self.entities.get(index).copied()
    }

    /// All columns, in component order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if this table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns the column index for the given component, if present.
    #[must_use]
    pub fn column_index(&self, component: Entity) -> Option<usize> {
        self.components.binary_search(&component).ok()
    }

    /// The column storing `component`.
    #[must_use]
    pub fn column(&self, component: Entity) -> Option<&Column> {
        self.column_index(component).map(|i| &self.columns[i])
    }

    /// The column storing `component`, mutably.
    #[must_use]
    pub fn column_mut(&mut self, component: Entity) -> Option<&mut Column> {
        self.column_index(component).map(|i| &mut self.columns[i])
    }

    /// Raw bytes of `component` at row `index`.
    #[must_use]
    pub fn get_bytes(&self, index: usize, component: Entity) -> Option<&[u8]> {
        self.column(component)?.get_raw(index)
    }

    /// Read `component` at row `index` as `T`.
    #[must_use]
    pub fn get<T: Pod>(&self, index: usize, component: Entity) -> Option<T> {
        self.column(component)?.get(index)
    }

    /// Overwrite `component` at row `index`.
    pub fn set<T: Pod>(&mut self, index: usize, component: Entity, value: T) -> bool {
        self.column_mut(component)
            .is_some_and(|column| column.set(index, value))
    }

    /// Append a zeroed row for `entity` and return its index.
    pub fn insert(&mut self, entity: Entity) -> usize {
        self.grow(1, entity)
    }

    /// Append `count` zeroed rows for the contiguous handles starting at
    /// `first` and return the index of the first new row.
    pub fn grow(&mut self, count: usize, first: Entity) -> usize {
        let index = self.entities.len();
        self.entities
            .extend((0..count as u64).map(|n| first.offset(n)));
        for column in &mut self.columns {
            column.push_zeroed(count);
        }
        index
    }

    /// Remove row `index` by moving the last row into its place.
    ///
    /// Returns the entity that now occupies `index`, so the caller can fix
    /// its index entry.
    pub fn delete(&mut self, index: usize) -> Option<Entity> {
        let last = self.entities.len().checked_sub(1)?;
        if index > last {
            return None;
        }
        for column in &mut self.columns {
            column.swap_remove(index, last);
        }
        self.entities.swap_remove(index);
        (index < last).then(|| self.entities[index])
    }

    /// Copy the components shared with `src` from `src_index` into `dst_index`.
    pub fn copy_row_from(&mut self, dst_index: usize, src: &Table, src_index: usize) {
        copy_row(
            &self.components,
            &mut self.columns,
            dst_index,
            &src.components,
            &src.columns,
            src_index,
        );
    }

    fn copy_row_within(&mut self, dst_index: usize, src_index: usize) {
        for column in &mut self.columns {
            column.copy_within(dst_index, src_index);
        }
    }
}

/// Maps each type to its table. Tables live in an arena and are addressed
/// by slot, so two of them can be borrowed at once.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: Vec<Table>,
    slots: HashMap<TypeId, usize>,
}

impl TableStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The table for `type_id`, if one has been created.
    #[must_use]
    pub fn get(&self, type_id: TypeId) -> Option<&Table> {
        self.slots.get(&type_id).map(|&slot| &self.tables[slot])
    }

    /// The table for `type_id`, mutably.
    #[must_use]
    pub fn get_mut(&mut self, type_id: TypeId) -> Option<&mut Table> {
        self.slots.get(&type_id).map(|&slot| &mut self.tables[slot])
    }

    /// Return the slot of the table for `type_id`, creating it if needed.
    pub fn ensure(
        &mut self,
        type_id: TypeId,
        types: &TypeStore,
        registry: &ComponentRegistry,
    ) -> Result<usize, StoreError> {
        if let Some(&slot) = self.slots.get(&type_id) {
            return Ok(slot);
        }
        let components = types.components(type_id)?.to_vec();
        let sizes: Vec<usize> = components.iter().map(|&c| registry.size_of(c)).collect();
        debug!(%type_id, columns = components.len(), "created table");

        let slot = self.tables.len();
        self.tables.push(Table::new(type_id, components, &sizes));
        self.slots.insert(type_id, slot);
        Ok(slot)
    }

    /// Insert a row for `entity` into the table for `type_id`.
    pub fn insert(
        &mut self,
        type_id: TypeId,
        entity: Entity,
        types: &TypeStore,
        registry: &ComponentRegistry,
    ) -> Result<usize, StoreError> {
        let slot = self.ensure(type_id, types, registry)?;
        Ok(self.tables[slot].insert(entity))
    }

    /// Insert `count` rows for contiguous handles into the table for `type_id`.
    pub fn grow(
        &mut self,
        type_id: TypeId,
        count: usize,
        first: Entity,
        types: &TypeStore,
        registry: &ComponentRegistry,
    ) -> Result<usize, StoreError> {
        let slot = self.ensure(type_id, types, registry)?;
        Ok(self.tables[slot].grow(count, first))
    }

    /// Copy shared components between two rows of this store.
    pub fn copy_row(
        &mut self,
        dst_type: TypeId,
        dst_index: usize,
        src_type: TypeId,
        src_index: usize,
    ) {
        let (Some(&dst), Some(&src)) = (self.slots.get(&dst_type), self.slots.get(&src_type))
        else {
            return;
        };
        if dst == src {
            self.tables[dst].copy_row_within(dst_index, src_index);
            return;
        }
        let (dst_table, src_table) = if dst < src {
            let (head, tail) = self.tables.split_at_mut(src);
            (&mut head[dst], &tail[0])
        } else {
            let (head, tail) = self.tables.split_at_mut(dst);
            (&mut tail[0], &head[src])
        };
        dst_table.copy_row_from(dst_index, src_table, src_index);
    }

    /// Iterate over every table.
    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if no table has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Drop every table.
    pub fn clear(&mut self) {
        self.tables.clear();
        self.slots.clear();
    }
}
