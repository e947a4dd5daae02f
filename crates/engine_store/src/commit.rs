//! Structural mutation.
//!
//! Every operation that changes an entity's composition reduces to
//! [`World::commit_w_type`]: move the entity's row to the table of a target
//! type, copy shared component data across, update the stage's index and
//! fire observers. While an iteration is active the work lands in the
//! current working stage and is folded into the main stage by a merge.

use tracing::{debug, trace, warn};

use crate::component::{Builtin, Component};
use crate::entity::Entity;
use crate::error::StoreError;
use crate::index::Row;
use crate::observer::Event;
use crate::stage::{StageRef, TableRef};
use crate::types::TypeId;
use crate::world::{stage_of, World};

impl World {
    /// Move `entity` to `current ∪ to_add \ to_remove` in the active stage.
    ///
    /// Returns the entity's new row index, or `None` when its type became
    /// empty. Committing to the type the entity already has is a no-op.
    pub fn commit(
        &mut self,
        entity: Entity,
        to_add: TypeId,
        to_remove: TypeId,
    ) -> Result<Option<usize>, StoreError> {
        self.check_entity(entity)?;
        self.ensure_not_merging()?;
        let stage = self.mode.stage();
        let current = self.stage(stage).and_then(|s| s.index.get(entity));
        let current_type = current.map_or(TypeId::EMPTY, |row| row.type_id);
        let target = self.types.merge(current_type, to_add, to_remove)?;
        self.commit_w_type(entity, stage, current, target, to_add, to_remove)
    }

    /// Move `entity` from `current` to a row of `target` in `stage`.
    ///
    /// `to_add` and `to_remove` select the observers to fire and, in a
    /// working stage, are accumulated into the stage's remove delta.
    pub(crate) fn commit_w_type(
        &mut self,
        entity: Entity,
        stage: StageRef,
        current: Option<Row>,
        target: TypeId,
        to_add: TypeId,
        to_remove: TypeId,
    ) -> Result<Option<usize>, StoreError> {
        let staged = stage != StageRef::Main;
        if staged {
            let removed = self
                .stage(stage)
                .map_or(TypeId::EMPTY, |s| s.remove_delta.get(entity));
            let removed = self.types.merge(removed, to_remove, to_add)?;
            stage_of(&mut self.main, &mut self.stages, stage)
                .remove_delta
                .set(entity, removed);
        }

        if let Some(row) = current {
            if row.type_id == target {
                return Ok(Some(row.index));
            }
        }
        let current_type = current.map_or(TypeId::EMPTY, |row| row.type_id);
        trace!(
            %entity,
            from = %current_type,
            to = %target,
            ?stage,
            "commit"
        );

        let target_stage = stage_of(&mut self.main, &mut self.stages, stage);
        let new_index = if target.is_empty() {
            None
        } else {
            let index = target_stage
                .tables
                .insert(target, entity, &self.types, &self.components)?;
            if let Some(old) = current {
                target_stage
                    .tables
                    .copy_row(target, index, old.type_id, old.index);
            }
            Some(index)
        };

        match new_index {
            Some(index) => target_stage.index.set(entity, Row::new(target, index)),
            None if staged => target_stage.index.set(entity, Row::NULL),
            None => {
                target_stage.index.remove(entity);
            }
        }

        if let Some(old) = current {
            if !staged && !to_remove.is_empty() {
                let old_table = TableRef {
                    stage,
                    type_id: old.type_id,
                };
                self.notify_post_merge(to_remove, old_table, old.index, 1);
            }
            self.delete_row(stage, old, entity);
        }

        if let Some(index) = new_index {
            if !to_add.is_empty() {
                let table = TableRef {
                    stage,
                    type_id: target,
                };
                self.notify_pre_merge(Event::Add, to_add, table, index, 1)?;
                self.apply_prefab_defaults(entity, stage, to_add)?;
            }
        }
        Ok(new_index)
    }

    /// Swap-remove `row` if it still holds `entity`, and repoint the entity
    /// that moved into its place.
    fn delete_row(&mut self, stage: StageRef, row: Row, entity: Entity) {
        let owner = stage_of(&mut self.main, &mut self.stages, stage);
        let Some(table) = owner.tables.get_mut(row.type_id) else {
            return;
        };
        if table.entity(row.index) != Some(entity) {
            return;
        }
        if let Some(moved) = table.delete(row.index) {
            owner.index.set(moved, row);
        }
    }

    /// Copy the components two rows share, possibly across stages.
    pub(crate) fn copy_between(
        &mut self,
        dst: TableRef,
        dst_index: usize,
        src: TableRef,
        src_index: usize,
    ) {
        if dst.stage == src.stage {
            stage_of(&mut self.main, &mut self.stages, dst.stage)
                .tables
                .copy_row(dst.type_id, dst_index, src.type_id, src_index);
            return;
        }
        let (dst_table, src_table) = match (dst.stage, src.stage) {
            (StageRef::Working(i), StageRef::Main) => (
                self.stages
                    .get_mut(i)
                    .and_then(|s| s.tables.get_mut(dst.type_id)),
                self.main.tables.get(src.type_id),
            ),
            (StageRef::Main, StageRef::Working(i)) => (
                self.main.tables.get_mut(dst.type_id),
                self.stages.get(i).and_then(|s| s.tables.get(src.type_id)),
            ),
            // Working stages never exchange rows with each other.
            _ => return,
        };
        if let (Some(dst_table), Some(src_table)) = (dst_table, src_table) {
            dst_table.copy_row_from(dst_index, src_table, src_index);
        }
    }

    // -- Creation --

    /// Create an entity with `type_id`. The empty type creates a handle
    /// without a row.
    pub fn new_entity(&mut self, type_id: TypeId) -> Result<Entity, StoreError> {
        self.ensure_not_merging()?;
        self.types.components(type_id)?;
        let entity = self.allocator.allocate();
        if !type_id.is_empty() {
            let stage = self.mode.stage();
            self.commit_w_type(entity, stage, None, type_id, type_id, TypeId::EMPTY)?;
        }
        Ok(entity)
    }

    /// Create `count` entities of `type_id` with contiguous handles in one
    /// table. Add observers are notified once for the whole row range.
    pub fn new_w_count(&mut self, type_id: TypeId, count: usize) -> Result<Vec<Entity>, StoreError> {
        self.ensure_not_merging()?;
        self.types.components(type_id)?;
        let first = self.allocator.allocate_range(count as u64);
        let entities: Vec<Entity> = (0..count as u64).map(|n| first.offset(n)).collect();
        if type_id.is_empty() || count == 0 {
            return Ok(entities);
        }

        let stage = self.mode.stage();
        let target = stage_of(&mut self.main, &mut self.stages, stage);
        let row = target
            .tables
            .grow(type_id, count, first, &self.types, &self.components)?;
        for (offset, &entity) in entities.iter().enumerate() {
            target.index.set(entity, Row::new(type_id, row + offset));
        }
        debug!(%type_id, %first, count, ?stage, "bulk created entities");

        let table = TableRef { stage, type_id };
        self.notify_pre_merge(Event::Add, type_id, table, row, count)?;

        // Observers may have migrated some of the rows.
        if self.rows_in_place(stage, &entities, type_id, row) {
            self.copy_from_prefab(table, type_id, row, count, type_id)?;
        } else {
            for &entity in &entities {
                self.apply_prefab_defaults(entity, stage, type_id)?;
            }
        }
        Ok(entities)
    }

    fn rows_in_place(&self, stage: StageRef, entities: &[Entity], type_id: TypeId, first: usize) -> bool {
        let Some(owner) = self.stage(stage) else {
            return false;
        };
        entities
            .iter()
            .enumerate()
            .all(|(offset, &entity)| owner.index.get(entity) == Some(Row::new(type_id, first + offset)))
    }

    /// Create an entity of `type_id` contained by `parent`.
    ///
    /// `parent` is tagged as a container if it is not one yet. An invalid
    /// parent creates a plain entity.
    pub fn new_child(&mut self, parent: Entity, type_id: TypeId) -> Result<Entity, StoreError> {
        if !parent.is_valid() {
            return self.new_entity(type_id);
        }
        self.mark_container(parent)?;
        let parent_t = self.types.intern(&[parent]);
        let full = self.types.merge(type_id, parent_t, TypeId::EMPTY)?;
        self.new_entity(full)
    }

    /// Create a new entity with the committed type of `entity`.
    ///
    /// With `copy_value` the component values are copied as well and set
    /// observers fire for the clone's full type. The clone shares no storage
    /// with the source. An entity without a committed row clones to a bare
    /// handle.
    pub fn clone(&mut self, entity: Entity, copy_value: bool) -> Result<Entity, StoreError> {
        self.check_entity(entity)?;
        self.ensure_not_merging()?;
        let result = self.allocator.allocate();
        let Some(source) = self.main.index.get(entity) else {
            return Ok(result);
        };
        let type_id = source.type_id;
        let stage = self.mode.stage();
        self.commit_w_type(result, stage, None, type_id, type_id, TypeId::EMPTY)?;

        if copy_value {
            // Add observers may have moved either row.
            let Some(src_row) = self.main.index.get(entity) else {
                return Ok(result);
            };
            let Some(dst_row) = self.stage(stage).and_then(|s| s.index.get(result)) else {
                return Ok(result);
            };
            let dst = TableRef {
                stage,
                type_id: dst_row.type_id,
            };
            self.copy_between(dst, dst_row.index, TableRef::main(src_row.type_id), src_row.index);
            self.notify_pre_merge(Event::Set, type_id, dst, dst_row.index, 1)?;
        }
        Ok(result)
    }

    // -- Mutation --

    /// Delete `entity` and all of its components. Deleting an entity that
    /// has no row is a no-op.
    ///
    /// While iterating, the entity's committed components are marked removed
    /// and its staged additions are discarded; the main row goes at merge.
    pub fn delete(&mut self, entity: Entity) -> Result<(), StoreError> {
        self.check_entity(entity)?;
        self.ensure_not_merging()?;

        if let StageRef::Working(i) = self.mode.stage() {
            let main_type = self.main.index.get(entity).map_or(TypeId::EMPTY, |row| row.type_id);
            let stage = StageRef::Working(i);
            if let Some(staged) = self.stages[i].index.get(entity) {
                self.delete_row(stage, staged, entity);
            }
            let working = &mut self.stages[i];
            working.remove_delta.set(entity, main_type);
            working.index.set(entity, Row::NULL);
            debug!(%entity, stage = i, "staged delete");
            return Ok(());
        }

        let Some(row) = self.main.index.get(entity) else {
            return Ok(());
        };
        self.commit_w_type(entity, StageRef::Main, Some(row), TypeId::EMPTY, TypeId::EMPTY, row.type_id)?;
        self.main.index.remove(entity);
        Ok(())
    }

    /// Add the components of `type_id` to `entity`.
    pub fn add(&mut self, entity: Entity, type_id: TypeId) -> Result<(), StoreError> {
        self.commit(entity, type_id, TypeId::EMPTY).map(|_| ())
    }

    /// Remove the components of `type_id` from `entity`.
    pub fn remove(&mut self, entity: Entity, type_id: TypeId) -> Result<(), StoreError> {
        self.commit(entity, TypeId::EMPTY, type_id).map(|_| ())
    }

    fn mark_container(&mut self, parent: Entity) -> Result<(), StoreError> {
        let container_t = self.types.intern(&[Builtin::CONTAINER]);
        if !self.has(parent, container_t)? {
            self.add(parent, container_t)?;
        }
        Ok(())
    }

    /// Make `child` a child of `parent`.
    pub fn adopt(&mut self, parent: Entity, child: Entity) -> Result<(), StoreError> {
        self.check_entity(parent)?;
        self.check_entity(child)?;
        self.ensure_not_merging()?;
        self.mark_container(parent)?;
        let parent_t = self.types.intern(&[parent]);
        self.add(child, parent_t)
    }

    /// Detach `child` from `parent`.
    pub fn orphan(&mut self, parent: Entity, child: Entity) -> Result<(), StoreError> {
        self.check_entity(parent)?;
        let parent_t = self.types.intern(&[parent]);
        self.remove(child, parent_t)
    }

    /// Write the raw value of `component` for `entity`, adding the component
    /// first if the entity lacks it.
    ///
    /// If an add observer removes the component again before the write, the
    /// call does nothing and still returns `entity`.
    pub fn set_bytes(&mut self, entity: Entity, component: Entity, bytes: &[u8]) -> Result<Entity, StoreError> {
        self.check_entity(entity)?;
        self.ensure_not_merging()?;
        if self.config.validate_set_size {
            let expected = self.components.size_of(component);
            if expected != bytes.len() {
                return Err(StoreError::SizeMismatch {
                    component,
                    expected,
                    actual: bytes.len(),
                });
            }
        }

        let mut found = self.locate(entity, component, true, false, &mut Vec::new())?;
        if found.is_none() {
            let component_t = self.types.intern(&[component]);
            self.commit(entity, component_t, TypeId::EMPTY)?;
            found = self.locate(entity, component, true, false, &mut Vec::new())?;
        }
        let Some(found) = found else {
            trace!(%entity, %component, "set skipped, component removed by observer");
            return Ok(entity);
        };

        let slot = self
            .table_mut(found.table)
            .and_then(|table| table.column_mut(component))
            .and_then(|column| column.get_raw_mut(found.index));
        if let Some(slot) = slot {
            if slot.len() != bytes.len() {
                warn!(
                    %entity,
                    %component,
                    expected = slot.len(),
                    actual = bytes.len(),
                    "set payload size mismatch, writing the common prefix"
                );
            }
            let len = slot.len().min(bytes.len());
            slot[..len].copy_from_slice(&bytes[..len]);
        }

        let component_t = self.types.intern(&[component]);
        self.notify_pre_merge(Event::Set, component_t, found.table, found.index, 1)?;
        Ok(entity)
    }

    /// Write `value` as the entity's `T`, adding `T` first if needed.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> Result<Entity, StoreError> {
        let component = self.component_id::<T>()?;
        self.set_bytes(entity, component, bytemuck::bytes_of(&value))
    }
}
