//! The world context and read-side lookups.
//!
//! A [`World`] owns everything the core needs: entity allocation, interned
//! types, component metadata, the main stage, the working stages, observers
//! and the execution mode. There is no global state; independent worlds do
//! not interact.
//!
//! Structural operations live in `commit.rs`, stage merging in `merge.rs`,
//! observer dispatch in `observer.rs` and prefab resolution in `prefab.rs`.

use tracing::warn;

use crate::component::{Builtin, Component, ComponentMeta, ComponentRegistry};
use crate::config::WorldConfig;
use crate::entity::{Entity, EntityAllocator};
use crate::error::StoreError;
use crate::index::Row;
use crate::observer::ObserverIndex;
use crate::stage::{ExecutionMode, Stage, StageRef, TableRef};
use crate::table::Table;
use crate::types::{difference_sorted, union_sorted, TypeId, TypeStore};

/// Where a component value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Location {
    pub table: TableRef,
    pub index: usize,
    pub column: usize,
}

/// The entity storage context.
#[derive(Debug)]
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) allocator: EntityAllocator,
    pub(crate) types: TypeStore,
    pub(crate) components: ComponentRegistry,
    pub(crate) main: Stage,
    pub(crate) stages: Vec<Stage>,
    pub(crate) observers: ObserverIndex,
    pub(crate) mode: ExecutionMode,
}

/// Pick a stage out of the world's fields without borrowing the rest.
pub(crate) fn stage_of<'a>(
    main: &'a mut Stage,
    stages: &'a mut [Stage],
    stage: StageRef,
) -> &'a mut Stage {
    match stage {
        StageRef::Main => main,
        StageRef::Working(i) => &mut stages[i],
    }
}

impl World {
    /// Create a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create a world with `config`.
    #[must_use]
    pub fn with_config(mut config: WorldConfig) -> Self {
        config.working_stages = config.working_stages.max(1);

        let mut allocator = EntityAllocator::new();
        let mut components = ComponentRegistry::new();
        for (id, name) in Builtin::ALL {
            let allocated = allocator.allocate();
            debug_assert_eq!(allocated, id);
            components.register(id, name, 0);
        }

        Self {
            stages: (0..config.working_stages).map(|_| Stage::default()).collect(),
            config,
            allocator,
            types: TypeStore::new(),
            components,
            main: Stage::default(),
            observers: ObserverIndex::default(),
            mode: ExecutionMode::Idle,
        }
    }

    /// The configuration this world was created with.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The current execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    // -- Components and types --

    /// Register `T` as a component, or return its id if already registered.
    pub fn component<T: Component>(&mut self) -> Result<Entity, StoreError> {
        self.new_component(T::type_name(), std::mem::size_of::<T>())
    }

    /// Register a component by name and element size. Registering a name
    /// twice returns the existing id.
    pub fn new_component(&mut self, name: &str, size: usize) -> Result<Entity, StoreError> {
        if let Some(id) = self.components.lookup(name) {
            return Ok(id);
        }
        let tag = self.types.intern(&[Builtin::COMPONENT]);
        let id = self.new_entity(tag)?;
        self.components.register(id, name, size);
        Ok(id)
    }

    /// The id `T` was registered under.
    pub fn component_id<T: Component>(&self) -> Result<Entity, StoreError> {
        self.components
            .lookup(T::type_name())
            .ok_or(StoreError::UnregisteredComponent(T::type_name()))
    }

    /// Element size of `component` (0 for tags and unregistered entities).
    #[must_use]
    pub fn size_of(&self, component: Entity) -> usize {
        self.components.size_of(component)
    }

    /// Metadata for a registered component.
    #[must_use]
    pub fn component_meta(&self, component: Entity) -> Option<&ComponentMeta> {
        self.components.meta(component)
    }

    /// Intern a component set.
    pub fn type_id(&mut self, components: &[Entity]) -> TypeId {
        self.types.intern(components)
    }

    /// The sorted components of `type_id`.
    pub fn type_components(&self, type_id: TypeId) -> Result<&[Entity], StoreError> {
        self.types.components(type_id)
    }

    /// The interned type store.
    #[must_use]
    pub fn types(&self) -> &TypeStore {
        &self.types
    }

    /// The single-entity type `{entity}`.
    pub fn type_from_entity(&mut self, entity: Entity) -> TypeId {
        self.types.intern(&[entity])
    }

    /// The one component named by `type_id`.
    pub fn entity_from_type(&self, type_id: TypeId) -> Result<Entity, StoreError> {
        self.types.single_component_of(type_id)
    }

    // -- Stages and tables --

    /// Number of working stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// A stage by reference.
    #[must_use]
    pub fn stage(&self, stage: StageRef) -> Option<&Stage> {
        match stage {
            StageRef::Main => Some(&self.main),
            StageRef::Working(i) => self.stages.get(i),
        }
    }

    /// A table by reference.
    #[must_use]
    pub fn table(&self, table: TableRef) -> Option<&Table> {
        self.stage(table.stage)?.tables.get(table.type_id)
    }

    /// A table by reference, mutably. Observers write row data through this.
    #[must_use]
    pub fn table_mut(&mut self, table: TableRef) -> Option<&mut Table> {
        let stage = match table.stage {
            StageRef::Main => &mut self.main,
            StageRef::Working(i) => self.stages.get_mut(i)?,
        };
        stage.tables.get_mut(table.type_id)
    }

    /// The entity's committed row.
    #[must_use]
    pub fn main_row(&self, entity: Entity) -> Option<Row> {
        self.main.index.get(entity)
    }

    /// The entity's row in the stage currently receiving changes.
    #[must_use]
    pub fn active_row(&self, entity: Entity) -> Option<Row> {
        self.stage(self.mode.stage())?.index.get(entity)
    }

    /// Number of entities with a committed row.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.main.index.len()
    }

    pub(crate) fn check_entity(&self, entity: Entity) -> Result<(), StoreError> {
        if self.allocator.is_allocated(entity) {
            Ok(())
        } else {
            Err(StoreError::InvalidEntity(entity))
        }
    }

    pub(crate) fn ensure_not_merging(&self) -> Result<(), StoreError> {
        if self.mode.is_merging() {
            warn!("structural operation rejected during merge");
            return Err(StoreError::WhileMerging);
        }
        Ok(())
    }

    // -- Lookups --

    fn find_in(&self, stage: StageRef, row: Row, component: Entity) -> Option<Location> {
        let table = self.stage(stage)?.tables.get(row.type_id)?;
        let column = table.column_index(component)?;
        if table.columns()[column].is_tag() {
            return None;
        }
        Some(Location {
            table: TableRef {
                stage,
                type_id: row.type_id,
            },
            index: row.index,
            column,
        })
    }

    /// Find the row holding `component` for `entity`.
    ///
    /// Order: the active working stage (unless the component was removed
    /// while staged), then the main stage, then the prefab chain.
    pub(crate) fn locate(
        &self,
        entity: Entity,
        component: Entity,
        staged_only: bool,
        search_prefab: bool,
        visited: &mut Vec<Entity>,
    ) -> Result<Option<Location>, StoreError> {
        let iterating = self.mode.is_iterating();
        let mut staged_type = TypeId::EMPTY;
        let mut main_type = TypeId::EMPTY;

        if let ExecutionMode::Iterating { stage } = self.mode {
            let working = &self.stages[stage];
            if let Some(row) = working.index.get(entity) {
                staged_type = row.type_id;
                if let Some(found) = self.find_in(StageRef::Working(stage), row, component) {
                    return Ok(Some(found));
                }
            }
            let removed = working.remove_delta.get(entity);
            if self.types.has_component(removed, component)? {
                return Ok(None);
            }
        }

        let search_main = !iterating || !staged_only;
        if search_main {
            if let Some(row) = self.main.index.get(entity) {
                main_type = row.type_id;
                if let Some(found) = self.find_in(StageRef::Main, row, component) {
                    return Ok(Some(found));
                }
            }
        }

        if !search_prefab || !Builtin::is_inheritable(component) {
            return Ok(None);
        }

        let mut prefab = None;
        if search_main && !main_type.is_empty() {
            prefab = self.prefab_of(main_type)?;
        }
        if prefab.is_none() && !staged_type.is_empty() {
            prefab = self.prefab_of(staged_type)?;
        }

        match prefab {
            Some(prefab) => {
                self.visit_prefab(visited, prefab)?;
                self.locate(prefab, component, staged_only, true, visited)
            }
            None => Ok(None),
        }
    }

    /// Raw bytes of `component` for `entity`, resolving through prefabs.
    ///
    /// Returns `Ok(None)` when the entity lacks the component or the
    /// component is a tag.
    ///
    /// The prefab link is taken from the committed type without consulting
    /// the stage's remove delta, so an entity deleted in the active stage
    /// still reads inherited values even though [`World::has`] reports it
    /// empty.
    pub fn get_bytes(&self, entity: Entity, component: Entity) -> Result<Option<&[u8]>, StoreError> {
        self.check_entity(entity)?;
        let Some(found) = self.locate(entity, component, false, true, &mut Vec::new())? else {
            return Ok(None);
        };
        Ok(self
            .table(found.table)
            .and_then(|table| table.columns()[found.column].get_raw(found.index)))
    }

    /// Read `T` for `entity`, resolving through prefabs.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<Option<T>, StoreError> {
        let component = self.component_id::<T>()?;
        match self.get_bytes(entity, component)? {
            Some(bytes) => bytemuck::try_pod_read_unaligned(bytes)
                .map(Some)
                .map_err(|_| StoreError::SizeMismatch {
                    component,
                    expected: bytes.len(),
                    actual: std::mem::size_of::<T>(),
                }),
            None => Ok(None),
        }
    }

    /// The entity's components as seen from the active stage: the main type
    /// with staged additions applied and staged removals subtracted.
    pub(crate) fn effective_components(&self, entity: Entity) -> Result<Vec<Entity>, StoreError> {
        let main_type = self.main.index.get(entity).map_or(TypeId::EMPTY, |row| row.type_id);
        let ExecutionMode::Iterating { stage } = self.mode else {
            return Ok(self.types.components(main_type)?.to_vec());
        };
        let working = &self.stages[stage];
        let staged_type = working.index.get(entity).map_or(TypeId::EMPTY, |row| row.type_id);
        let removed = working.remove_delta.get(entity);
        let union = union_sorted(
            self.types.components(main_type)?,
            self.types.components(staged_type)?,
        );
        Ok(difference_sorted(&union, self.types.components(removed)?))
    }

    /// The entity's type. While iterating this is the merged view.
    pub fn type_of(&mut self, entity: Entity) -> Result<TypeId, StoreError> {
        self.check_entity(entity)?;
        let components = self.effective_components(entity)?;
        Ok(self.types.intern(&components))
    }

    /// Whether `entity` has every component of `type_id`, own or inherited.
    /// The empty type is always had.
    pub fn has(&self, entity: Entity, type_id: TypeId) -> Result<bool, StoreError> {
        self.check_entity(entity)?;
        let wanted = self.types.components(type_id)?;
        if wanted.is_empty() {
            return Ok(true);
        }
        let components = self.effective_components(entity)?;
        self.components_contain(&components, wanted, true)
    }

    /// Whether `entity` has any component of `type_id`, own or inherited.
    pub fn has_any(&self, entity: Entity, type_id: TypeId) -> Result<bool, StoreError> {
        self.check_entity(entity)?;
        let wanted = self.types.components(type_id)?;
        if wanted.is_empty() {
            return Ok(true);
        }
        let components = self.effective_components(entity)?;
        self.components_contain(&components, wanted, false)
    }

    /// Whether `entity` has no components. While iterating this reflects
    /// pending staged changes.
    pub fn is_empty(&self, entity: Entity) -> Result<bool, StoreError> {
        self.check_entity(entity)?;
        Ok(self.effective_components(entity)?.is_empty())
    }

    /// The `index`-th component of the entity's row in the active stage.
    pub fn component_at(&self, entity: Entity, index: usize) -> Result<Option<Entity>, StoreError> {
        self.check_entity(entity)?;
        let Some(row) = self.active_row(entity) else {
            return Ok(None);
        };
        Ok(self.types.components(row.type_id)?.get(index).copied())
    }

    /// Whether `child` has been adopted by `parent`.
    pub fn contains(&self, parent: Entity, child: Entity) -> Result<bool, StoreError> {
        if !parent.is_valid() || !child.is_valid() {
            return Ok(false);
        }
        self.check_entity(child)?;
        let components = self.effective_components(child)?;
        self.components_contain(&components, &[parent], true)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};

    use super::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[test]
    fn test_builtins_are_reserved() {
        let world = World::new();
        assert_eq!(world.component_meta(Builtin::PREFAB).unwrap().name, "Prefab");
        assert_eq!(world.size_of(Builtin::CONTAINER), 0);
        assert_eq!(world.stage_count(), 1);
    }

    #[test]
    fn test_component_registration_is_idempotent() {
        let mut world = World::new();
        let a = world.component::<Position>().unwrap();
        let b = world.component::<Position>().unwrap();
        assert_eq!(a, b);
        assert_eq!(world.size_of(a), 8);

        let component_tag = world.type_id(&[Builtin::COMPONENT]);
        assert!(world.has(a, component_tag).unwrap());
    }

    #[test]
    fn test_unregistered_typed_get_is_an_error() {
        let mut world = World::new();
        let e = world.new_entity(TypeId::EMPTY).unwrap();
        assert_eq!(
            world.get::<Position>(e),
            Err(StoreError::UnregisteredComponent("Position"))
        );
    }

    #[test]
    fn test_invalid_handles_are_rejected() {
        let mut world = World::new();
        let position = world.component::<Position>().unwrap();
        assert_eq!(
            world.get_bytes(Entity::INVALID, position),
            Err(StoreError::InvalidEntity(Entity::INVALID))
        );
        assert!(world.has(Entity(10_000), TypeId::EMPTY).is_err());
    }

    #[test]
    fn test_empty_entity() {
        let mut world = World::new();
        let e = world.new_entity(TypeId::EMPTY).unwrap();
        assert!(e.is_valid());
        assert!(world.is_empty(e).unwrap());
        assert!(world.has(e, TypeId::EMPTY).unwrap());
        assert_eq!(world.type_of(e).unwrap(), TypeId::EMPTY);
        assert_eq!(world.component_at(e, 0).unwrap(), None);
    }

    #[test]
    fn test_type_entity_conversions() {
        let mut world = World::new();
        let position = world.component::<Position>().unwrap();
        let t = world.type_from_entity(position);
        assert_eq!(world.entity_from_type(t).unwrap(), position);
        assert!(matches!(
            world.entity_from_type(TypeId::EMPTY),
            Err(StoreError::NotASingleComponent { count: 0, .. })
        ));
        assert_eq!(
            world.entity_from_type(TypeId(999)),
            Err(StoreError::UnknownType(TypeId(999)))
        );
    }
}
