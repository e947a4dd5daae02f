//! Prefab resolution.
//!
//! A prefab is an entity carrying [`Builtin::PREFAB`]. Putting a prefab's
//! handle into a type links every entity of that type to it: components the
//! entity lacks are read from the prefab, and components added to the
//! entity are seeded with the prefab's values. Prefabs can have prefabs of
//! their own. Prefab rows are always read from the main stage.

use tracing::warn;

use crate::component::Builtin;
use crate::entity::Entity;
use crate::error::StoreError;
use crate::stage::{StageRef, TableRef};
use crate::types::TypeId;
use crate::world::World;

impl World {
    /// Create a prefab entity with `type_id` plus the prefab tag.
    pub fn new_prefab(&mut self, type_id: TypeId) -> Result<Entity, StoreError> {
        let prefab_t = self.types.intern(&[Builtin::PREFAB]);
        let full = self.types.merge(type_id, prefab_t, TypeId::EMPTY)?;
        self.new_entity(full)
    }

    /// Returns `true` if `entity` is committed as a prefab.
    pub fn is_prefab(&self, entity: Entity) -> Result<bool, StoreError> {
        match self.main.index.get(entity) {
            Some(row) => self.types.has_component(row.type_id, Builtin::PREFAB),
            None => Ok(false),
        }
    }

    /// The direct prefab named by `type_id`, if any.
    pub fn prefab_of(&self, type_id: TypeId) -> Result<Option<Entity>, StoreError> {
        let components = self.types.components(type_id)?;
        self.prefab_in(components)
    }

    fn prefab_in(&self, components: &[Entity]) -> Result<Option<Entity>, StoreError> {
        let mut found: Option<Entity> = None;
        for &component in components {
            if !Builtin::is_inheritable(component) || !self.is_prefab(component)? {
                continue;
            }
            if let Some(first) = found {
                return Err(StoreError::MultiplePrefabs {
                    first,
                    second: component,
                });
            }
            found = Some(component);
        }
        Ok(found)
    }

    /// Record a step along a prefab chain, failing on a revisit or when the
    /// chain exceeds the configured depth.
    pub(crate) fn visit_prefab(
        &self,
        visited: &mut Vec<Entity>,
        prefab: Entity,
    ) -> Result<(), StoreError> {
        if visited.contains(&prefab) || visited.len() >= self.config.max_prefab_depth {
            warn!(%prefab, depth = visited.len(), "prefab chain loops");
            return Err(StoreError::PrefabCycle(prefab));
        }
        visited.push(prefab);
        Ok(())
    }

    /// Whether `components` holds all (`match_all`) or any of `wanted`,
    /// counting components supplied by the prefab chain.
    pub(crate) fn components_contain(
        &self,
        components: &[Entity],
        wanted: &[Entity],
        match_all: bool,
    ) -> Result<bool, StoreError> {
        for &component in wanted {
            let found = components.binary_search(&component).is_ok()
                || (Builtin::is_inheritable(component)
                    && self.inherits(components, component)?);
            if found != match_all {
                return Ok(found);
            }
        }
        Ok(match_all)
    }

    fn inherits(&self, components: &[Entity], component: Entity) -> Result<bool, StoreError> {
        let mut visited = Vec::new();
        let mut prefab = self.prefab_in(components)?;
        while let Some(current) = prefab {
            self.visit_prefab(&mut visited, current)?;
            let Some(row) = self.main.index.get(current) else {
                return Ok(false);
            };
            let prefab_components = self.types.components(row.type_id)?;
            if prefab_components.binary_search(&component).is_ok() {
                return Ok(true);
            }
            prefab = self.prefab_in(prefab_components)?;
        }
        Ok(false)
    }

    /// Seed rows `[offset, offset + limit)` of `table` with prefab values for
    /// the components of `to_add`, walking the chain from `entity_type`.
    ///
    /// The nearest prefab that has a component supplies it.
    pub(crate) fn copy_from_prefab(
        &mut self,
        table: TableRef,
        entity_type: TypeId,
        offset: usize,
        limit: usize,
        to_add: TypeId,
    ) -> Result<(), StoreError> {
        let mut pending: Vec<Entity> = self
            .types
            .components(to_add)?
            .iter()
            .copied()
            .filter(|&c| Builtin::is_inheritable(c) && self.components.size_of(c) > 0)
            .collect();
        let mut visited = Vec::new();
        let mut current_type = entity_type;

        while !pending.is_empty() {
            let Some(prefab) = self.prefab_of(current_type)? else {
                break;
            };
            self.visit_prefab(&mut visited, prefab)?;
            let Some(prefab_row) = self.main.index.get(prefab) else {
                break;
            };
            let Some(prefab_table) = self.main.tables.get(prefab_row.type_id) else {
                break;
            };

            let mut defaults = Vec::new();
            pending.retain(|&component| match prefab_table.get_bytes(prefab_row.index, component) {
                Some(bytes) => {
                    defaults.push((component, bytes.to_vec()));
                    false
                }
                None => true,
            });

            if let Some(target) = self.table_mut(table) {
                for (component, bytes) in &defaults {
                    if let Some(column) = target.column_mut(*component) {
                        column.fill(offset..offset + limit, bytes);
                    }
                }
            }
            current_type = prefab_row.type_id;
        }
        Ok(())
    }

    /// Seed `entity`'s current row in `stage` with prefab values.
    ///
    /// The row is looked up again because add observers may have migrated it.
    /// A staged row only names the staged additions, so when it links no
    /// prefab the committed type is walked instead.
    pub(crate) fn apply_prefab_defaults(
        &mut self,
        entity: Entity,
        stage: StageRef,
        to_add: TypeId,
    ) -> Result<(), StoreError> {
        let Some(row) = self.stage(stage).and_then(|s| s.index.get(entity)) else {
            return Ok(());
        };
        let mut entity_type = row.type_id;
        if stage != StageRef::Main && self.prefab_of(entity_type)?.is_none() {
            if let Some(main_row) = self.main.index.get(entity) {
                entity_type = main_row.type_id;
            }
        }
        let table = TableRef {
            stage,
            type_id: row.type_id,
        };
        self.copy_from_prefab(table, entity_type, row.index, 1, to_add)
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};

    use super::*;
    use crate::component::Component;
    use crate::config::WorldConfig;

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

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    struct Mass(f32);

    impl Component for Mass {
        fn type_name() -> &'static str {
            "Mass"
        }
    }

    #[test]
    fn test_instance_reads_prefab_value() {
        let mut world = World::new();
        let position = world.component::<Position>().unwrap();
        let position_t = world.type_id(&[position]);

        let prefab = world.new_prefab(position_t).unwrap();
        world.set(prefab, Position { x: 1.0, y: 2.0 }).unwrap();

        let instance_t = world.type_id(&[prefab]);
        let instance = world.new_entity(instance_t).unwrap();

        assert_eq!(world.prefab_of(instance_t).unwrap(), Some(prefab));
        assert_eq!(
            world.get::<Position>(instance).unwrap(),
            Some(Position { x: 1.0, y: 2.0 })
        );
        assert!(world.has(instance, position_t).unwrap());

        // A local value shadows the prefab and stops tracking it.
        world.set(instance, Position { x: 5.0, y: 6.0 }).unwrap();
        world.set(prefab, Position { x: 9.0, y: 9.0 }).unwrap();
        assert_eq!(
            world.get::<Position>(instance).unwrap(),
            Some(Position { x: 5.0, y: 6.0 })
        );
    }

    #[test]
    fn test_prefab_tag_is_not_inherited() {
        let mut world = World::new();
        let prefab = world.new_prefab(TypeId::EMPTY).unwrap();
        let instance_t = world.type_id(&[prefab]);
        let instance = world.new_entity(instance_t).unwrap();

        let prefab_t = world.type_id(&[Builtin::PREFAB]);
        assert!(world.has(prefab, prefab_t).unwrap());
        assert!(!world.has(instance, prefab_t).unwrap());
        assert!(!world.is_prefab(instance).unwrap());
    }

    #[test]
    fn test_add_seeds_value_from_prefab_chain() {
        let mut world = World::new();
        let position = world.component::<Position>().unwrap();
        let mass = world.component::<Mass>().unwrap();
        let position_t = world.type_id(&[position]);
        let mass_t = world.type_id(&[mass]);

        let base = world.new_prefab(TypeId::EMPTY).unwrap();
        world.set(base, Position { x: 1.0, y: 1.0 }).unwrap();
        world.set(base, Mass(10.0)).unwrap();

        // `derived` overrides Mass but inherits Position from `base`.
        let base_t = world.type_id(&[base]);
        let derived = world.new_prefab(base_t).unwrap();
        world.set(derived, Mass(20.0)).unwrap();

        let instance_t = world.type_id(&[derived]);
        let instance = world.new_entity(instance_t).unwrap();
        world.add(instance, position_t).unwrap();
        world.add(instance, mass_t).unwrap();

        let row = world.main_row(instance).unwrap();
        let table = world.table(TableRef::main(row.type_id)).unwrap();
        assert_eq!(
            table.get::<Position>(row.index, position),
            Some(Position { x: 1.0, y: 1.0 })
        );
        assert_eq!(table.get::<Mass>(row.index, mass), Some(Mass(20.0)));
    }

    #[test]
    fn test_staged_add_seeds_from_committed_prefab() {
        let mut world = World::new();
        let mass = world.component::<Mass>().unwrap();
        let mass_t = world.type_id(&[mass]);

        let prefab = world.new_prefab(TypeId::EMPTY).unwrap();
        world.set(prefab, Mass(7.0)).unwrap();
        let instance_t = world.type_id(&[prefab]);
        let instance = world.new_entity(instance_t).unwrap();

        // The staged row only holds Mass, so the committed type names the prefab.
        world.begin_iteration().unwrap();
        world.add(instance, mass_t).unwrap();
        let staged = world.active_row(instance).unwrap();
        assert_eq!(staged.type_id, mass_t);
        let table = world
            .table(TableRef {
                stage: StageRef::Working(0),
                type_id: mass_t,
            })
            .unwrap();
        assert_eq!(table.get::<Mass>(staged.index, mass), Some(Mass(7.0)));
        assert_eq!(world.get::<Mass>(instance).unwrap(), Some(Mass(7.0)));

        world.end_iteration().unwrap();
        let row = world.main_row(instance).unwrap();
        assert_eq!(row.type_id, world.type_id(&[prefab, mass]));
        let table = world.table(TableRef::main(row.type_id)).unwrap();
        assert_eq!(table.get::<Mass>(row.index, mass), Some(Mass(7.0)));
    }

    #[test]
    fn test_prefab_created_while_iterating_is_not_visible_until_merged() {
        let mut world = World::new();
        let mass = world.component::<Mass>().unwrap();
        let mass_t = world.type_id(&[mass]);

        world.begin_iteration().unwrap();
        let prefab = world.new_prefab(mass_t).unwrap();
        world.set(prefab, Mass(5.0)).unwrap();
        let instance_t = world.type_id(&[prefab, mass]);
        let instance = world.new_entity(instance_t).unwrap();

        assert!(!world.is_prefab(prefab).unwrap());
        assert_eq!(world.prefab_of(instance_t).unwrap(), None);
        assert_eq!(world.get::<Mass>(instance).unwrap(), Some(Mass(0.0)));

        world.end_iteration().unwrap();
        assert!(world.is_prefab(prefab).unwrap());
        assert_eq!(world.prefab_of(instance_t).unwrap(), Some(prefab));
        assert_eq!(world.get::<Mass>(prefab).unwrap(), Some(Mass(5.0)));
        // The instance keeps the value its own row was created with.
        assert_eq!(world.get::<Mass>(instance).unwrap(), Some(Mass(0.0)));
    }

    #[test]
    fn test_staged_delete_still_reads_inherited_value() {
        let mut world = World::new();
        let position = world.component::<Position>().unwrap();
        let position_t = world.type_id(&[position]);

        let prefab = world.new_prefab(position_t).unwrap();
        world.set(prefab, Position { x: 1.0, y: 2.0 }).unwrap();
        let instance_t = world.type_id(&[prefab]);
        let instance = world.new_entity(instance_t).unwrap();

        world.begin_iteration().unwrap();
        world.delete(instance).unwrap();
        assert!(!world.has(instance, position_t).unwrap());
        assert!(world.is_empty(instance).unwrap());
        assert_eq!(
            world.get::<Position>(instance).unwrap(),
            Some(Position { x: 1.0, y: 2.0 })
        );

        world.end_iteration().unwrap();
        assert_eq!(world.main_row(instance), None);
        assert_eq!(world.get::<Position>(instance).unwrap(), None);
    }

    #[test]
    fn test_prefab_cycle_is_reported() {
        let mut world = World::with_config(WorldConfig::new().with_max_prefab_depth(8));
        let mass = world.component::<Mass>().unwrap();

        let a = world.new_prefab(TypeId::EMPTY).unwrap();
        let b = world.new_prefab(TypeId::EMPTY).unwrap();
        let a_t = world.type_id(&[a]);
        let b_t = world.type_id(&[b]);
        world.add(a, b_t).unwrap();
        world.add(b, a_t).unwrap();

        let instance = world.new_entity(a_t).unwrap();
        assert!(matches!(
            world.get_bytes(instance, mass),
            Err(StoreError::PrefabCycle(_))
        ));
    }

    #[test]
    fn test_two_prefabs_in_one_type_is_rejected() {
        let mut world = World::new();
        let mass = world.component::<Mass>().unwrap();
        let a = world.new_prefab(TypeId::EMPTY).unwrap();
        let b = world.new_prefab(TypeId::EMPTY).unwrap();
        let both = world.type_id(&[a, b]);
        let instance = world.new_entity(both).unwrap();

        assert_eq!(
            world.get_bytes(instance, mass),
            Err(StoreError::MultiplePrefabs { first: a, second: b })
        );
    }
}
