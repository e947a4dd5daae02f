//! Iteration control and stage merging.

use tracing::{debug, trace, warn};

use crate::entity::Entity;
use crate::error::StoreError;
use crate::index::Row;
use crate::stage::{ExecutionMode, Stage, StageRef};
use crate::types::TypeId;
use crate::world::World;

impl World {
    /// Start an iteration. Structural changes go to working stage 0 until
    /// another stage is selected.
    pub fn begin_iteration(&mut self) -> Result<(), StoreError> {
        match self.mode {
            ExecutionMode::Iterating { .. } => Err(StoreError::IterationActive),
            ExecutionMode::Merging => Err(StoreError::WhileMerging),
            ExecutionMode::Idle => {
                self.mode = ExecutionMode::Iterating { stage: 0 };
                trace!("iteration started");
                Ok(())
            }
        }
    }

    /// Route subsequent structural changes to working stage `stage`.
    pub fn select_stage(&mut self, stage: usize) -> Result<(), StoreError> {
        if !self.mode.is_iterating() {
            return Err(StoreError::NotIterating);
        }
        if stage >= self.stages.len() {
            return Err(StoreError::NoSuchStage {
                stage,
                count: self.stages.len(),
            });
        }
        self.mode = ExecutionMode::Iterating { stage };
        Ok(())
    }

    /// Leave the iteration and merge every working stage.
    pub fn end_iteration(&mut self) -> Result<(), StoreError> {
        if !self.mode.is_iterating() {
            return Err(StoreError::NotIterating);
        }
        self.mode = ExecutionMode::Idle;
        trace!("iteration ended");
        self.merge()
    }

    /// Fold every working stage into the main stage, in stage order.
    pub fn merge(&mut self) -> Result<(), StoreError> {
        match self.mode {
            ExecutionMode::Merging => {
                warn!("merge requested while merging");
                return Err(StoreError::WhileMerging);
            }
            ExecutionMode::Iterating { .. } => return Err(StoreError::MergeWhileIterating),
            ExecutionMode::Idle => {}
        }

        self.mode = ExecutionMode::Merging;
        let mut result = Ok(());
        for stage in 0..self.stages.len() {
            result = self.merge_stage(stage);
            if result.is_err() {
                break;
            }
        }
        self.mode = ExecutionMode::Idle;
        result
    }

    fn merge_stage(&mut self, stage: usize) -> Result<(), StoreError> {
        if self.stages[stage].is_clean() {
            return Ok(());
        }
        let mut working = std::mem::take(&mut self.stages[stage]);
        let entries = working.index.sorted_entries();

        let mut result = Ok(());
        for &(entity, staged) in &entries {
            result = self.merge_entity(entity, staged, &working);
            if result.is_err() {
                break;
            }
        }
        debug!(
            stage,
            entities = entries.len(),
            removed = working.remove_delta.len(),
            "merged stage"
        );

        working.clear();
        self.stages[stage] = working;
        result
    }

    /// Commit one staged entity to the main stage.
    ///
    /// The merged type starts from the committed type, applies the staged
    /// additions and subtracts everything removed while staged. Staged
    /// values are then copied over the committed ones.
    fn merge_entity(&mut self, entity: Entity, staged: Row, working: &Stage) -> Result<(), StoreError> {
        let main_row = self.main.index.get(entity);
        let main_type = main_row.map_or(TypeId::EMPTY, |row| row.type_id);
        let removed = working.remove_delta.get(entity);
        let merged = self.types.merge(main_type, staged.type_id, removed)?;

        let new_index =
            self.commit_w_type(entity, StageRef::Main, main_row, merged, TypeId::EMPTY, removed)?;

        if let Some(index) = new_index {
            if staged.is_null() {
                return Ok(());
            }
            if let (Some(dst), Some(src)) = (
                self.main.tables.get_mut(merged),
                working.tables.get(staged.type_id),
            ) {
                dst.copy_row_from(index, src, staged.index);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

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
    struct Health(u32);

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[test]
    fn test_mode_transitions() {
        let mut world = World::new();
        assert_eq!(world.end_iteration(), Err(StoreError::NotIterating));
        assert_eq!(world.select_stage(0), Err(StoreError::NotIterating));

        world.begin_iteration().unwrap();
        assert_eq!(world.begin_iteration(), Err(StoreError::IterationActive));
        assert_eq!(world.merge(), Err(StoreError::MergeWhileIterating));
        assert_eq!(
            world.select_stage(3),
            Err(StoreError::NoSuchStage { stage: 3, count: 1 })
        );

        world.end_iteration().unwrap();
        assert_eq!(world.mode(), ExecutionMode::Idle);
    }

    #[test]
    fn test_staged_add_is_isolated_until_merge() {
        let mut world = World::new();
        let position = world.component::<Position>().unwrap();
        let position_t = world.type_id(&[position]);
        let e = world.new_entity(TypeId::EMPTY).unwrap();

        world.begin_iteration().unwrap();
        world.add(e, position_t).unwrap();
        world.set(e, Position { x: 3.0, y: 4.0 }).unwrap();

        // Read-your-writes in the stage, nothing committed yet.
        assert!(world.has(e, position_t).unwrap());
        assert_eq!(world.get::<Position>(e).unwrap(), Some(Position { x: 3.0, y: 4.0 }));
        assert_eq!(world.main_row(e), None);

        world.end_iteration().unwrap();
        assert_eq!(world.main_row(e).map(|row| row.type_id), Some(position_t));
        assert_eq!(world.get::<Position>(e).unwrap(), Some(Position { x: 3.0, y: 4.0 }));
        assert!(world.stage(StageRef::Working(0)).unwrap().is_clean());
    }

    #[test]
    fn test_staged_set_overwrites_committed_value() {
        let mut world = World::new();
        let e = world.new_entity(TypeId::EMPTY).unwrap();
        world.component::<Health>().unwrap();
        world.set(e, Health(10)).unwrap();

        world.begin_iteration().unwrap();
        world.set(e, Health(7)).unwrap();
        assert_eq!(world.get::<Health>(e).unwrap(), Some(Health(7)));
        world.end_iteration().unwrap();

        assert_eq!(world.get::<Health>(e).unwrap(), Some(Health(7)));
    }

    #[test]
    fn test_staged_add_of_committed_component_resets_value() {
        let mut world = World::new();
        let health = world.component::<Health>().unwrap();
        let health_t = world.type_id(&[health]);
        let e = world.new_entity(TypeId::EMPTY).unwrap();
        world.set(e, Health(10)).unwrap();

        // The staged row starts zeroed and replaces the committed value.
        world.begin_iteration().unwrap();
        world.add(e, health_t).unwrap();
        assert_eq!(world.get::<Health>(e).unwrap(), Some(Health(0)));

        world.end_iteration().unwrap();
        assert_eq!(world.main_row(e).map(|row| row.type_id), Some(health_t));
        assert_eq!(world.get::<Health>(e).unwrap(), Some(Health(0)));
    }

    #[test]
    fn test_staged_delete() {
        let mut world = World::new();
        let position = world.component::<Position>().unwrap();
        let position_t = world.type_id(&[position]);
        let e = world.new_entity(position_t).unwrap();

        world.begin_iteration().unwrap();
        world.delete(e).unwrap();
        assert!(world.main_row(e).is_some());
        assert_eq!(world.type_of(e).unwrap(), TypeId::EMPTY);
        assert!(world.is_empty(e).unwrap());
        assert_eq!(world.get::<Position>(e).unwrap(), None);

        world.end_iteration().unwrap();
        assert_eq!(world.main_row(e), None);
        assert!(world.table(crate::stage::TableRef::main(position_t)).unwrap().is_empty());
    }

    #[test]
    fn test_staged_remove_of_committed_component() {
        let mut world = World::new();
        let position = world.component::<Position>().unwrap();
        let health = world.component::<Health>().unwrap();
        let position_t = world.type_id(&[position]);
        let both = world.type_id(&[position, health]);
        let e = world.new_entity(both).unwrap();
        world.set(e, Health(3)).unwrap();

        world.begin_iteration().unwrap();
        world.remove(e, position_t).unwrap();
        assert!(!world.has(e, position_t).unwrap());
        assert_eq!(world.get::<Position>(e).unwrap(), None);
        assert_eq!(world.main_row(e).map(|row| row.type_id), Some(both));

        world.end_iteration().unwrap();
        let health_t = world.type_id(&[health]);
        assert_eq!(world.type_of(e).unwrap(), health_t);
        assert_eq!(world.get::<Health>(e).unwrap(), Some(Health(3)));
    }

    #[test]
    fn test_remove_then_add_while_staged_keeps_component() {
        let mut world = World::new();
        let health = world.component::<Health>().unwrap();
        let health_t = world.type_id(&[health]);
        let e = world.new_entity(health_t).unwrap();

        world.begin_iteration().unwrap();
        world.remove(e, health_t).unwrap();
        world.add(e, health_t).unwrap();
        world.end_iteration().unwrap();

        assert!(world.has(e, health_t).unwrap());
    }

    #[test]
    fn test_remove_observer_fires_once_at_merge() {
        let mut world = World::new();
        let health = world.component::<Health>().unwrap();
        let health_t = world.type_id(&[health]);

        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&calls);
        world.on_remove(health_t, move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        let e = world.new_entity(health_t).unwrap();
        world.begin_iteration().unwrap();
        world.remove(e, health_t).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        world.end_iteration().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stages_merge_independently() {
        let mut world = World::with_config(WorldConfig::new().with_working_stages(2));
        let position = world.component::<Position>().unwrap();
        let health = world.component::<Health>().unwrap();
        let position_t = world.type_id(&[position]);
        let a = world.new_entity(TypeId::EMPTY).unwrap();
        let b = world.new_entity(TypeId::EMPTY).unwrap();

        world.begin_iteration().unwrap();
        world.set(a, Position { x: 1.0, y: 0.0 }).unwrap();
        world.select_stage(1).unwrap();
        world.set(b, Health(5)).unwrap();
        world.add(b, position_t).unwrap();

        // Stage 1 does not see stage 0's work.
        assert!(!world.has(a, position_t).unwrap());
        world.end_iteration().unwrap();

        let both = world.type_id(&[position, health]);
        assert_eq!(world.type_of(a).unwrap(), position_t);
        assert_eq!(world.type_of(b).unwrap(), both);
        assert_eq!(world.get::<Position>(a).unwrap(), Some(Position { x: 1.0, y: 0.0 }));
        assert_eq!(world.get::<Health>(b).unwrap(), Some(Health(5)));
    }

    #[test]
    fn test_entity_created_while_staged() {
        let mut world = World::new();
        let health = world.component::<Health>().unwrap();
        let health_t = world.type_id(&[health]);

        world.begin_iteration().unwrap();
        let created = world.new_w_count(health_t, 3).unwrap();
        world.set(created[2], Health(9)).unwrap();
        assert!(created.iter().all(|&e| world.main_row(e).is_none()));
        world.end_iteration().unwrap();

        for &e in &created {
            assert!(world.has(e, health_t).unwrap());
        }
        assert_eq!(world.get::<Health>(created[2]).unwrap(), Some(Health(9)));
    }
}
