//! Scripted frame loop.
//!
//! Each frame runs one iteration over every moving entity:
//!
//! 1. Begin an iteration.
//! 2. Spread the entities over the working stages.
//! 3. Integrate velocity into position, staging the writes.
//! 4. Despawn entities that left the arena (staged delete).
//! 5. End the iteration, merging every stage into the main stage.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use tracing::{debug, info};

use engine_store::{Builtin, Component, Entity, StageRef, World, WorldConfig};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// Configuration for the frame loop.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Number of frames to run.
    pub frames: u64,
    /// Seconds per frame.
    pub dt: f32,
    /// Entities farther than this from the origin on either axis despawn.
    pub arena: f32,
    /// Working stages to spread entities over.
    pub working_stages: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frames: 3,
            dt: 1.0,
            arena: 100.0,
            working_stages: 2,
        }
    }
}

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub moved: usize,
    pub despawned: usize,
}

#[derive(Debug)]
pub struct FrameLoop {
    frame_id: u64,
    config: FrameConfig,
    world: World,
}

impl FrameLoop {
    /// Create a frame loop over a fresh world with `Position` and
    /// `Velocity` registered.
    pub fn new(config: FrameConfig) -> Result<Self> {
        let mut world =
            World::with_config(WorldConfig::new().with_working_stages(config.working_stages));
        world.component::<Position>()?;
        world.component::<Velocity>()?;
        Ok(Self {
            frame_id: 0,
            config,
            world,
        })
    }

    #[must_use]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Non-prefab entities whose committed row holds both `Position` and
    /// `Velocity`.
    fn moving_entities(&self) -> Result<Vec<Entity>> {
        let position = self.world.component_id::<Position>()?;
        let velocity = self.world.component_id::<Velocity>()?;
        let Some(main) = self.world.stage(StageRef::Main) else {
            return Ok(Vec::new());
        };
        let mut entities: Vec<Entity> = main
            .tables
            .iter()
            .filter(|table| {
                let components = table.components();
                components.contains(&position)
                    && components.contains(&velocity)
                    && !components.contains(&Builtin::PREFAB)
            })
            .flat_map(|table| table.entities().iter().copied())
            .collect();
        entities.sort_unstable();
        Ok(entities)
    }

    /// Run one frame.
    pub fn frame(&mut self) -> Result<FrameStats> {
        self.frame_id += 1;
        let entities = self.moving_entities()?;
        let mut stats = FrameStats::default();

        self.world.begin_iteration()?;
        for (i, &entity) in entities.iter().enumerate() {
            self.world.select_stage(i % self.world.stage_count())?;

            let (Some(position), Some(velocity)) = (
                self.world.get::<Position>(entity)?,
                self.world.get::<Velocity>(entity)?,
            ) else {
                continue;
            };
            let next = Position {
                x: position.x + velocity.x * self.config.dt,
                y: position.y + velocity.y * self.config.dt,
            };

            if next.x.abs() > self.config.arena || next.y.abs() > self.config.arena {
                self.world.delete(entity)?;
                stats.despawned += 1;
            } else {
                self.world.set(entity, next)?;
                stats.moved += 1;
            }
        }
        self.world.end_iteration()?;

        debug!(
            frame_id = self.frame_id,
            moved = stats.moved,
            despawned = stats.despawned,
            "frame done"
        );
        Ok(stats)
    }

    /// Run the configured number of frames.
    pub fn run(&mut self) -> Result<FrameStats> {
        info!(frames = self.config.frames, stages = self.config.working_stages, "starting frame loop");
        let mut total = FrameStats::default();
        for _ in 0..self.config.frames {
            let stats = self.frame()?;
            total.moved += stats.moved;
            total.despawned += stats.despawned;
        }
        info!(frames = self.frame_id, "frame loop complete");
        Ok(total)
    }
}
