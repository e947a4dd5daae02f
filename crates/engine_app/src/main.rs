//! # engine_app: storage demo
//!
//! Drives a few scripted frames through `engine_store`:
//!
//! 1. Register components and an add observer.
//! 2. Create a prefab and bulk-create instances linked to it.
//! 3. Run the frame loop, which stages writes and deletes across working
//!    stages and merges them at the end of each frame.

mod frame;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use frame::{FrameConfig, FrameLoop, Position, Velocity};

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    info!("storage demo starting");

    let mut frame_loop = FrameLoop::new(FrameConfig::default())?;
    let world = frame_loop.world_mut();
    let position = world.component_id::<Position>()?;
    let velocity = world.component_id::<Velocity>()?;

    // Instances start from the prefab's velocity.
    let moving_t = world.type_id(&[position, velocity]);
    let prefab = world.new_prefab(moving_t)?;
    world.set(prefab, Velocity { x: 40.0, y: 0.0 })?;
    let instance_t = world.type_id(&[prefab, position, velocity]);

    // Count how many add notifications one bulk creation produces.
    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    world.on_add(instance_t, move |_, trigger| {
        counter.fetch_add(1, Ordering::SeqCst);
        info!(rows = trigger.rows.len(), "instances added");
    });

    let instances = world.new_w_count(instance_t, 4)?;
    for (i, &entity) in instances.iter().enumerate() {
        world.set(entity, Position { x: 0.0, y: i as f32 })?;
    }
    // One instance slows down with a local override.
    world.set(instances[0], Velocity { x: 10.0, y: 0.0 })?;

    info!(
        instances = instances.len(),
        notifications = notifications.load(Ordering::SeqCst),
        "spawned instances"
    );

    let total = frame_loop.run()?;
    info!(moved = total.moved, despawned = total.despawned, "frames complete");

    let world = frame_loop.world();
    for &entity in &instances {
        match world.get::<Position>(entity)? {
            Some(p) => info!(%entity, x = p.x, y = p.y, "survivor"),
            None => info!(%entity, "despawned"),
        }
    }

    info!(entities = world.entity_count(), "storage demo shut down");
    Ok(())
}
