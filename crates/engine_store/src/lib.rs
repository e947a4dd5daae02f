//! # engine_store
//!
//! Entity storage for an archetype ECS: entities are grouped into tables by
//! their exact component set, and every structural change moves a row from
//! one table to another.
//!
//! This crate provides:
//!
//! - [`World`]: the storage context (entity index, tables, observers and
//!   execution mode) with the create / add / remove / delete / clone / set
//!   operations.
//! - [`TypeStore`]: interned, sorted component sets ([`TypeId`]).
//! - [`Table`] / [`Column`]: column storage for one type, with merge-join
//!   row copies between tables.
//! - [`EntityIndex`]: entity → [`Row`] mapping, one per [`Stage`].
//! - Staging: while an iteration is active, structural changes are buffered
//!   in working stages and merged into the main stage afterwards.
//! - Prefabs: entities that supply default component values to instances
//!   linked to them.
//! - Observers: add / remove / set callbacks keyed by exact type.

mod commit;
pub mod component;
pub mod config;
pub mod copy;
pub mod entity;
pub mod error;
pub mod index;
mod merge;
pub mod observer;
mod prefab;
pub mod stage;
pub mod table;
pub mod types;
pub mod world;

pub use component::{Builtin, Component, ComponentMeta, ComponentRegistry};
pub use config::WorldConfig;
pub use entity::{Entity, EntityAllocator};
pub use error::StoreError;
pub use index::{EntityIndex, Row};
pub use observer::{Event, Observer, ObserverIndex, Trigger};
pub use stage::{ExecutionMode, Stage, StageRef, StagingDelta, TableRef};
pub use table::{Column, Table, TableStore};
pub use types::{TypeId, TypeStore};
pub use world::World;
