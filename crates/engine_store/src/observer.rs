//! Observers and notification dispatch.
//!
//! Observers are registered against an exact type id, separately for add,
//! remove and set events. One dispatch call hands every observer of the list
//! the table and a contiguous row range, so bulk creation notifies once for
//! the whole range.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use tracing::trace;

use crate::entity::Entity;
use crate::error::StoreError;
use crate::stage::{ExecutionMode, TableRef};
use crate::types::TypeId;
use crate::world::World;

/// The kind of change an observer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Add,
    Remove,
    Set,
}

/// What an observer is told about a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub event: Event,
    /// The exact type the observer was registered for.
    pub type_id: TypeId,
    /// The table the affected rows live in.
    pub table: TableRef,
    /// The affected rows, `[offset, offset + limit)`.
    pub rows: Range<usize>,
    /// The entities in `rows`, in row order.
    pub entities: Vec<Entity>,
}

/// An observer callback. It may read and write the affected rows through
/// [`World::table_mut`]; structural operations it issues from an add or set
/// observer are staged, from a remove observer they are rejected.
pub type Observer = Arc<dyn Fn(&mut World, &Trigger) + Send + Sync>;

/// Observer lists keyed by exact type, one map per event kind.
#[derive(Default)]
pub struct ObserverIndex {
    add: HashMap<TypeId, Vec<Observer>>,
    remove: HashMap<TypeId, Vec<Observer>>,
    set: HashMap<TypeId, Vec<Observer>>,
}

impl ObserverIndex {
    fn lists(&self, event: Event) -> &HashMap<TypeId, Vec<Observer>> {
        match event {
            Event::Add => &self.add,
            Event::Remove => &self.remove,
            Event::Set => &self.set,
        }
    }

    /// Append `observer` to the list for `event` on `type_id`.
    pub fn register(&mut self, event: Event, type_id: TypeId, observer: Observer) {
        let lists = match event {
            Event::Add => &mut self.add,
            Event::Remove => &mut self.remove,
            Event::Set => &mut self.set,
        };
        lists.entry(type_id).or_default().push(observer);
    }

    /// The observers for `event` on exactly `type_id`, in registration order.
    #[must_use]
    pub fn observers(&self, event: Event, type_id: TypeId) -> Vec<Observer> {
        self.lists(event).get(&type_id).cloned().unwrap_or_default()
    }

    /// Number of observers registered for `event`.
    #[must_use]
    pub fn count(&self, event: Event) -> usize {
        self.lists(event).values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for ObserverIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverIndex")
            .field("add", &self.count(Event::Add))
            .field("remove", &self.count(Event::Remove))
            .field("set", &self.count(Event::Set))
            .finish()
    }
}

impl World {
    /// Observe additions of exactly `type_id`.
    pub fn on_add<F>(&mut self, type_id: TypeId, observer: F)
    where
        F: Fn(&mut World, &Trigger) + Send + Sync + 'static,
    {
        self.observers.register(Event::Add, type_id, Arc::new(observer));
    }

    /// Observe removals of exactly `type_id`.
    pub fn on_remove<F>(&mut self, type_id: TypeId, observer: F)
    where
        F: Fn(&mut World, &Trigger) + Send + Sync + 'static,
    {
        self.observers.register(Event::Remove, type_id, Arc::new(observer));
    }

    /// Observe `set` calls on exactly `type_id`.
    pub fn on_set<F>(&mut self, type_id: TypeId, observer: F)
    where
        F: Fn(&mut World, &Trigger) + Send + Sync + 'static,
    {
        self.observers.register(Event::Set, type_id, Arc::new(observer));
    }

    /// Invoke every observer registered for `event` on `type_id` with rows
    /// `[offset, offset + limit)` of `table`. Returns whether any ran.
    pub(crate) fn notify(
        &mut self,
        event: Event,
        type_id: TypeId,
        table: TableRef,
        offset: usize,
        limit: usize,
    ) -> bool {
        let observers = self.observers.observers(event, type_id);
        if observers.is_empty() {
            return false;
        }

        let entities = self
            .table(table)
            .and_then(|t| t.entities().get(offset..offset + limit))
            .map(<[Entity]>::to_vec)
            .unwrap_or_default();
        let trigger = Trigger {
            event,
            type_id,
            table,
            rows: offset..offset + limit,
            entities,
        };
        trace!(?event, %type_id, rows = limit, observers = observers.len(), "notify");

        for observer in &observers {
            observer(self, &trigger);
        }
        true
    }

    /// Dispatch add or set observers.
    ///
    /// Observers run as if iterating so their structural changes are staged.
    /// If no iteration was active and any observer ran, the staged changes
    /// are merged right away. Nothing runs while merging.
    pub(crate) fn notify_pre_merge(
        &mut self,
        event: Event,
        type_id: TypeId,
        table: TableRef,
        offset: usize,
        limit: usize,
    ) -> Result<bool, StoreError> {
        if self.mode.is_merging() {
            return Ok(false);
        }

        let previous = self.mode;
        if !previous.is_iterating() {
            self.mode = ExecutionMode::Iterating { stage: 0 };
        }
        let notified = self.notify(event, type_id, table, offset, limit);
        self.mode = previous;

        if notified && !previous.is_iterating() {
            self.merge()?;
        }
        Ok(notified)
    }

    /// Dispatch remove observers. They only run outside an iteration, and
    /// run in merging mode so they cannot change structure.
    pub(crate) fn notify_post_merge(
        &mut self,
        type_id: TypeId,
        table: TableRef,
        offset: usize,
        limit: usize,
    ) -> bool {
        if self.mode.is_iterating() {
            return false;
        }

        let previous = self.mode;
        self.mode = ExecutionMode::Merging;
        let notified = self.notify(Event::Remove, type_id, table, offset, limit);
        self.mode = previous;
        notified
    }
}
