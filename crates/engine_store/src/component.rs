//! Component trait, built-in tags, and size metadata.
//!
//! Components are entities. Registering a component records its name and
//! element size so tables can lay out columns; any other entity used inside
//! a type (a prefab, a parent) is a tag with size 0.

use std::collections::HashMap;

use bytemuck::Pod;

use crate::entity::Entity;

/// The core component trait.
///
/// Component data is moved between tables with plain byte copies, so every
/// component must be plain old data.
///
/// # Examples
///
/// ```rust
/// use bytemuck::{Pod, Zeroable};
/// use engine_store::Component;
///
/// #[repr(C)]
/// #[derive(Debug, Clone, Copy, Pod, Zeroable)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: Pod + 'static {
    /// A human-readable, world-unique name for this component type.
    fn type_name() -> &'static str;
}

/// Handles reserved for the built-in tags. They are allocated first by every
/// world, so the values are stable.
pub struct Builtin;

impl Builtin {
    /// Marks entities that are registered components.
    pub const COMPONENT: Entity = Entity(1);
    /// Marks prefab (template) entities.
    pub const PREFAB: Entity = Entity(2);
    /// Marks entities that have adopted children.
    pub const CONTAINER: Entity = Entity(3);

    pub(crate) const ALL: [(Entity, &'static str); 3] = [
        (Self::COMPONENT, "Component"),
        (Self::PREFAB, "Prefab"),
        (Self::CONTAINER, "Container"),
    ];

    /// Returns `true` if `component` may be supplied by a prefab.
    ///
    /// The tags that say what an entity *is* never come from its prefab.
    #[must_use]
    pub fn is_inheritable(component: Entity) -> bool {
        component != Self::COMPONENT && component != Self::PREFAB
    }
}

/// Metadata about a registered component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMeta {
    /// The component's entity handle.
    pub id: Entity,
    /// The registered name.
    pub name: String,
    /// Size of one element in bytes (0 for tags).
    pub size: usize,
}

/// Name and size lookup for registered components.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_id: HashMap<Entity, ComponentMeta>,
    by_name: HashMap<String, Entity>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as the component called `name`.
    pub fn register(&mut self, id: Entity, name: impl Into<String>, size: usize) {
        let name = name.into();
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(id, ComponentMeta { id, name, size });
    }

    /// Look up a component by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Entity> {
        self.by_name.get(name).copied()
    }

    /// Metadata for a registered component.
    #[must_use]
    pub fn meta(&self, id: Entity) -> Option<&ComponentMeta> {
        self.by_id.get(&id)
    }

    /// Element size of `id`. Unregistered entities are tags.
    #[must_use]
    pub fn size_of(&self, id: Entity) -> usize {
        self.by_id.get(&id).map_or(0, |meta| meta.size)
    }

    /// Number of registered components, built-ins included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ComponentRegistry::new();
        registry.register(Entity(10), "Position", 8);

        assert_eq!(registry.lookup("Position"), Some(Entity(10)));
        assert_eq!(registry.size_of(Entity(10)), 8);
        assert_eq!(registry.meta(Entity(10)).unwrap().name, "Position");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregistered_entity_is_a_tag() {
        let registry = ComponentRegistry::new();
        assert_eq!(registry.size_of(Entity(99)), 0);
        assert!(registry.lookup("Velocity").is_none());
    }

    #[test]
    fn test_identity_tags_are_not_inheritable() {
        assert!(!Builtin::is_inheritable(Builtin::PREFAB));
        assert!(!Builtin::is_inheritable(Builtin::COMPONENT));
        assert!(Builtin::is_inheritable(Builtin::CONTAINER));
        assert!(Builtin::is_inheritable(Entity(42)));
    }
}
