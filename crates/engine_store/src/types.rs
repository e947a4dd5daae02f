//! Interned component sets.
//!
//! A type is a sorted, deduplicated set of component ids. Interning gives
//! each distinct set one [`TypeId`]; two ids are equal iff their sets are.
//! Ascending id order inside a type is an invariant the row copier and the
//! table column layout depend on.

use std::collections::HashMap;

use crate::entity::Entity;
use crate::error::StoreError;

/// An interned identifier for a component set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeId(pub u32);

impl TypeId {
    /// The empty type. Entities with this type have no row.
    pub const EMPTY: TypeId = TypeId(0);

    /// Returns `true` for the empty type.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Type({})", self.0)
    }
}

/// Owns every interned type.
#[derive(Debug)]
pub struct TypeStore {
    types: Vec<Vec<Entity>>,
    lookup: HashMap<Vec<Entity>, TypeId>,
}

impl TypeStore {
    /// Create a store holding only the empty type.
    #[must_use]
    pub fn new() -> Self {
        let mut lookup = HashMap::new();
        lookup.insert(Vec::new(), TypeId::EMPTY);
        Self {
            types: vec![Vec::new()],
            lookup,
        }
    }

    /// Intern a set of components. Order and duplicates in `components` do
    /// not matter.
    pub fn intern(&mut self, components: &[Entity]) -> TypeId {
        let mut sorted = components.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        self.intern_sorted(sorted)
    }

    fn intern_sorted(&mut self, sorted: Vec<Entity>) -> TypeId {
        if let Some(&id) = self.lookup.get(&sorted) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(sorted.clone());
        self.lookup.insert(sorted, id);
        id
    }

    /// The sorted components of `type_id`.
    pub fn components(&self, type_id: TypeId) -> Result<&[Entity], StoreError> {
        self.types
            .get(type_id.0 as usize)
            .map(Vec::as_slice)
            .ok_or(StoreError::UnknownType(type_id))
    }

    /// `base ∪ add \ remove`, without interning the result.
    pub fn merge_components(
        &self,
        base: TypeId,
        add: TypeId,
        remove: TypeId,
    ) -> Result<Vec<Entity>, StoreError> {
        let union = union_sorted(self.components(base)?, self.components(add)?);
        Ok(difference_sorted(&union, self.components(remove)?))
    }

    /// `base ∪ add \ remove`, interned.
    pub fn merge(
        &mut self,
        base: TypeId,
        add: TypeId,
        remove: TypeId,
    ) -> Result<TypeId, StoreError> {
        if add.is_empty() && remove.is_empty() {
            self.components(base)?;
            return Ok(base);
        }
        let merged = self.merge_components(base, add, remove)?;
        Ok(self.intern_sorted(merged))
    }

    /// Whether `type_id` holds all (`match_all`) or any of the components of
    /// `sub`. An empty `sub` is always contained.
    pub fn contains(
        &self,
        type_id: TypeId,
        sub: TypeId,
        match_all: bool,
    ) -> Result<bool, StoreError> {
        let components = self.components(type_id)?;
        let wanted = self.components(sub)?;
        if wanted.is_empty() {
            return Ok(true);
        }
        let mut found = wanted
            .iter()
            .map(|component| components.binary_search(component).is_ok());
        Ok(if match_all {
            found.all(|hit| hit)
        } else {
            found.any(|hit| hit)
        })
    }

    /// Whether `type_id` holds `component`.
    pub fn has_component(&self, type_id: TypeId, component: Entity) -> Result<bool, StoreError> {
        Ok(self.index_of(type_id, component)?.is_some())
    }

    /// Position of `component` inside `type_id`, which is also its column
    /// index in the type's table.
    pub fn index_of(&self, type_id: TypeId, component: Entity) -> Result<Option<usize>, StoreError> {
        Ok(self.components(type_id)?.binary_search(&component).ok())
    }

    /// The one component a single-component type names.
    pub fn single_component_of(&self, type_id: TypeId) -> Result<Entity, StoreError> {
        match self.components(type_id)? {
            [component] => Ok(*component),
            other => Err(StoreError::NotASingleComponent {
                type_id,
                count: other.len(),
            }),
        }
    }

    /// Number of interned types, the empty type included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always `false`: the empty type is interned at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Union of two ascending slices.
pub(crate) fn union_sorted(a: &[Entity], b: &[Entity]) -> Vec<Entity> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Elements of ascending `a` that are not in ascending `b`.
pub(crate) fn difference_sorted(a: &[Entity], b: &[Entity]) -> Vec<Entity> {
    if b.is_empty() {
        return a.to_vec();
    }
    a.iter()
        .copied()
        .filter(|component| b.binary_search(component).is_err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_order_independent() {
        let mut types = TypeStore::new();
        let a = types.intern(&[Entity(5), Entity(2), Entity(9)]);
        let b = types.intern(&[Entity(9), Entity(5), Entity(2), Entity(5)]);
        assert_eq!(a, b);
        assert_eq!(
            types.components(a).unwrap(),
            &[Entity(2), Entity(5), Entity(9)]
        );
    }

    #[test]
    fn test_empty_set_is_empty_type() {
        let mut types = TypeStore::new();
        assert_eq!(types.intern(&[]), TypeId::EMPTY);
        assert!(types.components(TypeId::EMPTY).unwrap().is_empty());
    }

    #[test]
    fn test_merge_adds_then_removes() {
        let mut types = TypeStore::new();
        let base = types.intern(&[Entity(1), Entity(3)]);
        let add = types.intern(&[Entity(2), Entity(4)]);
        let remove = types.intern(&[Entity(3), Entity(4)]);

        let merged = types.merge(base, add, remove).unwrap();
        assert_eq!(types.components(merged).unwrap(), &[Entity(1), Entity(2)]);
        assert_eq!(types.merge(base, TypeId::EMPTY, TypeId::EMPTY).unwrap(), base);
    }

    #[test]
    fn test_contains_all_and_any() {
        let mut types = TypeStore::new();
        let t = types.intern(&[Entity(1), Entity(2)]);
        let both = types.intern(&[Entity(1), Entity(2)]);
        let mixed = types.intern(&[Entity(2), Entity(7)]);

        assert!(types.contains(t, both, true).unwrap());
        assert!(!types.contains(t, mixed, true).unwrap());
        assert!(types.contains(t, mixed, false).unwrap());
        assert!(types.contains(t, TypeId::EMPTY, true).unwrap());
    }

    #[test]
    fn test_single_component_of() {
        let mut types = TypeStore::new();
        let one = types.intern(&[Entity(7)]);
        let two = types.intern(&[Entity(7), Entity(8)]);

        assert_eq!(types.single_component_of(one).unwrap(), Entity(7));
        assert_eq!(
            types.single_component_of(two),
            Err(StoreError::NotASingleComponent {
                type_id: two,
                count: 2
            })
        );
        assert!(types.single_component_of(TypeId::EMPTY).is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let types = TypeStore::new();
        assert_eq!(
            types.components(TypeId(42)),
            Err(StoreError::UnknownType(TypeId(42)))
        );
    }
}
