use crate::entity::Entity;
use crate::types::{SetOfTypes, TypeId};
use std::collections::{BTreeMap, BTreeSet};

/// Registry of the ground entities available to quantifiers and to
/// parameter enumeration, indexed by value and by exact type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOfEntities {
    by_value: BTreeMap<String, Entity>,
    by_type: BTreeMap<TypeId, BTreeSet<Entity>>,
}

impl SetOfEntities {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, entity: Entity) {
        self.by_type.entry(entity.tpe()).or_default().insert(entity.clone());
        self.by_value.insert(entity.value().to_string(), entity);
    }

    pub fn add_all(&mut self, entities: impl IntoIterator<Item = Entity>) {
        for e in entities {
            self.add(e);
        }
    }

    pub fn get(&self, value: &str) -> Option<&Entity> {
        self.by_value.get(value)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.by_value.contains_key(value)
    }

    /// All direct or indirect instances of the given type, in value order.
    pub fn instances_of_type<'a>(&'a self, types: &'a SetOfTypes, tpe: TypeId) -> impl Iterator<Item = &'a Entity> {
        self.by_type
            .iter()
            .filter(move |(t, _)| types.is_a(**t, tpe))
            .flat_map(|(_, entities)| entities.iter())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.by_value.values()
    }

    pub fn len(&self) -> usize {
        self.by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_value.is_empty()
    }
}
