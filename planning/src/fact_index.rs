use lyra_model::Fact;
use std::collections::BTreeMap;

/// Index from fact signatures to values (action or event identifiers).
///
/// Facts are bucketed by relaxed signature (predicate name) with
/// sub-indices by ground argument value per position and by ground fluent
/// value; pattern slots (parameters, wildcards) fall back to per-position
/// wildcard lists. Lookup narrows through the most selective ground
/// component of the queried fact and returns values in registration order.
#[derive(Debug, Clone)]
pub struct FactIndex<V> {
    by_name: BTreeMap<String, NameEntry<V>>,
    values_without_fact: Vec<V>,
}

#[derive(Debug, Clone)]
struct NameEntry<V> {
    all: Vec<V>,
    by_arg: Vec<SlotIndex<V>>,
    by_value: SlotIndex<V>,
}

#[derive(Debug, Clone)]
struct SlotIndex<V> {
    ground: BTreeMap<String, Vec<V>>,
    wildcard: Vec<V>,
}

impl<V> Default for SlotIndex<V> {
    fn default() -> Self {
        SlotIndex {
            ground: BTreeMap::new(),
            wildcard: Vec::new(),
        }
    }
}

impl<V> Default for FactIndex<V> {
    fn default() -> Self {
        FactIndex {
            by_name: BTreeMap::new(),
            values_without_fact: Vec::new(),
        }
    }
}

impl<V> SlotIndex<V> {
    /// Values compatible with a ground query value at this slot.
    fn candidates<'s>(&'s self, query: &str) -> Vec<&'s V> {
        let mut out: Vec<&V> = self.ground.get(query).into_iter().flatten().collect();
        out.extend(&self.wildcard);
        out
    }
}

impl<V: Clone + Eq> FactIndex<V> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, fact: &Fact, value: V) {
        let arity = fact.arguments().len();
        let entry = self.by_name.entry(fact.name().to_string()).or_insert_with(|| NameEntry {
            all: Vec::new(),
            by_arg: (0..arity).map(|_| SlotIndex::default()).collect(),
            by_value: SlotIndex::default(),
        });
        if !entry.all.contains(&value) {
            entry.all.push(value.clone());
        }
        for (pos, arg) in fact.arguments().iter().enumerate() {
            let slot = &mut entry.by_arg[pos];
            if arg.is_parameter() || arg.is_any_value() {
                slot.wildcard.push(value.clone());
            } else {
                slot.ground.entry(arg.value().to_string()).or_default().push(value.clone());
            }
        }
        match fact.value() {
            Some(v) if !v.is_parameter() && !v.is_any_value() => {
                entry.by_value.ground.entry(v.value().to_string()).or_default().push(value);
            }
            _ => entry.by_value.wildcard.push(value),
        }
    }

    /// Registers a value reachable without any fact condition.
    pub fn add_value_without_fact(&mut self, value: V) {
        if !self.values_without_fact.contains(&value) {
            self.values_without_fact.push(value);
        }
    }

    /// Erases a value everywhere.
    pub fn remove_value(&mut self, value: &V) {
        self.values_without_fact.retain(|v| v != value);
        self.by_name.retain(|_, entry| {
            entry.all.retain(|v| v != value);
            for slot in entry.by_arg.iter_mut().chain(std::iter::once(&mut entry.by_value)) {
                slot.wildcard.retain(|v| v != value);
                slot.ground.retain(|_, values| {
                    values.retain(|v| v != value);
                    !values.is_empty()
                });
            }
            !entry.all.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
        self.values_without_fact.clear();
    }

    /// Values registered under facts that could denote the same world atom
    /// as the queried fact, narrowed by its most selective ground slot.
    /// With `ignore_value` the fluent slot does not narrow the lookup.
    pub fn find(&self, fact: &Fact, ignore_value: bool) -> Vec<&V> {
        let Some(entry) = self.by_name.get(fact.name()) else {
            return Vec::new();
        };
        // pick the ground slot with the fewest compatible values
        let mut best: Option<Vec<&V>> = None;
        for (pos, arg) in fact.arguments().iter().enumerate() {
            if !arg.is_parameter() && !arg.is_any_value() {
                if let Some(slot) = entry.by_arg.get(pos) {
                    let candidates = slot.candidates(arg.value());
                    if best.as_ref().map_or(true, |b| candidates.len() < b.len()) {
                        best = Some(candidates);
                    }
                }
            }
        }
        if !ignore_value {
            if let Some(v) = fact.value() {
                if !v.is_parameter() && !v.is_any_value() {
                    let candidates = entry.by_value.candidates(v.value());
                    if best.as_ref().map_or(true, |b| candidates.len() < b.len()) {
                        best = Some(candidates);
                    }
                }
            }
        }
        match best {
            // preserve registration order and deduplicate
            Some(candidates) => entry.all.iter().filter(|v| candidates.contains(v)).collect(),
            None => entry.all.iter().collect(),
        }
    }

    pub fn values_without_fact(&self) -> &[V] {
        &self.values_without_fact
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty() && self.values_without_fact.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyra_model::{Entity, Parameter, Predicate, SetOfPredicates, SetOfTypes};

    fn fixture() -> (SetOfTypes, SetOfPredicates) {
        let mut types = SetOfTypes::new();
        let robot = types.add("robot", None).unwrap();
        let location = types.add("location", None).unwrap();
        let mut predicates = SetOfPredicates::new();
        predicates.add(Predicate::fluent(
            "at",
            vec![Parameter::new("?r", robot)],
            location,
        ));
        (types, predicates)
    }

    fn at(types: &SetOfTypes, predicates: &SetOfPredicates, r: &str, l: &str) -> Fact {
        let robot = types.get("robot").unwrap();
        let location = types.get("location").unwrap();
        Fact::new(
            types,
            predicates.get("at").unwrap(),
            vec![Entity::new(r, robot)],
            Some(Entity::new(l, location)),
        )
        .unwrap()
    }

    #[test]
    fn ground_lookup_narrows_and_wildcards_survive() {
        let (types, predicates) = fixture();
        let robot = types.get("robot").unwrap();
        let location = types.get("location").unwrap();

        let mut index: FactIndex<String> = FactIndex::new();
        index.add(&at(&types, &predicates, "bob", "kitchen"), "a1".to_string());
        index.add(&at(&types, &predicates, "alice", "kitchen"), "a2".to_string());
        let pattern = Fact::new(
            &types,
            predicates.get("at").unwrap(),
            vec![Entity::new("?r", robot)],
            Some(Entity::new("?l", location)),
        )
        .unwrap();
        index.add(&pattern, "a3".to_string());

        // only the wildcard pattern can denote at(bob)=bedroom
        let hits = index.find(&at(&types, &predicates, "bob", "bedroom"), false);
        let hits: Vec<&str> = hits.into_iter().map(|s| s.as_str()).collect();
        assert_eq!(hits, vec!["a3"]);

        // ignoring the fluent also brings back the entry bound to kitchen
        let hits = index.find(&at(&types, &predicates, "bob", "bedroom"), true);
        let hits: Vec<&str> = hits.into_iter().map(|s| s.as_str()).collect();
        assert_eq!(hits, vec!["a1", "a3"]);

        // a query with no ground slot returns everything
        assert_eq!(index.find(&pattern, false).len(), 3);
    }

    #[test]
    fn removal() {
        let (types, predicates) = fixture();
        let mut index: FactIndex<String> = FactIndex::new();
        index.add(&at(&types, &predicates, "bob", "kitchen"), "a1".to_string());
        index.add_value_without_fact("a2".to_string());
        index.remove_value(&"a1".to_string());
        assert!(index.find(&at(&types, &predicates, "bob", "kitchen"), false).is_empty());
        index.remove_value(&"a2".to_string());
        assert!(index.is_empty());
    }
}
