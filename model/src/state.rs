use crate::fact::{Fact, FactOptional};
use crate::types::SetOfTypes;
use im::{OrdMap, OrdSet};

/// Triple-indexed store of the facts currently true.
///
/// Backed by persistent containers so that the copies taken by the planner
/// when simulating plans share structure with the live state. Punctual
/// facts never enter the store; the functional-fluent invariant (at most
/// one value per argument tuple) is maintained by the world state on top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOfFacts {
    facts: OrdSet<Fact>,
    by_name: OrdMap<String, OrdSet<Fact>>,
}

impl SetOfFacts {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts a fact. Returns false when it was already present.
    pub fn insert(&mut self, fact: Fact) -> bool {
        if self.facts.contains(&fact) {
            return false;
        }
        self.by_name
            .entry(fact.name().to_string())
            .or_default()
            .insert(fact.clone());
        self.facts.insert(fact);
        true
    }

    /// Removes a fact by exact signature. Returns false when absent.
    pub fn remove(&mut self, fact: &Fact) -> bool {
        if self.facts.remove(fact).is_none() {
            return false;
        }
        let emptied = match self.by_name.get_mut(fact.name()) {
            Some(bucket) => {
                bucket.remove(fact);
                bucket.is_empty()
            }
            None => false,
        };
        if emptied {
            self.by_name.remove(fact.name());
        }
        true
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        self.facts.contains(fact)
    }

    /// Number of stored facts carrying the given relaxed signature.
    pub fn count_of(&self, name: &str) -> usize {
        self.by_name.get(name).map_or(0, |bucket| bucket.len())
    }

    pub fn facts_with_name<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Fact> {
        self.by_name.get(name).into_iter().flat_map(|bucket| bucket.iter())
    }

    /// The stored fact with the same name and arguments, whatever its
    /// fluent slot holds.
    pub fn find_with_arguments(&self, fact: &Fact) -> Option<&Fact> {
        self.facts_with_name(fact.name())
            .find(|stored| stored.arguments_equal(fact))
    }

    /// The bound value of a functional fluent for the given argument tuple.
    pub fn value_of(&self, fact: &Fact) -> Option<&crate::entity::Entity> {
        self.find_with_arguments(fact).and_then(|stored| stored.value())
    }

    /// The stored fact conflicting with `fact` on the functional invariant:
    /// same name and arguments, different fluent value.
    pub fn fluent_conflict(&self, fact: &Fact) -> Option<Fact> {
        if !fact.predicate().is_functional() {
            return None;
        }
        self.find_with_arguments(fact)
            .filter(|stored| stored.value() != fact.value())
            .cloned()
    }

    /// Whether an optional fact holds in this store, wildcards included.
    pub fn satisfies(&self, fo: &FactOptional, types: &SetOfTypes) -> bool {
        let fact = &fo.fact;
        let positive = if fact.is_value_negated() {
            // `f(args)!=v` holds iff the fluent is bound to another value
            self.facts_with_name(fact.name()).any(|stored| {
                fact.unify_with(stored, types, None, true).is_some() && stored.value() != fact.value()
            })
        } else {
            fact.is_in_facts(self.facts_with_name(fact.name()), types, None, false)
                .is_some()
        };
        positive != fo.is_negated
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

impl FromIterator<Fact> for SetOfFacts {
    fn from_iter<T: IntoIterator<Item = Fact>>(iter: T) -> Self {
        let mut set = SetOfFacts::new();
        for fact in iter {
            set.insert(fact);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Parameter};
    use crate::predicate::{Predicate, SetOfPredicates};
    use anyhow::Result;

    fn fixture() -> (SetOfTypes, SetOfPredicates) {
        let mut types = SetOfTypes::new();
        let robot = types.add("robot", None).unwrap();
        let location = types.add("location", None).unwrap();
        let mut predicates = SetOfPredicates::new();
        predicates.add(Predicate::relation("greeted", vec![]));
        predicates.add(Predicate::fluent(
            "at",
            vec![Parameter::new("?r", robot)],
            location,
        ));
        (types, predicates)
    }

    #[test]
    fn insert_remove_count() -> Result<()> {
        let (types, predicates) = fixture();
        let robot = types.get("robot")?;
        let location = types.get("location")?;
        let at = |r: &str, l: &str| {
            Fact::new(
                &types,
                predicates.get("at").unwrap(),
                vec![Entity::new(r, robot)],
                Some(Entity::new(l, location)),
            )
            .unwrap()
        };

        let mut facts = SetOfFacts::new();
        assert!(facts.insert(at("bob", "kitchen")));
        assert!(!facts.insert(at("bob", "kitchen")));
        assert!(facts.insert(at("alice", "bedroom")));
        assert_eq!(facts.count_of("at"), 2);
        assert!(facts.remove(&at("bob", "kitchen")));
        assert!(!facts.remove(&at("bob", "kitchen")));
        assert_eq!(facts.count_of("at"), 1);
        Ok(())
    }

    #[test]
    fn fluent_lookup_and_conflict() -> Result<()> {
        let (types, predicates) = fixture();
        let robot = types.get("robot")?;
        let location = types.get("location")?;
        let at = |r: &str, l: &str| {
            Fact::new(
                &types,
                predicates.get("at").unwrap(),
                vec![Entity::new(r, robot)],
                Some(Entity::new(l, location)),
            )
            .unwrap()
        };

        let mut facts = SetOfFacts::new();
        facts.insert(at("bob", "kitchen"));
        assert_eq!(facts.value_of(&at("bob", "bedroom")).unwrap().value(), "kitchen");
        assert_eq!(facts.fluent_conflict(&at("bob", "bedroom")), Some(at("bob", "kitchen")));
        assert_eq!(facts.fluent_conflict(&at("bob", "kitchen")), None);
        assert_eq!(facts.fluent_conflict(&at("alice", "kitchen")), None);
        Ok(())
    }

    #[test]
    fn satisfaction_with_wildcard_and_negated_value() -> Result<()> {
        let (types, predicates) = fixture();
        let robot = types.get("robot")?;
        let location = types.get("location")?;
        let at = |r: &str, l: &str| {
            Fact::new(
                &types,
                predicates.get("at").unwrap(),
                vec![Entity::new(r, robot)],
                Some(Entity::new(l, location)),
            )
            .unwrap()
        };

        let mut facts = SetOfFacts::new();
        facts.insert(at("bob", "kitchen"));

        let any = at("bob", "kitchen").with_value(Some(Entity::any_value(location)));
        assert!(facts.satisfies(&FactOptional::positive(any.clone()), &types));
        assert!(!facts.satisfies(&FactOptional::negative(any), &types));

        // at(bob)!=bedroom holds, at(bob)!=kitchen does not
        let not_bedroom = at("bob", "bedroom").with_value_negated(true);
        let not_kitchen = at("bob", "kitchen").with_value_negated(true);
        assert!(facts.satisfies(&FactOptional::positive(not_bedroom), &types));
        assert!(!facts.satisfies(&FactOptional::positive(not_kitchen), &types));
        Ok(())
    }
}
