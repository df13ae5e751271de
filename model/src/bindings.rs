use crate::entity::{Entity, Parameter};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// The candidate values still possible for a set of parameters.
///
/// A declared parameter mapped to an empty set is unconstrained; every
/// constraint added afterwards intersects its possibilities (conjunction),
/// while alternative matches union them (disjunction). A parameter whose
/// set becomes empty under intersection is a unification failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    possibilities: BTreeMap<Parameter, BTreeSet<Entity>>,
}

impl Bindings {
    pub fn new() -> Self {
        Default::default()
    }

    /// Declares every parameter as unconstrained.
    pub fn from_parameters(parameters: &[Parameter]) -> Self {
        let mut b = Bindings::new();
        for p in parameters {
            b.declare(p.clone());
        }
        b
    }

    pub fn declare(&mut self, parameter: Parameter) {
        self.possibilities.entry(parameter).or_default();
    }

    pub fn is_declared(&self, parameter: &Parameter) -> bool {
        self.possibilities.contains_key(parameter)
    }

    pub fn get(&self, parameter: &Parameter) -> Option<&BTreeSet<Entity>> {
        self.possibilities.get(parameter)
    }

    /// Constrains a parameter to a single value.
    pub fn bind(&mut self, parameter: Parameter, value: Entity) -> bool {
        self.constrain(parameter, std::iter::once(value).collect())
    }

    /// Intersects the possibilities of a parameter with `values`.
    /// Returns false when the parameter ends up with no possibility left.
    pub fn constrain(&mut self, parameter: Parameter, values: BTreeSet<Entity>) -> bool {
        let entry = self.possibilities.entry(parameter).or_default();
        if entry.is_empty() {
            *entry = values;
        } else {
            entry.retain(|e| values.contains(e));
        }
        !entry.is_empty()
    }

    /// Conjunction: intersects with every constrained parameter of `other`.
    /// Returns false when some parameter ends up with no possibility left.
    pub fn restrict_with(&mut self, other: &Bindings) -> bool {
        let mut ok = true;
        for (p, values) in &other.possibilities {
            if !values.is_empty() {
                ok &= self.constrain(p.clone(), values.clone());
            }
        }
        ok
    }

    /// Disjunction: unions the possibilities of `other` into this one.
    pub fn merge_union(&mut self, other: &Bindings) {
        for (p, values) in &other.possibilities {
            self.possibilities
                .entry(p.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    /// The value of a parameter constrained to exactly one possibility.
    pub fn single_value(&self, parameter: &Parameter) -> Option<&Entity> {
        let values = self.possibilities.get(parameter)?;
        if values.len() == 1 {
            values.iter().next()
        } else {
            None
        }
    }

    /// Whether every declared parameter has at least one possibility.
    pub fn is_complete(&self) -> bool {
        self.possibilities.values().all(|v| !v.is_empty())
    }

    /// Ground substitution of the parameters constrained to exactly one
    /// possibility.
    pub fn single_assignments(&self) -> BTreeMap<Parameter, Entity> {
        self.possibilities
            .iter()
            .filter(|(_, values)| values.len() == 1)
            .map(|(p, values)| (p.clone(), values.iter().next().unwrap().clone()))
            .collect()
    }

    /// Ground substitution keeping, for each parameter, its first
    /// possibility in entity order. Unconstrained parameters are skipped.
    pub fn first_assignment(&self) -> BTreeMap<Parameter, Entity> {
        self.possibilities
            .iter()
            .filter_map(|(p, values)| values.iter().next().map(|e| (p.clone(), e.clone())))
            .collect()
    }

    /// Enumerates every ground assignment, in deterministic order.
    pub fn unfold(&self) -> Vec<BTreeMap<Parameter, Entity>> {
        let constrained: Vec<(&Parameter, &BTreeSet<Entity>)> = self
            .possibilities
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .collect();
        if constrained.is_empty() {
            return vec![BTreeMap::new()];
        }
        constrained
            .iter()
            .map(|(_, values)| values.iter())
            .multi_cartesian_product()
            .map(|combination| {
                constrained
                    .iter()
                    .zip(combination)
                    .map(|((p, _), e)| ((*p).clone(), e.clone()))
                    .collect()
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Parameter, &BTreeSet<Entity>)> {
        self.possibilities.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.possibilities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.possibilities.len()
    }
}

impl Display for Bindings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, (p, values)) in self.possibilities.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match values.len() {
                1 => write!(f, "{p} -> {}", values.iter().next().unwrap())?,
                _ => write!(f, "{p} -> {{{}}}", values.iter().join(", "))?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SetOfTypes;

    fn setup() -> (Parameter, Entity, Entity) {
        let mut ts = SetOfTypes::new();
        let robot = ts.add("robot", None).unwrap();
        (
            Parameter::new("?r", robot),
            Entity::new("bob", robot),
            Entity::new("alice", robot),
        )
    }

    #[test]
    fn constrain_intersects() {
        let (p, bob, alice) = setup();
        let mut b = Bindings::from_parameters(std::slice::from_ref(&p));
        assert!(b.constrain(p.clone(), [bob.clone(), alice.clone()].into_iter().collect()));
        assert!(b.constrain(p.clone(), [bob.clone()].into_iter().collect()));
        assert_eq!(b.single_value(&p), Some(&bob));
        assert!(!b.constrain(p.clone(), [alice].into_iter().collect()));
        assert!(!b.is_complete());
    }

    #[test]
    fn union_and_unfold() {
        let (p, bob, alice) = setup();
        let mut b = Bindings::new();
        b.bind(p.clone(), bob.clone());
        let mut other = Bindings::new();
        other.bind(p.clone(), alice.clone());
        b.merge_union(&other);
        assert_eq!(b.get(&p).unwrap().len(), 2);

        let assignments = b.unfold();
        assert_eq!(assignments.len(), 2);
        // entity order: alice before bob
        assert_eq!(assignments[0][&p], alice);
        assert_eq!(assignments[1][&p], bob);
        assert_eq!(b.first_assignment()[&p], alice);
    }

    #[test]
    fn unconstrained_parameters_do_not_restrict() {
        let (p, bob, _) = setup();
        let mut b = Bindings::new();
        b.bind(p.clone(), bob.clone());
        let empty = Bindings::from_parameters(std::slice::from_ref(&p));
        assert!(b.restrict_with(&empty));
        assert_eq!(b.single_value(&p), Some(&bob));
    }
}
