use crate::bindings::Bindings;
use crate::entity::{Entity, Parameter};
use crate::errors::{ModelError, Result};
use crate::predicate::Predicate;
use crate::types::SetOfTypes;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An instance of a predicate: the atom of world state.
///
/// Arguments and the optional fluent value may carry parameter occurrences
/// (entities with the `?` sigil) or the any-value wildcard; a fact is ground
/// once neither remains. The exact signature of a fact is its name plus
/// argument values plus fluent; the relaxed signature, used for indexing,
/// is the name alone.
#[derive(Debug, Clone)]
pub struct Fact {
    predicate: Arc<Predicate>,
    arguments: SmallVec<[Entity; 4]>,
    value: Option<Entity>,
    value_negated: bool,
}

impl Fact {
    /// Builds a fact, validating arity, argument typing and the presence of
    /// a value exactly when the predicate is functional.
    pub fn new(
        types: &SetOfTypes,
        predicate: Arc<Predicate>,
        arguments: Vec<Entity>,
        value: Option<Entity>,
    ) -> Result<Fact> {
        if arguments.len() != predicate.arity() {
            return Err(ModelError::MalformedInput(format!(
                "fact `{}` expects {} arguments, got {}",
                predicate.name,
                predicate.arity(),
                arguments.len()
            )));
        }
        for (arg, param) in arguments.iter().zip(&predicate.parameters) {
            let compatible = if arg.is_parameter() || arg.is_any_value() {
                types.are_compatible(arg.tpe(), param.tpe)
            } else {
                types.is_a(arg.tpe(), param.tpe)
            };
            if !compatible {
                return Err(ModelError::TypeMismatch {
                    value: arg.value().to_string(),
                    found: types.name_of(arg.tpe()).to_string(),
                    expected: types.name_of(param.tpe).to_string(),
                });
            }
        }
        match (&value, predicate.value_type) {
            (None, None) => {}
            (Some(v), Some(tpe)) => {
                let compatible = if v.is_parameter() || v.is_any_value() {
                    types.are_compatible(v.tpe(), tpe)
                } else {
                    types.is_a(v.tpe(), tpe)
                };
                if !compatible {
                    return Err(ModelError::TypeMismatch {
                        value: v.value().to_string(),
                        found: types.name_of(v.tpe()).to_string(),
                        expected: types.name_of(tpe).to_string(),
                    });
                }
            }
            (None, Some(_)) => {
                return Err(ModelError::MalformedInput(format!(
                    "functional predicate `{}` requires a value (use the any-value wildcard)",
                    predicate.name
                )))
            }
            (Some(_), None) => {
                return Err(ModelError::MalformedInput(format!(
                    "predicate `{}` is a relation and cannot take a value",
                    predicate.name
                )))
            }
        }
        Ok(Fact {
            predicate,
            arguments: arguments.into(),
            value,
            value_negated: false,
        })
    }

    pub fn with_value_negated(mut self, negated: bool) -> Fact {
        self.value_negated = negated;
        self
    }

    /// Same fact with another fluent slot. The caller is responsible for
    /// keeping the slot consistent with the predicate's value type.
    pub fn with_value(mut self, value: Option<Entity>) -> Fact {
        self.value = value;
        self
    }

    pub fn name(&self) -> &str {
        &self.predicate.name
    }

    pub fn predicate(&self) -> &Arc<Predicate> {
        &self.predicate
    }

    pub fn arguments(&self) -> &[Entity] {
        &self.arguments
    }

    pub fn value(&self) -> Option<&Entity> {
        self.value.as_ref()
    }

    pub fn is_value_negated(&self) -> bool {
        self.value_negated
    }

    pub fn is_punctual(&self) -> bool {
        self.predicate.is_punctual()
    }

    /// Whether the fluent slot holds the wildcard: such a fact matches any
    /// bound value with the same arguments.
    pub fn is_complete_with_any_value(&self) -> bool {
        self.value.as_ref().is_some_and(|v| v.is_any_value())
    }

    pub fn has_parameters(&self, ignore_value: bool) -> bool {
        self.arguments.iter().any(|a| a.is_parameter())
            || (!ignore_value && self.value.as_ref().is_some_and(|v| v.is_parameter()))
    }

    pub fn has_parameter(&self, parameter: &Parameter) -> bool {
        self.arguments.iter().any(|a| a.denotes(parameter))
            || self.value.as_ref().is_some_and(|v| v.denotes(parameter))
    }

    pub fn arguments_equal(&self, other: &Fact) -> bool {
        self.arguments == other.arguments
    }

    /// New fact with parameter occurrences substituted in the arguments and
    /// in the fluent slot.
    pub fn replace_arguments(&self, substitution: &BTreeMap<Parameter, Entity>) -> Fact {
        let substitute = |e: &Entity| -> Entity {
            if e.is_parameter() {
                if let Some(replacement) = substitution.get(&e.to_parameter()) {
                    return replacement.clone();
                }
            }
            e.clone()
        };
        Fact {
            predicate: self.predicate.clone(),
            arguments: self.arguments.iter().map(substitute).collect(),
            value: self.value.as_ref().map(substitute),
            value_negated: self.value_negated,
        }
    }

    /// Replaces the given parameter occurrences by the any-value wildcard.
    /// Returns true when at least one occurrence was replaced.
    pub fn widen_parameters_to_any(&mut self, parameters: &[Parameter]) -> bool {
        let mut changed = false;
        let widen = |e: &mut Entity, changed: &mut bool| {
            if e.is_parameter() && parameters.iter().any(|p| e.denotes(p)) {
                *e = Entity::any_value(e.tpe());
                *changed = true;
            }
        };
        for a in &mut self.arguments {
            widen(a, &mut changed);
        }
        if let Some(v) = &mut self.value {
            widen(v, &mut changed);
        }
        changed
    }

    /// The argument of `example` standing at the position where this fact
    /// holds `parameter` (the example must be another instance of this fact).
    pub fn extract_argument(&self, parameter: &Parameter, example: &Fact) -> Option<Entity> {
        if self.name() != example.name() || self.arguments.len() != example.arguments.len() {
            return None;
        }
        for (own, ex) in self.arguments.iter().zip(&example.arguments) {
            if own.denotes(parameter) {
                return Some(ex.clone());
            }
        }
        if let (Some(own), Some(ex)) = (&self.value, &example.value) {
            if own.denotes(parameter) {
                return Some(ex.clone());
            }
        }
        None
    }

    /// The inverse substitution mapping each parameter occurring in this
    /// fact to the value `example` holds at the same position.
    pub fn parameters_to_arguments(&self, example: &Fact) -> BTreeMap<Parameter, Entity> {
        let mut map = BTreeMap::new();
        for (own, ex) in self.arguments.iter().zip(&example.arguments) {
            if own.is_parameter() {
                map.insert(own.to_parameter(), ex.clone());
            }
        }
        if let (Some(own), Some(ex)) = (&self.value, &example.value) {
            if own.is_parameter() {
                map.insert(own.to_parameter(), ex.clone());
            }
        }
        map
    }

    fn unify_slot(
        own: &Entity,
        other: &Entity,
        types: &SetOfTypes,
        bindings: Option<&Bindings>,
        out: &mut Bindings,
    ) -> bool {
        if own.is_parameter() {
            let p = own.to_parameter();
            if other.is_parameter() || other.is_any_value() {
                return types.are_compatible(p.tpe, other.tpe());
            }
            if !types.is_a(other.tpe(), p.tpe) {
                return false;
            }
            if let Some(existing) = bindings.and_then(|b| b.get(&p)) {
                if !existing.is_empty() && !existing.contains(other) {
                    return false;
                }
            }
            return out.constrain(p, std::iter::once(other.clone()).collect());
        }
        if own.is_any_value() || other.is_any_value() || other.is_parameter() {
            return true;
        }
        own == other
    }

    /// Tries to unify this fact (a pattern possibly holding parameters)
    /// with `other`.
    ///
    /// `bindings` carries the possibilities already known for this fact's
    /// parameters; the returned bindings hold the possibilities implied by
    /// `other` for each parameter, to be intersected by the caller. `None`
    /// means the two facts cannot denote the same world atom.
    pub fn unify_with(
        &self,
        other: &Fact,
        types: &SetOfTypes,
        bindings: Option<&Bindings>,
        ignore_values: bool,
    ) -> Option<Bindings> {
        if self.name() != other.name() || self.arguments.len() != other.arguments.len() {
            return None;
        }
        let mut out = Bindings::new();
        for (own, ex) in self.arguments.iter().zip(&other.arguments) {
            if !Self::unify_slot(own, ex, types, bindings, &mut out) {
                return None;
            }
        }
        if !ignore_values {
            if self.value_negated != other.value_negated {
                return None;
            }
            match (&self.value, &other.value) {
                (None, None) => {}
                (Some(own), Some(ex)) => {
                    if !Self::unify_slot(own, ex, types, bindings, &mut out) {
                        return None;
                    }
                }
                _ => return None,
            }
        }
        Some(out)
    }

    /// Whether this fact matches any fact of `facts`, unioning the bindings
    /// produced by each match. `None` when nothing matches.
    pub fn is_in_facts<'a>(
        &self,
        facts: impl IntoIterator<Item = &'a Fact>,
        types: &SetOfTypes,
        bindings: Option<&Bindings>,
        ignore_values: bool,
    ) -> Option<Bindings> {
        let mut result: Option<Bindings> = None;
        for fact in facts {
            if let Some(found) = self.unify_with(fact, types, bindings, ignore_values) {
                match &mut result {
                    None => result = Some(found),
                    Some(acc) => acc.merge_union(&found),
                }
            }
        }
        result
    }

    /// Whether this fact, seen as the effect of a producer, could feed the
    /// condition fact of a prospective successor under some binding.
    pub fn gives_interest_for_successor(&self, condition_fact: &Fact, types: &SetOfTypes) -> bool {
        self.unify_with(condition_fact, types, None, true).is_some()
    }
}

impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.arguments == other.arguments
            && self.value == other.value
            && self.value_negated == other.value_negated
    }
}
impl Eq for Fact {}

impl PartialOrd for Fact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Fact {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name()
            .cmp(other.name())
            .then_with(|| self.arguments.cmp(&other.arguments))
            .then_with(|| self.value.cmp(&other.value))
            .then_with(|| self.value_negated.cmp(&other.value_negated))
    }
}
impl Hash for Fact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
        self.arguments.hash(state);
        self.value.hash(state);
        self.value_negated.hash(state);
    }
}

impl Display for Fact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())?;
        if !self.arguments.is_empty() {
            write!(f, "(")?;
            for (i, a) in self.arguments.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{a}")?;
            }
            write!(f, ")")?;
        }
        if let Some(v) = &self.value {
            if self.value_negated {
                write!(f, "!={v}")?;
            } else {
                write!(f, "={v}")?;
            }
        }
        Ok(())
    }
}

/// A fact together with its polarity inside a condition or an effect.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactOptional {
    pub is_negated: bool,
    pub fact: Fact,
}

impl FactOptional {
    pub fn positive(fact: Fact) -> FactOptional {
        FactOptional {
            is_negated: false,
            fact,
        }
    }

    pub fn negative(fact: Fact) -> FactOptional {
        FactOptional {
            is_negated: true,
            fact,
        }
    }

    pub fn inverted(&self) -> FactOptional {
        FactOptional {
            is_negated: !self.is_negated,
            fact: self.fact.clone(),
        }
    }

    pub fn replace_arguments(&self, substitution: &BTreeMap<Parameter, Entity>) -> FactOptional {
        FactOptional {
            is_negated: self.is_negated,
            fact: self.fact.replace_arguments(substitution),
        }
    }
}

impl Display for FactOptional {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_negated {
            write!(f, "!{}", self.fact)
        } else {
            write!(f, "{}", self.fact)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::SetOfPredicates;
    use anyhow::Result;

    struct Fixture {
        types: SetOfTypes,
        predicates: SetOfPredicates,
    }

    fn fixture() -> Fixture {
        let mut types = SetOfTypes::new();
        let object = types.add("object", None).unwrap();
        types.add("robot", Some("object")).unwrap();
        let location = types.add("location", Some("object")).unwrap();
        let robot = types.id_of("robot").unwrap();
        let mut predicates = SetOfPredicates::new();
        predicates.add(Predicate::relation("greeted", vec![]));
        predicates.add(Predicate::relation(
            "can_traverse",
            vec![Parameter::new("?r", robot), Parameter::new("?l", location)],
        ));
        predicates.add(Predicate::fluent(
            "at",
            vec![Parameter::new("?r", robot)],
            location,
        ));
        Fixture { types, predicates }
    }

    fn at(fx: &Fixture, robot: &str, loc: &str) -> Fact {
        let robot_t = fx.types.id_of("robot").unwrap();
        let loc_t = fx.types.id_of("location").unwrap();
        Fact::new(
            &fx.types,
            fx.predicates.get("at").unwrap(),
            vec![Entity::new(robot, robot_t)],
            Some(Entity::new(loc, loc_t)),
        )
        .unwrap()
    }

    #[test]
    fn construction_is_validated() -> Result<()> {
        let fx = fixture();
        let robot_t = fx.types.id_of("robot").unwrap();
        let loc_t = fx.types.id_of("location").unwrap();
        let at = fx.predicates.get("at")?;

        // missing value on a functional predicate
        assert!(matches!(
            Fact::new(&fx.types, at.clone(), vec![Entity::new("bob", robot_t)], None),
            Err(ModelError::MalformedInput(_))
        ));
        // argument of the wrong type
        assert!(matches!(
            Fact::new(
                &fx.types,
                at.clone(),
                vec![Entity::new("kitchen", loc_t)],
                Some(Entity::new("kitchen", loc_t))
            ),
            Err(ModelError::TypeMismatch { .. })
        ));
        // wrong arity
        assert!(matches!(
            Fact::new(&fx.types, at, vec![], Some(Entity::new("kitchen", loc_t))),
            Err(ModelError::MalformedInput(_))
        ));
        Ok(())
    }

    #[test]
    fn equality_and_wildcard() {
        let fx = fixture();
        let loc_t = fx.types.id_of("location").unwrap();
        let bound = at(&fx, "bob", "kitchen");
        let any = bound.clone().with_value(Some(Entity::any_value(loc_t)));
        assert_eq!(bound, at(&fx, "bob", "kitchen"));
        assert_ne!(bound, at(&fx, "bob", "bedroom"));
        // the wildcard is not equal to a concrete bound value
        assert_ne!(bound, any);
        // but it unifies with it
        assert!(any.unify_with(&bound, &fx.types, None, false).is_some());
    }

    #[test]
    fn unification_binds_parameters() {
        let fx = fixture();
        let robot_t = fx.types.id_of("robot").unwrap();
        let loc_t = fx.types.id_of("location").unwrap();
        let pattern = Fact::new(
            &fx.types,
            fx.predicates.get("at").unwrap(),
            vec![Entity::new("?r", robot_t)],
            Some(Entity::new("?l", loc_t)),
        )
        .unwrap();
        let ground = at(&fx, "bob", "kitchen");

        let bound = pattern.unify_with(&ground, &fx.types, None, false).unwrap();
        let r = Parameter::new("?r", robot_t);
        let l = Parameter::new("?l", loc_t);
        assert_eq!(bound.single_value(&r).unwrap().value(), "bob");
        assert_eq!(bound.single_value(&l).unwrap().value(), "kitchen");

        // an existing incompatible constraint fails the unification
        let mut existing = Bindings::new();
        existing.bind(r.clone(), Entity::new("alice", robot_t));
        assert!(pattern.unify_with(&ground, &fx.types, Some(&existing), false).is_none());
    }

    #[test]
    fn repeated_parameter_must_agree() -> Result<()> {
        let fx = fixture();
        let robot_t = fx.types.id_of("robot").unwrap();
        let loc_t = fx.types.id_of("location").unwrap();
        // can_traverse(?x, ?x) is ill-typed on purpose for the second slot,
        // use two robots through a shared parent type instead
        let object_t = fx.types.id_of("object").unwrap();
        let mut predicates = SetOfPredicates::new();
        let pair = predicates.add(Predicate::relation(
            "pair",
            vec![Parameter::new("?a", object_t), Parameter::new("?b", object_t)],
        ));
        let pattern = Fact::new(
            &fx.types,
            pair.clone(),
            vec![Entity::new("?x", object_t), Entity::new("?x", object_t)],
            None,
        )?;
        let same = Fact::new(
            &fx.types,
            pair.clone(),
            vec![Entity::new("bob", robot_t), Entity::new("bob", robot_t)],
            None,
        )?;
        let different = Fact::new(
            &fx.types,
            pair,
            vec![Entity::new("bob", robot_t), Entity::new("kitchen", loc_t)],
            None,
        )?;
        assert!(pattern.unify_with(&same, &fx.types, None, false).is_some());
        assert!(pattern.unify_with(&different, &fx.types, None, false).is_none());
        Ok(())
    }

    #[test]
    fn substitution() {
        let fx = fixture();
        let robot_t = fx.types.id_of("robot").unwrap();
        let loc_t = fx.types.id_of("location").unwrap();
        let pattern = Fact::new(
            &fx.types,
            fx.predicates.get("at").unwrap(),
            vec![Entity::new("?r", robot_t)],
            Some(Entity::new("?l", loc_t)),
        )
        .unwrap();
        let mut subst = BTreeMap::new();
        subst.insert(Parameter::new("?r", robot_t), Entity::new("bob", robot_t));
        subst.insert(Parameter::new("?l", loc_t), Entity::new("kitchen", loc_t));
        assert_eq!(pattern.replace_arguments(&subst), at(&fx, "bob", "kitchen"));
    }

    #[test]
    fn extraction_from_an_example_instance() {
        let fx = fixture();
        let robot_t = fx.types.id_of("robot").unwrap();
        let loc_t = fx.types.id_of("location").unwrap();
        let pattern = Fact::new(
            &fx.types,
            fx.predicates.get("at").unwrap(),
            vec![Entity::new("?r", robot_t)],
            Some(Entity::new("?l", loc_t)),
        )
        .unwrap();
        let example = at(&fx, "bob", "kitchen");

        let r = Parameter::new("?r", robot_t);
        let l = Parameter::new("?l", loc_t);
        assert_eq!(pattern.extract_argument(&r, &example).unwrap().value(), "bob");
        assert_eq!(pattern.extract_argument(&l, &example).unwrap().value(), "kitchen");
        assert!(pattern.extract_argument(&Parameter::new("?x", robot_t), &example).is_none());

        let inverse = pattern.parameters_to_arguments(&example);
        assert_eq!(inverse[&r].value(), "bob");
        assert_eq!(inverse[&l].value(), "kitchen");
    }

    #[test]
    fn display_forms() {
        let fx = fixture();
        assert_eq!(at(&fx, "bob", "kitchen").to_string(), "at(bob)=kitchen");
        let greeted = Fact::new(&fx.types, fx.predicates.get("greeted").unwrap(), vec![], None).unwrap();
        assert_eq!(greeted.to_string(), "greeted");
        assert_eq!(FactOptional::negative(greeted).to_string(), "!greeted");
    }
}
