use crate::entity::Parameter;
use crate::errors::{ModelError, Result};
use crate::types::TypeId;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Prefix marking a punctual predicate: its facts are observed during a
/// single notification cycle and never stored in the world state.
pub const PUNCTUAL_PREFIX: char = '~';

/// Declaration of a relation or of a functional fluent.
///
/// A predicate with a value type denotes a function from argument tuples to
/// a value of that type; without one it denotes a plain relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub value_type: Option<TypeId>,
}

impl Predicate {
    pub fn relation(name: impl Into<String>, parameters: Vec<Parameter>) -> Predicate {
        Predicate {
            name: name.into(),
            parameters,
            value_type: None,
        }
    }

    pub fn fluent(name: impl Into<String>, parameters: Vec<Parameter>, value_type: TypeId) -> Predicate {
        Predicate {
            name: name.into(),
            parameters,
            value_type: Some(value_type),
        }
    }

    pub fn is_functional(&self) -> bool {
        self.value_type.is_some()
    }

    pub fn is_punctual(&self) -> bool {
        self.name.starts_with(PUNCTUAL_PREFIX)
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ")")
    }
}

/// Name-keyed registry of the predicates declared by an ontology.
#[derive(Debug, Clone, Default)]
pub struct SetOfPredicates {
    by_name: BTreeMap<String, Arc<Predicate>>,
}

impl SetOfPredicates {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a predicate and returns its shared handle.
    /// Re-declaring a name replaces the previous declaration.
    pub fn add(&mut self, predicate: Predicate) -> Arc<Predicate> {
        let handle = Arc::new(predicate);
        self.by_name.insert(handle.name.clone(), handle.clone());
        handle
    }

    pub fn add_all(&mut self, predicates: impl IntoIterator<Item = Predicate>) {
        for p in predicates {
            self.add(p);
        }
    }

    pub fn get_opt(&self, name: &str) -> Option<&Arc<Predicate>> {
        self.by_name.get(name)
    }

    /// Same as [`SetOfPredicates::get_opt`] but failing with `UnknownSymbol`.
    pub fn get(&self, name: &str) -> Result<Arc<Predicate>> {
        self.get_opt(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownSymbol(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Predicate>> {
        self.by_name.values()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
