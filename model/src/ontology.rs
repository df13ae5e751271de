use crate::entities::SetOfEntities;
use crate::entity::{Entity, Parameter, ANY_VALUE, PARAMETER_SIGIL};
use crate::errors::{ModelError, Result};
use crate::numeric::NumberValue;
use crate::predicate::SetOfPredicates;
use crate::types::{SetOfTypes, TypeId};

/// The static vocabulary of a domain: its type forest, its predicate
/// declarations and its constant entities.
///
/// Problem-local entities supplement the constants; both are consulted when
/// resolving symbols used inside conditions and effects.
#[derive(Debug, Clone, Default)]
pub struct Ontology {
    pub types: SetOfTypes,
    pub predicates: SetOfPredicates,
    pub constants: SetOfEntities,
}

impl Ontology {
    pub fn new() -> Self {
        Default::default()
    }

    /// Resolves a symbol used inside a condition or an effect to an entity.
    ///
    /// A `?`-sigiled symbol must denote one of the declared `parameters`;
    /// `*` is the any-value wildcard (typed with `expected`); a numeric
    /// literal becomes a number entity; anything else must be a declared
    /// constant or problem entity.
    pub fn resolve(
        &self,
        symbol: &str,
        expected: TypeId,
        extra_entities: Option<&SetOfEntities>,
        parameters: &[Parameter],
    ) -> Result<Entity> {
        if symbol.starts_with(PARAMETER_SIGIL) {
            let param = parameters
                .iter()
                .find(|p| p.name == symbol)
                .ok_or_else(|| ModelError::UnknownSymbol(symbol.to_string()))?;
            return Ok(param.to_entity());
        }
        if symbol == ANY_VALUE {
            return Ok(Entity::any_value(expected));
        }
        if let Ok(n) = NumberValue::parse(symbol) {
            return Ok(Entity::number(n));
        }
        self.constants
            .get(symbol)
            .or_else(|| extra_entities.and_then(|e| e.get(symbol)))
            .cloned()
            .ok_or_else(|| ModelError::UnknownSymbol(symbol.to_string()))
    }
}
