//! Symbolic data model of the lyra planner.
//!
//! The model is the vocabulary shared by every planning component: a type
//! forest with subtyping, typed entities and parameters, predicates with
//! optional functional fluents, facts, first-order conditions and
//! world-state modifications, and the persistent fact store the world
//! state is built on.

pub mod bindings;
pub mod condition;
pub mod entities;
pub mod entity;
pub mod errors;
pub mod fact;
pub mod modification;
pub mod numeric;
pub mod ontology;
pub mod predicate;
pub mod state;
pub mod types;

pub use bindings::Bindings;
pub use condition::{ArithExpr, Condition, EqOp, EvalContext, Term};
pub use entities::SetOfEntities;
pub use entity::{Entity, Parameter, ANY_VALUE, PARAMETER_SIGIL};
pub use errors::ModelError;
pub use fact::{Fact, FactOptional};
pub use modification::{FactOp, FactTemplates, FluentValue, Modification};
pub use numeric::NumberValue;
pub use ontology::Ontology;
pub use predicate::{Predicate, SetOfPredicates, PUNCTUAL_PREFIX};
pub use state::SetOfFacts;
pub use types::{SetOfTypes, TypeId};
