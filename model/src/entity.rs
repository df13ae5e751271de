use crate::numeric::NumberValue;
use crate::types::TypeId;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Printed form of the any-value wildcard.
pub const ANY_VALUE: &str = "*";

/// Sigil distinguishing parameters from entities.
pub const PARAMETER_SIGIL: char = '?';

/// A concrete ground value together with its type.
///
/// Two special forms exist: the any-value wildcard (matching any entity of a
/// compatible type) and numbers (typed with the builtin `number` type).
/// Inside fact arguments, an entity whose value carries the parameter sigil
/// stands for an unbound parameter occurrence.
#[derive(Debug, Clone)]
pub struct Entity {
    value: String,
    tpe: TypeId,
}

impl Entity {
    pub fn new(value: impl Into<String>, tpe: TypeId) -> Entity {
        Entity {
            value: value.into(),
            tpe,
        }
    }

    /// The wildcard matching any entity of a compatible type.
    pub fn any_value(tpe: TypeId) -> Entity {
        Entity::new(ANY_VALUE, tpe)
    }

    pub fn number(n: NumberValue) -> Entity {
        Entity::new(n.to_string(), TypeId::NUMBER)
    }

    pub fn int(i: i64) -> Entity {
        Entity::number(NumberValue::Int(i))
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn tpe(&self) -> TypeId {
        self.tpe
    }

    pub fn is_any_value(&self) -> bool {
        self.value == ANY_VALUE
    }

    /// Whether this entity stands for an unbound parameter occurrence.
    pub fn is_parameter(&self) -> bool {
        self.value.starts_with(PARAMETER_SIGIL)
    }

    pub fn to_parameter(&self) -> Parameter {
        Parameter::new(&self.value, self.tpe)
    }

    /// Whether this entity occurrence denotes the given parameter.
    pub fn denotes(&self, parameter: &Parameter) -> bool {
        self.value == parameter.name
    }

    pub fn as_number(&self) -> Option<NumberValue> {
        NumberValue::parse(&self.value).ok()
    }
}

// equality and ordering are on the value only: the type is a static
// annotation checked at construction and unification time
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
impl Eq for Entity {}
impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}
impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// An unbound, typed variable of an action, event, goal or quantifier.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub tpe: TypeId,
}

impl Parameter {
    /// Builds a parameter, normalizing the name to carry the leading sigil.
    pub fn new(name: impl Into<String>, tpe: TypeId) -> Parameter {
        let name: String = name.into();
        let name = if name.starts_with(PARAMETER_SIGIL) {
            name
        } else {
            format!("{PARAMETER_SIGIL}{name}")
        };
        Parameter { name, tpe }
    }

    /// The entity form used for parameter occurrences inside facts.
    pub fn to_entity(&self) -> Entity {
        Entity::new(self.name.clone(), self.tpe)
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Parameter {}
impl PartialOrd for Parameter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Parameter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}
impl Hash for Parameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for Parameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
