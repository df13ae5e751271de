use crate::errors::{ModelError, Result};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

/// Unique numeric handle of a type inside a [`SetOfTypes`] arena.
#[derive(Copy, Clone, Eq, Ord, PartialOrd, PartialEq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    /// Handle of the builtin `number` type, always the first slot of the arena.
    pub const NUMBER: TypeId = TypeId(0);
}

impl From<TypeId> for usize {
    fn from(id: TypeId) -> Self {
        id.0 as usize
    }
}
impl From<usize> for TypeId {
    fn from(id: usize) -> Self {
        TypeId(id as u32)
    }
}
impl Debug for TypeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

struct TypeNode {
    name: String,
    parent: Option<TypeId>,
}

/// Arena of named types forming a forest.
///
/// Each node owns its name and points to an optional parent; `is_a(t, u)`
/// holds iff `u` appears on the chain from `t` to its root. The builtin
/// `number` type (integer or float fluents) is always present.
pub struct SetOfTypes {
    nodes: Vec<TypeNode>,
    ids: HashMap<String, TypeId>,
}

pub const NUMBER_TYPE_NAME: &str = "number";

impl Default for SetOfTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SetOfTypes {
    fn clone(&self) -> Self {
        SetOfTypes {
            nodes: self
                .nodes
                .iter()
                .map(|n| TypeNode {
                    name: n.name.clone(),
                    parent: n.parent,
                })
                .collect(),
            ids: self.ids.clone(),
        }
    }
}

impl Debug for SetOfTypes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, n) in self.nodes.iter().enumerate() {
            match n.parent {
                Some(p) => writeln!(f, "{:?}\t{} - {}", TypeId(i as u32), n.name, self.name_of(p))?,
                None => writeln!(f, "{:?}\t{}", TypeId(i as u32), n.name)?,
            }
        }
        Ok(())
    }
}

impl SetOfTypes {
    pub fn new() -> Self {
        let mut set = SetOfTypes {
            nodes: Vec::new(),
            ids: HashMap::new(),
        };
        let number = set.insert(NUMBER_TYPE_NAME.to_string(), None);
        debug_assert_eq!(number, TypeId::NUMBER);
        set
    }

    /// Constructs an arena from `(type, optional parent)` declarations.
    /// Parents must be declared before their children.
    pub fn from_declarations<'a>(decls: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Result<Self> {
        let mut set = Self::new();
        for (name, parent) in decls {
            set.add(name, parent)?;
        }
        Ok(set)
    }

    /// Declares a type under an optional parent.
    /// Re-declaring an existing name returns the existing handle.
    pub fn add(&mut self, name: &str, parent: Option<&str>) -> Result<TypeId> {
        if let Some(&id) = self.ids.get(name) {
            return Ok(id);
        }
        let parent = match parent {
            Some(p) => Some(
                self.id_of(p)
                    .ok_or_else(|| ModelError::UnknownSymbol(p.to_string()))?,
            ),
            None => None,
        };
        Ok(self.insert(name.to_string(), parent))
    }

    fn insert(&mut self, name: String, parent: Option<TypeId>) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.ids.insert(name.clone(), id);
        self.nodes.push(TypeNode { name, parent });
        id
    }

    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.ids.get(name).copied()
    }

    /// Same as [`SetOfTypes::id_of`] but failing with `UnknownSymbol`.
    pub fn get(&self, name: &str) -> Result<TypeId> {
        self.id_of(name)
            .ok_or_else(|| ModelError::UnknownSymbol(name.to_string()))
    }

    pub fn name_of(&self, id: TypeId) -> &str {
        &self.nodes[usize::from(id)].name
    }

    pub fn parent_of(&self, id: TypeId) -> Option<TypeId> {
        self.nodes[usize::from(id)].parent
    }

    /// Whether `sup` appears on the chain from `tpe` to its root.
    pub fn is_a(&self, tpe: TypeId, sup: TypeId) -> bool {
        let mut current = Some(tpe);
        while let Some(t) = current {
            if t == sup {
                return true;
            }
            current = self.parent_of(t);
        }
        false
    }

    /// Two types are compatible when one is a subtype of the other.
    pub fn are_compatible(&self, a: TypeId, b: TypeId) -> bool {
        self.is_a(a, b) || self.is_a(b, a)
    }

    /// The deeper of two compatible types, `None` when they are unrelated.
    pub fn closer_of(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if self.is_a(a, b) {
            Some(a)
        } else if self.is_a(b, a) {
            Some(b)
        } else {
            None
        }
    }

    /// Iterator on all type handles by increasing id.
    pub fn types(&self) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.nodes.len()).map(TypeId::from)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
