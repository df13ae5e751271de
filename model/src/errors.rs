use thiserror::Error;

/// Errors raised while building or evaluating the symbolic model.
///
/// Unsatisfiable goals or missing action candidates are planner outcomes,
/// not errors, and never surface through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A structural invariant of an AST node is violated
    /// (e.g. an assignment to a non-functional predicate).
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// An entity or parameter does not fit the type expected at its position.
    #[error("type mismatch: `{value}` of type `{found}` is not a `{expected}`")]
    TypeMismatch {
        value: String,
        found: String,
        expected: String,
    },
    /// A type, predicate or entity is not declared in the ontology
    /// nor in the problem entities.
    #[error("unknown symbol: `{0}`")]
    UnknownSymbol(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
