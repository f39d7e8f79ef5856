use thiserror::Error;

/// Errors raised while building or validating a planning model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("action {action}: parameter {parameter} is not declared")]
    UndeclaredParameter { action: String, parameter: String },

    #[error("action {action}: fluent parameter {parameter} is not declared")]
    UndeclaredFluentParameter { action: String, parameter: String },

    #[error("action {0} already exists")]
    ActionAlreadyExists(String),

    #[error("fact {fact}: predicate expects {expected} arguments, got {found}")]
    PredicateArity {
        fact: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid fact `{0}`")]
    InvalidFact(String),

    #[error("invalid expression `{0}`")]
    InvalidExpression(String),

    #[error("invalid condition `{0}`")]
    InvalidCondition(String),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
