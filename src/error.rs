use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrineError {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("Undefined filter '{0}'")]
    UndefinedFilter(String),

    #[error("Filter '{filter}' error: {message}")]
    Filter { filter: String, message: String },

    #[error("'{0}' used outside of a for loop")]
    StrayControlFlow(&'static str),
}
