use evalhost_engine::EngineError;
use thiserror::Error;

/// Errors raised while running a program.
#[derive(Error, Debug)]
pub enum Error {
    /// A script error, reported back to the client as the eval's error text.
    #[error("{0}")]
    Runtime(String),

    /// Cancellation or a fatal engine error. Never caught by the interpreter.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl Error {
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }
}

/// Why a program failed to parse.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The input ended inside a string, a bracket or an expression. More
    /// input could complete it.
    #[error("{message}")]
    Incomplete { message: String },

    #[error("{message} at line {line}")]
    Invalid { message: String, line: usize },
}

impl ParseError {
    pub fn incomplete(message: impl Into<String>) -> Self {
        ParseError::Incomplete {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>, line: usize) -> Self {
        ParseError::Invalid {
            message: message.into(),
            line,
        }
    }
}
