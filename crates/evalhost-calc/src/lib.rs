//! A small expression language run by the evalhost engine.
//!
//! [`Calc`] implements [`evalhost_engine::Evaluator`]. Long-running
//! builtins (`sleep`, `spin`) and every statement and call pass through
//! [`evalhost_engine::Host::tick`], so queued evaluations run nested and
//! cancellation unwinds through the interpreter with `?`.

pub mod ast;
mod error;
mod eval;
mod interpreter;
mod lexer;
mod parser;
mod runtime;
mod value;

pub use error::{Error, ParseError};
pub use interpreter::Calc;
pub use parser::parse;
pub use value::Value;

/// Result type for interpreter operations.
pub type Result<T> = std::result::Result<T, Error>;
