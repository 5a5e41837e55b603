//! The calc interpreter.

use std::collections::HashMap;

use evalhost_engine::{EngineError, EvalInput, EvalOutput, EvalValue, Evaluator, Host, ParseStatus, ResultMode};

use crate::error::{Error, ParseError};
use crate::eval::Eval;
use crate::parser::parse;
use crate::runtime::Runtime;
use crate::value::Value;

/// Evaluator for calc programs.
///
/// Global variables persist across evaluations, nested ones included.
#[derive(Debug, Default)]
pub struct Calc {
    pub(crate) globals: HashMap<String, Value>,
}

impl Calc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }
}

impl Evaluator for Calc {
    fn evaluate(&mut self, input: &EvalInput<'_>, host: &mut dyn Host) -> Result<EvalOutput, EngineError> {
        let program = match parse(input.expr) {
            Ok(program) if program.is_empty() => return Ok(status(ParseStatus::Null)),
            Ok(program) => program,
            Err(ParseError::Incomplete { message }) => {
                tracing::debug!(id = input.id, %message, "Incomplete expression");
                return Ok(status(ParseStatus::Incomplete));
            }
            Err(err) => return Ok(EvalOutput::error(ParseStatus::Error, err.to_string())),
        };

        // Only a parsed program becomes a cancellation target.
        host.enter();
        let runtime = Runtime::new(input.env, input.new_env);
        let result = Eval::new(self, &mut *host, runtime).program(&program);
        host.leave();

        match result {
            Ok(value) => Ok(output(value, input.result)),
            Err(Error::Runtime(message)) => Ok(EvalOutput::error(ParseStatus::Ok, message)),
            Err(Error::Engine(err)) => Err(err),
        }
    }
}

fn status(parse_status: ParseStatus) -> EvalOutput {
    EvalOutput {
        parse_status,
        error: None,
        value: None,
    }
}

fn output(value: Value, mode: ResultMode) -> EvalOutput {
    match (mode, value) {
        (ResultMode::None, _) => status(ParseStatus::Ok),
        (ResultMode::Json, value) => EvalOutput::value(EvalValue::Json(value.to_json())),
        (ResultMode::Raw, Value::String(s)) => EvalOutput::value(EvalValue::Raw(s.into_bytes())),
        (ResultMode::Raw, Value::Null) => EvalOutput::value(EvalValue::Raw(Vec::new())),
        (ResultMode::Raw, other) => EvalOutput::error(
            ParseStatus::Ok,
            format!("raw result must be a string, got {}", other.type_name()),
        ),
    }
}
