//! Expression and statement evaluation.
//!
//! Script errors are `Error::Runtime` and end only the current evaluation.
//! Engine errors, cancellation included, come out of host calls and
//! propagate with `?` to the engine.

use std::time::{Duration, Instant};

use evalhost_engine::protocol::names;
use evalhost_engine::{EngineError, Host};
use serde_json::Value as JsonValue;

use crate::ast::{BinOp, Expr, Program, Statement, UnOp};
use crate::error::Error;
use crate::interpreter::Calc;
use crate::runtime::Runtime;
use crate::value::Value;
use crate::Result;

/// Longest single sleep between checkpoints in `sleep`.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Deepest expression tree `expr` will walk. Parsed programs stay well below
/// this; it bounds trees built some other way.
pub(crate) const MAX_DEPTH: usize = 512;

/// State of one running evaluation.
pub(crate) struct Eval<'a> {
    pub calc: &'a mut Calc,
    pub host: &'a mut dyn Host,
    pub runtime: Runtime,
    depth: usize,
}

impl<'a> Eval<'a> {
    pub fn new(calc: &'a mut Calc, host: &'a mut dyn Host, runtime: Runtime) -> Self {
        Eval {
            calc,
            host,
            runtime,
            depth: 0,
        }
    }

    /// Checkpoint: runs nested evaluations and unwinds on cancellation.
    fn tick(&mut self) -> Result<()> {
        self.host.tick(&mut *self.calc)?;
        Ok(())
    }

    /// Run all statements. The program's value is that of the last one.
    pub fn program(&mut self, program: &Program) -> Result<Value> {
        let mut result = Value::Null;
        for statement in &program.statements {
            self.tick()?;
            result = self.statement(statement)?;
        }
        Ok(result)
    }

    fn statement(&mut self, statement: &Statement) -> Result<Value> {
        match statement {
            Statement::Assign { name, value } => {
                let value = self.expr(value)?;
                self.runtime.set_var(name, value.clone(), &mut self.calc.globals);
                Ok(value)
            }
            Statement::Expr(expr) => self.expr(expr),
        }
    }

    pub fn expr(&mut self, expr: &Expr) -> Result<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::runtime("expression nested too deeply"));
        }
        self.depth += 1;
        let result = self.walk(expr);
        self.depth -= 1;
        result
    }

    fn walk(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Identifier(name) => self
                .runtime
                .get_var(name, &self.calc.globals)
                .ok_or_else(|| Error::runtime(format!("object '{}' not found", name))),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.expr(item)?);
                }
                Ok(Value::List(values))
            }
            Expr::Unary { op, operand } => {
                let value = self.expr(operand)?;
                unary(*op, value)
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.expr(arg)?);
                }
                self.tick()?;
                self.call(name, values)
            }
        }
    }

    fn binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<Value> {
        let left = self.expr(left)?;
        match op {
            BinOp::And if !left.to_bool() => return Ok(Value::Boolean(false)),
            BinOp::Or if left.to_bool() => return Ok(Value::Boolean(true)),
            BinOp::And | BinOp::Or => return Ok(Value::Boolean(self.expr(right)?.to_bool())),
            _ => {}
        }
        let right = self.expr(right)?;

        let result = match op {
            BinOp::Add => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                (Value::String(a), b) => Value::String(format!("{}{}", a, b.to_string_value())),
                (a, Value::String(b)) => Value::String(format!("{}{}", a.to_string_value(), b)),
                (Value::List(a), Value::List(b)) => Value::List(a.iter().chain(b).cloned().collect()),
                _ => {
                    return Err(Error::runtime(format!(
                        "cannot add {} and {}",
                        left.type_name(),
                        right.type_name()
                    )))
                }
            },
            BinOp::Sub => num_op("-", &left, &right, |a, b| a - b)?,
            BinOp::Mul => num_op("*", &left, &right, |a, b| a * b)?,
            BinOp::Div => num_op("/", &left, &right, |a, b| a / b)?,
            BinOp::Rem => num_op("%", &left, &right, |a, b| a % b)?,
            BinOp::Eq => Value::Boolean(left == right),
            BinOp::NotEq => Value::Boolean(left != right),
            BinOp::Lt => compare(&left, &right, |ord| ord.is_lt())?,
            BinOp::LtEq => compare(&left, &right, |ord| ord.is_le())?,
            BinOp::Gt => compare(&left, &right, |ord| ord.is_gt())?,
            BinOp::GtEq => compare(&left, &right, |ord| ord.is_ge())?,
            BinOp::And | BinOp::Or => unreachable!("short-circuited above"),
        };
        Ok(result)
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        if !self.runtime.has_builtins() {
            return Err(Error::runtime(format!("could not find function '{}'", name)));
        }

        match name {
            "print" => {
                let text: Vec<String> = args.iter().map(Value::to_string_value).collect();
                self.host
                    .notify(names::OUTPUT, vec![JsonValue::String(format!("{}\n", text.join(" ")))])?;
                Ok(Value::Null)
            }
            "ask" => {
                let [prompt] = arity::<1>(name, args)?;
                if !self.host.callbacks_allowed() {
                    return Err(Error::runtime("blocking callback not allowed during evaluation"));
                }
                let response = self.host.request(&mut *self.calc, names::READ_INPUT, vec![prompt.to_json()])?;
                Ok(response.args().first().map(Value::from_json).unwrap_or_default())
            }
            "sleep" => {
                let [ms] = arity::<1>(name, args)?;
                let ms = number(name, &ms)?;
                let invalid = || Error::runtime(format!("sleep: invalid duration {}", ms));
                let duration = Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).map_err(|_| invalid())?;
                let deadline = Instant::now().checked_add(duration).ok_or_else(invalid)?;
                loop {
                    self.tick()?;
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(Value::Null);
                    }
                    std::thread::sleep(remaining.min(SLEEP_SLICE));
                }
            }
            "spin" => {
                arity::<0>(name, args)?;
                loop {
                    self.tick()?;
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            "error" => {
                let message: Vec<String> = args.iter().map(Value::to_string_value).collect();
                Err(Error::Runtime(message.join(" ")))
            }
            "len" => match arity::<1>(name, args)? {
                [Value::String(s)] => Ok(Value::Number(s.chars().count() as f64)),
                [Value::List(items)] => Ok(Value::Number(items.len() as f64)),
                [other] => Err(Error::runtime(format!("len: cannot take length of {}", other.type_name()))),
            },
            "str" => {
                let [value] = arity::<1>(name, args)?;
                Ok(Value::String(value.to_string_value()))
            }
            "blob" => {
                let [value] = arity::<1>(name, args)?;
                let bytes = value.to_string_value().into_bytes();
                let handle = self.host.blobs().create(bytes).map_err(EngineError::from)?;
                Ok(Value::Number(handle as f64))
            }
            "blob_text" => {
                let [handle] = arity::<1>(name, args)?;
                let handle = number(name, &handle)?;
                let bytes = self
                    .host
                    .blobs()
                    .get(handle as u64)
                    .map_err(|err| Error::runtime(err.to_string()))?;
                Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            }
            _ => Err(Error::runtime(format!("could not find function '{}'", name))),
        }
    }
}

fn unary(op: UnOp, value: Value) -> Result<Value> {
    match (op, value) {
        (UnOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnOp::Neg, other) => Err(Error::runtime(format!("cannot negate {}", other.type_name()))),
        (UnOp::Not, value) => Ok(Value::Boolean(!value.to_bool())),
    }
}

fn num_op(symbol: &str, left: &Value, right: &Value, op: fn(f64, f64) -> f64) -> Result<Value> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(op(*a, *b))),
        _ => Err(Error::runtime(format!(
            "non-numeric argument to '{}': {} and {}",
            symbol,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn compare(left: &Value, right: &Value, pred: fn(std::cmp::Ordering) -> bool) -> Result<Value> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match ordering {
        Some(ordering) => Ok(Value::Boolean(pred(ordering))),
        None => Err(Error::runtime(format!(
            "cannot compare {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn number(function: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(Error::runtime(format!("{}: expected a number, got {}", function, other.type_name()))),
    }
}

/// Check that a builtin got exactly `N` arguments.
fn arity<const N: usize>(function: &str, args: Vec<Value>) -> Result<[Value; N]> {
    let count = args.len();
    args.try_into().map_err(|_| {
        Error::runtime(format!(
            "{}: expected {} argument{}, got {}",
            function,
            N,
            if N == 1 { "" } else { "s" },
            count
        ))
    })
}
