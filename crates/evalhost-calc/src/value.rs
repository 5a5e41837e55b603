//! Runtime values.

use std::fmt;

use serde_json::Value as JsonValue;

/// A value in the calc language.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    String(String),
    /// Numbers are always f64.
    Number(f64),
    Boolean(bool),
    List(Vec<Value>),
}

impl Value {
    /// Coerce this value to a string.
    pub fn to_string_value(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::String(s) => s.clone(),
            Value::Number(n) => {
                if n.is_nan() {
                    "NaN".to_string()
                } else if n.is_infinite() {
                    if *n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
                } else if is_integral(*n) {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(Value::to_source).collect();
                format!("[{}]", items.join(", "))
            }
        }
    }

    /// Like `to_string_value`, but strings are quoted. Used inside lists.
    fn to_source(&self) -> String {
        match self {
            Value::String(s) => format!("{:?}", s),
            other => other.to_string_value(),
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::List(_) => "list",
        }
    }

    /// Convert a JSON value received from the client.
    ///
    /// Objects have no counterpart and become null.
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null | JsonValue::Object(_) => Value::Null,
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
        }
    }

    /// Convert to JSON for an eval response. Integral numbers become JSON
    /// integers; NaN and the infinities become null.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Number(n) if is_integral(*n) => JsonValue::from(*n as i64),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

/// Whether `n` is a whole number that i64 holds exactly.
fn is_integral(n: f64) -> bool {
    n.is_finite() && n == n.trunc() && n.abs() < 9.0e15
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integral_numbers_are_json_integers() {
        assert_eq!(Value::Number(2.0).to_json(), json!(2));
        assert_eq!(Value::Number(-7.0).to_json(), json!(-7));
        assert_eq!(Value::Number(2.5).to_json(), json!(2.5));
        assert_eq!(Value::Number(f64::NAN).to_json(), JsonValue::Null);
    }

    #[test]
    fn test_list_to_json() {
        let list = Value::List(vec![Value::Number(1.0), Value::String("a".into()), Value::Null]);
        assert_eq!(list.to_json(), json!([1, "a", null]));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            Value::from_json(&json!([1, "x", true])),
            Value::List(vec![Value::Number(1.0), Value::String("x".into()), Value::Boolean(true)])
        );
        assert_eq!(Value::from_json(&json!({"a": 1})), Value::Null);
    }

    #[test]
    fn test_to_string_value() {
        assert_eq!(Value::Number(3.0).to_string_value(), "3");
        assert_eq!(Value::Number(0.5).to_string_value(), "0.5");
        assert_eq!(
            Value::List(vec![Value::Number(1.0), Value::String("a".into())]).to_string_value(),
            "[1, \"a\"]"
        );
    }
}
