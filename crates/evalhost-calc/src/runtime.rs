//! Variable scopes for one evaluation.

use std::collections::HashMap;

use evalhost_engine::protocol::EnvSelector;

use crate::value::Value;

/// Where an evaluation's variables live.
///
/// The global scope belongs to the [`crate::Calc`] and outlives any one
/// evaluation; it is passed in on every lookup so a nested evaluation sees
/// and makes the same changes. Every other scope is local to this runtime
/// and is thrown away with it.
#[derive(Debug)]
pub struct Runtime {
    env: EnvSelector,
    /// Scopes above the environment, innermost last.
    scopes: Vec<HashMap<String, Value>>,
}

impl Runtime {
    /// Runtime for an evaluation in `env`. With `new_env`, assignments go to
    /// a child scope instead of the environment itself.
    pub fn new(env: EnvSelector, new_env: bool) -> Self {
        let mut scopes = Vec::new();
        // Base and empty environments are fresh for every evaluation.
        if env != EnvSelector::Global {
            scopes.push(HashMap::new());
        }
        if new_env {
            scopes.push(HashMap::new());
        }
        Self { env, scopes }
    }

    /// Whether builtin functions can be called.
    pub fn has_builtins(&self) -> bool {
        self.env != EnvSelector::Empty
    }

    pub fn get_var(&self, name: &str, globals: &HashMap<String, Value>) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(value.clone());
            }
        }
        if self.env == EnvSelector::Global {
            return globals.get(name).cloned();
        }
        None
    }

    /// Assign in the innermost scope, which is the global one unless this
    /// runtime has local scopes.
    pub fn set_var(&mut self, name: &str, value: Value, globals: &mut HashMap<String, Value>) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => {
                globals.insert(name.to_string(), value);
            }
        }
    }
}
