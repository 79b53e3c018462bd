use crate::value::Value;
use std::collections::BTreeMap;

/// Runtime state of one template invocation: the context it was called with,
/// the loop slots bound so far, and how deep in partial inclusion it runs.
pub struct Frame<'v> {
    root: &'v Value,
    locals: Vec<Value>,
    depth: usize,
}

impl<'v> Frame<'v> {
    pub fn new(root: &'v Value) -> Self {
        Self::nested(root, 0)
    }

    pub fn nested(root: &'v Value, depth: usize) -> Self {
        Self {
            root,
            locals: Vec::new(),
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn push(&mut self, value: Value) {
        self.locals.push(value);
    }

    pub fn pop(&mut self) {
        self.locals.pop();
    }

    /// Value bound to loop slot `slot`, then down `tail`.
    pub fn local<S: AsRef<str>>(&self, slot: usize, tail: &[S]) -> Option<&Value> {
        self.locals.get(slot)?.get_path(tail)
    }

    /// Top-level context key, then down `tail`.
    pub fn context<S: AsRef<str>>(&self, key: &str, tail: &[S]) -> Option<&Value> {
        self.root.get(key)?.get_path(tail)
    }

    /// The context handed to a partial: this frame's root merged with `params`,
    /// parameters winning. A non-map root contributes nothing.
    pub fn partial_context(&self, params: Vec<(String, Value)>) -> Value {
        let mut merged = match self.root {
            Value::Map(m) => m.clone(),
            _ => BTreeMap::new(),
        };
        merged.extend(params);
        Value::Map(merged)
    }
}
