//! Namespace tree of installed functions
//!
//! A [`Namespace`] is built once per `Bindings` and materialized into a
//! fresh table tree for every runtime it is installed into.

use kiln_sdk::{BridgeResult, NativeFn, ScriptContext, ScriptValue};

use crate::adapter::protect;

enum Entry {
    Function(NativeFn),
    Namespace(Namespace),
}

/// Nested name → function / sub-namespace table
pub struct Namespace {
    path: String,
    entries: Vec<(String, Entry)>,
}

impl Namespace {
    /// Create an empty namespace; `path` is used to qualify function names
    /// in errors and logs
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            entries: Vec::new(),
        }
    }

    /// Dotted path of this namespace
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Add a protected function
    pub fn function<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut dyn ScriptContext, &[ScriptValue]) -> BridgeResult<ScriptValue>
            + Send
            + Sync
            + 'static,
    {
        let qualified = format!("{}.{}", self.path, name);
        self.entries
            .push((name.to_string(), Entry::Function(protect(&qualified, f))));
        self
    }

    /// Add a child namespace built by `f`
    pub fn namespace<F>(mut self, name: &str, f: F) -> BridgeResult<Self>
    where
        F: FnOnce(Namespace) -> BridgeResult<Namespace>,
    {
        let child = f(Namespace::new(&format!("{}.{}", self.path, name)))?;
        self.entries.push((name.to_string(), Entry::Namespace(child)));
        Ok(self)
    }

    /// Names of the direct entries, in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Materialize the tree as tables in `ctx`
    pub fn build(&self, ctx: &mut dyn ScriptContext) -> BridgeResult<ScriptValue> {
        let table = ctx.create_table();
        for (name, entry) in &self.entries {
            let value = match entry {
                Entry::Function(f) => {
                    let qualified = format!("{}.{}", self.path, name);
                    ctx.create_function(&qualified, f.clone())
                }
                Entry::Namespace(child) => child.build(ctx)?,
            };
            ctx.raw_set(&table, name.as_str().into(), value)?;
        }
        Ok(table)
    }
}
