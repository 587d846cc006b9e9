//! Value bridge: script values ↔ structured documents
//!
//! Tables classify as arrays only when they are non-empty and their keys,
//! in enumeration order, are exactly `1..=n`. Everything else (the empty
//! table included) is an object with stringified keys.

use kiln_sdk::{format_number, BridgeError, BridgeResult, ObjectRef, ScriptContext, ScriptValue};
use rustc_hash::FxHashSet;

use crate::document::Node;

/// Nesting limit used by [`to_document`]
pub const DEFAULT_MAX_DEPTH: usize = 200;

/// Convert a script value to a document
pub fn to_document(ctx: &dyn ScriptContext, value: &ScriptValue) -> BridgeResult<Node> {
    to_document_limited(ctx, value, DEFAULT_MAX_DEPTH)
}

/// Convert a script value to a document, failing past `max_depth` nested
/// tables
pub fn to_document_limited(
    ctx: &dyn ScriptContext,
    value: &ScriptValue,
    max_depth: usize,
) -> BridgeResult<Node> {
    let mut walker = Walker {
        ctx,
        path: FxHashSet::default(),
        max_depth,
    };
    walker.value(value, 0)
}

struct Walker<'a> {
    ctx: &'a dyn ScriptContext,
    /// Tables on the current path, for cycle detection
    path: FxHashSet<ObjectRef>,
    max_depth: usize,
}

impl Walker<'_> {
    fn value(&mut self, value: &ScriptValue, depth: usize) -> BridgeResult<Node> {
        match value {
            ScriptValue::Nil => Ok(Node::Null),
            ScriptValue::Bool(b) => Ok(Node::Bool(*b)),
            ScriptValue::Integer(i) => Ok(Node::Int(*i)),
            ScriptValue::Number(n) => Ok(Node::Float(*n)),
            ScriptValue::String(s) => s.as_str().map(Node::from).ok_or_else(|| {
                BridgeError::NotDocumentCastable("string is not valid UTF-8".to_string())
            }),
            ScriptValue::Table(r) => self.table(value, *r, depth),
            ScriptValue::Function(_) | ScriptValue::Userdata(_) => Err(
                BridgeError::NotDocumentCastable(format!("{} value", value.type_name())),
            ),
        }
    }

    fn table(&mut self, table: &ScriptValue, r: ObjectRef, depth: usize) -> BridgeResult<Node> {
        if depth >= self.max_depth {
            return Err(BridgeError::NotDocumentCastable(format!(
                "nesting deeper than {} levels",
                self.max_depth
            )));
        }
        if !self.path.insert(r) {
            return Err(BridgeError::NotDocumentCastable("cyclic table".to_string()));
        }

        let pairs = self.ctx.table_pairs(table)?;
        let is_array = !pairs.is_empty()
            && pairs
                .iter()
                .enumerate()
                .all(|(i, (key, _))| matches!(key, ScriptValue::Integer(n) if *n == i as i64 + 1));

        let node = if is_array {
            let mut items = Vec::with_capacity(pairs.len());
            for (_, value) in &pairs {
                items.push(self.value(value, depth + 1)?);
            }
            Node::Array(items)
        } else {
            let mut members = Vec::with_capacity(pairs.len());
            for (key, value) in &pairs {
                members.push((Node::String(object_key(key)?), self.value(value, depth + 1)?));
            }
            Node::Object(members)
        };

        self.path.remove(&r);
        Ok(node)
    }
}

fn object_key(key: &ScriptValue) -> BridgeResult<String> {
    match key {
        ScriptValue::Integer(i) => Ok(i.to_string()),
        ScriptValue::Number(n) => Ok(format_number(*n)),
        ScriptValue::Bool(b) => Ok(b.to_string()),
        ScriptValue::String(s) => s.as_str().map(str::to_string).ok_or_else(|| {
            BridgeError::NotDocumentCastable("object key is not valid UTF-8".to_string())
        }),
        other => Err(BridgeError::NotDocumentCastable(format!(
            "{} used as object key",
            other.type_name()
        ))),
    }
}

/// Convert a document to a script value, allocating tables as needed
pub fn from_document(ctx: &mut dyn ScriptContext, node: &Node) -> BridgeResult<ScriptValue> {
    Ok(match node {
        Node::Null => ScriptValue::Nil,
        Node::Bool(b) => ScriptValue::Bool(*b),
        Node::Int(i) => ScriptValue::Integer(*i),
        Node::Float(n) => ScriptValue::Number(*n),
        Node::String(s) => ScriptValue::from(s.as_str()),
        Node::Array(items) => {
            let table = ctx.create_table();
            for (i, item) in items.iter().enumerate() {
                let value = from_document(ctx, item)?;
                ctx.raw_set(&table, ScriptValue::Integer(i as i64 + 1), value)?;
            }
            table
        }
        Node::Object(pairs) => {
            let table = ctx.create_table();
            for (key, value) in pairs {
                if let Node::Null = key {
                    return Err(BridgeError::Argument("null object key".to_string()));
                }
                let key = from_document(ctx, key)?;
                let value = from_document(ctx, value)?;
                ctx.raw_set(&table, key, value)?;
            }
            table
        }
    })
}
