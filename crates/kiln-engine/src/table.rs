//! Ordered table object
//!
//! Tables keep entries in insertion order and index them through an
//! `FxHashMap` keyed by a normalized key. Float keys with an exact integer
//! value are normalized to integers, so `t[2.0]` and `t[2]` address the
//! same entry.

use kiln_sdk::{float_to_integer, BridgeError, BridgeResult, ObjectRef, ScriptString, ScriptValue};
use rustc_hash::FxHashMap;

/// Hashable form of a table key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TableKey {
    Bool(bool),
    Integer(i64),
    Float(u64),
    String(ScriptString),
    Ref(ObjectRef),
}

impl TableKey {
    fn from_value(key: &ScriptValue) -> BridgeResult<Self> {
        match key {
            ScriptValue::Nil => Err(BridgeError::Runtime("table index is nil".to_string())),
            ScriptValue::Bool(b) => Ok(TableKey::Bool(*b)),
            ScriptValue::Integer(i) => Ok(TableKey::Integer(*i)),
            ScriptValue::Number(n) if n.is_nan() => {
                Err(BridgeError::Runtime("table index is NaN".to_string()))
            }
            ScriptValue::Number(n) => Ok(match float_to_integer(*n) {
                Some(i) => TableKey::Integer(i),
                None => TableKey::Float(n.to_bits()),
            }),
            ScriptValue::String(s) => Ok(TableKey::String(s.clone())),
            ScriptValue::Table(r) | ScriptValue::Function(r) | ScriptValue::Userdata(r) => {
                Ok(TableKey::Ref(*r))
            }
        }
    }
}

/// Normalize a key value the same way lookups do
fn normalize_key(key: ScriptValue) -> ScriptValue {
    match key {
        ScriptValue::Number(n) => match float_to_integer(n) {
            Some(i) => ScriptValue::Integer(i),
            None => ScriptValue::Number(n),
        },
        other => other,
    }
}

/// Insertion-ordered table
#[derive(Debug, Default)]
pub struct Table {
    entries: Vec<(ScriptValue, ScriptValue)>,
    index: FxHashMap<TableKey, usize>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key (`nil` when absent)
    pub fn get(&self, key: &ScriptValue) -> BridgeResult<ScriptValue> {
        let key = TableKey::from_value(key)?;
        Ok(self
            .index
            .get(&key)
            .map(|&pos| self.entries[pos].1.clone())
            .unwrap_or_default())
    }

    /// Insert or overwrite an entry, keeping the original position on overwrite
    pub fn set(&mut self, key: ScriptValue, value: ScriptValue) -> BridgeResult<()> {
        let hashed = TableKey::from_value(&key)?;
        match self.index.get(&hashed) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(hashed, self.entries.len());
                self.entries.push((normalize_key(key), value));
            }
        }
        Ok(())
    }

    /// Remove an entry, returning its value
    pub fn remove(&mut self, key: &ScriptValue) -> BridgeResult<Option<ScriptValue>> {
        let hashed = TableKey::from_value(key)?;
        let Some(pos) = self.index.remove(&hashed) else {
            return Ok(None);
        };
        let (_, value) = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Ok(Some(value))
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[(ScriptValue, ScriptValue)] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Length of the sequence part: largest n with keys 1..=n all present
    pub fn sequence_len(&self) -> usize {
        let mut n = 0usize;
        while self.index.contains_key(&TableKey::Integer(n as i64 + 1)) {
            n += 1;
        }
        n
    }
}
