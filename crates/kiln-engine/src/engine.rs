//! ScriptEngine: the reference embedding runtime
//!
//! Implements `kiln_sdk::ScriptContext` over the slot heap and adds the
//! script-side operations bindings are exercised through: metatable-driven
//! indexing, method calls, `tostring`, host pins and collection.

use std::any::Any;
use std::rc::Rc;

use kiln_sdk::{
    format_number, BridgeError, BridgeResult, NativeFn, ObjectRef, ScriptContext, ScriptValue,
    TypeTag, UserdataInit,
};
use tracing::trace;

use crate::gc::{collector, GcHeader, GcStats, Heap, RootSet};
use crate::object::{FunctionObject, HeapObject, UserdataObject};
use crate::table::Table;

/// Maximum nesting of native calls before the runtime reports a stack overflow
pub const MAX_CALL_DEPTH: usize = 200;

/// Single-threaded script runtime
pub struct ScriptEngine {
    /// GC-managed objects
    heap: Heap,

    /// Collector roots
    roots: RootSet,

    /// Global table
    globals: ObjectRef,

    /// Host-private registry table
    registry: ObjectRef,

    /// Current native call depth
    depth: usize,

    /// Collector statistics
    stats: GcStats,
}

impl ScriptEngine {
    /// Create a runtime with empty global and registry tables
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let globals = heap.allocate(GcHeader::new(), HeapObject::Table(Table::new()));
        let registry = heap.allocate(GcHeader::new(), HeapObject::Table(Table::new()));

        let mut roots = RootSet::new();
        roots.add_permanent(globals);
        roots.add_permanent(registry);

        Self {
            heap,
            roots,
            globals,
            registry,
            depth: 0,
            stats: GcStats::default(),
        }
    }

    // ========================================================================
    // Heap access helpers
    // ========================================================================

    fn stale(r: ObjectRef) -> BridgeError {
        BridgeError::Runtime(format!("stale object reference {:?}", r))
    }

    fn table(&self, value: &ScriptValue) -> BridgeResult<&Table> {
        let ScriptValue::Table(r) = value else {
            return Err(BridgeError::type_mismatch("table", value.type_name()));
        };
        match self.heap.get(*r).map(|cell| &cell.object) {
            Some(HeapObject::Table(t)) => Ok(t),
            _ => Err(Self::stale(*r)),
        }
    }

    fn table_mut(&mut self, value: &ScriptValue) -> BridgeResult<&mut Table> {
        let ScriptValue::Table(r) = value else {
            return Err(BridgeError::type_mismatch("table", value.type_name()));
        };
        match self.heap.get_mut(*r).map(|cell| &mut cell.object) {
            Some(HeapObject::Table(t)) => Ok(t),
            _ => Err(Self::stale(*r)),
        }
    }

    fn userdata(&self, value: &ScriptValue) -> Option<(&GcHeader, &UserdataObject)> {
        let ScriptValue::Userdata(r) = value else {
            return None;
        };
        match self.heap.get(*r) {
            Some(cell) => match &cell.object {
                HeapObject::Userdata(ud) => Some((&cell.header, ud)),
                _ => None,
            },
            None => None,
        }
    }

    fn metafield(&self, value: &ScriptValue, name: &str) -> BridgeResult<ScriptValue> {
        let Some((_, ud)) = self.userdata(value) else {
            return Ok(ScriptValue::Nil);
        };
        match ud.metatable {
            Some(mt) => self.raw_get(&ScriptValue::Table(mt), &name.into()),
            None => Ok(ScriptValue::Nil),
        }
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// Set a global variable
    pub fn set_global(&mut self, name: &str, value: ScriptValue) -> BridgeResult<()> {
        let globals = self.globals();
        self.raw_set(&globals, name.into(), value)
    }

    /// Read a global variable
    pub fn get_global(&self, name: &str) -> BridgeResult<ScriptValue> {
        self.raw_get(&self.globals(), &name.into())
    }

    // ========================================================================
    // Script-side operations
    // ========================================================================

    /// `obj[key]`, honoring the userdata `__index` metamethod
    pub fn index(&mut self, obj: &ScriptValue, key: impl Into<ScriptValue>) -> BridgeResult<ScriptValue> {
        let key = key.into();
        match obj {
            ScriptValue::Table(_) => self.raw_get(obj, &key),
            ScriptValue::Userdata(_) => match self.metafield(obj, "__index")? {
                handler @ ScriptValue::Function(_) => self.call(&handler, &[obj.clone(), key]),
                lookup @ ScriptValue::Table(_) => self.raw_get(&lookup, &key),
                _ => Err(BridgeError::Runtime("attempt to index a userdata value".to_string())),
            },
            other => Err(BridgeError::Runtime(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    /// `obj[key] = value`, honoring the userdata `__newindex` metamethod
    pub fn set_index(
        &mut self,
        obj: &ScriptValue,
        key: impl Into<ScriptValue>,
        value: ScriptValue,
    ) -> BridgeResult<()> {
        let key = key.into();
        match obj {
            ScriptValue::Table(_) => self.raw_set(obj, key, value),
            ScriptValue::Userdata(_) => match self.metafield(obj, "__newindex")? {
                handler @ ScriptValue::Function(_) => {
                    self.call(&handler, &[obj.clone(), key, value]).map(|_| ())
                }
                _ => Err(BridgeError::Runtime("attempt to index a userdata value".to_string())),
            },
            other => Err(BridgeError::Runtime(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    /// `obj:name(args...)`
    pub fn call_method(
        &mut self,
        obj: &ScriptValue,
        name: &str,
        args: &[ScriptValue],
    ) -> BridgeResult<ScriptValue> {
        let method = self.index(obj, name)?;
        if method.is_nil() {
            return Err(BridgeError::Runtime(format!(
                "attempt to call a nil value (method '{}')",
                name
            )));
        }
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(obj.clone());
        full.extend_from_slice(args);
        self.call(&method, &full)
    }

    /// Resolve a dotted path from the globals (`"kiln.netIntel.getAsByIp"`)
    pub fn get_path(&mut self, path: &str) -> BridgeResult<ScriptValue> {
        let mut current = self.globals();
        for segment in path.split('.') {
            current = self.index(&current, segment)?;
        }
        Ok(current)
    }

    /// Call the function at a dotted path
    pub fn call_path(&mut self, path: &str, args: &[ScriptValue]) -> BridgeResult<ScriptValue> {
        let func = self.get_path(path)?;
        self.call(&func, args)
    }

    /// String conversion, honoring the userdata `__tostring` metamethod
    pub fn tostring(&mut self, value: &ScriptValue) -> BridgeResult<String> {
        Ok(match value {
            ScriptValue::Nil => "nil".to_string(),
            ScriptValue::Bool(b) => b.to_string(),
            ScriptValue::Integer(i) => i.to_string(),
            ScriptValue::Number(n) => format_number(*n),
            ScriptValue::String(s) => s.to_string_lossy(),
            ScriptValue::Table(r) => format!("table: 0x{:08x}", r.index()),
            ScriptValue::Function(r) => format!("function: 0x{:08x}", r.index()),
            ScriptValue::Userdata(r) => {
                let handler = self.metafield(value, "__tostring")?;
                if let ScriptValue::Function(_) = handler {
                    let result = self.call(&handler, &[value.clone()])?;
                    return match result {
                        ScriptValue::String(s) => Ok(s.to_string_lossy()),
                        _ => Err(BridgeError::Runtime(
                            "'__tostring' must return a string".to_string(),
                        )),
                    };
                }
                let name = self.metafield(value, "__name")?;
                match name.as_str() {
                    Some(name) => format!("{}: 0x{:08x}", name, r.index()),
                    None => format!("userdata: 0x{:08x}", r.index()),
                }
            }
        })
    }

    /// Length of the sequence part of a table
    pub fn table_len(&self, table: &ScriptValue) -> BridgeResult<usize> {
        Ok(self.table(table)?.sequence_len())
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Keep a value alive across collections until unpinned
    pub fn pin(&mut self, value: &ScriptValue) {
        self.roots.pin(value);
    }

    /// Release a pin taken with [`pin`](Self::pin)
    pub fn unpin(&mut self, value: &ScriptValue) {
        self.roots.unpin(value);
    }

    /// Run a full collection; unreachable userdata are finalized
    pub fn collect_garbage(&mut self) -> &GcStats {
        collector::collect(&mut self.heap, &self.roots, &mut self.stats);
        &self.stats
    }

    /// Invoke a userdata's finalizer now, as a runtime may do during
    /// shutdown or re-entrant collection.
    ///
    /// Returns `true` if the finalizer ran; repeated calls are no-ops.
    pub fn finalize(&mut self, value: &ScriptValue) -> bool {
        let ScriptValue::Userdata(r) = value else {
            return false;
        };
        match self.heap.get_mut(*r) {
            Some(cell) => collector::finalize(cell, &mut self.stats),
            None => false,
        }
    }

    /// Check whether a heap value is still allocated
    pub fn is_live(&self, value: &ScriptValue) -> bool {
        value.object_ref().map_or(true, |r| self.heap.get(r).is_some())
    }

    /// Number of live heap objects
    pub fn live_objects(&self) -> usize {
        self.heap.len()
    }

    /// Collector statistics
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        collector::finalize_all(&mut self.heap, &mut self.stats);
    }
}

impl ScriptContext for ScriptEngine {
    fn create_table(&mut self) -> ScriptValue {
        ScriptValue::Table(
            self.heap
                .allocate(GcHeader::new(), HeapObject::Table(Table::new())),
        )
    }

    fn raw_get(&self, table: &ScriptValue, key: &ScriptValue) -> BridgeResult<ScriptValue> {
        self.table(table)?.get(key)
    }

    fn raw_set(
        &mut self,
        table: &ScriptValue,
        key: ScriptValue,
        value: ScriptValue,
    ) -> BridgeResult<()> {
        self.table_mut(table)?.set(key, value)
    }

    fn table_pairs(&self, table: &ScriptValue) -> BridgeResult<Vec<(ScriptValue, ScriptValue)>> {
        Ok(self.table(table)?.entries().to_vec())
    }

    fn create_function(&mut self, name: &str, func: NativeFn) -> ScriptValue {
        let object = FunctionObject {
            name: name.to_string(),
            func,
        };
        ScriptValue::Function(self.heap.allocate(GcHeader::new(), HeapObject::Function(object)))
    }

    fn call(&mut self, func: &ScriptValue, args: &[ScriptValue]) -> BridgeResult<ScriptValue> {
        let ScriptValue::Function(r) = func else {
            return Err(BridgeError::Runtime(format!(
                "attempt to call a {} value",
                func.type_name()
            )));
        };
        let (name, native) = match self.heap.get(*r).map(|cell| &cell.object) {
            Some(HeapObject::Function(f)) => (f.name.clone(), f.func.clone()),
            _ => return Err(Self::stale(*r)),
        };
        if self.depth >= MAX_CALL_DEPTH {
            return Err(BridgeError::Runtime("stack overflow".to_string()));
        }

        self.depth += 1;
        let result = native(self, args);
        self.depth -= 1;

        if let Err(err) = &result {
            trace!(function = %name, error = %err, "native call raised");
        }
        result
    }

    fn create_userdata(&mut self, init: UserdataInit) -> BridgeResult<ScriptValue> {
        let metatable = match init.metatable {
            None => None,
            Some(ScriptValue::Table(r)) if self.heap.get(r).is_some() => Some(r),
            Some(other) => {
                return Err(BridgeError::type_mismatch("table", other.type_name()));
            }
        };
        let object = UserdataObject {
            payload: Some(init.payload),
            metatable,
            finalizer: init.finalizer,
        };
        Ok(ScriptValue::Userdata(
            self.heap
                .allocate(GcHeader::tagged(init.tag), HeapObject::Userdata(object)),
        ))
    }

    fn userdata_tag(&self, value: &ScriptValue) -> Option<TypeTag> {
        self.userdata(value)
            .and_then(|(header, _)| header.tag().cloned())
    }

    fn userdata_payload(&self, value: &ScriptValue) -> Option<Rc<dyn Any>> {
        self.userdata(value).and_then(|(_, ud)| ud.payload.clone())
    }

    fn globals(&self) -> ScriptValue {
        ScriptValue::Table(self.globals)
    }

    fn registry(&self) -> ScriptValue {
        ScriptValue::Table(self.registry)
    }
}
