//! Dispatch tables: member name → behavior, per native type
//!
//! A table is built once per type and shared read-only through `Arc`.
//! Names are bucketed by their [`joaat`] hash; a bucket hit is always
//! confirmed by comparing the full name, so colliding names still resolve
//! to their own member.
//!
//! Each runtime gets one metatable per type, cached in its registry under
//! the type tag:
//!
//! | field        | behavior                                              |
//! |--------------|-------------------------------------------------------|
//! | `__index`    | getter → value, method → cached function, else `nil`  |
//! | `__newindex` | setter, else an argument error                        |
//! | `__tostring` | formatter, when the type has one                      |
//! | `__name`     | the type tag                                          |
//! | `__methods`  | one function per method                               |

use std::sync::Arc;

use kiln_sdk::{BridgeError, BridgeResult, ScriptContext, ScriptValue, TypeTag};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::adapter::protect;
use crate::args::arg;
use crate::handle::Handle;
use crate::hash::joaat;
use crate::registry::{check_handle, check_type, register_type};

/// Reads a member value
pub type GetterFn<T> =
    Arc<dyn Fn(&mut dyn ScriptContext, &Handle<T>) -> BridgeResult<ScriptValue> + Send + Sync>;

/// Runs a method with the arguments after `self`
pub type MethodFn<T> = Arc<
    dyn Fn(&mut dyn ScriptContext, &Handle<T>, &[ScriptValue]) -> BridgeResult<ScriptValue>
        + Send
        + Sync,
>;

/// Writes a member value
pub type SetterFn<T> =
    Arc<dyn Fn(&mut dyn ScriptContext, &Handle<T>, ScriptValue) -> BridgeResult<()> + Send + Sync>;

/// Formats a handle for `tostring`
pub type FormatFn<T> = Arc<dyn Fn(&Handle<T>) -> BridgeResult<String> + Send + Sync>;

/// Readable member
pub enum Member<T> {
    /// Evaluated on access
    Getter(GetterFn<T>),
    /// Resolved to a callable on access
    Method(MethodFn<T>),
}

impl<T> Clone for Member<T> {
    fn clone(&self) -> Self {
        match self {
            Member::Getter(f) => Member::Getter(Arc::clone(f)),
            Member::Method(f) => Member::Method(Arc::clone(f)),
        }
    }
}

// ============================================================================
// Hashed name table
// ============================================================================

/// Name → value table bucketed by `joaat`
pub struct HashedTable<V> {
    entries: Vec<(String, V)>,
    buckets: FxHashMap<u32, Vec<usize>>,
}

impl<V> Default for HashedTable<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            buckets: FxHashMap::default(),
        }
    }
}

impl<V> HashedTable<V> {
    /// Insert or replace an entry
    pub fn insert(&mut self, name: &str, value: V) {
        let hash = joaat(name.as_bytes());
        let bucket = self.buckets.entry(hash).or_default();
        for &i in bucket.iter() {
            if self.entries[i].0 == name {
                self.entries[i].1 = value;
                return;
            }
        }
        bucket.push(self.entries.len());
        self.entries.push((name.to_string(), value));
    }

    /// Resolve a name
    pub fn lookup(&self, name: &str) -> Option<&V> {
        if let Some(bucket) = self.buckets.get(&joaat(name.as_bytes())) {
            for &i in bucket {
                let (candidate, value) = &self.entries[i];
                if candidate == name {
                    return Some(value);
                }
            }
        }
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value)
    }

    /// Entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// DispatchTable
// ============================================================================

/// Immutable member table for one native type
pub struct DispatchTable<T> {
    tag: TypeTag,
    readers: HashedTable<Member<T>>,
    writers: HashedTable<SetterFn<T>>,
    format: Option<FormatFn<T>>,
}

impl<T: 'static> DispatchTable<T> {
    /// Start building a table for handles tagged `tag`
    pub fn builder(tag: &str) -> DispatchBuilder<T> {
        DispatchBuilder {
            tag: tag.to_string(),
            readers: HashedTable::default(),
            writers: HashedTable::default(),
            format: None,
        }
    }

    /// Tag carried by handles of this type
    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    /// Resolve a readable member
    pub fn lookup(&self, name: &str) -> Option<&Member<T>> {
        self.readers.lookup(name)
    }

    /// Resolve a writable member
    pub fn setter(&self, name: &str) -> Option<&SetterFn<T>> {
        self.writers.lookup(name)
    }

    /// Readable members in declaration order
    pub fn members(&self) -> impl Iterator<Item = (&str, &Member<T>)> {
        self.readers.entries()
    }

    /// Format a handle, if the type defines `tostring`
    pub fn format(&self, handle: &Handle<T>) -> Option<BridgeResult<String>> {
        self.format.as_ref().map(|f| f(handle))
    }
}

/// Builder for [`DispatchTable`]
pub struct DispatchBuilder<T> {
    tag: String,
    readers: HashedTable<Member<T>>,
    writers: HashedTable<SetterFn<T>>,
    format: Option<FormatFn<T>>,
}

impl<T: 'static> DispatchBuilder<T> {
    /// Getter with access to the runtime (for members that return handles)
    pub fn getter<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut dyn ScriptContext, &Handle<T>) -> BridgeResult<ScriptValue> + Send + Sync + 'static,
    {
        self.readers.insert(name, Member::Getter(Arc::new(f)));
        self
    }

    /// Read-only field computed from the value
    pub fn field<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&T) -> ScriptValue + Send + Sync + 'static,
    {
        self.getter(name, move |_ctx, handle| handle.with(|value| f(value)))
    }

    /// Read/write field
    pub fn property<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&T) -> ScriptValue + Send + Sync + 'static,
        S: Fn(&mut T, ScriptValue) -> BridgeResult<()> + Send + Sync + 'static,
    {
        let setter: SetterFn<T> = Arc::new(
            move |_ctx: &mut dyn ScriptContext, handle: &Handle<T>, value: ScriptValue| {
                handle.with_mut(|target| set(target, value))?
            },
        );
        self.writers.insert(name, setter);
        self.field(name, get)
    }

    /// Method called as `obj:name(args...)`
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut dyn ScriptContext, &Handle<T>, &[ScriptValue]) -> BridgeResult<ScriptValue>
            + Send
            + Sync
            + 'static,
    {
        self.readers.insert(name, Member::Method(Arc::new(f)));
        self
    }

    /// `tostring` formatter
    pub fn to_string<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(move |handle: &Handle<T>| handle.with(|value| f(value))));
        self
    }

    /// Register the type and freeze the table.
    ///
    /// Adds `isValid` unless the type defines its own.
    pub fn build(mut self) -> BridgeResult<Arc<DispatchTable<T>>> {
        let tag = register_type::<T>(&self.tag)?;
        if self.readers.lookup("isValid").is_none() {
            self = self.method("isValid", |_ctx, handle, _args| Ok(handle.is_valid().into()));
        }
        Ok(Arc::new(DispatchTable {
            tag,
            readers: self.readers,
            writers: self.writers,
            format: self.format,
        }))
    }
}

// ============================================================================
// Metatables
// ============================================================================

/// Registry key of the metatable built from `table`.
///
/// Tables sharing a tag may capture different state, so the key includes
/// the table's address. The cached metatable holds the table alive, which
/// keeps the address from being reused while the entry exists.
fn metatable_key<T: 'static>(table: &Arc<DispatchTable<T>>) -> ScriptValue {
    format!("{}#{:p}", table.tag(), Arc::as_ptr(table)).into()
}

/// Metatable for `table` in this runtime, created on first use
pub fn metatable<T: 'static>(
    ctx: &mut dyn ScriptContext,
    table: &Arc<DispatchTable<T>>,
) -> BridgeResult<ScriptValue> {
    let registry = ctx.registry();
    let key = metatable_key(table);
    let cached = ctx.raw_get(&registry, &key)?;
    if let ScriptValue::Table(_) = cached {
        return Ok(cached);
    }

    let tag = table.tag().clone();
    let mt = ctx.create_table();
    let methods = ctx.create_table();

    for (name, member) in table.members() {
        let Member::Method(method) = member else {
            continue;
        };
        let method = Arc::clone(method);
        let qualified = format!("{}:{}", tag, name);
        let func = ctx.create_function(
            &qualified,
            protect(&qualified, move |ctx, args| {
                let this = arg(args, 0);
                let handle = check_handle::<T>(ctx, this)?;
                method(ctx, &handle, args.get(1..).unwrap_or(&[]))
            }),
        );
        ctx.raw_set(&methods, name.into(), func)?;
    }

    let index = {
        let table = Arc::clone(table);
        let methods = methods.clone();
        let tag = tag.clone();
        protect(&format!("{}.__index", tag), move |ctx, args| {
            let this = arg(args, 0);
            let key = arg(args, 1);
            let Some(name) = key.as_str() else {
                return Ok(ScriptValue::Nil);
            };
            match table.lookup(name) {
                Some(Member::Getter(get)) => {
                    let handle = check_handle::<T>(ctx, this)?;
                    get(ctx, &handle)
                }
                Some(Member::Method(_)) => {
                    check_type(ctx, this, &tag)?;
                    ctx.raw_get(&methods, key)
                }
                None => {
                    trace!(tag = %tag, member = name, "unknown member");
                    Ok(ScriptValue::Nil)
                }
            }
        })
    };

    let newindex = {
        let table = Arc::clone(table);
        let tag = tag.clone();
        protect(&format!("{}.__newindex", tag), move |ctx, args| {
            let this = arg(args, 0);
            let key = arg(args, 1);
            let value = args.get(2).cloned().unwrap_or_default();
            let name = key.as_str().unwrap_or("?");
            match table.setter(name) {
                Some(set) => {
                    let handle = check_handle::<T>(ctx, this)?;
                    set(ctx, &handle, value)?;
                    Ok(ScriptValue::Nil)
                }
                None if table.lookup(name).is_some() => Err(BridgeError::Argument(format!(
                    "member '{}' of {} is read-only",
                    name, tag
                ))),
                None => Err(BridgeError::Argument(format!(
                    "{} has no member named '{}'",
                    tag, name
                ))),
            }
        })
    };

    let index = ctx.create_function("__index", index);
    let newindex = ctx.create_function("__newindex", newindex);
    ctx.raw_set(&mt, "__index".into(), index)?;
    ctx.raw_set(&mt, "__newindex".into(), newindex)?;

    if table.format.is_some() {
        let table = Arc::clone(table);
        let tostring = protect(&format!("{}.__tostring", tag), move |ctx, args| {
            let this = arg(args, 0);
            let handle = check_handle::<T>(ctx, this)?;
            match table.format(&handle) {
                Some(text) => text.map(ScriptValue::from),
                None => Ok(ScriptValue::Nil),
            }
        });
        let tostring = ctx.create_function("__tostring", tostring);
        ctx.raw_set(&mt, "__tostring".into(), tostring)?;
    }

    ctx.raw_set(&mt, "__name".into(), tag.as_str().into())?;
    ctx.raw_set(&mt, "__methods".into(), methods)?;
    ctx.raw_set(&registry, key, mt.clone())?;
    Ok(mt)
}
