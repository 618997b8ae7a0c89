//! Core types for ember-tui.
//!
//! These types define the foundation that everything builds on: the dynamic
//! prop values carried by component and primitive descriptions, the ordered
//! prop records the reconciler diffs, and the text attributes understood by
//! the reference backend.

use std::fmt;
use std::sync::Arc;

// =============================================================================
// Callback
// =============================================================================

/// An opaque callback value threaded through props.
///
/// The engine never invokes callbacks itself - the drawing backend calls
/// them when a matching terminal-level input event occurs (e.g. a button
/// activation). Callbacks are ordinary prop values; equality is pointer
/// identity, so re-creating a closure every render marks the prop changed
/// while cloning an existing callback does not.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn() + Send + Sync>);

impl Callback {
    /// Wrap a closure as a callback prop value.
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self) {
        (self.0)();
    }

    /// Identity comparison (same underlying allocation).
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.0))
    }
}

// =============================================================================
// Value - dynamic prop values
// =============================================================================

/// A dynamically typed prop value.
///
/// Props are opaque to the core: the materializer copies them through and
/// the reconciler compares them shallowly. The closed set of variants keeps
/// comparison total and cheap - no trait objects, no deep recursion beyond
/// `List`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Callback(Callback),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // Bit comparison keeps NaN == NaN, so an unchanged NaN prop
            // does not re-dirty the tree every cycle.
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Callback(a), Value::Callback(b)) => a.same(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Callback> for Value {
    fn from(v: Callback) -> Self {
        Value::Callback(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl Value {
    /// Read as a string slice, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Read as an integer, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Read as a bool, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Read as a callback, if this is a `Callback`.
    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Value::Callback(c) => Some(c),
            _ => None,
        }
    }
}

// =============================================================================
// Props - ordered prop records
// =============================================================================

/// An ordered, immutable record of named prop values.
///
/// Order is declaration order; lookup is linear, which beats a map for the
/// handful of props a node carries. Structural equality over the full
/// record decides whether a component instance needs to re-render.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Props {
    entries: Vec<(&'static str, Value)>,
}

impl Props {
    /// An empty prop record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion. Later entries with the same name replace
    /// earlier ones.
    pub fn with(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or replace a prop.
    pub fn set(&mut self, name: &'static str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Look up a prop by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// Whether a prop with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of props in the record.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }
}

impl FromIterator<(&'static str, Value)> for Props {
    fn from_iter<I: IntoIterator<Item = (&'static str, Value)>>(iter: I) -> Self {
        let mut props = Props::new();
        for (name, value) in iter {
            props.set(name, value);
        }
        props
    }
}

/// Shallow element-by-element comparison of two dependency snapshots.
///
/// `None` means "always differs" (effect re-runs every render).
pub fn deps_changed(old: Option<&[Value]>, new: Option<&[Value]>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => old.len() != new.len() || old.iter().ne(new.iter()),
        _ => true,
    }
}

// =============================================================================
// Text Attributes (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Text attributes as a bitfield for efficient storage and comparison.
    ///
    /// Encoded into props as `Value::Int(attr.bits() as i64)`; the reference
    /// backend decodes with [`Attr::from_bits_truncate`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attr: u8 {
        const NONE = 0;
        const BOLD = 1 << 0;
        const DIM = 1 << 1;
        const ITALIC = 1 << 2;
        const UNDERLINE = 1 << 3;
        const INVERSE = 1 << 4;
        const STRIKETHROUGH = 1 << 5;
    }
}

impl From<Attr> for Value {
    fn from(attr: Attr) -> Self {
        Value::Int(attr.bits() as i64)
    }
}

// =============================================================================
// Tests
// =============================================================================
