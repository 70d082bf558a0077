//! Dynamic argument values.
//!
//! Factory calls take `&[Value]`. Plain data (numbers, strings, lists,
//! records) is matched structurally or by identity depending on the slot
//! mode; arbitrary Rust values ride along as [`Value::Native`], which is also
//! how a factory-produced instance is handed back to its factory.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::key::{ArgType, TypeKey};

// Type-erased Arc for native arguments
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

type View = Arc<dyn Fn() -> Value + Send + Sync>;

/// Structural view of a native type.
///
/// Native arguments are opaque by default: literal matching falls back to
/// their identity and property paths cannot see into them. Implementing
/// `Describe` and wrapping with [`Value::described`] exposes their content.
///
/// Views run while the factory's identity table is locked. Deriving keys on
/// that same factory from inside `describe` fails with
/// [`FactoryError::Reentrant`](crate::FactoryError::Reentrant).
///
/// # Examples
///
/// ```rust
/// use singleton_factory::{Describe, Value};
/// use std::sync::Arc;
///
/// struct Point { x: i64, y: i64 }
///
/// impl Describe for Point {
///     fn describe(&self) -> Value {
///         Value::record([("x", self.x), ("y", self.y)])
///     }
/// }
///
/// let p = Value::described(Arc::new(Point { x: 1, y: 2 }));
/// assert_eq!(p.property("y"), Value::from(2));
/// ```
pub trait Describe {
    /// Returns the plain-data view of `self`.
    fn describe(&self) -> Value;
}

/// A native Rust value carried as an argument.
#[derive(Clone)]
pub struct Native {
    key: TypeKey,
    inner: AnyArc,
    view: Option<View>,
}

impl Native {
    fn new<T: Any + Send + Sync>(value: Arc<T>, view: Option<View>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            inner: value,
            view,
        }
    }

    /// Type key of the wrapped value.
    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    /// Borrows the wrapped value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Returns a new `Arc<T>` to the wrapped value.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    /// The [`Describe`] view, if the value was wrapped with one.
    pub fn view(&self) -> Option<Value> {
        self.view.as_ref().map(|view| view())
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

/// An argument value.
///
/// `List`, `Record` and `Native` are shared (`Arc`) and therefore have an
/// identity: cloning a `Value` keeps the identity, building an equal value
/// from scratch does not.
#[derive(Clone)]
pub enum Value {
    /// Absent argument
    Undefined,
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    Str(Arc<str>),
    /// Ordered sequence
    List(Arc<Vec<Value>>),
    /// String-keyed record
    Record(Arc<BTreeMap<String, Value>>),
    /// Native Rust value
    Native(Native),
}

impl Value {
    /// Builds a list.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    /// Builds a record.
    pub fn record<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Record(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }

    /// Wraps an opaque native value.
    pub fn native<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Value::Native(Native::new(value, None))
    }

    /// Wraps a native value that exposes a structural view.
    pub fn described<T: Describe + Any + Send + Sync>(value: Arc<T>) -> Self {
        let target = value.clone();
        let view: View = Arc::new(move || target.describe());
        Value::Native(Native::new(value, Some(view)))
    }

    /// Originating type used for custom-argument dispatch.
    ///
    /// `Undefined` and `Null` have no type and are never custom arguments.
    pub fn arg_type(&self) -> Option<ArgType> {
        match self {
            Value::Undefined | Value::Null => None,
            Value::Bool(_) => Some(ArgType::Bool),
            Value::Int(_) | Value::Float(_) => Some(ArgType::Number),
            Value::Str(_) => Some(ArgType::Str),
            Value::List(_) => Some(ArgType::List),
            Value::Record(_) => Some(ArgType::Record),
            Value::Native(native) => Some(ArgType::Native(native.key)),
        }
    }

    /// Address of the shared allocation for identity-bearing values.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::List(list) => Some(Arc::as_ptr(list) as *const () as usize),
            Value::Record(record) => Some(Arc::as_ptr(record) as *const () as usize),
            Value::Native(native) => Some(native.addr()),
            _ => None,
        }
    }

    /// Whether both values are the very same shared object.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view; integral floats qualify.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => integral(*f),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list.as_slice()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_native(&self) -> Option<&Native> {
        match self {
            Value::Native(native) => Some(native),
            _ => None,
        }
    }

    /// Borrows a native argument as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_native().and_then(|native| native.downcast_ref::<T>())
    }

    /// Clones out a native argument as `Arc<T>`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.as_native().and_then(|native| native.downcast::<T>())
    }

    /// One step of property access.
    ///
    /// Records are read by field, lists by decimal index, described natives
    /// through their view. Anything else yields `Undefined`.
    pub fn property(&self, name: &str) -> Value {
        match self {
            Value::Record(record) => record.get(name).cloned().unwrap_or(Value::Undefined),
            Value::List(list) => name
                .parse::<usize>()
                .ok()
                .and_then(|index| list.get(index).cloned())
                .unwrap_or(Value::Undefined),
            Value::Native(native) => native
                .view()
                .map(|view| view.property(name))
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    /// Follows a property path.
    pub fn path<'a, I>(&self, path: I) -> Value
    where
        I: IntoIterator<Item = &'a str>,
    {
        path.into_iter()
            .fold(self.clone(), |current, step| current.property(step))
    }

    /// Constituents used when a value is spread element-wise.
    pub(crate) fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(list) => Some(list.as_ref().clone()),
            Value::Native(native) => match native.view() {
                Some(Value::List(list)) => Some(list.as_ref().clone()),
                _ => None,
            },
            _ => None,
        }
    }
}

pub(crate) fn integral(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= LIMIT {
        Some(f as i64)
    } else {
        None
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(list) => f.debug_list().entries(list.iter()).finish(),
            Value::Record(record) => f.debug_map().entries(record.iter()).finish(),
            Value::Native(native) => write!(f, "<{}>", native.key.name()),
        }
    }
}

// Structural equality; natives compare by identity
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => a.addr() == b.addr(),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(i), Value::Float(x)) | (Value::Float(x), Value::Int(i)) => integral(*x) == Some(*i),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        match i64::try_from(i) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(i as f64),
        }
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Undefined)
    }
}

#[cfg(feature = "config")]
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => Value::list(items),
            serde_json::Value::Object(fields) => Value::record(fields),
        }
    }
}

/// Builds a `Vec<Value>` argument list.
///
/// # Examples
///
/// ```rust
/// use singleton_factory::{args, Value};
///
/// let a = args!["Annie", 42, true];
/// assert_eq!(a, vec![Value::from("Annie"), Value::from(42), Value::from(true)]);
/// assert!(args![].is_empty());
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($arg)),+]
    };
}

impl From<Native> for Value {
    fn from(native: Native) -> Self {
        Value::Native(native)
    }
}
