//! Argument type keys used to register custom-argument behaviors.

use std::any::TypeId;

/// Identity of a native Rust type: its `TypeId` plus its name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Builds the key for `T`.
    #[inline(always)]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub(crate) fn from_parts(id: TypeId, name: &'static str) -> Self {
        Self { id, name }
    }

    /// The underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The `std::any::type_name` of the type.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

// TypeId-only comparison; the name is diagnostic
impl PartialEq for TypeKey {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The "originating type" of an argument, as seen by custom-argument dispatch.
///
/// Built-in value kinds have their own variants so that, for instance, every
/// string argument can be converted, or every list argument spread. Native
/// Rust types are keyed by [`TypeKey`].
///
/// # Examples
///
/// ```rust
/// use singleton_factory::{ArgType, Value};
/// use std::sync::Arc;
///
/// struct Tag(&'static str);
///
/// assert_eq!(Value::from("hi").arg_type(), Some(ArgType::Str));
/// assert_eq!(Value::from(3).arg_type(), Some(ArgType::Number));
/// assert_eq!(Value::native(Arc::new(Tag("a"))).arg_type(), Some(ArgType::of::<Tag>()));
/// assert_eq!(Value::Undefined.arg_type(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    /// `Value::Bool`
    Bool,
    /// `Value::Int` and `Value::Float`
    Number,
    /// `Value::Str`
    Str,
    /// `Value::List`
    List,
    /// `Value::Record`
    Record,
    /// `Value::Native` holding the given Rust type
    Native(TypeKey),
}

impl ArgType {
    /// Key for the native Rust type `T`.
    #[inline(always)]
    pub fn of<T: 'static>() -> Self {
        ArgType::Native(TypeKey::of::<T>())
    }

    /// Human-readable name for logs and error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ArgType::Bool => "bool",
            ArgType::Number => "number",
            ArgType::Str => "string",
            ArgType::List => "list",
            ArgType::Record => "record",
            ArgType::Native(key) => key.name(),
        }
    }
}
