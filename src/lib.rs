//! # singleton-factory
//!
//! Argument-keyed singleton factories: wrap a constructor so that calls with
//! equivalent arguments return the same shared instance.
//!
//! ## Features
//!
//! - **Declarative keys**: an [`ArgSpec`] says how each argument position
//!   contributes to the key (`object`, `literal`, `property:<path>`, `array`,
//!   `set`, `ignore`, with rest/repeat/optional/unordered/stem options)
//! - **Collision-free signatures**: self-delimiting fragments, so distinct
//!   argument lists never share a key
//! - **Custom arguments**: per-type `convert`, `reduce`, `spread` and
//!   `postprocess` behaviors
//! - **Instance tags**: passing a produced instance back in returns itself
//! - **Thread-safe**: at most one instance per key under parallel callers
//!
//! ## Quick Start
//!
//! ```rust
//! use singleton_factory::{args, ArgSpec, SingletonFactory, Value};
//! use std::sync::Arc;
//!
//! struct Console { name: String }
//!
//! let consoles = SingletonFactory::new(
//!     |args: &[Value]| Ok(Console { name: args[0].property("name").as_str().unwrap_or("?").to_string() }),
//!     ArgSpec::from_tokens(["property:name"]),
//! )
//! .unwrap();
//!
//! let a = consoles.call(&args![Value::record([("name", "main"), ("color", "red")])]).unwrap();
//! let b = consoles.call(&args![Value::record([("name", "main")])]).unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//!
//! // Instances are tagged with their key
//! let again = consoles.call(&[Value::native(a.clone())]).unwrap();
//! assert!(Arc::ptr_eq(&a, &again));
//! assert_eq!(again.name, "main");
//! ```
//!
//! ## Argument modes
//!
//! - **object**: one key per distinct shared object (`Arc` identity)
//! - **literal**: deep structural content
//! - **property:a.b**: the value found along a property path
//! - **array** / **set**: element-wise, ordered or not
//! - **ignore**: never affects the key
//!
//! ## Feature flags
//!
//! - `config`: deserialize argument specs with serde and build [`Value`]s
//!   from `serde_json::Value`.

pub mod arg_spec;
pub mod custom_args;
pub mod error;
pub mod factory;
pub mod key;
pub mod keyfn;
pub mod metrics;
pub mod observer;
pub mod signature;
pub mod value;

mod internal;
mod registry;

pub use arg_spec::{ArgSpec, Cardinality, CompiledPlan, Mode, SlotRecord, SlotSpec, SubSpec};
pub use custom_args::{Behavior, SpreadSource, MAX_SPREAD_DEPTH};
pub use error::{FactoryError, FactoryResult, HookError, HookKind, HookResult};
pub use factory::{FactoryBuilder, HookContext, SingletonFactory};
pub use key::{ArgType, TypeKey};
pub use keyfn::KeyFunction;
pub use metrics::{MetricsSnapshot, TimingStats};
pub use observer::{FactoryObserver, LoggingObserver};
pub use value::{Describe, Native, Value};
