//! Diagnostic observers for factory calls.
//!
//! Observers see every call outcome: a construction (with its duration), a
//! reuse of a cached instance, or a failure. They run synchronously on the
//! calling thread. Only `constructing` runs while the instance registry is
//! locked: calls back into the factory from it fail with
//! [`FactoryError::Reentrant`] and `singleton` lookups return `None`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::FactoryError;

/// Observer of factory call events.
///
/// All methods have empty default implementations.
///
/// # Examples
///
/// ```
/// use singleton_factory::{args, FactoryObserver, SingletonFactory, Value};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Counting(AtomicUsize);
///
/// impl FactoryObserver for Counting {
///     fn constructed(&self, _factory: &str, _key: &str, _duration: Duration) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let counting = Arc::new(Counting::default());
/// let names = SingletonFactory::builder(|args: &[Value]| Ok(format!("{:?}", args)))
///     .observer(counting.clone())
///     .build()
///     .unwrap();
///
/// names.call(&args!["a"]).unwrap();
/// names.call(&args!["a"]).unwrap();
/// assert_eq!(counting.0.load(Ordering::Relaxed), 1);
/// ```
pub trait FactoryObserver: Send + Sync {
    /// A new instance is about to be constructed under `key`.
    ///
    /// Runs with the registry locked, like the constructor itself.
    fn constructing(&self, _factory: &str, _key: &str) {}

    /// The constructor returned and the instance was registered.
    fn constructed(&self, _factory: &str, _key: &str, _duration: Duration) {}

    /// A call was served by the instance already registered under `key`.
    fn reused(&self, _factory: &str, _key: &str) {}

    /// A call failed; registrations made before the failure stay.
    fn failed(&self, _factory: &str, _error: &FactoryError) {}
}

/// Registered observers of one factory.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn FactoryObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn FactoryObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    #[inline]
    pub(crate) fn constructing(&self, factory: &str, key: &str) {
        for observer in &self.observers {
            observer.constructing(factory, key);
        }
    }

    #[inline]
    pub(crate) fn constructed(&self, factory: &str, key: &str, duration: Duration) {
        for observer in &self.observers {
            observer.constructed(factory, key, duration);
        }
    }

    #[inline]
    pub(crate) fn reused(&self, factory: &str, key: &str) {
        for observer in &self.observers {
            observer.reused(factory, key);
        }
    }

    #[inline]
    pub(crate) fn failed(&self, factory: &str, error: &FactoryError) {
        for observer in &self.observers {
            observer.failed(factory, error);
        }
    }
}

/// Built-in observer that emits `tracing` events.
///
/// Constructions log at `debug`, reuses at `trace`, failures at `warn`.
///
/// # Examples
///
/// ```
/// use singleton_factory::{LoggingObserver, SingletonFactory, Value};
/// use std::sync::Arc;
///
/// let factory = SingletonFactory::builder(|_: &[Value]| Ok(()))
///     .observer(Arc::new(LoggingObserver::with_prefix("units")))
///     .build()
///     .unwrap();
/// factory.call(&[]).unwrap();
/// ```
pub struct LoggingObserver {
    prefix: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "singleton-factory".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryObserver for LoggingObserver {
    fn constructing(&self, factory: &str, key: &str) {
        tracing::trace!(prefix = %self.prefix, factory, key, "constructing instance");
    }

    fn constructed(&self, factory: &str, key: &str, duration: Duration) {
        tracing::debug!(prefix = %self.prefix, factory, key, ?duration, "instance constructed");
    }

    fn reused(&self, factory: &str, key: &str) {
        tracing::trace!(prefix = %self.prefix, factory, key, "instance reused");
    }

    fn failed(&self, factory: &str, error: &FactoryError) {
        tracing::warn!(prefix = %self.prefix, factory, %error, "factory call failed");
    }
}
