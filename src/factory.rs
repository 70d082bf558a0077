//! Singleton factories.
//!
//! A [`SingletonFactory`] wraps a constructor so that calls with equivalent
//! arguments share one instance. Equivalence is decided by the factory's key
//! function (usually compiled from an [`ArgSpec`]); instances are cached per
//! factory under their composite key and never evicted.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

use crate::arg_spec::{ArgSpec, CompiledPlan};
use crate::custom_args::{resolve_registrations, Behavior, RegistrationTable, Spread, SpreadSource};
use crate::error::{FactoryError, FactoryResult, HookKind, HookResult};
use crate::internal::{ensure_not_held, ConstructionGuard, Held};
use crate::key::{ArgType, TypeKey};
use crate::keyfn::KeyFunction;
use crate::metrics::{FactoryMetrics, MetricsSnapshot};
use crate::observer::{FactoryObserver, Observers};
use crate::registry::InstanceRegistry;
use crate::signature::IdentityTable;
use crate::value::Value;

type Constructor<T> = Arc<dyn Fn(&[Value]) -> HookResult<T> + Send + Sync>;
type PreprocessFn = Arc<dyn Fn(Vec<Value>) -> HookResult<Vec<Value>> + Send + Sync>;
type PostprocessFn<T> = Arc<dyn Fn(&HookContext<'_, T>, &[Value]) -> HookResult + Send + Sync>;

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

/// What postprocessing hooks see: the instance, its key and the factory.
///
/// Derefs to the instance.
pub struct HookContext<'a, T> {
    instance: &'a Arc<T>,
    key: &'a str,
    factory: &'a SingletonFactory<T>,
}

impl<'a, T> HookContext<'a, T> {
    pub fn instance(&self) -> &'a Arc<T> {
        self.instance
    }

    /// Composite key the instance is registered under.
    pub fn key(&self) -> &'a str {
        self.key
    }

    /// The factory being called, for hooks that need to call back into it.
    pub fn factory(&self) -> &'a SingletonFactory<T> {
        self.factory
    }
}

impl<T> Deref for HookContext<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.instance
    }
}

struct FactoryInner<T> {
    id: u64,
    name: &'static str,
    type_key: TypeKey,
    ctor: Constructor<T>,
    keyfn: KeyFunction,
    registrations: Option<RegistrationTable<T>>,
    preprocess: Option<PreprocessFn>,
    postprocess: Option<PostprocessFn<T>>,
    identities: Mutex<IdentityTable>,
    registry: Mutex<InstanceRegistry<T>>,
    observers: Observers,
    metrics: FactoryMetrics,
}

/// Wraps a constructor so that equivalent arguments yield the same instance.
///
/// Cloning is cheap and clones share the same registry.
///
/// # Examples
///
/// ```rust
/// use singleton_factory::{args, ArgSpec, SingletonFactory, Value};
/// use std::sync::Arc;
///
/// struct Person { first: String, last: String }
///
/// let people = SingletonFactory::new(
///     |args: &[Value]| Ok(Person {
///         first: args[0].as_str().unwrap_or_default().to_string(),
///         last: args[1].as_str().unwrap_or_default().to_string(),
///     }),
///     ArgSpec::from_tokens(["literal", "literal"]),
/// )
/// .unwrap();
///
/// let a = people.call(&args!["Ann", "Smith"]).unwrap();
/// let b = people.call(&args!["Ann", "Smith"]).unwrap();
/// let c = people.call(&args!["Bob", "Smith"]).unwrap();
///
/// assert!(Arc::ptr_eq(&a, &b));
/// assert!(!Arc::ptr_eq(&a, &c));
/// assert_eq!(people.len(), 2);
/// ```
pub struct SingletonFactory<T> {
    inner: Arc<FactoryInner<T>>,
}

impl<T> Clone for SingletonFactory<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> SingletonFactory<T> {
    /// Starts configuring a factory around `ctor`.
    pub fn builder<F>(ctor: F) -> FactoryBuilder<T>
    where
        F: Fn(&[Value]) -> HookResult<T> + Send + Sync + 'static,
    {
        FactoryBuilder::new(ctor)
    }

    /// Factory keyed by `spec`, with no further options.
    pub fn new<F>(ctor: F, spec: ArgSpec) -> FactoryResult<Self>
    where
        F: Fn(&[Value]) -> HookResult<T> + Send + Sync + 'static,
    {
        Self::builder(ctor).spec(spec).build()
    }

    /// Returns the instance for `args`, constructing it on first use.
    ///
    /// The raw arguments go through the custom-argument pipeline and
    /// `preprocess`; the resulting plain arguments are keyed and, on a miss,
    /// handed to the constructor. Postprocessing runs on hits and misses.
    ///
    /// # Errors
    ///
    /// A failing constructor leaves the registry untouched. A failing
    /// postprocess hook does not undo the registration: the instance stays
    /// cached, partially initialized, and later calls with the same key
    /// return it.
    pub fn call(&self, args: &[Value]) -> FactoryResult<Arc<T>> {
        self.inner.metrics.record_call();
        let result = self.call_inner(args);
        if let Err(error) = &result {
            self.inner.metrics.record_failed_call();
            self.inner.observers.failed(self.inner.name, error);
        }
        result
    }

    fn call_inner(&self, args: &[Value]) -> FactoryResult<Arc<T>> {
        let (plain, extracted) = self.prepare(args)?;
        let key = self.derive_key(&plain)?;
        let instance = self.resolve(&key, &plain)?;

        let ctx = HookContext {
            instance: &instance,
            key: &key,
            factory: self,
        };
        if let Some(table) = &self.inner.registrations {
            table.postprocess(&ctx, &extracted)?;
        }
        if let Some(postprocess) = &self.inner.postprocess {
            postprocess(&ctx, &plain).map_err(|e| FactoryError::hook(HookKind::Postprocess, e))?;
        }
        Ok(instance)
    }

    /// Composite key of already plain arguments.
    ///
    /// No hook other than a custom key closure runs, and nothing is
    /// registered.
    pub fn key(&self, args: &[Value]) -> FactoryResult<String> {
        self.derive_key(args)
    }

    /// Registered instance for plain `args`, if any. Never constructs.
    pub fn get(&self, args: &[Value]) -> FactoryResult<Option<Arc<T>>> {
        let key = self.derive_key(args)?;
        Ok(self.singleton(&key))
    }

    /// Like [`key`](Self::key), but `args` are processed exactly as
    /// [`call`](Self::call) would process them first.
    pub fn loose_key(&self, args: &[Value]) -> FactoryResult<String> {
        let (plain, _) = self.prepare(args)?;
        self.derive_key(&plain)
    }

    /// Like [`get`](Self::get), with [`loose_key`](Self::loose_key) keying.
    pub fn loose_get(&self, args: &[Value]) -> FactoryResult<Option<Arc<T>>> {
        let key = self.loose_key(args)?;
        Ok(self.singleton(&key))
    }

    /// Registered instance for `key`, if any.
    ///
    /// Returns `None` when called from within this factory's own constructor.
    pub fn singleton(&self, key: &str) -> Option<Arc<T>> {
        self.lock_registry().ok()?.get(key).cloned()
    }

    /// Key `instance` was registered under, if this factory produced it.
    pub fn key_of(&self, instance: &Arc<T>) -> Option<String> {
        let registry = self.lock_registry().ok()?;
        registry
            .key_of(crate::registry::tag_of(instance))
            .map(str::to_string)
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.lock_registry().map(|registry| registry.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered keys, in registration order.
    pub fn keys(&self) -> Vec<String> {
        match self.lock_registry() {
            Ok(registry) => registry.keys().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot(self.len())
    }

    /// Runs the custom-argument pipeline and `preprocess`.
    fn prepare(&self, raw: &[Value]) -> FactoryResult<(Vec<Value>, Vec<(usize, Value)>)> {
        let (plain, extracted) = match &self.inner.registrations {
            Some(table) => {
                let processed = table.process(raw)?;
                (processed.plain, processed.extracted)
            }
            None => (raw.to_vec(), Vec::new()),
        };

        let plain = match &self.inner.preprocess {
            Some(preprocess) => {
                preprocess(plain).map_err(|e| FactoryError::hook(HookKind::Preprocess, e))?
            }
            None => plain,
        };
        Ok((plain, extracted))
    }

    fn derive_key(&self, args: &[Value]) -> FactoryResult<String> {
        if let Some(key) = self.tagged_key(args)? {
            return Ok(key);
        }

        match &self.inner.keyfn {
            KeyFunction::Plan(_) => {
                // Describe views run under the identity lock
                ensure_not_held(self.inner.id, Held::Identities, self.inner.name)?;
                let mut identities = self.inner.identities.lock();
                let _guard = ConstructionGuard::enter(self.inner.id, Held::Identities);
                self.inner.keyfn.derive(args, &mut identities)
            }
            // Custom closures may call back into the factory; no lock held
            KeyFunction::Custom(_) => self.inner.keyfn.derive(args, &mut IdentityTable::new()),
        }
    }

    /// Key of an instance of this factory passed back in as the only argument.
    fn tagged_key(&self, args: &[Value]) -> FactoryResult<Option<String>> {
        let native = match args {
            [Value::Native(native)] if native.type_key() == self.inner.type_key => native,
            _ => return Ok(None),
        };
        let registry = self.lock_registry()?;
        Ok(registry.key_of(native.addr()).map(str::to_string))
    }

    /// Construct-or-reuse under the registry lock.
    fn resolve(&self, key: &str, args: &[Value]) -> FactoryResult<Arc<T>> {
        let inner = &*self.inner;
        let mut registry = self.lock_registry()?;

        if let Some(instance) = registry.get(key) {
            let instance = instance.clone();
            drop(registry);
            inner.metrics.record_hit();
            inner.observers.reused(inner.name, key);
            return Ok(instance);
        }

        // The observer and constructor run under the lock; calls back into
        // this factory fail with `Reentrant`
        let (built, started) = {
            let _guard = ConstructionGuard::enter(inner.id, Held::Registry);
            inner.observers.constructing(inner.name, key);
            let started = Instant::now();
            ((inner.ctor)(args), started)
        };

        match built {
            Ok(value) => {
                let instance = Arc::new(value);
                registry.insert(key.to_string(), instance.clone());
                drop(registry);

                let elapsed = started.elapsed();
                inner.metrics.record_construction(elapsed);
                inner.observers.constructed(inner.name, key, elapsed);
                Ok(instance)
            }
            Err(source) => {
                drop(registry);
                inner.metrics.record_failed_construction();
                Err(FactoryError::Construction {
                    type_name: inner.type_key.name(),
                    source,
                })
            }
        }
    }

    fn lock_registry(&self) -> FactoryResult<MutexGuard<'_, InstanceRegistry<T>>> {
        ensure_not_held(self.inner.id, Held::Registry, self.inner.name)?;
        Ok(self.inner.registry.lock())
    }
}

impl<T> fmt::Debug for SingletonFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonFactory")
            .field("name", &self.inner.name)
            .field("keyfn", &self.inner.keyfn)
            .field("custom_args", &self.inner.registrations.as_ref().map_or(0, |t| t.len()))
            .field("observers", &self.inner.observers.len())
            .finish_non_exhaustive()
    }
}

/// Configures a [`SingletonFactory`].
///
/// # Examples
///
/// ```rust
/// use singleton_factory::{args, ArgSpec, Behavior, SingletonFactory, Value};
/// use std::sync::Arc;
///
/// struct Email(String);
///
/// let emails = SingletonFactory::builder(|args: &[Value]| {
///     Ok(Email(args[0].as_str().unwrap_or_default().to_string()))
/// })
/// .spec(ArgSpec::from_tokens(["literal"]))
/// .preprocess(|args| {
///     Ok(args
///         .into_iter()
///         .map(|a| a.as_str().map(|s| Value::from(s.to_lowercase())).unwrap_or(a))
///         .collect())
/// })
/// .build()
/// .unwrap();
///
/// let a = emails.call(&args!["Ann@Example.org"]).unwrap();
/// let b = emails.call(&args!["ann@example.org"]).unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// assert_eq!(a.0, "ann@example.org");
/// ```
pub struct FactoryBuilder<T> {
    name: Option<&'static str>,
    ctor: Constructor<T>,
    spec: Option<ArgSpec>,
    key_fn: Option<KeyFunction>,
    custom_args: Vec<(ArgType, Behavior<T>)>,
    spread: Option<SpreadSource>,
    shallow_spread: Option<SpreadSource>,
    preprocess: Option<PreprocessFn>,
    postprocess: Option<PostprocessFn<T>>,
    observers: Observers,
}

impl<T: Send + Sync + 'static> FactoryBuilder<T> {
    fn new<F>(ctor: F) -> Self
    where
        F: Fn(&[Value]) -> HookResult<T> + Send + Sync + 'static,
    {
        Self {
            name: None,
            ctor: Arc::new(ctor),
            spec: None,
            key_fn: None,
            custom_args: Vec::new(),
            spread: None,
            shallow_spread: None,
            preprocess: None,
            postprocess: None,
            observers: Observers::default(),
        }
    }

    /// Name used in logs and errors; defaults to the type name of `T`.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Derives keys from `spec`. Without a spec or key closure, all
    /// arguments are matched by content.
    pub fn spec(mut self, spec: ArgSpec) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Derives keys with a closure instead of a spec.
    pub fn key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> HookResult<String> + Send + Sync + 'static,
    {
        self.key_fn = Some(KeyFunction::custom(f));
        self
    }

    /// Rewrites the plain argument list before keying and construction.
    pub fn preprocess<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> HookResult<Vec<Value>> + Send + Sync + 'static,
    {
        self.preprocess = Some(Arc::new(f));
        self
    }

    /// Runs on every call, after all custom-argument postprocessing.
    pub fn postprocess<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookContext<'_, T>, &[Value]) -> HookResult + Send + Sync + 'static,
    {
        self.postprocess = Some(Arc::new(f));
        self
    }

    /// Registers `behavior` for arguments of `arg_type`.
    pub fn custom_arg(mut self, arg_type: ArgType, behavior: Behavior<T>) -> Self {
        self.custom_args.push((arg_type, behavior));
        self
    }

    /// Registers `behavior` for native arguments of type `U`.
    pub fn custom_arg_type<U: 'static>(self, behavior: Behavior<T>) -> Self {
        self.custom_arg(ArgType::of::<U>(), behavior)
    }

    /// Spreads instances of `T` passed as arguments, recursively.
    pub fn spread(mut self, source: SpreadSource) -> Self {
        self.spread = Some(source);
        self
    }

    /// Spreads instances of `T` passed as arguments, one level only.
    pub fn shallow_spread(mut self, source: SpreadSource) -> Self {
        self.shallow_spread = Some(source);
        self
    }

    /// [`spread`](Self::spread) with constituents taken from the instance.
    pub fn spread_with<F>(self, f: F) -> Self
    where
        F: Fn(&T) -> Vec<Value> + Send + Sync + 'static,
    {
        self.spread(instance_spread(f))
    }

    /// [`shallow_spread`](Self::shallow_spread) with constituents taken from
    /// the instance.
    pub fn shallow_spread_with<F>(self, f: F) -> Self
    where
        F: Fn(&T) -> Vec<Value> + Send + Sync + 'static,
    {
        self.shallow_spread(instance_spread(f))
    }

    pub fn observer(mut self, observer: Arc<dyn FactoryObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    /// Validates the configuration and builds the factory.
    pub fn build(self) -> FactoryResult<SingletonFactory<T>> {
        let type_key = TypeKey::of::<T>();
        let name = self.name.unwrap_or(type_key.name());

        let keyfn = match (self.spec, self.key_fn) {
            (Some(_), Some(_)) => {
                return Err(FactoryError::config("spec and key_fn are mutually exclusive"))
            }
            (Some(spec), None) => KeyFunction::from_plan(spec.compile()?),
            (None, Some(keyfn)) => keyfn,
            (None, None) => KeyFunction::from_plan(CompiledPlan::all_literal()),
        };

        let own_type = ArgType::Native(type_key);
        let own_spread = Spread::from_pair(self.spread, self.shallow_spread, own_type)?;
        let registrations = resolve_registrations(self.custom_args, own_type, own_spread)?;

        tracing::debug!(
            factory = name,
            keyfn = ?keyfn,
            custom_args = registrations.as_ref().map_or(0, |t| t.len()),
            "singleton factory built"
        );

        Ok(SingletonFactory {
            inner: Arc::new(FactoryInner {
                id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
                name,
                type_key,
                ctor: self.ctor,
                keyfn,
                registrations,
                preprocess: self.preprocess,
                postprocess: self.postprocess,
                identities: Mutex::new(IdentityTable::new()),
                registry: Mutex::new(InstanceRegistry::new()),
                observers: self.observers,
                metrics: FactoryMetrics::default(),
            }),
        })
    }
}

fn instance_spread<T, F>(f: F) -> SpreadSource
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> Vec<Value> + Send + Sync + 'static,
{
    SpreadSource::with(move |value: &Value| match value.downcast_ref::<T>() {
        Some(instance) => Ok(f(instance)),
        None => Err(format!("expected {}, got {:?}", std::any::type_name::<T>(), value).into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn spec_and_key_fn_conflict() {
        let built = SingletonFactory::builder(|_: &[Value]| Ok(()))
            .spec(ArgSpec::from_tokens(["literal"]))
            .key_fn(|_| Ok(String::new()))
            .build();
        assert!(matches!(built, Err(FactoryError::Configuration(_))));
    }

    #[test]
    fn spread_and_shallow_spread_conflict() {
        let built = SingletonFactory::builder(|_: &[Value]| Ok(()))
            .spread(SpreadSource::Elements)
            .shallow_spread(SpreadSource::Elements)
            .build();
        assert!(matches!(built, Err(FactoryError::Configuration(_))));
    }

    #[test]
    fn default_key_matches_all_arguments_by_content() {
        let factory = SingletonFactory::builder(|args: &[Value]| Ok(args.len())).build().unwrap();

        let a = factory.call(&args![1, Value::list([2, 3])]).unwrap();
        let b = factory.call(&args![1, Value::list([2, 3])]).unwrap();
        let c = factory.call(&args![1]).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(factory.name(), std::any::type_name::<usize>());
    }

    #[test]
    fn tag_short_circuit_needs_a_single_argument() {
        let factory = SingletonFactory::builder(|args: &[Value]| Ok(args.len()))
            .name("lengths")
            .build()
            .unwrap();

        let first = factory.call(&args!["a", "b"]).unwrap();
        let as_arg = Value::native(first.clone());

        assert_eq!(factory.key(&[as_arg.clone()]).unwrap(), factory.key(&args!["a", "b"]).unwrap());
        assert_ne!(
            factory.key(&[as_arg.clone(), Value::from(1)]).unwrap(),
            factory.key(&args!["a", "b"]).unwrap()
        );
        assert!(Arc::ptr_eq(&factory.call(&[as_arg]).unwrap(), &first));
        assert_eq!(factory.key_of(&first).as_deref(), Some(factory.keys()[0].as_str()));
    }

    #[test]
    fn context_exposes_instance_and_key() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let factory = SingletonFactory::builder(|args: &[Value]| Ok(args.len()))
            .spec(ArgSpec::from_tokens(["literal"]))
            .postprocess(move |ctx, _| {
                log.lock().push((**ctx, ctx.key().to_string()));
                Ok(())
            })
            .build()
            .unwrap();

        factory.call(&args!["x"]).unwrap();
        assert_eq!(*seen.lock(), vec![(1, "s1:x".to_string())]);
    }
}
