//! Custom-argument pipeline.
//!
//! Arguments of registered types get special treatment before and after key
//! derivation:
//!
//! - `spread` / `shallow_spread` decompose one argument into several
//!   (recursively for `spread`),
//! - `convert` replaces an argument by the plain value the constructor
//!   expects,
//! - arguments of registered types with neither are dropped from the
//!   constructor arguments and only drive postprocessing,
//! - `reduce` merges all arguments of one type from a call into a single
//!   value handed to that type's `postprocess`,
//! - `postprocess` updates the instance, on hits as well as misses.
//!
//! # Examples
//!
//! ```rust
//! use singleton_factory::{args, Behavior, SingletonFactory, SpreadSource, ArgType, Value};
//! use std::sync::Arc;
//!
//! struct Crowd(Vec<String>);
//!
//! let crowds = SingletonFactory::builder(|args: &[Value]| {
//!     Ok(Crowd(args.iter().filter_map(|a| a.as_str().map(String::from)).collect()))
//! })
//! .custom_arg(ArgType::List, Behavior::new().spread(SpreadSource::Elements))
//! .build()
//! .unwrap();
//!
//! let crowd = crowds.call(&args!["Sam", Value::list(["Peter", "Paul"])]).unwrap();
//! assert_eq!(crowd.0, ["Sam", "Peter", "Paul"]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{FactoryError, FactoryResult, HookKind, HookResult};
use crate::factory::HookContext;
use crate::key::ArgType;
use crate::value::Value;

/// Bound on nested `spread` expansion.
pub const MAX_SPREAD_DEPTH: usize = 256;

type ConvertFn = Arc<dyn Fn(&Value) -> HookResult<Value> + Send + Sync>;
type ReduceFn = Arc<dyn Fn(&[Value]) -> HookResult<Value> + Send + Sync>;
type SpreadFn = Arc<dyn Fn(&Value) -> HookResult<Vec<Value>> + Send + Sync>;
type ArgPostprocessFn<T> = Arc<dyn Fn(&HookContext<'_, T>, &Value) -> HookResult + Send + Sync>;

/// Where the constituents of a spread argument come from.
#[derive(Clone)]
pub enum SpreadSource {
    /// The elements of a list (or of a described native whose view is a list)
    Elements,
    /// A closure returning the constituents
    With(SpreadFn),
}

impl SpreadSource {
    pub fn with<F>(f: F) -> Self
    where
        F: Fn(&Value) -> HookResult<Vec<Value>> + Send + Sync + 'static,
    {
        SpreadSource::With(Arc::new(f))
    }

    fn expand(&self, value: &Value) -> FactoryResult<Vec<Value>> {
        match self {
            SpreadSource::Elements => value.elements().ok_or_else(|| {
                FactoryError::hook(
                    HookKind::Spread,
                    format!("cannot spread non-sequence value {:?}", value).into(),
                )
            }),
            SpreadSource::With(f) => f(value).map_err(|e| FactoryError::hook(HookKind::Spread, e)),
        }
    }
}

impl fmt::Debug for SpreadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadSource::Elements => f.write_str("Elements"),
            SpreadSource::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Behavior registered for one argument type.
///
/// Validated when the factory is built: `spread` and `shallow_spread` are
/// exclusive, `reduce` excludes both and requires `postprocess`.
pub struct Behavior<T> {
    convert: Option<ConvertFn>,
    reduce: Option<ReduceFn>,
    spread: Option<SpreadSource>,
    shallow_spread: Option<SpreadSource>,
    postprocess: Option<ArgPostprocessFn<T>>,
}

impl<T> Behavior<T> {
    pub fn new() -> Self {
        Self {
            convert: None,
            reduce: None,
            spread: None,
            shallow_spread: None,
            postprocess: None,
        }
    }

    /// Replaces the argument with a plain constructor argument.
    pub fn convert<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> HookResult<Value> + Send + Sync + 'static,
    {
        self.convert = Some(Arc::new(f));
        self
    }

    /// Merges all arguments of this type from one call into one value.
    pub fn reduce<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> HookResult<Value> + Send + Sync + 'static,
    {
        self.reduce = Some(Arc::new(f));
        self
    }

    /// Replaces the argument with its constituents, spreading those again.
    pub fn spread(mut self, source: SpreadSource) -> Self {
        self.spread = Some(source);
        self
    }

    /// Replaces the argument with its constituents, without recursion.
    pub fn shallow_spread(mut self, source: SpreadSource) -> Self {
        self.shallow_spread = Some(source);
        self
    }

    /// Updates the instance from the raw argument (or the reduced value).
    pub fn postprocess<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookContext<'_, T>, &Value) -> HookResult + Send + Sync + 'static,
    {
        self.postprocess = Some(Arc::new(f));
        self
    }
}

impl<T> Default for Behavior<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Spread {
    pub(crate) deep: bool,
    pub(crate) source: SpreadSource,
}

impl Spread {
    /// Combines the `spread`/`shallow_spread` pair into one rule.
    pub(crate) fn from_pair(
        spread: Option<SpreadSource>,
        shallow: Option<SpreadSource>,
        owner: ArgType,
    ) -> FactoryResult<Option<Spread>> {
        match (spread, shallow) {
            (Some(_), Some(_)) => Err(FactoryError::config(format!(
                "{} is registered with both spread and shallow_spread",
                owner.display_name()
            ))),
            (Some(source), None) => Ok(Some(Spread { deep: true, source })),
            (None, Some(source)) => Ok(Some(Spread { deep: false, source })),
            (None, None) => Ok(None),
        }
    }
}

pub(crate) struct Registration<T> {
    arg_type: ArgType,
    convert: Option<ConvertFn>,
    reduce: Option<ReduceFn>,
    spread: Option<Spread>,
    postprocess: Option<ArgPostprocessFn<T>>,
}

/// Normalized registrations, in declaration order.
pub(crate) struct RegistrationTable<T> {
    entries: Vec<Registration<T>>,
    index: HashMap<ArgType, usize>,
}

/// Output of [`RegistrationTable::process`].
pub(crate) struct ProcessedArgs {
    /// Arguments for the constructor and key derivation
    pub(crate) plain: Vec<Value>,
    /// Raw arguments of registered types with their registration index
    pub(crate) extracted: Vec<(usize, Value)>,
}

/// Builds the registration table from the builder options.
///
/// Precedence rules:
/// 1. Each `(type, behavior)` pair is validated on its own; registering the
///    same type twice is an error.
/// 2. A factory-level spread (`spread`/`shallow_spread` on the builder)
///    targets the factory's own type. If that type is already registered
///    without spread or reduce, the spread is merged into its entry;
///    otherwise it is an error. If the type is not registered, a new entry
///    is appended after the declared ones.
/// 3. No registrations at all disables the pipeline (`None`).
pub(crate) fn resolve_registrations<T>(
    declared: Vec<(ArgType, Behavior<T>)>,
    own_type: ArgType,
    own_spread: Option<Spread>,
) -> FactoryResult<Option<RegistrationTable<T>>> {
    let mut entries: Vec<Registration<T>> = Vec::with_capacity(declared.len() + 1);
    let mut index = HashMap::new();

    for (arg_type, behavior) in declared {
        if index.contains_key(&arg_type) {
            return Err(FactoryError::config(format!(
                "{} is registered more than once",
                arg_type.display_name()
            )));
        }

        let spread = Spread::from_pair(behavior.spread, behavior.shallow_spread, arg_type)?;
        if behavior.reduce.is_some() {
            if spread.is_some() {
                return Err(FactoryError::config(format!(
                    "{} cannot be both reduced and spread",
                    arg_type.display_name()
                )));
            }
            if behavior.postprocess.is_none() {
                return Err(FactoryError::config(format!(
                    "{} has reduce but no postprocess to receive the reduced value",
                    arg_type.display_name()
                )));
            }
        }

        index.insert(arg_type, entries.len());
        entries.push(Registration {
            arg_type,
            convert: behavior.convert,
            reduce: behavior.reduce,
            spread,
            postprocess: behavior.postprocess,
        });
    }

    if let Some(spread) = own_spread {
        match index.get(&own_type) {
            Some(&at) => {
                let entry = &mut entries[at];
                if entry.spread.is_some() || entry.reduce.is_some() {
                    return Err(FactoryError::config(format!(
                        "factory spread conflicts with the custom argument registered for {}",
                        own_type.display_name()
                    )));
                }
                entry.spread = Some(spread);
            }
            None => {
                index.insert(own_type, entries.len());
                entries.push(Registration {
                    arg_type: own_type,
                    convert: None,
                    reduce: None,
                    spread: Some(spread),
                    postprocess: None,
                });
            }
        }
    }

    if entries.is_empty() {
        return Ok(None);
    }

    tracing::debug!(
        types = ?entries.iter().map(|e| e.arg_type.display_name()).collect::<Vec<_>>(),
        "custom arguments resolved"
    );

    Ok(Some(RegistrationTable { entries, index }))
}

impl<T> RegistrationTable<T> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn lookup(&self, value: &Value) -> Option<(usize, &Registration<T>)> {
        let at = *self.index.get(&value.arg_type()?)?;
        Some((at, &self.entries[at]))
    }

    /// Extraction, spreading and conversion of the raw arguments.
    pub(crate) fn process(&self, raw: &[Value]) -> FactoryResult<ProcessedArgs> {
        let extracted = raw
            .iter()
            .filter_map(|arg| self.lookup(arg).map(|(at, _)| (at, arg.clone())))
            .collect();

        let mut spread = Vec::with_capacity(raw.len());
        for arg in raw {
            self.spread_into(arg, 0, &mut spread)?;
        }

        let mut plain = Vec::with_capacity(spread.len());
        for arg in spread {
            match self.lookup(&arg) {
                None => plain.push(arg),
                Some((_, entry)) => match &entry.convert {
                    Some(convert) => plain.push(
                        convert(&arg).map_err(|e| FactoryError::hook(HookKind::Convert, e))?,
                    ),
                    None if entry.spread.is_some() => plain.push(arg),
                    // Postprocessing-only argument
                    None => {}
                },
            }
        }

        Ok(ProcessedArgs { plain, extracted })
    }

    fn spread_into(&self, arg: &Value, depth: usize, out: &mut Vec<Value>) -> FactoryResult<()> {
        if depth > MAX_SPREAD_DEPTH {
            return Err(FactoryError::DepthExceeded(MAX_SPREAD_DEPTH));
        }

        let spread = match self.lookup(arg) {
            Some((_, Registration { spread: Some(spread), .. })) => spread,
            _ => {
                out.push(arg.clone());
                return Ok(());
            }
        };

        let parts = spread.source.expand(arg)?;
        if spread.deep {
            for part in &parts {
                self.spread_into(part, depth + 1, out)?;
            }
        } else {
            out.extend(parts);
        }
        Ok(())
    }

    /// Runs reducers and per-type postprocess hooks against the instance.
    ///
    /// Reduced types go first, in declaration order; then each remaining
    /// extracted argument, ordered by its type's declaration and then by
    /// argument position.
    pub(crate) fn postprocess(
        &self,
        ctx: &HookContext<'_, T>,
        extracted: &[(usize, Value)],
    ) -> FactoryResult<()> {
        for (at, entry) in self.entries.iter().enumerate() {
            let (Some(reduce), Some(postprocess)) = (&entry.reduce, &entry.postprocess) else {
                continue;
            };
            let group: Vec<Value> = extracted
                .iter()
                .filter(|(owner, _)| *owner == at)
                .map(|(_, arg)| arg.clone())
                .collect();
            let reduced = reduce(&group).map_err(|e| FactoryError::hook(HookKind::Reduce, e))?;
            postprocess(ctx, &reduced).map_err(|e| FactoryError::hook(HookKind::ArgPostprocess, e))?;
        }

        let mut individual: Vec<&(usize, Value)> = extracted
            .iter()
            .filter(|(owner, _)| self.entries[*owner].reduce.is_none())
            .collect();
        individual.sort_by_key(|(owner, _)| *owner);

        for (owner, arg) in individual {
            if let Some(postprocess) = &self.entries[*owner].postprocess {
                postprocess(ctx, arg).map_err(|e| FactoryError::hook(HookKind::ArgPostprocess, e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    struct Unit;

    struct Tag(&'static str);

    fn table(declared: Vec<(ArgType, Behavior<Unit>)>) -> RegistrationTable<Unit> {
        resolve_registrations(declared, ArgType::of::<Unit>(), None)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn no_registrations_disable_the_pipeline() {
        let resolved = resolve_registrations::<Unit>(Vec::new(), ArgType::of::<Unit>(), None).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn conflicting_registrations_are_rejected() {
        let cases: Vec<Vec<(ArgType, Behavior<Unit>)>> = vec![
            vec![(ArgType::Str, Behavior::new()), (ArgType::Str, Behavior::new())],
            vec![(
                ArgType::List,
                Behavior::new()
                    .spread(SpreadSource::Elements)
                    .shallow_spread(SpreadSource::Elements),
            )],
            vec![(
                ArgType::List,
                Behavior::new()
                    .spread(SpreadSource::Elements)
                    .reduce(|_| Ok(Value::Null))
                    .postprocess(|_, _| Ok(())),
            )],
            vec![(ArgType::Str, Behavior::new().reduce(|_| Ok(Value::Null)))],
        ];

        for declared in cases {
            assert!(matches!(
                resolve_registrations(declared, ArgType::of::<Unit>(), None),
                Err(FactoryError::Configuration(_))
            ));
        }
    }

    #[test]
    fn factory_spread_merges_or_conflicts() {
        let own = ArgType::of::<Unit>();
        let spread = || Some(Spread { deep: true, source: SpreadSource::Elements });

        let merged = resolve_registrations(
            vec![(own, Behavior::<Unit>::new().convert(|v| Ok(v.clone())))],
            own,
            spread(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(merged.len(), 1);
        assert!(merged.entries[0].spread.is_some());
        assert!(merged.entries[0].convert.is_some());

        let conflict = resolve_registrations(
            vec![(own, Behavior::<Unit>::new().shallow_spread(SpreadSource::Elements))],
            own,
            spread(),
        );
        assert!(matches!(conflict, Err(FactoryError::Configuration(_))));

        let appended = resolve_registrations(vec![(ArgType::Str, Behavior::<Unit>::new())], own, spread())
            .unwrap()
            .unwrap();
        assert_eq!(appended.len(), 2);
        assert_eq!(appended.entries[1].arg_type, own);
    }

    #[test]
    fn converts_drops_and_extracts() {
        let table = table(vec![
            (
                ArgType::Str,
                Behavior::new().convert(|v| Ok(Value::from(format!("{}!", v.as_str().unwrap_or("")))))
            ),
            (ArgType::of::<Tag>(), Behavior::new().postprocess(|_, _| Ok(()))),
        ]);

        let tag = Value::native(Arc::new(Tag("x")));
        let processed = table.process(&[Value::from("hi"), tag.clone(), Value::from(3)]).unwrap();

        assert_eq!(processed.plain, args!["hi!", 3]);
        assert_eq!(processed.extracted.len(), 2);
        assert_eq!(processed.extracted[1].0, 1);
        assert!(processed.extracted[1].1.same_identity(&tag));
    }

    #[test]
    fn deep_and_shallow_spreading() {
        let deep = table(vec![(ArgType::List, Behavior::new().spread(SpreadSource::Elements))]);
        let nested = Value::list([Value::from(1), Value::list([2, 3])]);
        assert_eq!(deep.process(&[nested.clone(), Value::from(4)]).unwrap().plain, args![1, 2, 3, 4]);

        let shallow = table(vec![(ArgType::List, Behavior::new().shallow_spread(SpreadSource::Elements))]);
        let plain = shallow.process(&[nested]).unwrap().plain;
        assert_eq!(plain.len(), 2);
        assert_eq!(plain[1], Value::list([2, 3]));
    }

    #[test]
    fn self_spreading_is_bounded() {
        let table = table(vec![(
            ArgType::Str,
            Behavior::new().spread(SpreadSource::with(|v| Ok(vec![v.clone()]))),
        )]);

        assert!(matches!(
            table.process(&args!["loop"]),
            Err(FactoryError::DepthExceeded(MAX_SPREAD_DEPTH))
        ));
    }

    #[test]
    fn spreading_non_sequences_fails() {
        let table = table(vec![(ArgType::Str, Behavior::new().spread(SpreadSource::Elements))]);
        assert!(matches!(
            table.process(&args!["abc"]),
            Err(FactoryError::Hook { hook: HookKind::Spread, .. })
        ));
    }
}
