//! Key functions: whole argument lists to composite keys.

use std::fmt;
use std::sync::Arc;

use crate::arg_spec::{Cardinality, CompiledPlan};
use crate::error::{FactoryError, FactoryResult, HookKind, HookResult};
use crate::signature::{IdentityTable, SignatureEncoder};
use crate::value::Value;

/// Separator between slot fragments.
pub const SLOT_SEPARATOR: char = '|';

const UNDEFINED: &Value = &Value::Undefined;

type CustomKeyFn = Arc<dyn Fn(&[Value]) -> HookResult<String> + Send + Sync>;

/// Maps an argument list to its composite key.
#[derive(Clone)]
pub enum KeyFunction {
    /// Derived from a compiled argument plan
    Plan(CompiledPlan),
    /// Caller-provided closure
    Custom(CustomKeyFn),
}

impl KeyFunction {
    pub fn from_plan(plan: CompiledPlan) -> Self {
        KeyFunction::Plan(plan)
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> HookResult<String> + Send + Sync + 'static,
    {
        KeyFunction::Custom(Arc::new(f))
    }

    /// Computes the key of `args`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use singleton_factory::{args, ArgSpec, keyfn::KeyFunction, signature::IdentityTable};
    ///
    /// let keyfn = KeyFunction::from_plan(ArgSpec::from_tokens(["literal", "ignore"]).compile().unwrap());
    /// let mut ids = IdentityTable::new();
    ///
    /// assert_eq!(keyfn.derive(&args!["x", 1], &mut ids).unwrap(), "s1:x|_");
    /// assert_eq!(keyfn.derive(&args!["x"], &mut ids).unwrap(), "s1:x|_");
    /// ```
    pub fn derive(&self, args: &[Value], identities: &mut IdentityTable) -> FactoryResult<String> {
        match self {
            KeyFunction::Plan(plan) => {
                let mut encoder = SignatureEncoder::new(identities);
                let mut out = String::new();
                write_plan(&mut encoder, plan, args, &mut out)?;
                Ok(out)
            }
            KeyFunction::Custom(f) => f(args).map_err(|e| FactoryError::hook(HookKind::KeyFn, e)),
        }
    }
}

impl fmt::Debug for KeyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFunction::Plan(plan) => f.debug_tuple("Plan").field(plan).finish(),
            KeyFunction::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Walks `plan` over `args`, appending the joined slot fragments to `out`.
///
/// Non-variadic slots take one argument each (missing ones encode as
/// undefined); the trailing variadic slot takes everything left. Arguments
/// past a non-variadic plan do not contribute.
pub(crate) fn write_plan(
    encoder: &mut SignatureEncoder<'_>,
    plan: &CompiledPlan,
    args: &[Value],
    out: &mut String,
) -> FactoryResult<()> {
    for (index, slot) in plan.slots().iter().enumerate() {
        if index > 0 {
            out.push(SLOT_SEPARATOR);
        }
        if let Some(stem) = &slot.stem {
            out.push_str(stem);
            out.push('=');
        }

        match slot.cardinality {
            Cardinality::Single | Cardinality::Optional => {
                let arg = args.get(index).unwrap_or(UNDEFINED);
                encoder.write(&slot.mode, arg, out)?;
            }
            Cardinality::Rest | Cardinality::Repeat => {
                let rest = args.get(index..).unwrap_or(&[]);
                if rest.is_empty() && slot.cardinality == Cardinality::Repeat {
                    return Err(FactoryError::Arity {
                        slot: index,
                        stem: slot.stem.clone(),
                    });
                }

                let mut fragments = encoder.fragments(&slot.mode, rest)?;
                if slot.unordered {
                    fragments.sort_unstable();
                }
                out.push('[');
                out.push_str(&fragments.join(","));
                out.push(']');
            }
        }
    }
    Ok(())
}
