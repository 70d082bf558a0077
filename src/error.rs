//! Error types for singleton factories.

use std::fmt;

/// Boxed error returned by user-supplied constructors and hooks.
///
/// Hooks return `Result<_, HookError>` so any error type (or a plain string
/// via `.into()`) can be surfaced; the factory wraps it in [`FactoryError`]
/// and keeps it reachable through [`std::error::Error::source`].
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for constructors and hooks.
pub type HookResult<T = ()> = Result<T, HookError>;

/// Which user hook produced a [`FactoryError::Hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Custom-argument `convert`
    Convert,
    /// Custom-argument `reduce`
    Reduce,
    /// Custom-argument `spread` or `shallow_spread`
    Spread,
    /// Custom-argument `postprocess`
    ArgPostprocess,
    /// Wholesale `preprocess`
    Preprocess,
    /// Wholesale `postprocess`
    Postprocess,
    /// Caller-provided key closure
    KeyFn,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::Convert => "convert",
            HookKind::Reduce => "reduce",
            HookKind::Spread => "spread",
            HookKind::ArgPostprocess => "argument postprocess",
            HookKind::Preprocess => "preprocess",
            HookKind::Postprocess => "postprocess",
            HookKind::KeyFn => "key function",
        };
        f.write_str(name)
    }
}

/// Singleton factory errors
///
/// Every failure is surfaced to the caller as soon as it happens; nothing is
/// retried or swallowed.
///
/// # Examples
///
/// ```rust
/// use singleton_factory::{ArgSpec, FactoryError};
///
/// let err = ArgSpec::from_tokens(["literal", "bogus"]).compile().unwrap_err();
/// assert!(matches!(err, FactoryError::Configuration(_)));
/// assert_eq!(err.to_string(), "Configuration error: unknown mode token 'bogus'");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    /// Malformed argument spec or conflicting registrations, raised at build time
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A `repeat` slot received no argument
    #[error("Arity error: slot {slot}{suffix} requires at least one argument", suffix = stem_suffix(.stem))]
    Arity {
        /// Position of the offending slot in the plan
        slot: usize,
        /// Stem label of the slot, when it has one
        stem: Option<String>,
    },
    /// The wrapped constructor failed; nothing was registered
    #[error("Construction of {type_name} failed: {source}")]
    Construction {
        /// Target type name
        type_name: &'static str,
        /// Error returned by the constructor
        #[source]
        source: HookError,
    },
    /// A user hook failed
    #[error("{hook} hook failed: {source}")]
    Hook {
        /// Hook that failed
        hook: HookKind,
        /// Error returned by the hook
        #[source]
        source: HookError,
    },
    /// A constructor called back into its own factory on the same thread
    #[error("Re-entrant call into factory {0} during construction")]
    Reentrant(&'static str),
    /// Recursive spreading went deeper than the bound
    #[error("Max spread depth {0} exceeded")]
    DepthExceeded(usize),
}

fn stem_suffix(stem: &Option<String>) -> String {
    match stem {
        Some(stem) => format!(" ({})", stem),
        None => String::new(),
    }
}

impl FactoryError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        FactoryError::Configuration(message.into())
    }

    pub(crate) fn hook(hook: HookKind, source: HookError) -> Self {
        FactoryError::Hook { hook, source }
    }
}

/// Result type for factory operations
///
/// A convenience alias for `Result<T, FactoryError>`.
///
/// # Examples
///
/// ```rust
/// use singleton_factory::{FactoryError, FactoryResult};
///
/// fn check(ok: bool) -> FactoryResult<()> {
///     if ok { Ok(()) } else { Err(FactoryError::Configuration("nope".into())) }
/// }
///
/// assert!(check(true).is_ok());
/// assert!(check(false).is_err());
/// ```
pub type FactoryResult<T> = Result<T, FactoryError>;
