//! Declarative argument specs and their compilation.
//!
//! A spec is a list of slot descriptors, one per positional argument. Each
//! descriptor is either a mode token (`"object"`, `"literal"`, `"array"`,
//! `"set"`, `"ignore"`, `"property"`), a compound token chaining modes
//! (`"array:literal"`, `"set:property:id"`, `"property:object"`), or a
//! [`SlotRecord`] carrying explicit options.
//!
//! # Examples
//!
//! ```rust
//! use singleton_factory::{ArgSpec, SlotRecord};
//! use singleton_factory::arg_spec::{Cardinality, Mode};
//!
//! let plan = ArgSpec::new()
//!     .slot("object")
//!     .slot(SlotRecord::new("literal").rest())
//!     .compile()
//!     .unwrap();
//!
//! assert_eq!(plan.len(), 2);
//! assert_eq!(plan.slots()[0].mode, Mode::Reference);
//! assert_eq!(plan.slots()[1].cardinality, Cardinality::Rest);
//! ```

mod plan;

pub use plan::{Cardinality, CompiledPlan, Elements, Mode, Slot};

#[cfg(feature = "config")]
use serde::Deserialize;

use crate::error::{FactoryError, FactoryResult};

/// One slot descriptor: a mode token or an option record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Deserialize))]
#[cfg_attr(feature = "config", serde(untagged))]
pub enum SlotSpec {
    Token(String),
    Record(SlotRecord),
}

impl From<&str> for SlotSpec {
    fn from(token: &str) -> Self {
        SlotSpec::Token(token.to_string())
    }
}

impl From<String> for SlotSpec {
    fn from(token: String) -> Self {
        SlotSpec::Token(token)
    }
}

impl From<SlotRecord> for SlotSpec {
    fn from(record: SlotRecord) -> Self {
        SlotSpec::Record(record)
    }
}

/// Element sub-spec of an `array`/`set` slot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Deserialize))]
#[cfg_attr(feature = "config", serde(untagged))]
pub enum SubSpec {
    /// Positional descriptors, matched like a nested argument list
    Tuple(Vec<SlotSpec>),
    /// One descriptor applied to every element
    One(Box<SlotSpec>),
}

/// Record-form slot descriptor.
///
/// Field names follow the declarative format (`type`, `property`, `sub`,
/// `rest`, `repeat`, `unordered`, `optional`, `stem`); the builder methods
/// mirror them.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "config", derive(Deserialize))]
#[cfg_attr(feature = "config", serde(default, deny_unknown_fields))]
pub struct SlotRecord {
    /// Mode token, possibly compound; defaults to `property` when a path is
    /// given, `literal` otherwise
    #[cfg_attr(feature = "config", serde(rename = "type"))]
    pub kind: Option<String>,
    /// Dotted path consumed by the first `property` token
    pub property: Option<String>,
    /// Element descriptors consumed by the terminal `array`/`set` token
    pub sub: Option<SubSpec>,
    pub rest: bool,
    pub repeat: bool,
    pub unordered: bool,
    pub optional: bool,
    pub stem: Option<String>,
}

impl SlotRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn property(mut self, path: impl Into<String>) -> Self {
        self.property = Some(path.into());
        self
    }

    /// Applies one descriptor to every element.
    pub fn sub(mut self, sub: impl Into<SlotSpec>) -> Self {
        self.sub = Some(SubSpec::One(Box::new(sub.into())));
        self
    }

    /// Matches elements positionally.
    pub fn sub_tuple<I, S>(mut self, subs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SlotSpec>,
    {
        self.sub = Some(SubSpec::Tuple(subs.into_iter().map(Into::into).collect()));
        self
    }

    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }

    pub fn repeat(mut self) -> Self {
        self.repeat = true;
        self
    }

    pub fn unordered(mut self) -> Self {
        self.unordered = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn stem(mut self, stem: impl Into<String>) -> Self {
        self.stem = Some(stem.into());
        self
    }

    fn has_cardinality(&self) -> bool {
        self.rest || self.repeat || self.unordered || self.optional || self.stem.is_some()
    }
}

/// Declarative argument spec: an ordered list of slot descriptors.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "config", derive(Deserialize))]
#[cfg_attr(feature = "config", serde(transparent))]
pub struct ArgSpec {
    slots: Vec<SlotSpec>,
}

impl ArgSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spec made of plain tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SlotSpec>,
    {
        Self {
            slots: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a JSON spec such as `["object", {"type": "literal", "optional": true}]`.
    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> FactoryResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| FactoryError::config(format!("invalid argument spec: {}", e)))
    }

    /// Appends a slot descriptor.
    pub fn slot(mut self, slot: impl Into<SlotSpec>) -> Self {
        self.slots.push(slot.into());
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Validates the spec and produces the plan used for key derivation.
    pub fn compile(&self) -> FactoryResult<CompiledPlan> {
        compile_slots(&self.slots)
    }
}

impl<S: Into<SlotSpec>> FromIterator<S> for ArgSpec {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_tokens(iter)
    }
}

fn compile_slots(specs: &[SlotSpec]) -> FactoryResult<CompiledPlan> {
    let mut slots = Vec::with_capacity(specs.len());

    for (index, spec) in specs.iter().enumerate() {
        let slot = compile_slot(spec)?;
        if slot.cardinality.is_variadic() && index + 1 != specs.len() {
            return Err(FactoryError::config(format!(
                "variadic slot {} must be the last slot",
                index
            )));
        }
        slots.push(slot);
    }

    Ok(CompiledPlan::from_slots(slots))
}

fn compile_slot(spec: &SlotSpec) -> FactoryResult<Slot> {
    let record = match spec {
        SlotSpec::Token(token) => return Ok(Slot::new(ModeParser::new(token, None, None).parse_all()?)),
        SlotSpec::Record(record) => record,
    };

    let cardinality = match (record.rest, record.repeat, record.optional) {
        (false, false, false) => Cardinality::Single,
        (false, false, true) => Cardinality::Optional,
        (true, false, false) => Cardinality::Rest,
        (false, true, false) => Cardinality::Repeat,
        (true, true, _) => {
            return Err(FactoryError::config("a slot cannot be both rest and repeat"));
        }
        (_, _, true) => {
            return Err(FactoryError::config("a variadic slot cannot be optional"));
        }
    };

    if record.unordered && !cardinality.is_variadic() {
        return Err(FactoryError::config(
            "unordered requires a rest or repeat slot",
        ));
    }

    Ok(Slot {
        mode: mode_of_record(record)?,
        cardinality,
        unordered: record.unordered,
        stem: record.stem.clone(),
    })
}

fn mode_of_record(record: &SlotRecord) -> FactoryResult<Mode> {
    let kind = match (record.kind.as_deref(), &record.property) {
        (Some(kind), _) => kind,
        (None, Some(_)) => "property",
        (None, None) => "object",
    };
    ModeParser::new(kind, record.property.as_deref(), record.sub.as_ref()).parse_all()
}

fn compile_element(spec: &SlotSpec) -> FactoryResult<Mode> {
    match spec {
        SlotSpec::Token(token) => ModeParser::new(token, None, None).parse_all(),
        SlotSpec::Record(record) if record.has_cardinality() => Err(FactoryError::config(
            "element descriptors cannot carry rest, repeat, unordered, optional or stem",
        )),
        SlotSpec::Record(record) => mode_of_record(record),
    }
}

/// Parses a (compound) mode token, consuming the record's `property` and
/// `sub` options where they apply.
struct ModeParser<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
    property: Option<&'a str>,
    sub: Option<&'a SubSpec>,
}

impl<'a> ModeParser<'a> {
    fn new(kind: &'a str, property: Option<&'a str>, sub: Option<&'a SubSpec>) -> Self {
        Self {
            tokens: kind.split(':').map(str::trim).collect(),
            pos: 0,
            property,
            sub,
        }
    }

    fn parse_all(mut self) -> FactoryResult<Mode> {
        let mode = self.parse()?;

        if let Some(extra) = self.tokens.get(self.pos) {
            return Err(FactoryError::config(format!(
                "unexpected token '{}' in mode '{}'",
                extra,
                self.tokens.join(":")
            )));
        }
        if self.property.is_some() {
            return Err(FactoryError::config(
                "'property' option given to a mode without a property token",
            ));
        }
        if self.sub.is_some() {
            return Err(FactoryError::config(
                "'sub' option given to a mode other than a terminal array or set",
            ));
        }

        Ok(mode)
    }

    fn has_more(&self) -> bool {
        self.pos < self.tokens.len()
    }

    fn next(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.pos).copied();
        self.pos += 1;
        token
    }

    fn parse(&mut self) -> FactoryResult<Mode> {
        let token = match self.next() {
            Some(token) if !token.is_empty() => token,
            _ => return Err(FactoryError::config("empty mode token")),
        };

        match token {
            "object" => Ok(Mode::Reference),
            "literal" => Ok(Mode::Literal),
            "ignore" => Ok(Mode::Ignore),
            "array" => Ok(Mode::Array(self.elements()?)),
            "set" => match self.elements()? {
                Elements::Each(mode) => Ok(Mode::Set(mode)),
                Elements::Tuple(_) => Err(FactoryError::config(
                    "a set sub-spec must be a single descriptor",
                )),
            },
            "property" => {
                let path = match self.property.take() {
                    Some(path) => path,
                    None => self.next().ok_or_else(|| {
                        FactoryError::config("property mode requires a path")
                    })?,
                };
                let inner = if self.has_more() {
                    self.parse()?
                } else {
                    Mode::Literal
                };
                Ok(Mode::Property {
                    path: split_path(path)?,
                    inner: Box::new(inner),
                })
            }
            other => Err(FactoryError::config(format!(
                "unknown mode token '{}'",
                other
            ))),
        }
    }

    fn elements(&mut self) -> FactoryResult<Elements> {
        if self.has_more() {
            return Ok(Elements::Each(Box::new(self.parse()?)));
        }
        match self.sub.take() {
            Some(SubSpec::One(spec)) => Ok(Elements::Each(Box::new(compile_element(spec)?))),
            Some(SubSpec::Tuple(specs)) => Ok(Elements::Tuple(compile_slots(specs)?)),
            // Elements are shared objects unless told otherwise
            None => Ok(Elements::Each(Box::new(Mode::Reference))),
        }
    }
}

fn split_path(path: &str) -> FactoryResult<Vec<String>> {
    let steps: Vec<String> = path.split('.').map(str::to_string).collect();
    if steps.iter().any(String::is_empty) {
        return Err(FactoryError::config(format!(
            "invalid property path '{}'",
            path
        )));
    }
    Ok(steps)
}
