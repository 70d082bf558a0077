//! Compiled argument plans.

/// How one value is turned into a signature fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// One signature per distinct object identity (`object`)
    Reference,
    /// Deep structural content (`literal`)
    Literal,
    /// Drill along `path`, then encode the terminal value under `inner`
    Property {
        /// Property names, outermost first
        path: Vec<String>,
        /// Mode applied to the terminal value
        inner: Box<Mode>,
    },
    /// Ordered sequence
    Array(Elements),
    /// Unordered collection; element signatures are sorted before joining
    Set(Box<Mode>),
    /// Constant fragment; the value never affects the key
    Ignore,
}

/// Element matching for [`Mode::Array`].
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    /// The same mode for every element
    Each(Box<Mode>),
    /// Positional matching, like a nested argument list
    Tuple(CompiledPlan),
}

/// How many arguments a slot consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    /// Exactly one argument; a missing one encodes as undefined
    #[default]
    Single,
    /// Zero or one argument
    Optional,
    /// Every remaining argument, possibly none
    Rest,
    /// Every remaining argument, at least one
    Repeat,
}

impl Cardinality {
    pub fn is_variadic(self) -> bool {
        matches!(self, Cardinality::Rest | Cardinality::Repeat)
    }
}

/// One compiled slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub mode: Mode,
    pub cardinality: Cardinality,
    /// Sort variadic fragments before joining
    pub unordered: bool,
    /// Label prefixed to the slot's fragment
    pub stem: Option<String>,
}

impl Slot {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            cardinality: Cardinality::Single,
            unordered: false,
            stem: None,
        }
    }
}

/// Validated sequence of slots; only the last one may be variadic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledPlan {
    slots: Vec<Slot>,
}

impl CompiledPlan {
    pub(crate) fn from_slots(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    /// Plan matching every argument by content, used when no spec is given.
    pub fn all_literal() -> Self {
        let mut slot = Slot::new(Mode::Literal);
        slot.cardinality = Cardinality::Rest;
        Self { slots: vec![slot] }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The trailing variadic slot, if any.
    pub fn variadic(&self) -> Option<&Slot> {
        self.slots.last().filter(|slot| slot.cardinality.is_variadic())
    }
}
