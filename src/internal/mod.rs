//! Internal implementation details.

pub(crate) mod construction;

pub(crate) use construction::{ensure_not_held, ConstructionGuard, Held};
