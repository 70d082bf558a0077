//! Signature encoding: one value under one mode becomes one text fragment.
//!
//! Fragments are self-delimiting, so joining them never makes two different
//! inputs collide:
//!
//! | value              | literal fragment          |
//! |--------------------|---------------------------|
//! | undefined          | `u`                       |
//! | null               | `n`                       |
//! | `true` / `false`   | `t` / `f`                 |
//! | integral number    | `i42`                     |
//! | other number       | `d1.5`                    |
//! | string             | `s5:hello`                |
//! | list               | `[i1,i2]`                 |
//! | record             | `{2:id=i1}`               |
//! | described native   | `#5:Point{1:x=i1}`        |
//!
//! Identity fragments are `o<n>`, ignored slots are `_`.

use std::collections::HashMap;

use crate::arg_spec::{Elements, Mode};
use crate::error::FactoryResult;
use crate::keyfn::write_plan;
use crate::value::{integral, Value};

/// Per-factory allocator of identity signatures.
///
/// Ids start at 1 and only grow. Each entry keeps its value alive so an
/// address can never be reused by a different object while the table exists.
#[derive(Default)]
pub struct IdentityTable {
    next: u64,
    ids: HashMap<usize, (u64, Value)>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity number of `value`, allocated on first encounter.
    ///
    /// Returns `None` for values without identity (primitives).
    pub fn id_of(&mut self, value: &Value) -> Option<u64> {
        let addr = value.identity()?;
        if let Some((id, _)) = self.ids.get(&addr) {
            return Some(*id);
        }
        self.next += 1;
        self.ids.insert(addr, (self.next, value.clone()));
        Some(self.next)
    }

    /// Number of identities handed out.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Encodes values into signature fragments.
pub struct SignatureEncoder<'a> {
    identities: &'a mut IdentityTable,
}

impl<'a> SignatureEncoder<'a> {
    pub fn new(identities: &'a mut IdentityTable) -> Self {
        Self { identities }
    }

    /// Signature of `value` under `mode`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use singleton_factory::{Value, signature::{IdentityTable, SignatureEncoder}};
    /// use singleton_factory::arg_spec::Mode;
    ///
    /// let mut ids = IdentityTable::new();
    /// let mut encoder = SignatureEncoder::new(&mut ids);
    ///
    /// let rec = Value::record([("id", 1)]);
    /// assert_eq!(encoder.encode(&Mode::Literal, &rec).unwrap(), "{2:id=i1}");
    /// assert_eq!(encoder.encode(&Mode::Reference, &rec).unwrap(), "o1");
    /// assert_eq!(encoder.encode(&Mode::Ignore, &rec).unwrap(), "_");
    /// ```
    pub fn encode(&mut self, mode: &Mode, value: &Value) -> FactoryResult<String> {
        let mut out = String::new();
        self.write(mode, value, &mut out)?;
        Ok(out)
    }

    pub(crate) fn write(&mut self, mode: &Mode, value: &Value, out: &mut String) -> FactoryResult<()> {
        match mode {
            Mode::Ignore => out.push('_'),
            Mode::Literal => self.write_literal(value, out),
            Mode::Reference => match self.identities.id_of(value) {
                Some(id) => push_identity(id, out),
                None => self.write_literal(value, out),
            },
            Mode::Property { path, inner } => {
                let target = value.path(path.iter().map(String::as_str));
                self.write(inner, &target, out)?;
            }
            Mode::Array(elements) => self.write_sequence(value, out, |encoder, items, out| {
                match elements {
                    Elements::Each(mode) => {
                        let fragments = encoder.fragments(mode, items)?;
                        out.push('[');
                        out.push_str(&fragments.join(","));
                        out.push(']');
                    }
                    Elements::Tuple(plan) => {
                        out.push('(');
                        write_plan(encoder, plan, items, out)?;
                        out.push(')');
                    }
                }
                Ok(())
            })?,
            Mode::Set(mode) => self.write_sequence(value, out, |encoder, items, out| {
                let mut fragments = encoder.fragments(mode, items)?;
                fragments.sort_unstable();
                out.push('[');
                out.push_str(&fragments.join(","));
                out.push(']');
                Ok(())
            })?,
        }
        Ok(())
    }

    /// Encodes each value on its own.
    pub(crate) fn fragments(&mut self, mode: &Mode, values: &[Value]) -> FactoryResult<Vec<String>> {
        values.iter().map(|value| self.encode(mode, value)).collect()
    }

    fn write_sequence<F>(&mut self, value: &Value, out: &mut String, body: F) -> FactoryResult<()>
    where
        F: FnOnce(&mut Self, &[Value], &mut String) -> FactoryResult<()>,
    {
        match value.elements() {
            Some(items) => body(self, items.as_slice(), out),
            None if value.is_undefined() => {
                out.push('u');
                Ok(())
            }
            // Not a sequence: keep it distinguishable from a one-element list
            None => {
                out.push('=');
                self.write_literal(value, out);
                Ok(())
            }
        }
    }

    fn write_literal(&mut self, value: &Value, out: &mut String) {
        match value {
            Value::Undefined => out.push('u'),
            Value::Null => out.push('n'),
            Value::Bool(true) => out.push('t'),
            Value::Bool(false) => out.push('f'),
            Value::Int(i) => {
                out.push('i');
                out.push_str(&i.to_string());
            }
            Value::Float(x) => match integral(*x) {
                Some(i) => {
                    out.push('i');
                    out.push_str(&i.to_string());
                }
                None => {
                    out.push('d');
                    out.push_str(&format!("{:?}", x));
                }
            },
            Value::Str(s) => {
                out.push('s');
                push_sized(s, out);
            }
            Value::List(items) => {
                out.push('[');
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    self.write_literal(item, out);
                }
                out.push(']');
            }
            Value::Record(fields) => {
                out.push('{');
                for (index, (name, field)) in fields.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    push_sized(name, out);
                    out.push('=');
                    self.write_literal(field, out);
                }
                out.push('}');
            }
            Value::Native(native) => match native.view() {
                Some(view) => {
                    out.push('#');
                    push_sized(native.type_key().name(), out);
                    self.write_literal(&view, out);
                }
                // Opaque content: identity is the only safe notion of equality
                None => {
                    if let Some(id) = self.identities.id_of(value) {
                        push_identity(id, out);
                    }
                }
            },
        }
    }
}

fn push_identity(id: u64, out: &mut String) {
    out.push('o');
    out.push_str(&id.to_string());
}

fn push_sized(text: &str, out: &mut String) {
    out.push_str(&text.len().to_string());
    out.push(':');
    out.push_str(text);
}
