//! Values and the module-wide value table.
//!
//! Every operand and instruction result is a `ValueId` into one arena owned
//! by the module. Constants are interned per `(value, bits)` so that IR
//! identity coincides with arena identity, which is what the constraint
//! graph keys its maps on.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a value in the module's value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// What a value is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// An integer constant.
    Const(i128),
    /// A formal parameter of a function.
    Arg { func: String },
    /// The result of an instruction.
    Inst { func: String, block: String },
}

/// Per-value data held in the table.
#[derive(Debug, Clone)]
pub struct ValueData {
    /// Value name (`x`, `essa_sigma_x.body`, `42`).
    pub name: String,
    /// Integer type width in bits.
    pub bits: u32,
    pub kind: ValueKind,
}

/// The module-wide value arena.
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    data: Vec<ValueData>,
    consts: IndexMap<(i128, u32), ValueId>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh non-constant value.
    pub fn new_value(&mut self, name: impl Into<String>, bits: u32, kind: ValueKind) -> ValueId {
        let id = ValueId(self.data.len() as u32);
        self.data.push(ValueData { name: name.into(), bits, kind });
        id
    }

    /// Intern an integer constant at the given width.
    pub fn const_int(&mut self, value: i128, bits: u32) -> ValueId {
        if let Some(&id) = self.consts.get(&(value, bits)) {
            return id;
        }
        let id = ValueId(self.data.len() as u32);
        self.data.push(ValueData {
            name: value.to_string(),
            bits,
            kind: ValueKind::Const(value),
        });
        self.consts.insert((value, bits), id);
        id
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, id: ValueId) -> &ValueData {
        &self.data[id.index()]
    }

    pub fn name(&self, id: ValueId) -> &str {
        &self.data[id.index()].name
    }

    pub fn bits(&self, id: ValueId) -> u32 {
        self.data[id.index()].bits
    }

    pub fn is_const(&self, id: ValueId) -> bool {
        matches!(self.data[id.index()].kind, ValueKind::Const(_))
    }

    pub fn const_value(&self, id: ValueId) -> Option<i128> {
        match self.data[id.index()].kind {
            ValueKind::Const(v) => Some(v),
            _ => None,
        }
    }

    /// Qualified label used in listings and dot dumps:
    /// `func.block.name` for instruction results, `func.name` for
    /// parameters, the literal for constants.
    pub fn label(&self, id: ValueId) -> String {
        let d = &self.data[id.index()];
        match &d.kind {
            ValueKind::Const(v) => v.to_string(),
            ValueKind::Arg { func } => format!("{}.{}", func, d.name),
            ValueKind::Inst { func, block } => format!("{}.{}.{}", func, block, d.name),
        }
    }

    /// Look up a non-constant value by function and name.
    pub fn find(&self, func: &str, name: &str) -> Option<ValueId> {
        self.data
            .iter()
            .position(|d| {
                d.name == name
                    && match &d.kind {
                        ValueKind::Arg { func: f } => f == func,
                        ValueKind::Inst { func: f, .. } => f == func,
                        ValueKind::Const(_) => false,
                    }
            })
            .map(|i| ValueId(i as u32))
    }

    /// Iterate over all value ids.
    pub fn ids(&self) -> impl Iterator<Item = ValueId> {
        (0..self.data.len() as u32).map(ValueId)
    }
}
