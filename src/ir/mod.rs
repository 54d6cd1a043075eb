//! The e-SSA intermediate representation consumed by the analysis.
//!
//! # Structure
//!
//! ```text
//! Module
//! ├── ValueTable (one arena for constants, parameters, results)
//! └── Functions
//!     └── Blocks
//!         └── Instructions + Terminator
//! ```
//!
//! The IR is in SSA form; after the e-SSA pass has run, branch-constrained
//! variables additionally have sigma definitions (one-operand phis whose
//! name carries the sigma marker) in the branch successors.

mod block;
mod function;
mod instruction;
mod value;

pub use block::Block;
pub use function::Function;
pub use instruction::{BinOp, CastOp, Inst, Predicate, Terminator};
pub use value::{ValueData, ValueId, ValueKind, ValueTable};

use indexmap::IndexMap;

/// A module: functions plus the shared value table.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub functions: IndexMap<String, Function>,
    pub values: ValueTable,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
            values: ValueTable::new(),
        }
    }

    pub fn add_function(&mut self, func: Function) {
        self.functions.insert(func.name.clone(), func);
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Maximum integer bit width over every function in the module.
    pub fn max_bit_width(&self) -> u32 {
        self.functions
            .values()
            .map(|f| f.max_bit_width(&self.values))
            .max()
            .unwrap_or(1)
    }

    /// Look up a value by function and name (parameters and results).
    pub fn lookup(&self, func: &str, name: &str) -> Option<ValueId> {
        self.values.find(func, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_basics() {
        let mut m = Module::new("test");
        m.add_function(Function::new("f"));
        assert!(m.get_function("f").is_some());
        assert!(m.get_function("g").is_none());
        assert_eq!(m.max_bit_width(), 1);
    }
}
