//! Functions.

use super::block::Block;
use super::instruction::Inst;
use super::value::{ValueId, ValueTable};
use indexmap::IndexMap;

/// A function: ordered blocks plus formal parameters.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Formal parameter values, in declaration order.
    pub params: Vec<ValueId>,
    /// Return type width; `None` for void.
    pub ret_bits: Option<u32>,
    /// Basic blocks (insertion order; the first added block is the entry).
    pub blocks: IndexMap<String, Block>,
    pub entry: String,
    /// Variadic functions are excluded from interprocedural matching.
    pub variadic: bool,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret_bits: None,
            blocks: IndexMap::new(),
            entry: String::new(),
            variadic: false,
        }
    }

    pub fn add_block(&mut self, block: Block) {
        if self.entry.is_empty() {
            self.entry = block.label.clone();
        }
        self.blocks.insert(block.label.clone(), block);
    }

    pub fn get_block(&self, label: &str) -> Option<&Block> {
        self.blocks.get(label)
    }

    pub fn get_block_mut(&mut self, label: &str) -> Option<&mut Block> {
        self.blocks.get_mut(label)
    }

    /// A function without blocks is an external declaration.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_labels(&self) -> Vec<String> {
        self.blocks.keys().cloned().collect()
    }

    /// Iterate over `(block label, instruction)` pairs in layout order.
    pub fn insts(&self) -> impl Iterator<Item = (&str, &Inst)> {
        self.blocks
            .values()
            .flat_map(|b| b.insts.iter().map(move |i| (b.label.as_str(), i)))
    }

    /// Find the instruction defining `v`.
    pub fn def_inst(&self, v: ValueId) -> Option<&Inst> {
        self.insts().map(|(_, i)| i).find(|i| i.dst() == Some(v))
    }

    /// Recompute predecessor/successor edges from the terminators.
    pub fn rebuild_cfg(&mut self) {
        let mut edges: Vec<(String, String)> = Vec::new();
        for block in self.blocks.values() {
            if let Some(term) = block.terminator() {
                for succ in term.successors() {
                    edges.push((block.label.clone(), succ.to_string()));
                }
            }
        }

        for block in self.blocks.values_mut() {
            block.preds.clear();
            block.succs.clear();
        }

        for (from, to) in edges {
            if let Some(b) = self.blocks.get_mut(&from) {
                b.add_succ(&to);
            }
            if let Some(b) = self.blocks.get_mut(&to) {
                b.add_pred(&from);
            }
        }
    }

    /// Maximum integer bit width over instruction results and operands.
    /// Never zero.
    pub fn max_bit_width(&self, values: &ValueTable) -> u32 {
        let mut max = 0;
        for (_, inst) in self.insts() {
            if let Some(dst) = inst.dst() {
                max = max.max(values.bits(dst));
            }
            for v in inst.uses() {
                max = max.max(values.bits(v));
            }
        }
        max.max(1)
    }
}
