//! Basic blocks.

use super::instruction::{Inst, Terminator};

/// A basic block: instructions plus one terminator, with CFG edges
/// maintained by [`Function::rebuild_cfg`](super::Function::rebuild_cfg).
#[derive(Debug, Clone)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub term: Option<Terminator>,
    pub preds: Vec<String>,
    pub succs: Vec<String>,
}

impl Block {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            insts: Vec::new(),
            term: None,
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn push(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    pub fn insert(&mut self, index: usize, inst: Inst) {
        self.insts.insert(index, inst);
    }

    pub fn set_term(&mut self, term: Terminator) {
        self.term = Some(term);
    }

    pub fn terminator(&self) -> Option<&Terminator> {
        self.term.as_ref()
    }

    pub fn add_pred(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.preds.contains(&label) {
            self.preds.push(label);
        }
    }

    pub fn add_succ(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.succs.contains(&label) {
            self.succs.push(label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, ValueId};

    #[test]
    fn block_basics() {
        let mut b = Block::new("entry");
        b.push(Inst::Binary {
            dst: ValueId(2),
            op: BinOp::Add,
            lhs: ValueId(0),
            rhs: ValueId(1),
        });
        assert!(b.terminator().is_none());
        b.set_term(Terminator::Ret { value: Some(ValueId(2)) });
        assert!(b.terminator().is_some());

        b.add_pred("a");
        b.add_pred("a");
        assert_eq!(b.preds, vec!["a".to_string()]);
    }
}
