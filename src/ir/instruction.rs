//! Instructions and terminators.

use super::value::ValueId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary arithmetic and bitwise opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::UDiv => "udiv",
            BinOp::SDiv => "sdiv",
            BinOp::URem => "urem",
            BinOp::SRem => "srem",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
        };
        write!(f, "{}", s)
    }
}

/// Integer cast opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
        };
        write!(f, "{}", s)
    }
}

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl Predicate {
    /// Logical negation: the predicate that holds on the false branch.
    pub fn inverse(self) -> Predicate {
        match self {
            Predicate::Eq => Predicate::Ne,
            Predicate::Ne => Predicate::Eq,
            Predicate::Slt => Predicate::Sge,
            Predicate::Sle => Predicate::Sgt,
            Predicate::Sgt => Predicate::Sle,
            Predicate::Sge => Predicate::Slt,
            Predicate::Ult => Predicate::Uge,
            Predicate::Ule => Predicate::Ugt,
            Predicate::Ugt => Predicate::Ule,
            Predicate::Uge => Predicate::Ult,
        }
    }

    /// Operand swap: `a pred b` iff `b pred.swapped() a`.
    pub fn swapped(self) -> Predicate {
        match self {
            Predicate::Eq => Predicate::Eq,
            Predicate::Ne => Predicate::Ne,
            Predicate::Slt => Predicate::Sgt,
            Predicate::Sle => Predicate::Sge,
            Predicate::Sgt => Predicate::Slt,
            Predicate::Sge => Predicate::Sle,
            Predicate::Ult => Predicate::Ugt,
            Predicate::Ule => Predicate::Uge,
            Predicate::Ugt => Predicate::Ult,
            Predicate::Uge => Predicate::Ule,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Predicate::Eq => "eq",
            Predicate::Ne => "ne",
            Predicate::Slt => "slt",
            Predicate::Sle => "sle",
            Predicate::Sgt => "sgt",
            Predicate::Sge => "sge",
            Predicate::Ult => "ult",
            Predicate::Ule => "ule",
            Predicate::Ugt => "ugt",
            Predicate::Uge => "uge",
        };
        write!(f, "{}", s)
    }
}

/// A non-terminator instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    Binary {
        dst: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cast {
        dst: ValueId,
        op: CastOp,
        src: ValueId,
    },
    Load {
        dst: ValueId,
        addr: ValueId,
    },
    /// `dst` is the instruction's own identity; stores produce no usable
    /// value but still occupy a graph node.
    Store {
        dst: ValueId,
        addr: ValueId,
        value: ValueId,
    },
    /// Phi and sigma nodes; sigmas are phis whose destination name carries
    /// the e-SSA marker and have a single incoming.
    Phi {
        dst: ValueId,
        incoming: Vec<(String, ValueId)>,
    },
    Icmp {
        dst: ValueId,
        pred: Predicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    Call {
        dst: Option<ValueId>,
        callee: String,
        args: Vec<ValueId>,
    },
}

impl Inst {
    /// The value defined by this instruction, if any.
    pub fn dst(&self) -> Option<ValueId> {
        match self {
            Inst::Binary { dst, .. }
            | Inst::Cast { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::Store { dst, .. }
            | Inst::Phi { dst, .. }
            | Inst::Icmp { dst, .. } => Some(*dst),
            Inst::Call { dst, .. } => *dst,
        }
    }

    /// Values read by this instruction.
    pub fn uses(&self) -> Vec<ValueId> {
        match self {
            Inst::Binary { lhs, rhs, .. } | Inst::Icmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Inst::Cast { src, .. } => vec![*src],
            Inst::Load { addr, .. } => vec![*addr],
            Inst::Store { addr, value, .. } => vec![*addr, *value],
            Inst::Phi { incoming, .. } => incoming.iter().map(|(_, v)| *v).collect(),
            Inst::Call { args, .. } => args.clone(),
        }
    }

    /// Rewrite every use of `from` into `to`. Phi incomings are only
    /// rewritten when `pred_ok` accepts the incoming block.
    pub fn replace_uses(&mut self, from: ValueId, to: ValueId, pred_ok: impl Fn(&str) -> bool) {
        let r = |v: &mut ValueId| {
            if *v == from {
                *v = to;
            }
        };
        match self {
            Inst::Binary { lhs, rhs, .. } | Inst::Icmp { lhs, rhs, .. } => {
                r(lhs);
                r(rhs);
            }
            Inst::Cast { src, .. } => r(src),
            Inst::Load { addr, .. } => r(addr),
            Inst::Store { addr, value, .. } => {
                r(addr);
                r(value);
            }
            Inst::Phi { incoming, .. } => {
                for (pred, v) in incoming.iter_mut() {
                    if *v == from && pred_ok(pred) {
                        *v = to;
                    }
                }
            }
            Inst::Call { args, .. } => {
                for a in args.iter_mut() {
                    r(a);
                }
            }
        }
    }
}

/// A block terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Br {
        target: String,
    },
    CondBr {
        cond: ValueId,
        then_block: String,
        else_block: String,
    },
    Switch {
        cond: ValueId,
        default: String,
        cases: Vec<(i128, String)>,
    },
    Ret {
        value: Option<ValueId>,
    },
}

impl Terminator {
    /// Successor block labels, in branch order.
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Terminator::Br { target } => vec![target],
            Terminator::CondBr { then_block, else_block, .. } => {
                vec![then_block, else_block]
            }
            Terminator::Switch { default, cases, .. } => {
                let mut succs = vec![default.as_str()];
                succs.extend(cases.iter().map(|(_, b)| b.as_str()));
                succs
            }
            Terminator::Ret { .. } => vec![],
        }
    }

    /// Values read by the terminator.
    pub fn uses(&self) -> Vec<ValueId> {
        match self {
            Terminator::CondBr { cond, .. } | Terminator::Switch { cond, .. } => vec![*cond],
            Terminator::Ret { value } => value.iter().copied().collect(),
            Terminator::Br { .. } => vec![],
        }
    }

    /// Rewrite every use of `from` into `to`.
    pub fn replace_uses(&mut self, from: ValueId, to: ValueId) {
        match self {
            Terminator::CondBr { cond, .. } | Terminator::Switch { cond, .. } => {
                if *cond == from {
                    *cond = to;
                }
            }
            Terminator::Ret { value: Some(v) } if *v == from => *v = to,
            _ => {}
        }
    }
}
