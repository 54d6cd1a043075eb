//! Operations of the constraint graph.
//!
//! An operation is a hyperedge with one sink and zero or more sources, plus
//! an *intersect* interval that constrains the sink. Sigma operations may
//! carry a symbolic intersect referencing another variable; those are
//! resolved against the bound's interval once the solver knows it.

use crate::ir::{BinOp, CastOp, Predicate, ValueId};
use crate::range::{Range, Width};
use std::fmt;

/// Index of an operation in the graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

impl OpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Opcodes of single-source operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpcode {
    Trunc,
    ZExt,
    SExt,
    Load,
    Store,
}

impl From<CastOp> for UnaryOpcode {
    fn from(op: CastOp) -> Self {
        match op {
            CastOp::Trunc => UnaryOpcode::Trunc,
            CastOp::ZExt => UnaryOpcode::ZExt,
            CastOp::SExt => UnaryOpcode::SExt,
        }
    }
}

/// The intersect attached to an operation: either a concrete interval or a
/// symbolic one referencing the interval of `bound`. A symbolic intersect
/// reads as `Unknown` until [`fix_symbolic`] writes its resolved range.
#[derive(Debug, Clone)]
pub enum BasicInterval {
    Concrete(Range),
    Symb {
        pred: Predicate,
        bound: ValueId,
        range: Range,
    },
}

impl BasicInterval {
    pub fn concrete(range: Range) -> Self {
        BasicInterval::Concrete(range)
    }

    pub fn symbolic(pred: Predicate, bound: ValueId, w: Width) -> Self {
        BasicInterval::Symb { pred, bound, range: Range::unknown(w) }
    }

    /// The interval this intersect currently contributes.
    pub fn range(&self) -> Range {
        match self {
            BasicInterval::Concrete(r) => *r,
            BasicInterval::Symb { range, .. } => *range,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, BasicInterval::Symb { .. })
    }

    pub fn bound(&self) -> Option<ValueId> {
        match self {
            BasicInterval::Symb { bound, .. } => Some(*bound),
            BasicInterval::Concrete(_) => None,
        }
    }
}

/// Resolve a symbolic intersect to a concrete range, given the current
/// interval of the bound variable and of the operation's sink.
pub fn fix_symbolic(pred: Predicate, bound: &Range, sink: &Range, w: Width) -> Range {
    let l = bound.lower();
    let u = bound.upper();
    let lower = sink.lower();
    let upper = sink.upper();

    match pred {
        Predicate::Eq => Range::new(l, u),
        Predicate::Sle => Range::new(lower, u),
        Predicate::Slt => {
            if u != w.max() {
                Range::new(lower, u - 1)
            } else {
                Range::new(lower, u)
            }
        }
        Predicate::Sge => Range::new(l, upper),
        Predicate::Sgt => {
            if l != w.min() {
                Range::new(l + 1, upper)
            } else {
                Range::new(l, upper)
            }
        }
        _ => Range::full(w),
    }
}

/// Shape of an operation.
#[derive(Debug, Clone)]
pub enum OpKind {
    Unary {
        op: UnaryOpcode,
        source: ValueId,
    },
    Binary {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Sink is the union of the sources; 0..N sources.
    Phi {
        sources: Vec<ValueId>,
    },
    /// e-SSA sigma: single source, intersect possibly symbolic.
    Sigma {
        source: ValueId,
        unresolved: bool,
    },
    /// Transient pseudo-edge used only during SCC discovery.
    ControlDep {
        source: ValueId,
    },
}

/// A hyperedge of the constraint graph.
#[derive(Debug, Clone)]
pub struct Operation {
    pub sink: ValueId,
    pub kind: OpKind,
    pub intersect: BasicInterval,
}

impl Operation {
    /// Source values, in operand order.
    pub fn sources(&self) -> Vec<ValueId> {
        match &self.kind {
            OpKind::Unary { source, .. }
            | OpKind::Sigma { source, .. }
            | OpKind::ControlDep { source } => vec![*source],
            OpKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            OpKind::Phi { sources } => sources.clone(),
        }
    }

    pub fn is_sigma(&self) -> bool {
        matches!(self.kind, OpKind::Sigma { .. })
    }

    pub fn is_control_dep(&self) -> bool {
        matches!(self.kind, OpKind::ControlDep { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w() -> Width {
        Width::new(32)
    }

    #[test]
    fn symbolic_reads_unknown_until_fixed() {
        let itv = BasicInterval::symbolic(Predicate::Slt, ValueId(3), w());
        assert!(itv.range().is_unknown());
        assert_eq!(itv.bound(), Some(ValueId(3)));
    }

    #[test]
    fn fix_symbolic_table() {
        let bound = Range::new(0, 100);
        let sink = Range::new(-5, 500);

        assert_eq!(
            fix_symbolic(Predicate::Eq, &bound, &sink, w()),
            Range::new(0, 100)
        );
        assert_eq!(
            fix_symbolic(Predicate::Sle, &bound, &sink, w()),
            Range::new(-5, 100)
        );
        assert_eq!(
            fix_symbolic(Predicate::Slt, &bound, &sink, w()),
            Range::new(-5, 99)
        );
        assert_eq!(
            fix_symbolic(Predicate::Sge, &bound, &sink, w()),
            Range::new(0, 500)
        );
        assert_eq!(
            fix_symbolic(Predicate::Sgt, &bound, &sink, w()),
            Range::new(1, 500)
        );
    }

    #[test]
    fn fix_symbolic_keeps_sentinel_bounds() {
        let bound = Range::full(w());
        let sink = Range::new(0, 10);
        assert_eq!(
            fix_symbolic(Predicate::Slt, &bound, &sink, w()),
            Range::new(0, w().max())
        );
        assert_eq!(
            fix_symbolic(Predicate::Sgt, &bound, &sink, w()),
            Range::new(w().min(), 10)
        );
    }

    #[test]
    fn unsupported_predicate_is_full() {
        let bound = Range::new(0, 1);
        let sink = Range::new(0, 1);
        assert_eq!(
            fix_symbolic(Predicate::Ult, &bound, &sink, w()),
            Range::full(w())
        );
    }
}
