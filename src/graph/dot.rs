//! Dot-format dump of the constraint graph.
//!
//! Variable nodes are labelled `func.block.name <range>`; operation nodes
//! carry their opcode or intersect; control-dependence pseudo-edges from
//! the last SCC discovery are drawn dashed.

use super::ops::{BasicInterval, OpKind, UnaryOpcode};
use super::ConstraintGraph;
use crate::ir::{Predicate, ValueId};
use std::fmt::Write;

impl ConstraintGraph<'_> {
    /// Render the graph as a dot digraph.
    pub fn to_dot(&self, title: &str) -> String {
        let mut out = String::new();
        let w = self.width;

        let _ = writeln!(out, "digraph dotgraph {{");
        let _ = writeln!(out, "label=\"Constraint Graph for '{}'\";", title);
        let _ = writeln!(
            out,
            "node [shape=record,fontname=\"Times-Roman\",fontsize=14];"
        );

        for (&v, node) in &self.vars {
            let _ = writeln!(
                out,
                " \"{}\" [label=\"{} {}\"]",
                self.module.values.label(v),
                self.module.values.label(v),
                node.interval.display(w)
            );
        }

        for (idx, op) in self.oprs.iter().enumerate() {
            // Pseudo-edges are rendered separately, dashed.
            if op.is_control_dep() {
                continue;
            }
            let name = format!("op{}", idx);
            let label = self.op_label(op);
            let _ = writeln!(out, " \"{}\" [label=\"{}\"]", name, label);

            for src in op.sources() {
                let _ = writeln!(
                    out,
                    " \"{}\" -> \"{}\"",
                    self.module.values.label(src),
                    name
                );
            }
            let _ = writeln!(
                out,
                " \"{}\" -> \"{}\"",
                name,
                self.module.values.label(op.sink)
            );
        }

        for (source, sink) in &self.pseudo_edges {
            let _ = writeln!(
                out,
                " \"{}\" -> \"{}\" [style=dashed]",
                self.module.values.label(*source),
                self.module.values.label(*sink)
            );
        }

        let _ = writeln!(out, "}}");
        out
    }

    fn op_label(&self, op: &super::ops::Operation) -> String {
        match &op.kind {
            OpKind::Binary { op: bop, .. } => bop.to_string(),
            OpKind::Unary { op: uop, .. } => {
                let bw = self.module.values.bits(op.sink);
                match uop {
                    UnaryOpcode::Trunc => format!("trunc i{}", bw),
                    UnaryOpcode::ZExt => format!("zext i{}", bw),
                    UnaryOpcode::SExt => format!("sext i{}", bw),
                    UnaryOpcode::Load | UnaryOpcode::Store => self.intersect_label(&op.intersect),
                }
            }
            OpKind::Sigma { .. } => self.intersect_label(&op.intersect),
            OpKind::Phi { .. } => "phi".to_string(),
            OpKind::ControlDep { .. } => String::new(),
        }
    }

    fn intersect_label(&self, itv: &BasicInterval) -> String {
        match itv {
            BasicInterval::Concrete(r) => r.display(self.width).to_string(),
            BasicInterval::Symb { pred, bound, .. } => self.symb_label(*pred, *bound),
        }
    }

    fn symb_label(&self, pred: Predicate, bound: ValueId) -> String {
        let b = self.module.values.label(bound);
        match pred {
            Predicate::Eq => format!("[lb({b}), ub({b})]"),
            Predicate::Sle => format!("[-inf, ub({b})]"),
            Predicate::Slt => format!("[-inf, ub({b}) - 1]"),
            Predicate::Sge => format!("[lb({b}), +inf]"),
            Predicate::Sgt => format!("[lb({b}) + 1, +inf]"),
            _ => "Unknown".to_string(),
        }
    }
}
