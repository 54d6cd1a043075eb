//! Two-phase fixpoint resolution of the constraint graph.
//!
//! Each SCC is solved once, in reverse topological order: a bounded
//! non-widening warm-up, a pre-update that jumps growing bounds to the
//! sentinels (widening / growth), resolution of symbolic intersects, and a
//! post-update that recovers precision (narrowing / cropping). Results are
//! then propagated into the operations feeding later SCCs.

use super::ops::{BasicInterval, OpId, OpKind};
use super::{AbstractState, ConstraintGraph, Nuutila};
use crate::essa::SIGMA_MARKER;
use crate::ir::ValueId;
use crate::range::Range;
use crate::stats::Timer;
use indexmap::{IndexMap, IndexSet};

/// Fixpoint strategy: Cousot widening/narrowing or growth/crop with
/// abstract-state guided shrinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    Cousot,
    CropDfs,
}

/// The meet operator applied by one update pass.
#[derive(Debug, Clone, Copy)]
enum MeetOp {
    Fixed,
    Widen,
    Growth,
    Narrow,
    Crop,
}

impl<'m> ConstraintGraph<'m> {
    /// Solve the graph. Idempotent once a fixpoint is reached: re-running
    /// any update pass changes nothing.
    pub fn find_intervals(&mut self, strategy: Strategy) {
        let timer = Timer::start();
        self.build_symbolic_intersect_map();
        let sccs = Nuutila::new(self);
        self.profile.update_time("Nuutila", timer.stop());

        self.stats.num_sccs += sccs.worklist.len();

        let timer = Timer::start();
        for root in &sccs.worklist {
            let component = &sccs.components[root];

            if component.len() == 1 {
                self.stats.num_alone_sccs += 1;
                self.fix_intersects(component);
                let v = component[0];
                self.resolve_pending_sigma(v);
                if self.vars[&v].interval.is_unknown() {
                    self.vars[&v].interval = Range::full(self.width);
                }
            } else {
                self.stats.size_max_scc = self.stats.size_max_scc.max(component.len());

                let comp_use = self.build_use_map(component);

                // Bounded warm-up improves the starting point without
                // risking divergence.
                let mut entry = self.generate_entry_points(component);
                self.update_bounded(component.len() * 2, &comp_use, &mut entry);

                let mut entry = self.generate_entry_points(component);
                let pre = match strategy {
                    Strategy::Cousot => MeetOp::Widen,
                    Strategy::CropDfs => MeetOp::Growth,
                };
                self.update(&comp_use, &mut entry, pre);

                self.fix_intersects(component);

                for &v in component {
                    if self.vars[&v].interval.is_unknown() {
                        self.vars[&v].interval = Range::full(self.width);
                    }
                }

                match strategy {
                    Strategy::Cousot => {
                        let mut actives = self.generate_active_vars(component);
                        self.update(&comp_use, &mut actives, MeetOp::Narrow);
                    }
                    Strategy::CropDfs => self.pos_update_crop(&comp_use, component),
                }
            }

            self.propagate_to_next_scc(component);
        }
        self.profile.update_time("SCCs resolution", timer.stop());
    }

    /// Re-evaluate a sigma that was propagated before its symbolic
    /// intersect had been resolved.
    fn resolve_pending_sigma(&mut self, v: ValueId) {
        if !self.module.values.name(v).starts_with(SIGMA_MARKER) {
            return;
        }
        let Some(&op_id) = self.def_map.get(&v) else { return };
        if let OpKind::Sigma { unresolved: true, .. } = self.oprs[op_id.index()].kind {
            let r = self.eval(op_id);
            self.vars[&v].interval = r;
            if let OpKind::Sigma { unresolved, .. } = &mut self.oprs[op_id.index()].kind {
                *unresolved = false;
            }
        }
    }

    /// Values of the component that already carry information. Unresolved
    /// sigmas are re-evaluated first so the intersect fixed by an earlier
    /// SCC takes effect.
    fn generate_entry_points(&mut self, component: &IndexSet<ValueId>) -> IndexSet<ValueId> {
        let mut entry = IndexSet::new();

        for &v in component {
            self.resolve_pending_sigma(v);
            if !self.vars[&v].interval.is_unknown() {
                entry.insert(v);
            }
        }

        entry
    }

    /// Non-constant members of the component, seeding the post phase.
    fn generate_active_vars(&mut self, component: &IndexSet<ValueId>) -> IndexSet<ValueId> {
        component
            .iter()
            .copied()
            .filter(|&v| !self.module.values.is_const(v))
            .collect()
    }

    /// Worklist update: re-evaluate every use of an active value with the
    /// given meet; enqueue sinks that changed.
    fn update(
        &mut self,
        comp_use: &IndexMap<ValueId, IndexSet<OpId>>,
        active: &mut IndexSet<ValueId>,
        meet: MeetOp,
    ) {
        while let Some(v) = active.pop() {
            let Some(ops) = comp_use.get(&v) else { continue };
            for &op in ops {
                if self.run_meet(op, meet) {
                    active.insert(self.oprs[op.index()].sink);
                }
            }
        }
    }

    /// Like [`update`], but with a hard cap on the number of evaluations.
    fn update_bounded(
        &mut self,
        mut iterations: usize,
        comp_use: &IndexMap<ValueId, IndexSet<OpId>>,
        active: &mut IndexSet<ValueId>,
    ) {
        while let Some(v) = active.pop() {
            let Some(ops) = comp_use.get(&v) else { continue };
            for &op in ops {
                if iterations == 0 {
                    active.clear();
                    return;
                }
                iterations -= 1;

                if self.run_meet(op, MeetOp::Fixed) {
                    active.insert(self.oprs[op.index()].sink);
                }
            }
        }
    }

    fn run_meet(&mut self, op: OpId, meet: MeetOp) -> bool {
        match meet {
            MeetOp::Fixed => self.meet_fixed(op),
            MeetOp::Widen => self.meet_widen(op),
            MeetOp::Growth => self.meet_growth(op),
            MeetOp::Narrow => self.meet_narrow(op),
            MeetOp::Crop => self.meet_crop(op),
        }
    }

    /// Plain re-evaluation; used by the bounded warm-up.
    fn meet_fixed(&mut self, op: OpId) -> bool {
        let sink = self.oprs[op.index()].sink;
        let old = self.vars[&sink].interval;
        let new = self.eval(op);
        self.vars[&sink].interval = new;
        old != new
    }

    /// Widening: the first real evaluation is accepted; afterwards a
    /// growing bound jumps to its sentinel.
    fn meet_widen(&mut self, op: OpId) -> bool {
        let w = self.width;
        let sink = self.oprs[op.index()].sink;
        let old = self.vars[&sink].interval;
        let new = self.eval(op);

        if old.is_unknown() {
            self.vars[&sink].interval = new;
        } else if new.lower() < old.lower() && new.upper() > old.upper() {
            self.vars[&sink].interval = Range::full(w);
        } else if new.lower() < old.lower() {
            self.vars[&sink].interval = Range::new(w.min(), old.upper());
        } else if new.upper() > old.upper() {
            self.vars[&sink].interval = Range::new(old.lower(), w.max());
        }

        old != self.vars[&sink].interval
    }

    /// Growth: the CropDFS pre-phase; jumps straight to the sentinels.
    fn meet_growth(&mut self, op: OpId) -> bool {
        let w = self.width;
        let sink = self.oprs[op.index()].sink;
        let old = self.vars[&sink].interval;
        let new = self.eval(op);

        if old.is_unknown() {
            self.vars[&sink].interval = new;
        } else if new.lower() < old.lower() {
            if new.upper() > old.upper() {
                self.vars[&sink].interval = Range::full(w);
            } else {
                self.vars[&sink].interval = Range::new(w.min(), old.upper());
            }
        } else if new.upper() > old.upper() {
            self.vars[&sink].interval = Range::new(old.lower(), w.max());
        }

        old != self.vars[&sink].interval
    }

    /// Narrowing: a sentinel bound is replaced by any finite bound the
    /// evaluation produces; finite bounds may still relax outwards.
    fn meet_narrow(&mut self, op: OpId) -> bool {
        let w = self.width;
        let sink = self.oprs[op.index()].sink;
        let o_lower = self.vars[&sink].interval.lower();
        let o_upper = self.vars[&sink].interval.upper();
        let new = self.eval(op);
        let n_lower = new.lower();
        let n_upper = new.upper();
        let mut changed = false;

        if o_lower == w.min() && n_lower != w.min() {
            self.vars[&sink].interval = Range::new(n_lower, o_upper);
            changed = true;
        } else {
            let smin = o_lower.min(n_lower);
            if o_lower != smin {
                self.vars[&sink].interval = Range::new(smin, o_upper);
                changed = true;
            }
        }

        let cur_lower = self.vars[&sink].interval.lower();
        if o_upper == w.max() && n_upper != w.max() {
            self.vars[&sink].interval = Range::new(cur_lower, n_upper);
            changed = true;
        } else {
            let smax = o_upper.max(n_upper);
            if o_upper != smax {
                self.vars[&sink].interval = Range::new(cur_lower, smax);
                changed = true;
            }
        }

        changed
    }

    /// Cropping: shrink only on the sides the abstract state says are
    /// unbounded.
    fn meet_crop(&mut self, op: OpId) -> bool {
        let sink = self.oprs[op.index()].sink;
        let old = self.vars[&sink].interval;
        let new = self.eval(op);
        let state = self.vars[&sink].abstract_state;
        let mut changed = false;

        if matches!(state, AbstractState::MinUnbounded | AbstractState::Unbounded)
            && new.lower() > old.lower()
        {
            self.vars[&sink].interval = Range::new(new.lower(), old.upper());
            changed = true;
        }

        let cur = self.vars[&sink].interval;
        if matches!(state, AbstractState::MaxUnbounded | AbstractState::Unbounded)
            && new.upper() < cur.upper()
        {
            self.vars[&sink].interval = Range::new(cur.lower(), new.upper());
            changed = true;
        }

        changed
    }

    /// CropDFS post phase: snapshot abstract states, then run a crop walk
    /// from every unary or sigma operation whose sink kept a finite bound.
    fn pos_update_crop(
        &mut self,
        comp_use: &IndexMap<ValueId, IndexSet<OpId>>,
        component: &IndexSet<ValueId>,
    ) {
        let w = self.width;
        for &v in component {
            self.vars[&v].store_abstract_state(w);
        }

        for idx in 0..self.oprs.len() {
            let op = &self.oprs[idx];
            if !matches!(op.kind, OpKind::Unary { .. } | OpKind::Sigma { .. }) {
                continue;
            }
            if !component.contains(&op.sink) {
                continue;
            }
            let r = self.vars[&op.sink].interval;
            if r.lower() != w.min() || r.upper() != w.max() {
                self.crop_walk(comp_use, OpId(idx as u32));
            }
        }
    }

    /// Local worklist traversal over the component's use map; each sink is
    /// cropped at most once per walk.
    fn crop_walk(&mut self, comp_use: &IndexMap<ValueId, IndexSet<OpId>>, start: OpId) {
        let mut active: IndexSet<OpId> = IndexSet::new();
        let mut visited: IndexSet<ValueId> = IndexSet::new();
        active.insert(start);

        while let Some(op) = active.pop() {
            let sink = self.oprs[op.index()].sink;
            if visited.contains(&sink) {
                continue;
            }

            self.meet_crop(op);
            visited.insert(sink);

            if let Some(ops) = comp_use.get(&sink) {
                for &next in ops {
                    active.insert(next);
                }
            }
        }
    }

    /// Evaluate every operation using a member of the solved component so
    /// the next SCCs see concrete entry points; sigmas whose symbolic
    /// intersect is still unresolved are flagged for the next component.
    fn propagate_to_next_scc(&mut self, component: &IndexSet<ValueId>) {
        for &v in component {
            let ops: Vec<OpId> = self
                .use_map
                .get(&v)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default();

            for op in ops {
                let r = self.eval(op);
                let sink = self.oprs[op.index()].sink;
                self.vars[&sink].interval = r;

                let opr = &mut self.oprs[op.index()];
                if let OpKind::Sigma { unresolved, .. } = &mut opr.kind {
                    if matches!(&opr.intersect, BasicInterval::Symb { range, .. } if range.is_unknown())
                    {
                        *unresolved = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Block, Function, Inst, Module, Predicate, Terminator, ValueKind};
    use crate::range::Width;

    /// `x0 = 10; while (x < 100) x++` in e-SSA form.
    fn loop_module() -> Module {
        let mut m = Module::new("t");
        let f_name = "f".to_string();
        let iv = |m: &mut Module, name: &str, block: &str| {
            m.values.new_value(
                name,
                32,
                ValueKind::Inst { func: f_name.clone(), block: block.into() },
            )
        };

        let k10 = m.values.const_int(10, 32);
        let k100 = m.values.const_int(100, 32);
        let k1 = m.values.const_int(1, 32);
        let x_phi = iv(&mut m, "x", "header");
        let cond = m.values.new_value(
            "cond",
            1,
            ValueKind::Inst { func: f_name.clone(), block: "header".into() },
        );
        let x_body = iv(&mut m, "essa_sigma_x.body", "body");
        let x_next = iv(&mut m, "x.next", "body");
        let x_exit = iv(&mut m, "essa_sigma_x.exit", "exit");

        let mut f = Function::new("f");

        let mut entry = Block::new("entry");
        entry.set_term(Terminator::Br { target: "header".into() });
        f.add_block(entry);

        let mut header = Block::new("header");
        header.push(Inst::Phi {
            dst: x_phi,
            incoming: vec![("entry".into(), k10), ("body".into(), x_next)],
        });
        header.push(Inst::Icmp { dst: cond, pred: Predicate::Slt, lhs: x_phi, rhs: k100 });
        header.set_term(Terminator::CondBr {
            cond,
            then_block: "body".into(),
            else_block: "exit".into(),
        });
        f.add_block(header);

        let mut body = Block::new("body");
        body.push(Inst::Phi { dst: x_body, incoming: vec![("header".into(), x_phi)] });
        body.push(Inst::Binary { dst: x_next, op: BinOp::Add, lhs: x_body, rhs: k1 });
        body.set_term(Terminator::Br { target: "header".into() });
        f.add_block(body);

        let mut exit = Block::new("exit");
        exit.push(Inst::Phi { dst: x_exit, incoming: vec![("header".into(), x_phi)] });
        exit.set_term(Terminator::Ret { value: Some(x_exit) });
        f.add_block(exit);

        m.add_function(f);
        m
    }

    fn solve(m: &Module, strategy: Strategy) -> ConstraintGraph<'_> {
        let func = m.get_function("f").unwrap();
        let width = Width::new(func.max_bit_width(&m.values));
        let mut g = ConstraintGraph::new(m, width);
        g.build_graph(func);
        g.build_var_nodes();
        g.find_intervals(strategy);
        g
    }

    #[test]
    fn counting_loop_cousot() {
        let m = loop_module();
        let g = solve(&m, Strategy::Cousot);

        let x_phi = m.lookup("f", "x").unwrap();
        let x_exit = m.lookup("f", "essa_sigma_x.exit").unwrap();
        assert_eq!(g.range_of(x_phi), crate::range::Range::new(10, 100));
        assert_eq!(g.range_of(x_exit), crate::range::Range::new(100, 100));
    }

    #[test]
    fn counting_loop_crop() {
        let m = loop_module();
        let g = solve(&m, Strategy::CropDfs);

        let x_phi = m.lookup("f", "x").unwrap();
        let x_exit = m.lookup("f", "essa_sigma_x.exit").unwrap();
        assert_eq!(g.range_of(x_phi), crate::range::Range::new(10, 100));
        assert_eq!(g.range_of(x_exit), crate::range::Range::new(100, 100));
    }

    #[test]
    fn fixpoint_is_idempotent() {
        let m = loop_module();
        let mut g = solve(&m, Strategy::Cousot);

        let before: Vec<_> = g.intervals().collect();
        // One more plain update pass over every operation.
        for idx in 0..g.oprs.len() {
            g.meet_fixed(OpId(idx as u32));
        }
        let after: Vec<_> = g.intervals().collect();
        assert_eq!(before, after);
    }
}
