//! The constraint graph and its solver.
//!
//! Nodes are variables (one per IR value), hyperedges are operations that
//! constrain a sink in terms of its sources. The graph is built from the
//! instructions of one or more functions, partitioned into strongly
//! connected components, and solved per component in reverse topological
//! order.
//!
//! ```text
//! build_graph  ──►  build_var_nodes  ──►  find_intervals
//!      │                                      │
//!      ├─ branch/switch value maps            ├─ Nuutila SCCs (+ pseudo-edges)
//!      ├─ operations + def/use maps           ├─ widen/growth, narrow/crop
//!      └─ sigma intersects                    └─ propagation to later SCCs
//! ```

pub mod ops;

mod dot;
mod interproc;
mod nuutila;
mod solver;

pub use interproc::match_parameters_and_return_values;
pub use nuutila::Nuutila;
pub use solver::Strategy;

use crate::essa::SIGMA_MARKER;
use crate::ir::{BinOp, Function, Inst, Module, Predicate, Terminator, ValueId};
use crate::range::{Range, Width};
use crate::stats::{AnalysisStats, Profile};
use indexmap::{IndexMap, IndexSet};
use ops::{fix_symbolic, BasicInterval, OpId, OpKind, Operation, UnaryOpcode};

/// Shape of an interval after the growth phase, driving the crop phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractState {
    /// Both bounds finite; crop may not touch it.
    Bounded,
    /// Lower bound is -inf; crop may only raise the lower bound.
    MinUnbounded,
    /// Upper bound is +inf; crop may only lower the upper bound.
    MaxUnbounded,
    /// Both bounds are sentinels; crop may shrink either side.
    Unbounded,
}

/// A variable node: one IR value and its current interval.
#[derive(Debug, Clone)]
pub struct VarNode {
    pub value: ValueId,
    pub interval: Range,
    pub abstract_state: AbstractState,
}

impl VarNode {
    fn new(value: ValueId, w: Width) -> Self {
        Self {
            value,
            interval: Range::unknown(w),
            abstract_state: AbstractState::Bounded,
        }
    }

    /// Snapshot the interval shape between the growth and crop phases.
    pub fn store_abstract_state(&mut self, w: Width) {
        debug_assert!(!self.interval.is_unknown());
        let lo_inf = self.interval.lower() == w.min();
        let hi_inf = self.interval.upper() == w.max();
        self.abstract_state = match (lo_inf, hi_inf) {
            (true, true) => AbstractState::Unbounded,
            (true, false) => AbstractState::MinUnbounded,
            (false, true) => AbstractState::MaxUnbounded,
            (false, false) => AbstractState::Bounded,
        };
    }
}

/// Branch-derived intervals for one compared value: what holds on the true
/// successor and on the false successor.
#[derive(Debug, Clone)]
pub struct ValueBranchMap {
    pub true_block: String,
    pub false_block: String,
    pub true_itv: BasicInterval,
    pub false_itv: BasicInterval,
}

/// Switch-derived intervals for the condition value, one per successor.
#[derive(Debug, Clone)]
pub struct ValueSwitchMap {
    pub entries: Vec<(BasicInterval, String)>,
}

/// The constraint graph of one analysis run.
pub struct ConstraintGraph<'m> {
    pub(crate) module: &'m Module,
    pub(crate) width: Width,
    pub(crate) vars: IndexMap<ValueId, VarNode>,
    pub(crate) oprs: Vec<Operation>,
    pub(crate) def_map: IndexMap<ValueId, OpId>,
    pub(crate) use_map: IndexMap<ValueId, IndexSet<OpId>>,
    pub(crate) symb_map: IndexMap<ValueId, IndexSet<OpId>>,
    branch_maps: IndexMap<ValueId, ValueBranchMap>,
    switch_maps: IndexMap<ValueId, ValueSwitchMap>,
    /// Control-dependence edges recorded by SCC discovery, kept for dumps.
    pub(crate) pseudo_edges: Vec<(ValueId, ValueId)>,
    pub stats: AnalysisStats,
    pub profile: Profile,
}

impl<'m> ConstraintGraph<'m> {
    pub fn new(module: &'m Module, width: Width) -> Self {
        Self {
            module,
            width,
            vars: IndexMap::new(),
            oprs: Vec::new(),
            def_map: IndexMap::new(),
            use_map: IndexMap::new(),
            symb_map: IndexMap::new(),
            branch_maps: IndexMap::new(),
            switch_maps: IndexMap::new(),
            pseudo_edges: Vec::new(),
            stats: AnalysisStats::default(),
            profile: Profile::new(),
        }
    }

    pub fn width(&self) -> Width {
        self.width
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    /// The computed interval of a value; `Unknown` if it never entered the
    /// graph.
    pub fn range_of(&self, v: ValueId) -> Range {
        self.vars
            .get(&v)
            .map(|n| n.interval)
            .unwrap_or_else(|| Range::unknown(self.width))
    }

    /// Iterate over `(value, interval)` pairs in insertion order.
    pub fn intervals(&self) -> impl Iterator<Item = (ValueId, Range)> + '_ {
        self.vars.iter().map(|(&v, n)| (v, n.interval))
    }

    /// Register a variable node; idempotent on IR identity.
    pub fn add_var_node(&mut self, v: ValueId) {
        if self.vars.contains_key(&v) {
            return;
        }
        self.vars.insert(v, VarNode::new(v, self.width));
        self.use_map.entry(v).or_default();
    }

    pub(crate) fn push_op(&mut self, op: Operation) -> OpId {
        let id = OpId(self.oprs.len() as u32);
        self.oprs.push(op);
        id
    }

    fn register_def(&mut self, sink: ValueId, op: OpId) {
        self.def_map.insert(sink, op);
    }

    fn register_use(&mut self, source: ValueId, op: OpId) {
        self.use_map.entry(source).or_default().insert(op);
    }

    /// Add a single-source operation (casts, loads, stores).
    pub fn add_unary_op(&mut self, uop: UnaryOpcode, sink: ValueId, source: ValueId) {
        self.add_var_node(sink);
        self.add_var_node(source);
        let id = self.push_op(Operation {
            sink,
            kind: OpKind::Unary { op: uop, source },
            intersect: BasicInterval::concrete(Range::full(self.width)),
        });
        self.register_def(sink, id);
        self.register_use(source, id);
    }

    /// Add a binary operation. Sigmas carry the branch intersects, so
    /// binary operations always start with the full-range intersect.
    pub fn add_binary_op(&mut self, bop: BinOp, sink: ValueId, lhs: ValueId, rhs: ValueId) {
        self.add_var_node(sink);
        self.add_var_node(lhs);
        self.add_var_node(rhs);
        let id = self.push_op(Operation {
            sink,
            kind: OpKind::Binary { op: bop, lhs, rhs },
            intersect: BasicInterval::concrete(Range::full(self.width)),
        });
        self.register_def(sink, id);
        self.register_use(lhs, id);
        self.register_use(rhs, id);
    }

    /// Add a phi operation joining `sources`.
    pub fn add_phi_op(&mut self, sink: ValueId, sources: &[ValueId]) {
        self.add_var_node(sink);
        let id = self.push_op(Operation {
            sink,
            kind: OpKind::Phi { sources: sources.to_vec() },
            intersect: BasicInterval::concrete(Range::full(self.width)),
        });
        self.register_def(sink, id);
        for &s in sources {
            self.add_var_node(s);
            self.register_use(s, id);
        }
    }

    /// Add a sigma operation, looking up its intersect in the branch or
    /// switch value maps by the block the sigma lives in.
    pub fn add_sigma_op(&mut self, sink: ValueId, source: ValueId, block: &str) {
        self.add_var_node(sink);
        self.add_var_node(source);

        let itv = if let Some(vbm) = self.branch_maps.get(&source) {
            if block == vbm.true_block {
                Some(vbm.true_itv.clone())
            } else if block == vbm.false_block {
                Some(vbm.false_itv.clone())
            } else {
                None
            }
        } else if let Some(vsm) = self.switch_maps.get(&source) {
            vsm.entries
                .iter()
                .find(|(_, b)| b == block)
                .map(|(i, _)| i.clone())
        } else {
            None
        };

        let intersect = itv.unwrap_or_else(|| BasicInterval::concrete(Range::full(self.width)));
        let id = self.push_op(Operation {
            sink,
            kind: OpKind::Sigma { source, unresolved: false },
            intersect,
        });
        self.register_def(sink, id);
        self.register_use(source, id);
    }

    /// Instructions that feed the graph. Comparisons and calls stay out;
    /// their results are treated as inputs.
    fn is_valid_inst(inst: &Inst) -> bool {
        matches!(
            inst,
            Inst::Binary { .. }
                | Inst::Cast { .. }
                | Inst::Load { .. }
                | Inst::Store { .. }
                | Inst::Phi { .. }
        )
    }

    fn build_operations(&mut self, block: &str, inst: &Inst) {
        match inst {
            Inst::Binary { dst, op, lhs, rhs } => self.add_binary_op(*op, *dst, *lhs, *rhs),
            Inst::Cast { dst, op, src } => self.add_unary_op((*op).into(), *dst, *src),
            Inst::Load { dst, addr } => self.add_unary_op(UnaryOpcode::Load, *dst, *addr),
            Inst::Store { dst, addr, .. } => self.add_unary_op(UnaryOpcode::Store, *dst, *addr),
            Inst::Phi { dst, incoming } => {
                if self.module.values.name(*dst).starts_with(SIGMA_MARKER) && incoming.len() == 1 {
                    self.add_sigma_op(*dst, incoming[0].1, block);
                } else {
                    let sources: Vec<ValueId> = incoming.iter().map(|(_, v)| *v).collect();
                    self.add_phi_op(*dst, &sources);
                }
            }
            Inst::Icmp { .. } | Inst::Call { .. } => {}
        }
    }

    /// Signed set of `x` satisfying `x pred c`, with unrepresentable sets
    /// saturated to the full range.
    fn icmp_region(&self, pred: Predicate, c: i128) -> Range {
        let w = self.width;
        let c = w.clamp(c);
        let full = Range::full(w);
        match pred {
            Predicate::Eq => Range::new(c, c),
            Predicate::Ne => full,
            Predicate::Slt => {
                if c == w.min() {
                    full
                } else {
                    Range::new(w.min(), c - 1)
                }
            }
            Predicate::Sle => Range::new(w.min(), c),
            Predicate::Sgt => {
                if c == w.max() {
                    full
                } else {
                    Range::new(c + 1, w.max())
                }
            }
            Predicate::Sge => Range::new(c, w.max()),
            Predicate::Ult => {
                if c > 0 {
                    Range::new(0, c - 1)
                } else {
                    full
                }
            }
            Predicate::Ule => {
                if c >= 0 {
                    Range::new(0, c)
                } else {
                    full
                }
            }
            Predicate::Ugt => {
                // Satisfiable as a signed interval only for negative c
                // other than all-ones.
                if c < -1 {
                    Range::new(c + 1, -1)
                } else {
                    full
                }
            }
            Predicate::Uge => {
                if c < 0 {
                    Range::new(c, -1)
                } else {
                    full
                }
            }
        }
    }

    /// The complement of a branch region, saturated back into an interval.
    fn invert_region(&self, r: &Range) -> Range {
        let w = self.width;
        if r.is_max_range(w) {
            return Range::full(w);
        }
        if r.lower() == w.min() {
            Range::new(r.upper() + 1, w.max())
        } else if r.upper() == w.max() {
            Range::new(w.min(), r.lower() - 1)
        } else {
            Range::full(w)
        }
    }

    /// Shift a concrete branch interval by a constant, keeping sentinel
    /// bounds pinned. Used to push an interval through `x + c` / `x - c`.
    fn shift_region(&self, r: &Range, delta: i128) -> Range {
        let w = self.width;
        let lo = if r.lower() == w.min() {
            w.min()
        } else {
            w.clamp(r.lower() + delta)
        };
        let hi = if r.upper() == w.max() {
            w.max()
        } else {
            w.clamp(r.upper() + delta)
        };
        Range::new(lo, hi)
    }

    /// Record branch intervals for `v`, mirroring them one level through a
    /// defining cast (same intervals) or add/sub with a constant (shifted
    /// intervals).
    fn insert_branch_entries(
        &mut self,
        v: ValueId,
        true_block: &str,
        false_block: &str,
        true_itv: BasicInterval,
        false_itv: BasicInterval,
        defs: &IndexMap<ValueId, &Inst>,
    ) {
        self.branch_maps.insert(
            v,
            ValueBranchMap {
                true_block: true_block.to_string(),
                false_block: false_block.to_string(),
                true_itv: true_itv.clone(),
                false_itv: false_itv.clone(),
            },
        );

        let Some(inst) = defs.get(&v) else { return };
        let values = &self.module.values;

        let derived = match inst {
            Inst::Cast { src, .. } if !values.is_const(*src) => {
                Some((*src, true_itv, false_itv))
            }
            Inst::Binary { op, lhs, rhs, .. } => {
                let (src, delta) = match op {
                    BinOp::Add => {
                        if let Some(c) = values.const_value(*rhs) {
                            (*lhs, -c)
                        } else if let Some(c) = values.const_value(*lhs) {
                            (*rhs, -c)
                        } else {
                            return;
                        }
                    }
                    BinOp::Sub => {
                        if let Some(c) = values.const_value(*rhs) {
                            (*lhs, c)
                        } else {
                            return;
                        }
                    }
                    _ => return,
                };
                if values.is_const(src) {
                    return;
                }
                match (&true_itv, &false_itv) {
                    (BasicInterval::Concrete(t), BasicInterval::Concrete(f)) => Some((
                        src,
                        BasicInterval::concrete(self.shift_region(t, delta)),
                        BasicInterval::concrete(self.shift_region(f, delta)),
                    )),
                    _ => None,
                }
            }
            _ => None,
        };

        if let Some((src, t, f)) = derived {
            self.add_var_node(src);
            self.branch_maps.insert(
                src,
                ValueBranchMap {
                    true_block: true_block.to_string(),
                    false_block: false_block.to_string(),
                    true_itv: t,
                    false_itv: f,
                },
            );
        }
    }

    /// Translate one conditional branch into per-operand branch intervals.
    fn build_value_branch_map(
        &mut self,
        cond: ValueId,
        true_block: &str,
        false_block: &str,
        defs: &IndexMap<ValueId, &Inst>,
    ) {
        let Some(Inst::Icmp { pred, lhs, rhs, .. }) = defs.get(&cond).copied() else {
            return;
        };
        let (pred, lhs, rhs) = (*pred, *lhs, *rhs);

        self.add_var_node(lhs);
        self.add_var_node(rhs);

        if let Some(c) = self.module.values.const_value(rhs) {
            let t = self.icmp_region(pred, c);
            let f = self.invert_region(&t);
            self.insert_branch_entries(
                lhs,
                true_block,
                false_block,
                BasicInterval::concrete(t),
                BasicInterval::concrete(f),
                defs,
            );
        } else {
            let w = self.width;
            self.insert_branch_entries(
                lhs,
                true_block,
                false_block,
                BasicInterval::symbolic(pred, rhs, w),
                BasicInterval::symbolic(pred.inverse(), rhs, w),
                defs,
            );

            let spred = pred.swapped();
            self.insert_branch_entries(
                rhs,
                true_block,
                false_block,
                BasicInterval::symbolic(spred, lhs, w),
                BasicInterval::symbolic(spred.inverse(), lhs, w),
                defs,
            );
        }
    }

    /// Translate a switch into per-successor intervals for its condition:
    /// `[case, case]` per case, the full range for the default.
    fn build_value_switch_map(
        &mut self,
        cond: ValueId,
        default: &str,
        cases: &[(i128, String)],
        defs: &IndexMap<ValueId, &Inst>,
    ) {
        let w = self.width;
        self.add_var_node(cond);

        let mut entries = vec![(BasicInterval::concrete(Range::full(w)), default.to_string())];
        for (value, block) in cases {
            let v = w.clamp(*value);
            entries.push((BasicInterval::concrete(Range::new(v, v)), block.clone()));
        }

        self.switch_maps.insert(cond, ValueSwitchMap { entries: entries.clone() });

        if let Some(Inst::Cast { src, .. }) = defs.get(&cond) {
            if !self.module.values.is_const(*src) {
                self.add_var_node(*src);
                self.switch_maps.insert(*src, ValueSwitchMap { entries });
            }
        }
    }

    fn build_value_maps(&mut self, func: &Function) {
        let mut defs: IndexMap<ValueId, &Inst> = IndexMap::new();
        for (_, inst) in func.insts() {
            if let Some(dst) = inst.dst() {
                defs.insert(dst, inst);
            }
        }

        let branches: Vec<_> = func
            .blocks
            .values()
            .filter_map(|b| b.terminator().cloned())
            .collect();

        for term in branches {
            match term {
                Terminator::CondBr { cond, then_block, else_block } => {
                    self.build_value_branch_map(cond, &then_block, &else_block, &defs);
                }
                Terminator::Switch { cond, default, cases } => {
                    self.build_value_switch_map(cond, &default, &cases, &defs);
                }
                _ => {}
            }
        }
    }

    /// Build nodes and operations from one function's instructions.
    pub fn build_graph(&mut self, func: &Function) {
        log::debug!("building constraint graph for function '{}'", func.name);
        self.build_value_maps(func);

        for block in func.blocks.values() {
            for inst in &block.insts {
                if !Self::is_valid_inst(inst) {
                    continue;
                }
                self.build_operations(&block.label, inst);
            }
        }
    }

    /// Initialize every node: constants to their singleton, inputs (values
    /// without a defining operation) to the full range, everything else to
    /// `Unknown`.
    pub fn build_var_nodes(&mut self) {
        let w = self.width;
        let keys: Vec<ValueId> = self.vars.keys().copied().collect();
        for v in keys {
            let interval = if let Some(c) = self.module.values.const_value(v) {
                Range::constant(w.clamp(c))
            } else if self.def_map.contains_key(&v) {
                Range::unknown(w)
            } else {
                Range::full(w)
            };
            self.vars[&v].interval = interval;
        }
    }

    /// Map each bound variable to the sigma operations whose symbolic
    /// intersect references it.
    pub(crate) fn build_symbolic_intersect_map(&mut self) {
        self.symb_map.clear();
        for (idx, op) in self.oprs.iter().enumerate() {
            if let Some(bound) = op.intersect.bound() {
                self.symb_map
                    .entry(bound)
                    .or_default()
                    .insert(OpId(idx as u32));
            }
        }
    }

    /// Resolve the symbolic intersects bounded by members of `component`.
    pub(crate) fn fix_intersects(&mut self, component: &IndexSet<ValueId>) {
        let w = self.width;
        for &v in component {
            let Some(ops) = self.symb_map.get(&v) else { continue };
            let ops: Vec<OpId> = ops.iter().copied().collect();
            for op_id in ops {
                let sink = self.oprs[op_id.index()].sink;
                let bound_range = self.vars[&v].interval;
                let sink_range = self.vars[&sink].interval;
                if let BasicInterval::Symb { pred, range, .. } =
                    &mut self.oprs[op_id.index()].intersect
                {
                    *range = fix_symbolic(*pred, &bound_range, &sink_range, w);
                }
            }
        }
    }

    /// The subset of the use map restricted to operations whose sink is in
    /// `component`.
    pub(crate) fn build_use_map(
        &self,
        component: &IndexSet<ValueId>,
    ) -> IndexMap<ValueId, IndexSet<OpId>> {
        let mut comp_use: IndexMap<ValueId, IndexSet<OpId>> = IndexMap::new();
        for &v in component {
            let list = comp_use.entry(v).or_default();
            if let Some(ops) = self.use_map.get(&v) {
                for &op in ops {
                    if component.contains(&self.oprs[op.index()].sink) {
                        list.insert(op);
                    }
                }
            }
        }
        comp_use
    }

    /// Promote an inconsistent meet result to the full range.
    fn promote_inconsistent(&self, r: Range) -> Range {
        if r.is_regular() && r.lower() > r.upper() {
            Range::full(self.width)
        } else {
            r
        }
    }

    /// Evaluate one operation against the current intervals of its sources.
    pub fn eval(&self, id: OpId) -> Range {
        let w = self.width;
        let op = &self.oprs[id.index()];

        match &op.kind {
            OpKind::Unary { op: uop, source } => {
                let oprnd = self.vars[source].interval;
                let bw = self.module.values.bits(op.sink);
                let mut result = if oprnd.is_regular() {
                    match uop {
                        UnaryOpcode::Trunc => oprnd.truncate(bw, w),
                        UnaryOpcode::ZExt => oprnd.zext_or_trunc(bw, w),
                        UnaryOpcode::SExt => oprnd.sext_or_trunc(bw, w),
                        UnaryOpcode::Load | UnaryOpcode::Store => oprnd,
                    }
                } else if oprnd.is_empty() {
                    Range::empty(w)
                } else {
                    Range::unknown(w)
                };

                let itv = op.intersect.range();
                if !itv.is_max_range(w) {
                    result = result.intersect_with(&itv, w);
                }
                self.promote_inconsistent(result)
            }

            OpKind::Sigma { source, .. } => {
                let result = self.vars[source]
                    .interval
                    .intersect_with(&op.intersect.range(), w);
                self.promote_inconsistent(result)
            }

            OpKind::Binary { op: bop, lhs, rhs } => {
                let op1 = self.vars[lhs].interval;
                let op2 = self.vars[rhs].interval;

                if op1.is_regular() && op2.is_regular() {
                    let mut result = match bop {
                        BinOp::Add => op1.add(&op2, w),
                        BinOp::Sub => op1.sub(&op2, w),
                        BinOp::Mul => op1.mul(&op2, w),
                        BinOp::UDiv => op1.udiv(&op2, w),
                        BinOp::SDiv => op1.sdiv(&op2, w),
                        BinOp::URem => op1.urem(&op2, w),
                        BinOp::SRem => op1.srem(&op2, w),
                        BinOp::Shl => op1.shl(&op2, w),
                        BinOp::LShr => op1.lshr(&op2, w),
                        BinOp::AShr => op1.ashr(&op2, w),
                        BinOp::And => op1.and(&op2, w),
                        BinOp::Or => op1.or(&op2, w),
                        BinOp::Xor => op1.xor(&op2, w),
                    };
                    result = self.promote_inconsistent(result);

                    let itv = op.intersect.range();
                    if !itv.is_max_range(w) {
                        result = result.intersect_with(&itv, w);
                        result = self.promote_inconsistent(result);
                    }
                    result
                } else if op1.is_empty() || op2.is_empty() {
                    Range::empty(w)
                } else {
                    Range::unknown(w)
                }
            }

            OpKind::Phi { sources } => {
                let mut it = sources.iter();
                let Some(first) = it.next() else {
                    return Range::unknown(w);
                };
                let mut result = self.vars[first].interval;
                for s in it {
                    result = result.union_with(&self.vars[s].interval);
                }
                result
            }

            OpKind::ControlDep { .. } => Range::full(w),
        }
    }

    /// Fill the precision counters from the solved intervals.
    pub fn compute_stats(&mut self) {
        let w = self.width;
        self.stats.num_ops = self.oprs.len();

        for (&v, node) in &self.vars {
            if self.use_map.get(&v).map_or(true, |s| s.is_empty()) {
                self.stats.num_zero_uses += 1;
            }

            if self.module.values.is_const(v) {
                self.stats.num_constants += 1;
                continue;
            }
            self.stats.num_vars += 1;

            let total = self.module.values.bits(v);
            self.stats.used_bits += total as u64;
            let r = node.interval;

            if r.is_unknown() {
                self.stats.num_unknown += 1;
                self.stats.need_bits += total as u64;
                continue;
            }
            if r.is_empty() {
                self.stats.num_empty += 1;
                continue;
            }

            if r.lower() == w.min() {
                if r.upper() == w.max() {
                    self.stats.num_max_range += 1;
                } else {
                    self.stats.num_min_inf_c += 1;
                }
            } else if r.upper() == w.max() {
                self.stats.num_c_plus_inf += 1;
            } else {
                self.stats.num_cc += 1;
            }

            self.stats.need_bits += crate::stats::bits_needed(&r, total) as u64;
        }

        self.stats.percent_reduction = if self.stats.used_bits > 0 {
            100.0 * (1.0 - self.stats.need_bits as f64 / self.stats.used_bits as f64)
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Block, CastOp, Function, Module, ValueKind};

    fn inst_value(m: &mut Module, name: &str, bits: u32) -> ValueId {
        m.values.new_value(
            name,
            bits,
            ValueKind::Inst { func: "f".into(), block: "entry".into() },
        )
    }

    #[test]
    fn var_node_idempotent() {
        let m = Module::new("t");
        let mut g = ConstraintGraph::new(&m, Width::new(32));
        g.add_var_node(ValueId(0));
        g.add_var_node(ValueId(0));
        assert_eq!(g.vars.len(), 1);
        assert!(g.use_map.contains_key(&ValueId(0)));
    }

    #[test]
    fn binary_op_registers_maps() {
        let mut m = Module::new("t");
        let a = inst_value(&mut m, "a", 32);
        let b = inst_value(&mut m, "b", 32);
        let c = inst_value(&mut m, "c", 32);

        let mut g = ConstraintGraph::new(&m, Width::new(32));
        g.add_binary_op(BinOp::Add, c, a, b);

        assert!(g.def_map.contains_key(&c));
        assert_eq!(g.use_map[&a].len(), 1);
        assert_eq!(g.use_map[&b].len(), 1);
    }

    #[test]
    fn inputs_and_constants_initialize() {
        let mut m = Module::new("t");
        let a = inst_value(&mut m, "a", 32);
        let k = m.values.const_int(7, 32);
        let c = inst_value(&mut m, "c", 32);

        let mut g = ConstraintGraph::new(&m, Width::new(32));
        g.add_binary_op(BinOp::Add, c, a, k);
        g.build_var_nodes();

        assert!(g.range_of(a).is_max_range(g.width()));
        assert_eq!(g.range_of(k), Range::new(7, 7));
        assert!(g.range_of(c).is_unknown());
        // Values outside the graph read as Unknown.
        assert!(g.range_of(ValueId(999)).is_unknown());
    }

    #[test]
    fn binary_eval_with_constant() {
        let mut m = Module::new("t");
        let a = inst_value(&mut m, "a", 32);
        let k = m.values.const_int(5, 32);
        let c = inst_value(&mut m, "c", 32);

        let mut g = ConstraintGraph::new(&m, Width::new(32));
        g.add_binary_op(BinOp::Add, c, a, k);
        g.build_var_nodes();
        g.vars[&a].interval = Range::new(1, 2);

        let op = g.def_map[&c];
        assert_eq!(g.eval(op), Range::new(6, 7));
    }

    #[test]
    fn icmp_region_table() {
        let m = Module::new("t");
        let g = ConstraintGraph::new(&m, Width::new(32));
        let w = g.width();

        assert_eq!(g.icmp_region(Predicate::Eq, 7), Range::new(7, 7));
        assert_eq!(g.icmp_region(Predicate::Slt, 100), Range::new(w.min(), 99));
        assert_eq!(g.icmp_region(Predicate::Sle, 100), Range::new(w.min(), 100));
        assert_eq!(g.icmp_region(Predicate::Sgt, 0), Range::new(1, w.max()));
        assert_eq!(g.icmp_region(Predicate::Sge, 0), Range::new(0, w.max()));
        assert_eq!(g.icmp_region(Predicate::Ult, 10), Range::new(0, 9));
        assert_eq!(g.icmp_region(Predicate::Ne, 3), Range::full(w));
    }

    #[test]
    fn invert_region_saturates() {
        let m = Module::new("t");
        let g = ConstraintGraph::new(&m, Width::new(32));
        let w = g.width();

        assert_eq!(
            g.invert_region(&Range::new(w.min(), 99)),
            Range::new(100, w.max())
        );
        assert_eq!(
            g.invert_region(&Range::new(5, w.max())),
            Range::new(w.min(), 4)
        );
        assert_eq!(g.invert_region(&Range::new(7, 7)), Range::full(w));
        assert_eq!(g.invert_region(&Range::full(w)), Range::full(w));
    }

    #[test]
    fn sigma_gets_branch_interval() {
        let mut m = Module::new("t");
        let x = inst_value(&mut m, "x", 32);
        let cond = inst_value(&mut m, "cond", 1);
        let sig = m.values.new_value(
            format!("{}_x.then", SIGMA_MARKER),
            32,
            ValueKind::Inst { func: "f".into(), block: "then".into() },
        );
        let k = m.values.const_int(100, 32);

        let mut f = Function::new("f");
        let mut entry = Block::new("entry");
        entry.push(Inst::Icmp { dst: cond, pred: Predicate::Slt, lhs: x, rhs: k });
        entry.set_term(Terminator::CondBr {
            cond,
            then_block: "then".into(),
            else_block: "exit".into(),
        });
        f.add_block(entry);
        let mut then = Block::new("then");
        then.push(Inst::Phi { dst: sig, incoming: vec![("entry".into(), x)] });
        then.set_term(Terminator::Ret { value: Some(sig) });
        f.add_block(then);
        let mut exit = Block::new("exit");
        exit.set_term(Terminator::Ret { value: None });
        f.add_block(exit);
        m.add_function(f);

        let func = m.get_function("f").unwrap();
        let mut g = ConstraintGraph::new(&m, Width::new(32));
        g.build_graph(func);

        let op = g.def_map[&sig];
        assert!(g.oprs[op.index()].is_sigma());
        assert_eq!(
            g.oprs[op.index()].intersect.range(),
            Range::new(g.width().min(), 99)
        );
    }

    #[test]
    fn cast_feeding_compare_is_mirrored() {
        let mut m = Module::new("t");
        let x = inst_value(&mut m, "x", 16);
        let xw = inst_value(&mut m, "xw", 32);
        let cond = inst_value(&mut m, "cond", 1);
        let k = m.values.const_int(10, 32);

        let mut f = Function::new("f");
        let mut entry = Block::new("entry");
        entry.push(Inst::Cast { dst: xw, op: CastOp::SExt, src: x });
        entry.push(Inst::Icmp { dst: cond, pred: Predicate::Slt, lhs: xw, rhs: k });
        entry.set_term(Terminator::CondBr {
            cond,
            then_block: "a".into(),
            else_block: "b".into(),
        });
        f.add_block(entry);
        let mut a = Block::new("a");
        a.set_term(Terminator::Ret { value: None });
        f.add_block(a);
        let mut b = Block::new("b");
        b.set_term(Terminator::Ret { value: None });
        f.add_block(b);
        m.add_function(f);

        let func = m.get_function("f").unwrap();
        let mut g = ConstraintGraph::new(&m, Width::new(32));
        g.build_graph(func);

        assert!(g.branch_maps.contains_key(&xw));
        assert!(g.branch_maps.contains_key(&x));
    }

    #[test]
    fn add_constant_compare_shifts_interval() {
        let mut m = Module::new("t");
        let a = inst_value(&mut m, "a", 32);
        let b = inst_value(&mut m, "b", 32);
        let cond = inst_value(&mut m, "cond", 1);
        let k5 = m.values.const_int(5, 32);
        let k7 = m.values.const_int(7, 32);

        let mut f = Function::new("f");
        let mut entry = Block::new("entry");
        entry.push(Inst::Binary { dst: b, op: BinOp::Add, lhs: a, rhs: k5 });
        entry.push(Inst::Icmp { dst: cond, pred: Predicate::Eq, lhs: b, rhs: k7 });
        entry.set_term(Terminator::CondBr {
            cond,
            then_block: "t".into(),
            else_block: "e".into(),
        });
        f.add_block(entry);
        let mut t = Block::new("t");
        t.set_term(Terminator::Ret { value: None });
        f.add_block(t);
        let mut e = Block::new("e");
        e.set_term(Terminator::Ret { value: None });
        f.add_block(e);
        m.add_function(f);

        let func = m.get_function("f").unwrap();
        let mut g = ConstraintGraph::new(&m, Width::new(32));
        g.build_graph(func);

        let vbm = &g.branch_maps[&a];
        assert_eq!(vbm.true_itv.range(), Range::new(2, 2));
    }
}
