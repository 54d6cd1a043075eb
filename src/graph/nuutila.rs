//! Nuutila's strongly-connected-components algorithm.
//!
//! Before the DFS, a transient control-dependence pseudo-edge is installed
//! from every symbolic bound to the sigma it constrains, which forces the
//! bound into an earlier (or the same) component; the edges are removed as
//! soon as the components are known.

use super::ops::{BasicInterval, OpId, OpKind, Operation};
use super::ConstraintGraph;
use crate::ir::ValueId;
use crate::range::Range;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;

/// Topologically ordered SCCs of the constraint graph.
pub struct Nuutila {
    /// Component roots; front-to-back processing visits predecessors
    /// before successors.
    pub worklist: Vec<ValueId>,
    /// Members of each component, keyed by root.
    pub components: IndexMap<ValueId, IndexSet<ValueId>>,
}

struct DfsState {
    index: i64,
    dfs: HashMap<ValueId, i64>,
    root: HashMap<ValueId, ValueId>,
    in_component: IndexSet<ValueId>,
    stack: Vec<ValueId>,
    worklist: Vec<ValueId>,
    components: IndexMap<ValueId, IndexSet<ValueId>>,
}

impl Nuutila {
    /// Compute the SCCs of `graph`.
    pub fn new(graph: &mut ConstraintGraph<'_>) -> Self {
        let first_transient = graph.oprs.len();
        Self::add_control_dependence_edges(graph);

        let mut state = DfsState {
            index: 0,
            dfs: graph.vars.keys().map(|&v| (v, -1)).collect(),
            root: HashMap::new(),
            in_component: IndexSet::new(),
            stack: Vec::new(),
            worklist: Vec::new(),
            components: IndexMap::new(),
        };

        let keys: Vec<ValueId> = graph.vars.keys().copied().collect();
        for v in keys {
            if state.dfs[&v] < 0 {
                Self::visit(graph, &mut state, v);
            }
        }

        Self::del_control_dependence_edges(graph, first_transient);

        // Roots close in successor-first order; reverse for the solver.
        state.worklist.reverse();

        Self { worklist: state.worklist, components: state.components }
    }

    fn visit(graph: &ConstraintGraph<'_>, st: &mut DfsState, v: ValueId) {
        st.dfs.insert(v, st.index);
        st.index += 1;
        st.root.insert(v, v);

        let ops: Vec<OpId> = graph
            .use_map
            .get(&v)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();

        for op in ops {
            let name = graph.oprs[op.index()].sink;

            if st.dfs[&name] < 0 {
                Self::visit(graph, st, name);
            }

            if !st.in_component.contains(&name) && st.dfs[&st.root[&v]] >= st.dfs[&st.root[&name]]
            {
                let r = st.root[&name];
                st.root.insert(v, r);
            }
        }

        if st.root[&v] == v {
            st.worklist.push(v);

            let mut scc = IndexSet::new();
            scc.insert(v);
            st.in_component.insert(v);

            while let Some(&top) = st.stack.last() {
                if st.dfs[&top] > st.dfs[&v] {
                    st.stack.pop();
                    st.in_component.insert(top);
                    scc.insert(top);
                } else {
                    break;
                }
            }

            st.components.insert(v, scc);
        } else {
            st.stack.push(v);
        }
    }

    /// Install a `ControlDep(sigma sink <- bound)` pseudo-edge for every
    /// symbolic intersect.
    fn add_control_dependence_edges(graph: &mut ConstraintGraph<'_>) {
        let pairs: Vec<(ValueId, ValueId)> = {
            let oprs = &graph.oprs;
            graph
                .symb_map
                .iter()
                .flat_map(|(&bound, ops)| {
                    ops.iter().map(move |&op| (bound, oprs[op.index()].sink))
                })
                .collect()
        };

        for (bound, sink) in pairs {
            let id = OpId(graph.oprs.len() as u32);
            graph.oprs.push(Operation {
                sink,
                kind: OpKind::ControlDep { source: bound },
                intersect: BasicInterval::concrete(Range::full(graph.width)),
            });
            graph.use_map.entry(bound).or_default().insert(id);
        }
    }

    /// Remove the pseudo-edges, remembering them for the dot dump.
    fn del_control_dependence_edges(graph: &mut ConstraintGraph<'_>, first_transient: usize) {
        for (_, ops) in graph.use_map.iter_mut() {
            ops.retain(|op| op.index() < first_transient);
        }

        for op in &graph.oprs[first_transient..] {
            if let OpKind::ControlDep { source } = op.kind {
                graph.pseudo_edges.push((source, op.sink));
            }
        }

        graph.oprs.truncate(first_transient);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Module, ValueKind};
    use crate::range::Width;

    fn value(m: &mut Module, name: &str) -> ValueId {
        m.values.new_value(
            name,
            32,
            ValueKind::Inst { func: "f".into(), block: "b".into() },
        )
    }

    #[test]
    fn chain_is_processed_sources_first() {
        let mut m = Module::new("t");
        let a = value(&mut m, "a");
        let b = value(&mut m, "b");
        let c = value(&mut m, "c");
        let one = m.values.const_int(1, 32);

        let mut g = ConstraintGraph::new(&m, Width::new(32));
        g.add_binary_op(BinOp::Add, b, a, one);
        g.add_binary_op(BinOp::Add, c, b, one);

        let sccs = Nuutila::new(&mut g);
        let pos = |v: ValueId| {
            sccs.worklist
                .iter()
                .position(|&r| sccs.components[&r].contains(&v))
                .unwrap()
        };
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
        // Every component here is a singleton.
        assert!(sccs.components.values().all(|c| c.len() == 1));
    }

    #[test]
    fn cycle_is_one_component() {
        let mut m = Module::new("t");
        let x = value(&mut m, "x");
        let y = value(&mut m, "y");
        let one = m.values.const_int(1, 32);

        let mut g = ConstraintGraph::new(&m, Width::new(32));
        // x = y + 1; y = x + 1: a two-node cycle.
        g.add_binary_op(BinOp::Add, x, y, one);
        g.add_binary_op(BinOp::Add, y, x, one);

        let sccs = Nuutila::new(&mut g);
        let root = sccs
            .worklist
            .iter()
            .find(|&&r| sccs.components[&r].contains(&x))
            .unwrap();
        let comp = &sccs.components[root];
        assert!(comp.contains(&x) && comp.contains(&y));
    }

    #[test]
    fn pseudo_edges_are_removed_after_discovery() {
        let mut m = Module::new("t");
        let x = value(&mut m, "x");
        let sig = value(&mut m, "essa_sigma_x.t");
        let bound = value(&mut m, "n");

        let mut g = ConstraintGraph::new(&m, Width::new(32));
        g.add_var_node(bound);
        g.add_var_node(x);
        g.add_var_node(sig);
        let id = g.push_op(Operation {
            sink: sig,
            kind: OpKind::Sigma { source: x, unresolved: false },
            intersect: BasicInterval::symbolic(crate::ir::Predicate::Slt, bound, g.width()),
        });
        g.def_map.insert(sig, id);
        g.use_map.entry(x).or_default().insert(id);
        g.build_symbolic_intersect_map();

        let before = g.oprs.len();
        let sccs = Nuutila::new(&mut g);
        assert_eq!(g.oprs.len(), before);
        assert!(g.use_map[&bound].is_empty());
        assert_eq!(g.pseudo_edges, vec![(bound, sig)]);

        // The bound's component precedes the sigma's.
        let pos = |v: ValueId| {
            sccs.worklist
                .iter()
                .position(|&r| sccs.components[&r].contains(&v))
                .unwrap()
        };
        assert!(pos(bound) < pos(sig));
    }
}
