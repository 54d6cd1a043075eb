//! Interprocedural parameter and return-value matching.
//!
//! For every called function, one phi joins the actual arguments of all
//! call sites into each formal parameter, and one phi per call site joins
//! the function's return values into the call's result. The graph then
//! spans the whole module and the ordinary solver handles the rest.

use super::ops::{BasicInterval, OpId, OpKind, Operation};
use super::ConstraintGraph;
use crate::ir::{Function, Inst, Terminator, ValueId};
use crate::range::Range;

/// Connect `func`'s formals and returns to every call site in the module.
/// Variadic functions and declarations are not offered to this matcher by
/// the driver; functions without any call site are left alone.
pub fn match_parameters_and_return_values(graph: &mut ConstraintGraph<'_>, func: &Function) {
    let module = graph.module();

    let mut sites: Vec<(Vec<ValueId>, Option<ValueId>)> = Vec::new();
    for f in module.functions.values() {
        for (_, inst) in f.insts() {
            if let Inst::Call { dst, callee, args } = inst {
                if callee == &func.name {
                    sites.push((args.clone(), *dst));
                }
            }
        }
    }
    if sites.is_empty() {
        return;
    }

    log::debug!(
        "matching {} call site(s) of '{}'",
        sites.len(),
        func.name
    );
    let full = BasicInterval::concrete(Range::full(graph.width()));

    // One phi per formal parameter; sources are filled in per call site.
    let mut matchers: Vec<OpId> = Vec::with_capacity(func.params.len());
    for &formal in &func.params {
        graph.add_var_node(formal);
        let id = graph.push_op(Operation {
            sink: formal,
            kind: OpKind::Phi { sources: Vec::new() },
            intersect: full.clone(),
        });
        graph.def_map.insert(formal, id);
        matchers.push(id);
    }

    // Every value returned by the function.
    let mut returns: Vec<ValueId> = Vec::new();
    if func.ret_bits.is_some() {
        for block in func.blocks.values() {
            if let Some(Terminator::Ret { value: Some(v) }) = block.terminator() {
                graph.add_var_node(*v);
                if !returns.contains(v) {
                    returns.push(*v);
                }
            }
        }
    }

    for (args, dst) in sites {
        for (i, &arg) in args.iter().enumerate() {
            let Some(&matcher) = matchers.get(i) else { break };
            graph.add_var_node(arg);
            if let OpKind::Phi { sources } = &mut graph.oprs[matcher.index()].kind {
                sources.push(arg);
            }
            graph.use_map.entry(arg).or_default().insert(matcher);
        }

        if let Some(dst) = dst {
            if returns.is_empty() {
                continue;
            }
            graph.add_var_node(dst);
            let id = graph.push_op(Operation {
                sink: dst,
                kind: OpKind::Phi { sources: returns.clone() },
                intersect: full.clone(),
            });
            graph.def_map.insert(dst, id);
            for &r in &returns {
                graph.use_map.entry(r).or_default().insert(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Strategy;
    use crate::ir::{BinOp, Block, Module, ValueKind};
    use crate::range::Width;

    /// `fn f(p) { return p + 1 }` called as `f(10)` and `f(20)`.
    fn cross_call_module() -> Module {
        let mut m = Module::new("t");

        let p = m.values.new_value("p", 32, ValueKind::Arg { func: "f".into() });
        let r = m.values.new_value(
            "r",
            32,
            ValueKind::Inst { func: "f".into(), block: "entry".into() },
        );
        let k1 = m.values.const_int(1, 32);
        let k10 = m.values.const_int(10, 32);
        let k20 = m.values.const_int(20, 32);
        let c1 = m.values.new_value(
            "c1",
            32,
            ValueKind::Inst { func: "main".into(), block: "entry".into() },
        );
        let c2 = m.values.new_value(
            "c2",
            32,
            ValueKind::Inst { func: "main".into(), block: "entry".into() },
        );

        let mut f = Function::new("f");
        f.params.push(p);
        f.ret_bits = Some(32);
        let mut entry = Block::new("entry");
        entry.push(Inst::Binary { dst: r, op: BinOp::Add, lhs: p, rhs: k1 });
        entry.set_term(Terminator::Ret { value: Some(r) });
        f.add_block(entry);
        m.add_function(f);

        let mut main = Function::new("main");
        let mut entry = Block::new("entry");
        entry.push(Inst::Call { dst: Some(c1), callee: "f".into(), args: vec![k10] });
        entry.push(Inst::Call { dst: Some(c2), callee: "f".into(), args: vec![k20] });
        entry.set_term(Terminator::Ret { value: None });
        main.add_block(entry);
        m.add_function(main);

        m
    }

    #[test]
    fn parameters_and_returns_are_joined() {
        let m = cross_call_module();
        let width = Width::new(m.max_bit_width());
        let mut g = ConstraintGraph::new(&m, width);
        for f in m.functions.values() {
            g.build_graph(f);
            match_parameters_and_return_values(&mut g, f);
        }
        g.build_var_nodes();
        g.find_intervals(Strategy::Cousot);

        let p = m.lookup("f", "p").unwrap();
        let r = m.lookup("f", "r").unwrap();
        let c1 = m.lookup("main", "c1").unwrap();

        assert_eq!(g.range_of(p), Range::new(10, 20));
        assert_eq!(g.range_of(r), Range::new(11, 21));
        assert_eq!(g.range_of(c1), Range::new(11, 21));
    }

    #[test]
    fn uncalled_function_is_untouched() {
        let mut m = Module::new("t");
        let p = m.values.new_value("p", 32, ValueKind::Arg { func: "g".into() });
        let mut g_func = Function::new("g");
        g_func.params.push(p);
        let mut entry = Block::new("entry");
        entry.set_term(Terminator::Ret { value: None });
        g_func.add_block(entry);
        m.add_function(g_func);

        let mut graph = ConstraintGraph::new(&m, Width::new(32));
        let func = m.get_function("g").unwrap();
        match_parameters_and_return_values(&mut graph, func);
        assert!(graph.oprs.is_empty());
    }
}
