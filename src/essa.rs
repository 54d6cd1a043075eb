//! e-SSA construction.
//!
//! Inserts sigma definitions for branch-constrained variables: after a
//! conditional branch on an integer comparison, each successor that has the
//! branch as its only predecessor receives a fresh one-operand phi (named
//! with [`SIGMA_MARKER`]) per refinable compared value, and every use
//! dominated by that successor is renamed to it. Switch conditions get one
//! sigma per single-predecessor case successor, the default included.
//!
//! A refinable value is a non-constant compared operand, plus, one level
//! deep, the variable source of an operand defined by a cast or by an
//! add/sub with a constant; the graph builder mirrors branch intervals
//! through the same one-level window.

use crate::ir::{BinOp, Function, Inst, Module, Terminator, ValueId, ValueKind, ValueTable};
use indexmap::{IndexMap, IndexSet};

/// Name prefix identifying sigma nodes. The constraint graph classifies
/// phis by this marker.
pub const SIGMA_MARKER: &str = "essa_sigma";

/// Run e-SSA construction on every function of the module.
pub fn transform_module(module: &mut Module) {
    let Module { functions, values, .. } = module;
    for func in functions.values_mut() {
        transform_function(values, func);
    }
}

/// Run e-SSA construction on one function.
pub fn transform_function(values: &mut ValueTable, func: &mut Function) {
    if func.is_declaration() {
        return;
    }
    func.rebuild_cfg();
    let doms = dominator_sets(func);

    let labels = func.block_labels();
    for label in labels {
        // Re-read the terminator each time: earlier sites may have renamed
        // the operands this one compares.
        let Some(term) = func.blocks.get(&label).and_then(|b| b.terminator().cloned()) else {
            continue;
        };

        let (targets, succs): (Vec<ValueId>, Vec<String>) = match term {
            Terminator::CondBr { cond, then_block, else_block } => {
                let Some(Inst::Icmp { lhs, rhs, .. }) = func.def_inst(cond) else {
                    continue;
                };
                let (lhs, rhs) = (*lhs, *rhs);
                if then_block == else_block {
                    continue;
                }
                let mut targets = IndexSet::new();
                collect_refinable(values, func, lhs, &mut targets);
                collect_refinable(values, func, rhs, &mut targets);
                (targets.into_iter().collect(), vec![then_block, else_block])
            }
            Terminator::Switch { cond, default, cases } => {
                let mut targets = IndexSet::new();
                collect_refinable(values, func, cond, &mut targets);
                let mut succs: IndexSet<String> = IndexSet::new();
                succs.insert(default);
                for (_, block) in cases {
                    succs.insert(block);
                }
                (targets.into_iter().collect(), succs.into_iter().collect())
            }
            _ => continue,
        };

        if targets.is_empty() {
            continue;
        }

        for succ in succs {
            let single_pred = func
                .blocks
                .get(&succ)
                .map(|b| b.preds.len() == 1)
                .unwrap_or(false);
            if !single_pred {
                continue;
            }

            for &v in &targets {
                if !has_dominated_use(func, &doms, &succ, v) {
                    continue;
                }

                let sid = new_sigma_value(values, func, v, &succ);
                rename_dominated_uses(func, &doms, &succ, v, sid);
                if let Some(block) = func.blocks.get_mut(&succ) {
                    block.insert(0, Inst::Phi { dst: sid, incoming: vec![(label.clone(), v)] });
                }
            }
        }
    }
}

/// The values a comparison operand lets a branch refine.
fn collect_refinable(
    values: &ValueTable,
    func: &Function,
    v: ValueId,
    out: &mut IndexSet<ValueId>,
) {
    if values.is_const(v) {
        return;
    }
    out.insert(v);

    let Some(inst) = func.def_inst(v) else { return };
    match inst {
        Inst::Cast { src, .. } if !values.is_const(*src) => {
            out.insert(*src);
        }
        Inst::Binary { op: BinOp::Add, lhs, rhs, .. } => {
            if values.is_const(*rhs) && !values.is_const(*lhs) {
                out.insert(*lhs);
            } else if values.is_const(*lhs) && !values.is_const(*rhs) {
                out.insert(*rhs);
            }
        }
        Inst::Binary { op: BinOp::Sub, lhs, rhs, .. } => {
            if values.is_const(*rhs) && !values.is_const(*lhs) {
                out.insert(*lhs);
            }
        }
        _ => {}
    }
}

/// Create the sigma value, deriving a unique name from the original.
fn new_sigma_value(
    values: &mut ValueTable,
    func: &Function,
    v: ValueId,
    succ: &str,
) -> ValueId {
    let marker_prefix = format!("{}_", SIGMA_MARKER);
    let base = values.name(v).to_string();
    let base = base.strip_prefix(&marker_prefix).unwrap_or(&base).to_string();

    let mut name = format!("{}_{}.{}", SIGMA_MARKER, base, succ);
    let mut n = 1;
    while values.find(&func.name, &name).is_some() {
        name = format!("{}_{}.{}.{}", SIGMA_MARKER, base, succ, n);
        n += 1;
    }

    values.new_value(
        name,
        values.bits(v),
        ValueKind::Inst { func: func.name.clone(), block: succ.to_string() },
    )
}

/// Is `v` used anywhere the successor dominates? Phi uses count at their
/// incoming edge, not at the phi's block.
fn has_dominated_use(
    func: &Function,
    doms: &IndexMap<String, IndexSet<String>>,
    succ: &str,
    v: ValueId,
) -> bool {
    for block in func.blocks.values() {
        let dominated = doms[&block.label].contains(succ);

        for inst in &block.insts {
            match inst {
                Inst::Phi { incoming, .. } => {
                    if incoming.iter().any(|(p, val)| {
                        *val == v && doms.get(p).is_some_and(|d| d.contains(succ))
                    }) {
                        return true;
                    }
                }
                _ if dominated => {
                    if inst.uses().contains(&v) {
                        return true;
                    }
                }
                _ => {}
            }
        }

        if dominated {
            if let Some(term) = block.terminator() {
                if term.uses().contains(&v) {
                    return true;
                }
            }
        }
    }
    false
}

/// Rewrite dominated uses of `v` to the sigma value. Runs before the sigma
/// instruction itself is inserted, so the sigma's own operand is untouched.
fn rename_dominated_uses(
    func: &mut Function,
    doms: &IndexMap<String, IndexSet<String>>,
    succ: &str,
    v: ValueId,
    sid: ValueId,
) {
    let labels = func.block_labels();
    for label in labels {
        let dominated = doms[&label].contains(succ);
        let Some(block) = func.blocks.get_mut(&label) else { continue };

        for inst in block.insts.iter_mut() {
            match inst {
                Inst::Phi { .. } => inst.replace_uses(v, sid, |p| {
                    doms.get(p).is_some_and(|d| d.contains(succ))
                }),
                _ if dominated => inst.replace_uses(v, sid, |_| true),
                _ => {}
            }
        }

        if dominated {
            if let Some(term) = block.term.as_mut() {
                term.replace_uses(v, sid);
            }
        }
    }
}

/// Dominator sets by forward dataflow: `dom(b) = {b} ∪ ⋂ dom(preds)`.
fn dominator_sets(func: &Function) -> IndexMap<String, IndexSet<String>> {
    let labels = func.block_labels();
    let all: IndexSet<String> = labels.iter().cloned().collect();

    let mut doms: IndexMap<String, IndexSet<String>> =
        labels.iter().map(|l| (l.clone(), all.clone())).collect();
    let mut entry_only = IndexSet::new();
    entry_only.insert(func.entry.clone());
    doms.insert(func.entry.clone(), entry_only);

    loop {
        let mut changed = false;
        for label in &labels {
            if *label == func.entry {
                continue;
            }
            let preds = &func.blocks[label].preds;
            if preds.is_empty() {
                continue;
            }

            let mut new: IndexSet<String> = doms[&preds[0]].clone();
            for p in &preds[1..] {
                new = new.intersection(&doms[p]).cloned().collect();
            }
            new.insert(label.clone());

            if new != doms[label] {
                doms.insert(label.clone(), new);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    doms
}
