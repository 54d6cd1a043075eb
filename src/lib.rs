//! Range analysis for integer variables over an e-SSA IR.
//!
//! For every integer-typed value the engine computes a conservative signed
//! interval `[lo, hi]` such that every runtime value lies within it. The
//! output feeds bitwidth reduction, instrumentation and dead-branch
//! elimination.
//!
//! # Architecture
//!
//! ```text
//! Textual IR (.ir)
//!       │
//!       ▼ (parser)
//! ┌──────────────┐
//! │   Module     │
//! └──────┬───────┘
//!        │ (essa: sigma insertion)
//!        ▼
//! ┌──────────────┐
//! │  e-SSA IR    │  ← branch-constrained variables get fresh names
//! └──────┬───────┘
//!        │ (graph: build)
//!        ▼
//! ┌──────────────┐
//! │ Constraint   │  ← branch intervals, symbolic sigma intersects
//! │   graph      │
//! └──────┬───────┘
//!        │ (Nuutila + widen/narrow or growth/crop)
//!        ▼
//!   Interval per value
//! ```
//!
//! # Example
//!
//! ```
//! use range_analysis::{analyze_function, essa, parser, Strategy};
//!
//! let mut module = parser::parse(
//!     "func @f(%n: i32) -> i32 {\n\
//!      entry:\n  %c = icmp sgt i32 %n, 0\n  cbr %c, pos, done\n\
//!      pos:\n  ret i32 %n\n\
//!      done:\n  ret i32 0\n}\n",
//! )
//! .unwrap();
//! essa::transform_module(&mut module);
//!
//! let graph = analyze_function(&module, "f", Strategy::Cousot).unwrap();
//! let sigma = module.lookup("f", "essa_sigma_n.pos").unwrap();
//! assert_eq!(graph.range_of(sigma).lower(), 1);
//! ```

pub mod essa;
pub mod graph;
pub mod ir;
pub mod parser;
pub mod range;
pub mod stats;

pub use graph::{match_parameters_and_return_values, ConstraintGraph, Strategy};
pub use ir::Module;
pub use range::{Range, RangeKind, Width};

use anyhow::{bail, Result};
use stats::Timer;

/// Intraprocedural analysis of one function. The analysis width is the
/// maximum integer width of the function's instructions.
pub fn analyze_function<'m>(
    module: &'m Module,
    name: &str,
    strategy: Strategy,
) -> Result<ConstraintGraph<'m>> {
    let Some(func) = module.get_function(name) else {
        bail!("unknown function '{}'", name);
    };
    if func.is_declaration() {
        bail!("function '{}' has no body", name);
    }

    let width = Width::new(func.max_bit_width(&module.values));
    let mut graph = ConstraintGraph::new(module, width);

    let timer = Timer::start();
    graph.build_graph(func);
    graph.build_var_nodes();
    graph.profile.update_time("BuildGraph", timer.stop());

    graph.find_intervals(strategy);

    let timer = Timer::start();
    graph.compute_stats();
    graph.profile.update_time("ComputeStats", timer.stop());

    Ok(graph)
}

/// Interprocedural analysis of a whole module: one graph spans every
/// defined, non-variadic function, with actual/formal parameters and
/// return values matched across call sites.
pub fn analyze_module<'m>(module: &'m Module, strategy: Strategy) -> ConstraintGraph<'m> {
    let width = Width::new(module.max_bit_width());
    let mut graph = ConstraintGraph::new(module, width);

    let timer = Timer::start();
    for func in module.functions.values() {
        if func.is_declaration() || func.variadic {
            continue;
        }
        graph.build_graph(func);
        match_parameters_and_return_values(&mut graph, func);
    }
    graph.build_var_nodes();
    graph.profile.update_time("BuildGraph", timer.stop());

    graph.find_intervals(strategy);

    let timer = Timer::start();
    graph.compute_stats();
    graph.profile.update_time("ComputeStats", timer.stop());

    graph
}
