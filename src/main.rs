//! Range analysis CLI.
//!
//! Parses a textual IR file, runs e-SSA construction, then the selected
//! range analysis, and prints the interval of every variable.
//!
//! # Usage
//!
//! ```bash
//! # Intraprocedural Cousot analysis of every function
//! range-analysis program.ir
//!
//! # Interprocedural crop analysis with statistics
//! range-analysis program.ir --analysis inter-crop --stats
//!
//! # Dump the constraint graph of one function
//! range-analysis program.ir --function main --dot graph.dot
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use range_analysis::{analyze_function, analyze_module, essa, parser, ConstraintGraph, Strategy};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Analysis {
    /// Intraprocedural, widening/narrowing
    IntraCousot,
    /// Intraprocedural, growth/crop
    IntraCrop,
    /// Interprocedural, widening/narrowing
    InterCousot,
    /// Interprocedural, growth/crop
    InterCrop,
}

impl Analysis {
    fn strategy(self) -> Strategy {
        match self {
            Analysis::IntraCousot | Analysis::InterCousot => Strategy::Cousot,
            Analysis::IntraCrop | Analysis::InterCrop => Strategy::CropDfs,
        }
    }

    fn interprocedural(self) -> bool {
        matches!(self, Analysis::InterCousot | Analysis::InterCrop)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "range-analysis",
    version,
    about = "Interval range analysis for integer variables over an e-SSA IR"
)]
struct Args {
    /// Input IR file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Which analysis to run
    #[arg(long, value_enum, default_value = "intra-cousot")]
    analysis: Analysis,

    /// Restrict an intraprocedural run to one function
    #[arg(long, value_name = "NAME")]
    function: Option<String>,

    /// Write the constraint graph in dot format
    #[arg(long, value_name = "PATH")]
    dot: Option<PathBuf>,

    /// Print statistics and phase timings
    #[arg(long)]
    stats: bool,

    /// Print the ranges as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let mut module = parser::parse(&source)
        .with_context(|| format!("Failed to parse {}", args.input.display()))?;

    essa::transform_module(&mut module);

    let strategy = args.analysis.strategy();

    if args.analysis.interprocedural() {
        let graph = analyze_module(&module, strategy);
        report(&args, "module", &graph)?;
    } else {
        let names: Vec<String> = match &args.function {
            Some(name) => vec![name.clone()],
            None => module
                .functions
                .values()
                .filter(|f| !f.is_declaration())
                .map(|f| f.name.clone())
                .collect(),
        };

        if args.dot.is_some() && names.len() > 1 {
            anyhow::bail!("--dot with an intraprocedural analysis needs --function");
        }

        for name in names {
            let graph = analyze_function(&module, &name, strategy)?;
            report(&args, &name, &graph)?;
        }
    }

    Ok(())
}

fn report(args: &Args, title: &str, graph: &ConstraintGraph<'_>) -> Result<()> {
    let module = graph.module();
    let w = graph.width();

    if args.json {
        let ranges: BTreeMap<String, serde_json::Value> = graph
            .intervals()
            .filter(|(v, _)| !module.values.is_const(*v))
            .map(|(v, r)| {
                let value = serde_json::to_value(r).unwrap_or(serde_json::Value::Null);
                (module.values.label(v), value)
            })
            .collect();
        let out = serde_json::json!({
            "analysis": title,
            "width": w.bits(),
            "ranges": ranges,
            "stats": graph.stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}:", title);
        for (v, r) in graph.intervals() {
            if module.values.is_const(v) {
                continue;
            }
            println!("  {:<32} {}", module.values.label(v), r.display(w));
        }
    }

    if let Some(path) = &args.dot {
        std::fs::write(path, graph.to_dot(title))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if args.stats {
        graph.stats.display();
        graph.profile.display();
    }

    Ok(())
}
