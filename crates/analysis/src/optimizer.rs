use std::collections::HashMap;

use either::Either;
use rayon::prelude::*;

use crate::{
    analysis::{
        constant_folding::fold_constant_uses,
        constant_propagation::{ConstantMap, analyze},
        dead_code_elim::eliminate_dead_code,
        purity::{PureSet, PurityClassification, classify_purity},
        verify::{ProcedureVerificationError, verify_procedure},
    },
    call_graph::CallGraph,
    dataflow::DataflowResults,
    graph::cfg::ControlFlowGraph,
    interpreter::{EvalSettings, Evaluate, Interpreter},
    ir::{ProcId, Procedure, ProcedureMap},
};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct OptimizeSettings {
    pub eval: EvalSettings,
    /// Cross-check every deletion against strong liveness.
    pub verify_liveness: bool,
    /// Transform every procedure with a body, not just the entry points.
    pub transform_all: bool,
    /// Analyze and transform procedures on the rayon thread pool.
    pub parallel: bool,
}

impl Default for OptimizeSettings {
    fn default() -> Self {
        Self {
            eval: EvalSettings::default(),
            verify_liveness: true,
            transform_all: false,
            parallel: false,
        }
    }
}

impl OptimizeSettings {
    pub fn aggressive() -> Self {
        Self {
            transform_all: true,
            parallel: true,
            ..Self::default()
        }
    }
}

/// A whole program: every procedure, the call graph over them, and the procedures execution
/// may start from.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub procedures: ProcedureMap,
    pub call_graph: CallGraph,
    pub entries: Vec<ProcId>,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TransformStats {
    pub folded_uses: usize,
    pub removed: usize,
    pub retargeted: usize,
    pub kept_by_liveness: usize,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProcedureReport {
    pub procedure: ProcId,
    pub stats: TransformStats,
}

#[derive(Debug, Clone)]
pub struct OptimizeReport {
    pub purity: PurityClassification,
    pub transformed: Vec<ProcedureReport>,
    /// Procedures that failed verification and were left untouched.
    pub skipped: Vec<(ProcId, ProcedureVerificationError)>,
}

/// Rewrite one procedure given the constant facts computed over it.
///
/// Constant uses are folded first, then unobservable instructions are deleted. `constants` must
/// have been computed over `procedure` as it is now, and `cfg` must be its control-flow graph.
pub fn transform(
    procedure: &mut Procedure,
    cfg: &ControlFlowGraph,
    constants: &DataflowResults<ConstantMap>,
    pure: &PureSet,
    call_graph: &CallGraph,
    verify_liveness: bool,
) -> TransformStats {
    let folded_uses = fold_constant_uses(procedure, constants);
    let elim = eliminate_dead_code(
        procedure,
        cfg,
        constants,
        pure,
        call_graph,
        verify_liveness,
    );

    TransformStats {
        folded_uses,
        removed: elim.removed,
        retargeted: elim.retargeted,
        kept_by_liveness: elim.kept_by_liveness,
    }
}

/// Optimize a program, evaluating pure calls with the built-in interpreter.
///
/// The interpreter runs over a copy of the procedures taken before anything is transformed, so
/// evaluation results do not depend on the order procedures are rewritten in.
pub fn optimize_program(program: &mut Program, settings: OptimizeSettings) -> OptimizeReport {
    let Program {
        procedures,
        call_graph,
        entries,
    } = program;

    let snapshot = procedures.clone();
    let interpreter = Interpreter::new(&snapshot, call_graph, settings.eval);
    run(procedures, call_graph, entries, &interpreter, settings)
}

/// Optimize a program, evaluating pure calls with `evaluator`.
pub fn optimize_program_with(
    program: &mut Program,
    evaluator: &dyn Evaluate,
    settings: OptimizeSettings,
) -> OptimizeReport {
    let Program {
        procedures,
        call_graph,
        entries,
    } = program;
    run(procedures, call_graph, entries, evaluator, settings)
}

fn run(
    procedures: &mut ProcedureMap,
    call_graph: &CallGraph,
    entries: &[ProcId],
    evaluator: &dyn Evaluate,
    settings: OptimizeSettings,
) -> OptimizeReport {
    // The purity set must be complete before any procedure is analyzed.
    let purity = classify_purity(procedures, call_graph, entries);
    let pure = purity.pure_set();

    let selected = if settings.transform_all {
        Either::Left(procedures.ids())
    } else {
        Either::Right(entries.iter().copied())
    };

    let mut verified: Vec<(ProcId, ControlFlowGraph)> = Vec::new();
    let mut skipped = Vec::new();
    for proc_id in selected {
        let Some(procedure) = procedures.get(proc_id) else {
            continue;
        };
        if procedure.external || verified.iter().any(|&(p, _)| p == proc_id) {
            continue;
        }

        match prepare(proc_id, procedure, procedures, call_graph) {
            Ok(cfg) => verified.push((proc_id, cfg)),
            Err(err) => {
                log::warn!("skipping `{}`: {err}", procedure.name);
                skipped.push((proc_id, err));
            }
        }
    }

    let mut targets = procedures.iter_mut().collect::<HashMap<_, _>>();
    let work = verified
        .into_iter()
        .filter_map(|(proc_id, cfg)| Some((proc_id, targets.remove(&proc_id)?, cfg)))
        .collect::<Vec<_>>();

    let optimize_one = |(proc_id, procedure, cfg): (ProcId, &mut Procedure, ControlFlowGraph)| {
        log::debug!("optimizing `{}`", procedure.name);
        let constants = analyze(procedure, &cfg, pure, call_graph, evaluator);
        let stats = transform(
            procedure,
            &cfg,
            &constants,
            pure,
            call_graph,
            settings.verify_liveness,
        );
        ProcedureReport {
            procedure: proc_id,
            stats,
        }
    };

    let transformed: Vec<ProcedureReport> = if settings.parallel {
        work.into_par_iter().map(optimize_one).collect()
    } else {
        work.into_iter().map(optimize_one).collect()
    };

    log::info!(
        "transformed {} procedures ({} instructions removed), skipped {}",
        transformed.len(),
        transformed.iter().map(|r| r.stats.removed).sum::<usize>(),
        skipped.len()
    );

    OptimizeReport {
        purity,
        transformed,
        skipped,
    }
}

fn prepare(
    proc_id: ProcId,
    procedure: &Procedure,
    procedures: &ProcedureMap,
    call_graph: &CallGraph,
) -> Result<ControlFlowGraph, ProcedureVerificationError> {
    verify_procedure(proc_id, procedure, procedures, call_graph)?;
    Ok(ControlFlowGraph::compute(procedure)?)
}
