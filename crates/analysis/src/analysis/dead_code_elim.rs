use std::collections::{HashMap, VecDeque};

use pureflow_util::index_containers::IndexSet;

use crate::{
    analysis::{
        constant_propagation::ConstantMap, liveness::strong_liveness, purity::PureSet,
        reaching_defs::reaching_definitions,
    },
    call_graph::CallGraph,
    dataflow::DataflowResults,
    graph::cfg::ControlFlowGraph,
    ir::{InstId, Instruction, Operand, Procedure},
};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct EliminationStats {
    /// Instructions dropped from the procedure.
    pub removed: usize,
    /// Jumps redirected because their target was dropped.
    pub retargeted: usize,
    /// Instructions the closure would have dropped but strong liveness showed to be needed.
    pub kept_by_liveness: usize,
}

/// Delete every instruction whose result is unobservable.
///
/// An instruction is inessential if it is an assignment whose value is either a call that may
/// only reach pure procedures, or a non-call expression that is constant after it or cannot trap.
/// Everything else is essential. Starting from the essential instructions, the definitions
/// reaching each of their variable uses are pulled in breadth-first until closure, and every
/// instruction outside the closure is removed.
///
/// `constants` must be the facts computed before any use was folded, `cfg` the control-flow
/// graph of `procedure` (which folding does not change). With `verify_liveness`, the deletions
/// are cross-checked against strong liveness and any deleted definition found to be live is kept.
pub fn eliminate_dead_code(
    procedure: &mut Procedure,
    cfg: &ControlFlowGraph,
    constants: &DataflowResults<ConstantMap>,
    pure: &PureSet,
    call_graph: &CallGraph,
    verify_liveness: bool,
) -> EliminationStats {
    let mut stats = EliminationStats::default();

    let mut essential = IndexSet::new();
    for &inst_id in &procedure.body {
        let inst = &procedure.instructions[inst_id];
        if !is_inessential(inst_id, inst, constants, pure, call_graph) {
            essential.insert(inst_id.index() as usize);
        }
    }

    let reaching = reaching_definitions(procedure, cfg);

    let mut live = IndexSet::new();
    let mut queue = VecDeque::new();
    for &inst_id in &procedure.body {
        if essential.contains(inst_id.index() as usize) {
            live.insert(inst_id.index() as usize);
            queue.push_back(inst_id);
        }
    }

    // Pull in every definition that may reach a use by a live instruction.
    let close = |live: &mut IndexSet, queue: &mut VecDeque<InstId>| {
        while let Some(inst_id) = queue.pop_front() {
            let Some(defs) = reaching.before(inst_id) else {
                continue;
            };
            for var in procedure.instructions[inst_id].used_variables() {
                for def in defs.defs_of(var) {
                    if live.insert(def.index() as usize) {
                        queue.push_back(def);
                    }
                }
            }
        }
    };
    close(&mut live, &mut queue);

    if verify_liveness {
        let liveness = strong_liveness(procedure, cfg, |inst_id, _| {
            essential.contains(inst_id.index() as usize)
        });

        for &inst_id in &procedure.body {
            if live.contains(inst_id.index() as usize) {
                continue;
            }
            let Some(def) = procedure.instructions[inst_id].def() else {
                continue;
            };
            if liveness.after(inst_id).is_some_and(|l| l.contains(&def)) {
                log::warn!(
                    "definition {inst_id} in `{}` is strongly live but was not reached, keeping it",
                    procedure.name
                );
                live.insert(inst_id.index() as usize);
                queue.push_back(inst_id);
                stats.kept_by_liveness += 1;
            }
        }
        close(&mut live, &mut queue);
    }

    let is_live = |inst_id: InstId| live.contains(inst_id.index() as usize);

    // A dropped jump target with nothing live after it has nowhere to be redirected to, so it
    // stays behind as a `NoOp`.
    let mut stranded = Vec::new();
    let mut next_live = vec![None; procedure.body.len()];
    let mut next = None;
    for (pos, &inst_id) in procedure.body.iter().enumerate().rev() {
        if is_live(inst_id) {
            next = Some(inst_id);
        }
        next_live[pos] = next;
    }

    let positions = procedure
        .body
        .iter()
        .enumerate()
        .map(|(pos, &inst_id)| (inst_id, pos))
        .collect::<HashMap<_, _>>();

    let mut retargets = Vec::new();
    for &inst_id in &procedure.body {
        if !is_live(inst_id) {
            continue;
        }
        let Some(target) = procedure.instructions[inst_id].jump_target() else {
            continue;
        };
        if is_live(target) {
            continue;
        }
        match next_live[positions[&target]] {
            Some(new_target) => retargets.push((inst_id, new_target)),
            None => stranded.push(target),
        }
    }

    for (inst_id, new_target) in retargets {
        if let Some(target) = procedure.instructions[inst_id].jump_target_mut() {
            *target = new_target;
            stats.retargeted += 1;
        }
    }

    for &target in &stranded {
        live.insert(target.index() as usize);
        procedure.instructions[target] = Instruction::NoOp;
    }

    let Procedure {
        body, instructions, ..
    } = procedure;
    body.retain(|&inst_id| {
        if live.contains(inst_id.index() as usize) {
            true
        } else {
            instructions.remove(inst_id);
            stats.removed += 1;
            false
        }
    });

    log::debug!(
        "removed {} instructions from `{}` ({} jumps retargeted)",
        stats.removed,
        procedure.name,
        stats.retargeted
    );

    stats
}

fn is_inessential(
    inst_id: InstId,
    inst: &Instruction,
    constants: &DataflowResults<ConstantMap>,
    pure: &PureSet,
    call_graph: &CallGraph,
) -> bool {
    let Instruction::Assign { dest, value } = inst else {
        return false;
    };

    match *value {
        Operand::Call { site, .. } => pure.covers(call_graph.targets(site)),
        ref value => {
            constants
                .after(inst_id)
                .is_some_and(|fact| fact.get(*dest).is_constant())
                || !can_trap(value)
        }
    }
}

/// Whether evaluating an expression may fail at runtime or run arbitrary code.
fn can_trap(operand: &Operand) -> bool {
    operand.subterms().any(|term| match *term {
        Operand::Binary { op, .. } => op.can_trap(),
        Operand::Call { .. } => true,
        Operand::Literal(_) | Operand::Var(_) => false,
    })
}
