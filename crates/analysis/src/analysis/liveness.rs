use std::collections::HashSet;

use crate::{
    dataflow::{DataflowAnalysis, DataflowResults, Direction, solve},
    graph::cfg::ControlFlowGraph,
    ir::{InstId, Instruction, Procedure, VarId},
};

/// Backward strong liveness.
///
/// A variable is strongly live at a point if some path from there reaches a use of it by an
/// instruction that is itself needed. An instruction is needed when it has no definition, when
/// `effectful` says so, or when the variable it defines is strongly live after it. Uses by
/// instructions that are not needed do not make anything live, so chains of dead definitions
/// are dead all the way back.
pub struct StrongLiveness<F> {
    effectful: F,
}

impl<F> StrongLiveness<F>
where
    F: Fn(InstId, &Instruction) -> bool,
{
    pub fn new(effectful: F) -> Self {
        Self { effectful }
    }
}

impl<F> DataflowAnalysis for StrongLiveness<F>
where
    F: Fn(InstId, &Instruction) -> bool,
{
    type Fact = HashSet<VarId>;

    const DIRECTION: Direction = Direction::Backward;

    fn boundary_fact(&self, _: &Procedure) -> Self::Fact {
        HashSet::new()
    }

    fn initial_fact(&self, _: &Procedure) -> Self::Fact {
        HashSet::new()
    }

    fn meet(&self, into: &mut Self::Fact, other: &Self::Fact) {
        into.extend(other.iter().copied());
    }

    fn transfer(&self, inst_id: InstId, inst: &Instruction, live_out: &Self::Fact) -> Self::Fact {
        let mut live_in = live_out.clone();

        let needed = match inst.def() {
            Some(def) => {
                live_in.remove(&def);
                live_out.contains(&def) || (self.effectful)(inst_id, inst)
            }
            None => true,
        };

        if needed {
            live_in.extend(inst.used_variables());
        }
        live_in
    }
}

/// Strongly live variables before and after every instruction.
pub fn strong_liveness(
    procedure: &Procedure,
    cfg: &ControlFlowGraph,
    effectful: impl Fn(InstId, &Instruction) -> bool,
) -> DataflowResults<HashSet<VarId>> {
    solve(&StrongLiveness::new(effectful), procedure, cfg)
}

#[cfg(test)]
mod tests {
    use crate::{
        ir::{BinOp, Operand, VarKind},
        literal::Literal,
    };

    use super::*;

    #[test]
    fn test_dead_chain_is_not_live() {
        let mut proc = Procedure::new("f");
        let a = proc.add_variable("a", VarKind::Primitive);
        let b = proc.add_variable("b", VarKind::Primitive);
        let c = proc.add_variable("c", VarKind::Primitive);

        let def_a = proc.push(Instruction::Assign {
            dest: a,
            value: Operand::Literal(Literal::Int(1)),
        });
        let def_b = proc.push(Instruction::Assign {
            dest: b,
            value: Operand::binary(BinOp::Add, a, Literal::Int(1)),
        });
        let def_c = proc.push(Instruction::Assign {
            dest: c,
            value: Operand::binary(BinOp::Mul, a, Literal::Int(2)),
        });
        let ret = proc.push(Instruction::Return(Some(Operand::Var(c))));

        let cfg = ControlFlowGraph::compute(&proc).unwrap();
        let live = strong_liveness(&proc, &cfg, |_, _| false);

        // `b` is never used, so its use of `a` does not count.
        assert!(!live.after(def_b).unwrap().contains(&b));
        assert!(live.after(def_a).unwrap().contains(&a));
        assert!(live.after(def_c).unwrap().contains(&c));
        assert!(live.before(ret).unwrap().contains(&c));
        assert!(live.before(def_a).unwrap().is_empty());
    }

    #[test]
    fn test_effectful_definition_keeps_uses_live() {
        let mut proc = Procedure::new("f");
        let x = proc.add_variable("x", VarKind::Primitive);
        let y = proc.add_variable("y", VarKind::Primitive);

        proc.push(Instruction::Assign {
            dest: x,
            value: Operand::Literal(Literal::Int(3)),
        });
        let effect = proc.push(Instruction::Assign {
            dest: y,
            value: Operand::Var(x),
        });
        proc.push(Instruction::Return(None));

        let cfg = ControlFlowGraph::compute(&proc).unwrap();

        let plain = strong_liveness(&proc, &cfg, |_, _| false);
        assert!(!plain.before(effect).unwrap().contains(&x));

        let forced = strong_liveness(&proc, &cfg, |id, _| id == effect);
        assert!(forced.before(effect).unwrap().contains(&x));
        assert!(!forced.after(effect).unwrap().contains(&y));
    }

    #[test]
    fn test_loop_keeps_counter_live() {
        let mut proc = Procedure::new("f");
        let i = proc.add_variable("i", VarKind::Primitive);

        proc.push(Instruction::Assign {
            dest: i,
            value: Operand::Literal(Literal::Int(0)),
        });
        let head = proc.push(Instruction::Assign {
            dest: i,
            value: Operand::binary(BinOp::Add, i, Literal::Int(1)),
        });
        let branch = proc.push(Instruction::Branch {
            cond: Operand::binary(BinOp::LessThan, i, Literal::Int(10)),
            target: head,
        });

        let cfg = ControlFlowGraph::compute(&proc).unwrap();
        let live = strong_liveness(&proc, &cfg, |_, _| false);

        assert!(live.before(branch).unwrap().contains(&i));
        assert!(live.before(head).unwrap().contains(&i));
    }
}
