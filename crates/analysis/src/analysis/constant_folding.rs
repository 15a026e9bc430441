use pureflow_util::typed_id_map::IdMap;

use crate::{
    analysis::constant_propagation::ConstantMap,
    dataflow::DataflowResults,
    ir::{Operand, Procedure, VarId, VarKind, Variable},
    literal::Literal,
};

/// Rewrite variable uses that are known constants into literals, returning how many leaves were
/// replaced.
///
/// Each instruction is rewritten using the facts that hold immediately before it. A standalone
/// use slot (an assigned value, a call argument, a branch condition...) is replaced when it is a
/// primitive variable holding a constant. Both leaves of a binary expression are replaced only
/// when both are constant, and the expression node itself is left in place: evaluating it is
/// the job of whatever consumes its result.
pub fn fold_constant_uses(
    procedure: &mut Procedure,
    constants: &DataflowResults<ConstantMap>,
) -> usize {
    let Procedure {
        variables,
        instructions,
        body,
        ..
    } = procedure;

    let mut folded = 0;
    for &inst_id in body.iter() {
        let (Some(fact), Some(inst)) = (constants.before(inst_id), instructions.get_mut(inst_id))
        else {
            continue;
        };

        for slot in inst.uses_mut() {
            folded += fold_use(slot, fact, variables);
        }
    }
    folded
}

fn fold_use(
    operand: &mut Operand,
    fact: &ConstantMap,
    variables: &IdMap<VarId, Variable>,
) -> usize {
    match *operand {
        Operand::Var(var) => {
            if let Some(lit) = standalone_constant(var, fact, variables) {
                *operand = Operand::Literal(lit.clone());
                1
            } else {
                0
            }
        }
        Operand::Binary {
            ref mut left,
            ref mut right,
            ..
        } => {
            let (Some(l), Some(r)) = (leaf_constant(left, fact), leaf_constant(right, fact)) else {
                return 0;
            };
            let (l, r) = (l.clone(), r.clone());

            let mut folded = 0;
            for (side, lit) in [(left, l), (right, r)] {
                if side.as_var().is_some() {
                    **side = Operand::Literal(lit);
                    folded += 1;
                }
            }
            folded
        }
        Operand::Call { ref mut args, .. } => args
            .iter_mut()
            .map(|arg| match *arg {
                Operand::Var(var) => match standalone_constant(var, fact, variables) {
                    Some(lit) => {
                        *arg = Operand::Literal(lit.clone());
                        1
                    }
                    None => 0,
                },
                _ => 0,
            })
            .sum(),
        Operand::Literal(_) => 0,
    }
}

fn standalone_constant<'a>(
    var: VarId,
    fact: &'a ConstantMap,
    variables: &IdMap<VarId, Variable>,
) -> Option<&'a Literal> {
    let lit = fact.constant(var)?;
    variables
        .get(var)
        .is_some_and(|v| v.kind == VarKind::Primitive && v.kind.accepts(lit))
        .then_some(lit)
}

fn leaf_constant<'a>(operand: &'a Operand, fact: &'a ConstantMap) -> Option<&'a Literal> {
    match operand {
        Operand::Literal(lit) => Some(lit),
        &Operand::Var(var) => fact.constant(var),
        _ => None,
    }
}
