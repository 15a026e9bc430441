use std::collections::HashSet;

use thiserror::Error;

use crate::{
    call_graph::CallGraph,
    graph::cfg::{CfgError, ControlFlowGraph},
    ir::{CallSiteId, InstId, ProcId, Procedure, ProcedureMap, VarId},
};

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ProcedureVerificationError {
    #[error("instruction {0} in the body does not exist")]
    MissingInstruction(InstId),
    #[error("instruction {0} appears more than once in the body")]
    InstructionReused(InstId),
    #[error("instruction {inst} references unknown variable {var}")]
    UnknownVariable { inst: InstId, var: VarId },
    #[error("parameter {0} is not a declared variable")]
    UnknownParameter(VarId),
    #[error("instruction {inst} references unknown call site {site}")]
    UnknownCallSite { inst: InstId, site: CallSiteId },
    #[error("instruction {inst} uses call site {site} which belongs to another procedure")]
    ForeignCallSite { inst: InstId, site: CallSiteId },
    #[error("call site {site} targets unknown procedure {target}")]
    UnknownCallee { site: CallSiteId, target: ProcId },
    #[error(transparent)]
    Cfg(#[from] CfgError),
}

/// Check that every reference made by a procedure body resolves, and that its control flow is
/// well-formed.
///
/// External procedures have nothing to check beyond their parameters.
pub fn verify_procedure(
    proc_id: ProcId,
    procedure: &Procedure,
    procedures: &ProcedureMap,
    call_graph: &CallGraph,
) -> Result<(), ProcedureVerificationError> {
    for &param in &procedure.parameters {
        if !procedure.variables.contains(param) {
            return Err(ProcedureVerificationError::UnknownParameter(param));
        }
    }

    let mut seen = HashSet::new();
    for &inst_id in &procedure.body {
        let inst = procedure
            .instructions
            .get(inst_id)
            .ok_or(ProcedureVerificationError::MissingInstruction(inst_id))?;

        if !seen.insert(inst_id) {
            return Err(ProcedureVerificationError::InstructionReused(inst_id));
        }

        for var in inst.def().into_iter().chain(inst.used_variables()) {
            if !procedure.variables.contains(var) {
                return Err(ProcedureVerificationError::UnknownVariable {
                    inst: inst_id,
                    var,
                });
            }
        }

        for site in inst.call_sites() {
            let call_site = call_graph
                .get(site)
                .ok_or(ProcedureVerificationError::UnknownCallSite {
                    inst: inst_id,
                    site,
                })?;

            if call_site.caller != proc_id {
                return Err(ProcedureVerificationError::ForeignCallSite {
                    inst: inst_id,
                    site,
                });
            }

            for &target in call_site.targets() {
                if !procedures.contains(target) {
                    return Err(ProcedureVerificationError::UnknownCallee { site, target });
                }
            }
        }
    }

    if !procedure.external {
        ControlFlowGraph::compute(procedure)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        ir::{Instruction, Operand, VarKind},
        literal::Literal,
    };

    use super::*;

    #[test]
    fn test_verify_references() {
        let mut procedures = ProcedureMap::new();
        let mut call_graph = CallGraph::new();

        let other = procedures.insert(Procedure::new("other"));
        let main = procedures.insert(Procedure::new("main"));
        let foreign = call_graph.add_site(other, [other]);
        let own = call_graph.add_site(main, [main]);

        let mut proc = Procedure::new("main");
        let x = proc.add_variable("x", VarKind::Primitive);
        proc.push(Instruction::Assign {
            dest: x,
            value: Operand::call(own, [Operand::Literal(Literal::Int(1))]),
        });
        assert_eq!(
            verify_procedure(main, &proc, &procedures, &call_graph),
            Ok(())
        );

        let mut bad = proc.clone();
        let call = bad.push(Instruction::Call {
            site: foreign,
            args: Vec::new(),
        });
        assert_eq!(
            verify_procedure(main, &bad, &procedures, &call_graph),
            Err(ProcedureVerificationError::ForeignCallSite {
                inst: call,
                site: foreign,
            })
        );

        let mut bad = proc.clone();
        let first = bad.body[0];
        bad.body.push(first);
        assert_eq!(
            verify_procedure(main, &bad, &procedures, &call_graph),
            Err(ProcedureVerificationError::InstructionReused(first))
        );

        let mut bad = proc.clone();
        bad.variables.remove(x);
        assert!(matches!(
            verify_procedure(main, &bad, &procedures, &call_graph),
            Err(ProcedureVerificationError::UnknownVariable { var, .. }) if var == x
        ));
    }

    #[test]
    fn test_dangling_jump_is_reported() {
        let mut procedures = ProcedureMap::new();
        let id = procedures.insert(Procedure::new("f"));
        let call_graph = CallGraph::new();

        let mut proc = Procedure::new("f");
        let gone = proc.push(Instruction::NoOp);
        proc.push(Instruction::Jump(gone));
        proc.body.remove(0);
        proc.instructions.remove(gone);

        assert!(matches!(
            verify_procedure(id, &proc, &procedures, &call_graph),
            Err(ProcedureVerificationError::Cfg(CfgError::MissingJumpTarget { .. }))
        ));
    }
}
