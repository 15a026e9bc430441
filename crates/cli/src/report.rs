use std::fmt::Write as _;

use pureflow_analysis::{CallSiteId, ImpurityReason, ProcId, Program, PurityClassification};

/// Describe why a procedure is impure, naming procedures rather than printing their ids.
pub fn impurity_reason(program: &Program, reason: ImpurityReason) -> String {
    let name = |proc_id: ProcId| match program.procedures.get(proc_id) {
        Some(p) => format!("`{}`", p.name),
        None => proc_id.to_string(),
    };
    let targets = |site: CallSiteId| {
        program
            .call_graph
            .targets(site)
            .iter()
            .map(|&t| name(t))
            .collect::<Vec<_>>()
            .join(", ")
    };

    match reason {
        ImpurityReason::SharedStorage(inst) => format!("accesses shared storage at {inst}"),
        ImpurityReason::UnresolvedCall(site) => format!("call site {site} has no known target"),
        ImpurityReason::PolymorphicCall(site) => {
            format!("call site {site} may reach any of {}", targets(site))
        }
        ImpurityReason::ExternalCallee(callee) => format!("calls external {}", name(callee)),
        ImpurityReason::ImpureCallee(callee) => format!("calls impure {}", name(callee)),
    }
}

/// One line per procedure with a body, sorted by name.
pub fn purity_listing(program: &Program, purity: &PurityClassification) -> String {
    let mut procedures = program
        .procedures
        .iter()
        .filter(|(_, p)| !p.external)
        .collect::<Vec<_>>();
    procedures.sort_by(|(_, a), (_, b)| a.name.cmp(&b.name));

    let mut out = String::new();
    for (proc_id, procedure) in procedures {
        match purity.reason(proc_id) {
            None if purity.is_pure(proc_id) => {
                let _ = writeln!(out, "{}: pure", procedure.name);
            }
            None => {
                let _ = writeln!(out, "{}: unclassified", procedure.name);
            }
            Some(reason) => {
                let _ = writeln!(
                    out,
                    "{}: impure, {}",
                    procedure.name,
                    impurity_reason(program, reason)
                );
            }
        }
    }
    out
}
