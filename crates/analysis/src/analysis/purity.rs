use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use crate::{
    call_graph::{CallGraph, Dispatch},
    graph::{dfs::depth_first_search_with, predecessors::Predecessors},
    ir::{CallSiteId, InstId, ProcId, Procedure, ProcedureMap},
};

/// Procedures whose execution has no externally observable effect beyond returning a value.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PureSet(HashSet<ProcId>);

impl PureSet {
    #[inline]
    pub fn contains(&self, proc_id: ProcId) -> bool {
        self.0.contains(&proc_id)
    }

    /// Whether a call site may only ever invoke pure procedures. Unresolved sites are not.
    pub fn covers(&self, targets: &[ProcId]) -> bool {
        !targets.is_empty() && targets.iter().all(|&t| self.contains(t))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ProcId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ProcId> for PureSet {
    fn from_iter<T: IntoIterator<Item = ProcId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The first signal found that makes a procedure impure.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ImpurityReason {
    /// Reads or writes a field or static.
    SharedStorage(InstId),
    UnresolvedCall(CallSiteId),
    PolymorphicCall(CallSiteId),
    /// Calls a procedure with no analyzable body.
    ExternalCallee(ProcId),
    ImpureCallee(ProcId),
}

impl fmt::Display for ImpurityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpurityReason::SharedStorage(inst) => write!(f, "accesses shared storage at {inst}"),
            ImpurityReason::UnresolvedCall(site) => {
                write!(f, "call site {site} has no resolved target")
            }
            ImpurityReason::PolymorphicCall(site) => {
                write!(f, "call site {site} has more than one candidate target")
            }
            ImpurityReason::ExternalCallee(callee) => write!(f, "calls external procedure {callee}"),
            ImpurityReason::ImpureCallee(callee) => write!(f, "calls impure procedure {callee}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PurityClassification {
    pure: PureSet,
    impure: HashMap<ProcId, ImpurityReason>,
}

impl PurityClassification {
    #[inline]
    pub fn pure_set(&self) -> &PureSet {
        &self.pure
    }

    pub fn into_pure_set(self) -> PureSet {
        self.pure
    }

    #[inline]
    pub fn is_pure(&self, proc_id: ProcId) -> bool {
        self.pure.contains(proc_id)
    }

    /// Why a procedure was classified impure, `None` if it is pure or was never classified.
    #[inline]
    pub fn reason(&self, proc_id: ProcId) -> Option<ImpurityReason> {
        self.impure.get(&proc_id).copied()
    }

    pub fn impure(&self) -> impl Iterator<Item = (ProcId, ImpurityReason)> + '_ {
        self.impure.iter().map(|(&p, &r)| (p, r))
    }
}

/// The result of scanning one procedure body in isolation.
struct LocalScan {
    reason: Option<ImpurityReason>,
    callees: Vec<ProcId>,
}

fn scan_procedure(
    procedure: &Procedure,
    procedures: &ProcedureMap,
    call_graph: &CallGraph,
) -> LocalScan {
    let mut reason = None;
    let mut callees = Vec::new();

    for &inst_id in &procedure.body {
        let Some(inst) = procedure.instructions.get(inst_id) else {
            continue;
        };

        if inst.accesses_shared_storage() {
            reason.get_or_insert(ImpurityReason::SharedStorage(inst_id));
        }

        for site in inst.call_sites() {
            match call_graph.dispatch(site) {
                Dispatch::Unresolved => {
                    reason.get_or_insert(ImpurityReason::UnresolvedCall(site));
                }
                Dispatch::Polymorphic(_) => {
                    reason.get_or_insert(ImpurityReason::PolymorphicCall(site));
                }
                Dispatch::Monomorphic(callee) => match procedures.get(callee) {
                    Some(p) if !p.external => {
                        if !callees.contains(&callee) {
                            callees.push(callee);
                        }
                    }
                    _ => {
                        reason.get_or_insert(ImpurityReason::ExternalCallee(callee));
                    }
                },
            }
        }
    }

    LocalScan { reason, callees }
}

/// Classify every non-external procedure as pure or impure.
///
/// Procedures are first scanned in isolation, in a depth-first postorder over the monomorphic
/// call edges starting from `entries` and then from every remaining procedure, so callees are
/// settled before their callers. Impurity is then pushed backwards along caller edges with a
/// worklist until nothing changes, which also covers recursive clusters where provisional
/// purity was assumed before a member was found impure.
pub fn classify_purity(
    procedures: &ProcedureMap,
    call_graph: &CallGraph,
    entries: &[ProcId],
) -> PurityClassification {
    let is_user = |p: ProcId| procedures.get(p).is_some_and(|p| !p.external);

    let mut scans: HashMap<ProcId, LocalScan> = HashMap::new();
    let mut post_order = Vec::new();

    let roots = entries
        .iter()
        .copied()
        .chain(procedures.ids())
        .filter(|&p| is_user(p));

    depth_first_search_with(
        &mut (&mut scans, &mut post_order),
        roots,
        |(scans, _), proc_id| {
            let scan = scan_procedure(&procedures[proc_id], procedures, call_graph);
            let callees = scan.callees.clone();
            scans.insert(proc_id, scan);
            callees
        },
        |(_, post_order), proc_id| post_order.push(proc_id),
    );

    let callers = Predecessors::compute(post_order.iter().copied(), |p| {
        scans[&p].callees.iter().copied()
    });

    let mut impure = HashMap::new();
    let mut worklist = Vec::new();
    for &proc_id in &post_order {
        if let Some(reason) = scans[&proc_id].reason {
            log::debug!("`{}` is impure: {reason}", procedures[proc_id].name);
            impure.insert(proc_id, reason);
            worklist.push(proc_id);
        }
    }
    // Pop in postorder so callees closest to the leaves propagate first.
    worklist.reverse();

    while let Some(callee) = worklist.pop() {
        for &caller in callers.get(callee) {
            if !impure.contains_key(&caller) {
                log::debug!(
                    "`{}` is impure: calls impure `{}`",
                    procedures[caller].name,
                    procedures[callee].name
                );
                impure.insert(caller, ImpurityReason::ImpureCallee(callee));
                worklist.push(caller);
            }
        }
    }

    let pure = post_order
        .iter()
        .copied()
        .filter(|p| !impure.contains_key(p))
        .collect::<PureSet>();

    log::info!(
        "classified {} procedures: {} pure, {} impure",
        post_order.len(),
        pure.len(),
        impure.len()
    );

    PurityClassification { pure, impure }
}

#[cfg(test)]
mod tests {
    use crate::{
        ir::{BinOp, Instruction, Operand, VarKind},
        literal::Literal,
    };

    use super::*;

    struct Builder {
        procedures: ProcedureMap,
        call_graph: CallGraph,
    }

    impl Builder {
        fn new() -> Self {
            Self {
                procedures: ProcedureMap::new(),
                call_graph: CallGraph::new(),
            }
        }

        fn procedure(&mut self, name: &str) -> ProcId {
            let mut proc = Procedure::new(name);
            proc.add_parameter("n", VarKind::Primitive);
            self.procedures.insert(proc)
        }

        fn call(&mut self, caller: ProcId, targets: &[ProcId]) -> CallSiteId {
            let site = self.call_graph.add_site(caller, targets.iter().copied());
            let proc = &mut self.procedures[caller];
            let n = proc.parameters[0];
            proc.push(Instruction::Call {
                site,
                args: vec![Operand::Var(n)],
            });
            site
        }

        fn write_static(&mut self, proc_id: ProcId) -> InstId {
            let proc = &mut self.procedures[proc_id];
            let n = proc.parameters[0];
            proc.push(Instruction::SetStatic {
                field: "counter".to_owned(),
                value: Operand::Var(n),
            })
        }

        fn classify(&self, entries: &[ProcId]) -> PurityClassification {
            classify_purity(&self.procedures, &self.call_graph, entries)
        }
    }

    #[test]
    fn test_leaf_arithmetic_is_pure() {
        let mut b = Builder::new();
        let square = b.procedure("square");
        let proc = &mut b.procedures[square];
        let n = proc.parameters[0];
        proc.push(Instruction::Return(Some(Operand::binary(BinOp::Mul, n, n))));

        let purity = b.classify(&[square]);
        assert!(purity.is_pure(square));
        assert_eq!(purity.reason(square), None);
    }

    #[test]
    fn test_unresolved_and_polymorphic_calls() {
        let mut b = Builder::new();
        let main = b.procedure("main");
        let unresolved = b.procedure("unresolved");
        let poly = b.procedure("poly");
        let a_foo = b.procedure("A.foo");
        let b_foo = b.procedure("B.foo");

        let site = b.call(unresolved, &[]);
        let poly_site = b.call(poly, &[a_foo, b_foo]);
        b.call(main, &[unresolved]);

        let purity = b.classify(&[main]);
        assert_eq!(
            purity.reason(unresolved),
            Some(ImpurityReason::UnresolvedCall(site))
        );
        assert_eq!(
            purity.reason(poly),
            Some(ImpurityReason::PolymorphicCall(poly_site))
        );
        assert_eq!(
            purity.reason(main),
            Some(ImpurityReason::ImpureCallee(unresolved))
        );
        assert!(purity.is_pure(a_foo));
        assert!(purity.is_pure(b_foo));
    }

    #[test]
    fn test_external_callee_is_impure() {
        let mut b = Builder::new();
        let main = b.procedure("main");
        let print = b
            .procedures
            .insert(Procedure::external("print", [VarKind::Primitive]));
        b.call(main, &[print]);

        let purity = b.classify(&[main]);
        assert_eq!(
            purity.reason(main),
            Some(ImpurityReason::ExternalCallee(print))
        );
        assert!(!purity.is_pure(print));
        assert_eq!(purity.reason(print), None);
    }

    #[test]
    fn test_mutual_recursion_shares_impurity() {
        let mut b = Builder::new();
        let main = b.procedure("main");
        let even = b.procedure("even");
        let odd = b.procedure("odd");
        let bystander = b.procedure("bystander");

        b.call(main, &[even]);
        b.call(even, &[odd]);
        b.call(odd, &[even]);
        let write = b.write_static(odd);
        b.call(bystander, &[even]);

        let purity = b.classify(&[main]);
        assert_eq!(
            purity.reason(odd),
            Some(ImpurityReason::SharedStorage(write))
        );
        assert_eq!(purity.reason(even), Some(ImpurityReason::ImpureCallee(odd)));
        assert_eq!(purity.reason(main), Some(ImpurityReason::ImpureCallee(even)));
        assert_eq!(
            purity.reason(bystander),
            Some(ImpurityReason::ImpureCallee(even))
        );
        assert!(purity.pure_set().is_empty());
    }

    #[test]
    fn test_pure_recursion_stays_pure() {
        let mut b = Builder::new();
        let fact = b.procedure("factorial");
        b.call(fact, &[fact]);
        let proc = &mut b.procedures[fact];
        proc.push(Instruction::Return(Some(Operand::Literal(Literal::Int(1)))));

        let purity = b.classify(&[]);
        assert!(purity.is_pure(fact));
    }
}
