use pureflow_util::typed_id_map::IdMap;

use crate::ir::{CallSiteId, ProcId};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CallSite {
    /// The procedure containing the call.
    pub caller: ProcId,
    targets: Vec<ProcId>,
}

impl CallSite {
    /// Candidate callees, sorted and without duplicates.
    #[inline]
    pub fn targets(&self) -> &[ProcId] {
        &self.targets
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Dispatch<'a> {
    /// No target is known for the call site.
    Unresolved,
    Monomorphic(ProcId),
    /// More than one procedure may be invoked at runtime.
    Polymorphic(&'a [ProcId]),
}

/// Whole-program mapping from call sites to their candidate callees.
///
/// Built once by the frontend and read-only for every analysis.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    sites: IdMap<CallSiteId, CallSite>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_site(
        &mut self,
        caller: ProcId,
        targets: impl IntoIterator<Item = ProcId>,
    ) -> CallSiteId {
        let mut targets = targets.into_iter().collect::<Vec<_>>();
        targets.sort();
        targets.dedup();
        self.sites.insert(CallSite { caller, targets })
    }

    #[inline]
    pub fn get(&self, site: CallSiteId) -> Option<&CallSite> {
        self.sites.get(site)
    }

    /// The candidate callees of a call site. A site unknown to the call graph has none.
    #[inline]
    pub fn targets(&self, site: CallSiteId) -> &[ProcId] {
        self.sites.get(site).map(CallSite::targets).unwrap_or(&[])
    }

    pub fn dispatch(&self, site: CallSiteId) -> Dispatch<'_> {
        match self.targets(site) {
            [] => Dispatch::Unresolved,
            &[target] => Dispatch::Monomorphic(target),
            targets => Dispatch::Polymorphic(targets),
        }
    }

    pub fn sites(&self) -> impl Iterator<Item = (CallSiteId, &CallSite)> + '_ {
        self.sites.iter()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Procedure, ProcedureMap};

    use super::*;

    #[test]
    fn test_dispatch() {
        let mut procedures = ProcedureMap::new();
        let main = procedures.insert(Procedure::new("main"));
        let a = procedures.insert(Procedure::new("A.foo"));
        let b = procedures.insert(Procedure::new("B.foo"));

        let mut call_graph = CallGraph::new();
        let none = call_graph.add_site(main, []);
        let one = call_graph.add_site(main, [a, a]);
        let two = call_graph.add_site(main, [b, a]);

        assert_eq!(call_graph.dispatch(none), Dispatch::Unresolved);
        assert_eq!(call_graph.dispatch(one), Dispatch::Monomorphic(a));
        assert_eq!(call_graph.dispatch(two), Dispatch::Polymorphic(&[a, b]));
        assert_eq!(call_graph.get(two).unwrap().caller, main);
    }
}
