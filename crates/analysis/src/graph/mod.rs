pub mod cfg;
pub mod dfs;
pub mod predecessors;

use crate::ir::{InstId, ProcId};

pub trait Node: Copy + Eq {
    /// Must be a unique, low-valued array index that identifies the node. Graph algorithms may use
    /// memory proportional to the maximum length returned here.
    fn index(&self) -> usize;
}

impl Node for usize {
    fn index(&self) -> usize {
        *self
    }
}

impl Node for InstId {
    fn index(&self) -> usize {
        self.index() as usize
    }
}

impl Node for ProcId {
    fn index(&self) -> usize {
        self.index() as usize
    }
}
