pub mod constant_folding;
pub mod constant_propagation;
pub mod dead_code_elim;
pub mod liveness;
pub mod purity;
pub mod reaching_defs;
pub mod verify;
