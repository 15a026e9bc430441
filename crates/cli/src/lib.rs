pub mod load;
pub mod report;

pub use self::{
    load::{LoadError, load_program, parse_program},
    report::{impurity_reason, purity_listing},
};
