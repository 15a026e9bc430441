pub mod analysis;
pub mod call_graph;
pub mod dataflow;
pub mod graph;
pub mod interpreter;
pub mod ir;
pub mod literal;
pub mod optimizer;

pub use self::{
    analysis::{
        constant_propagation::{ConstantMap, ConstantValue},
        purity::{ImpurityReason, PureSet, PurityClassification, classify_purity},
        verify::ProcedureVerificationError,
    },
    call_graph::{CallGraph, CallSite, Dispatch},
    interpreter::{EvalError, EvalSettings, Evaluate, Interpreter},
    ir::{
        BinOp, CallSiteId, InstId, Instruction, Operand, ProcId, Procedure, ProcedureMap, VarId,
        VarKind, Variable,
    },
    literal::Literal,
    optimizer::{
        OptimizeReport, OptimizeSettings, ProcedureReport, Program, TransformStats,
        optimize_program, optimize_program_with,
    },
};
