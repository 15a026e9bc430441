use std::collections::HashMap;

use pureflow_util::typed_id_map::SecondaryMap;
use thiserror::Error;

use crate::{
    call_graph::{CallGraph, Dispatch},
    ir::{BinOp, CallSiteId, InstId, Instruction, Operand, ProcId, ProcedureMap, VarId, VarKind},
    literal::Literal,
};

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum EvalError {
    #[error("expected {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("argument {index} should be {expected}, found {found}")]
    ArgumentKind {
        index: usize,
        expected: VarKind,
        found: &'static str,
    },
    #[error("`{0}` failed on its operands")]
    Arithmetic(BinOp),
    #[error("variable {0} read before it was assigned")]
    Uninitialized(VarId),
    #[error("variable {0} is not declared")]
    UnknownVariable(VarId),
    #[error("instruction {0} does not exist")]
    MissingInstruction(InstId),
    #[error("instruction {0} accesses shared storage")]
    SharedStorage(InstId),
    #[error("call site {0} does not have exactly one target")]
    UnresolvedCall(CallSiteId),
    #[error("call depth exceeded {0}")]
    DepthExceeded(usize),
    #[error("ran out of fuel")]
    OutOfFuel,
    #[error("procedure finished without returning a value")]
    MissingReturn,
    #[error("branch condition is not an int")]
    NonNumericCondition,
    #[error("procedure {0} is external")]
    External(ProcId),
    #[error("procedure {0} does not exist")]
    UnknownProcedure(ProcId),
    #[error("native function failed: {0}")]
    Native(String),
}

/// Runs a procedure as a pure function of its arguments.
///
/// Only called on procedures already classified pure. An `Err` is never fatal to the caller, it
/// just means the call result is not a known constant.
pub trait Evaluate: Sync {
    fn evaluate(&self, proc_id: ProcId, args: &[Literal]) -> Result<Literal, EvalError>;
}

impl<F> Evaluate for F
where
    F: Fn(ProcId, &[Literal]) -> Result<Literal, EvalError> + Sync,
{
    fn evaluate(&self, proc_id: ProcId, args: &[Literal]) -> Result<Literal, EvalError> {
        self(proc_id, args)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EvalSettings {
    /// Maximum number of instructions executed by one top-level evaluation, across every nested
    /// call.
    pub fuel: u64,
    pub max_depth: usize,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            fuel: 100_000,
            max_depth: 64,
        }
    }
}

pub type NativeFn = Box<dyn Fn(&[Literal]) -> Result<Literal, EvalError> + Send + Sync>;

/// A direct interpreter for procedure bodies.
///
/// Any access to fields or statics fails, as does any call that does not dispatch to exactly one
/// procedure. Registered native functions take precedence over procedure bodies.
pub struct Interpreter<'a> {
    procedures: &'a ProcedureMap,
    call_graph: &'a CallGraph,
    natives: HashMap<ProcId, NativeFn>,
    settings: EvalSettings,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        procedures: &'a ProcedureMap,
        call_graph: &'a CallGraph,
        settings: EvalSettings,
    ) -> Self {
        Self {
            procedures,
            call_graph,
            natives: HashMap::new(),
            settings,
        }
    }

    pub fn register_native(
        &mut self,
        proc_id: ProcId,
        f: impl Fn(&[Literal]) -> Result<Literal, EvalError> + Send + Sync + 'static,
    ) {
        self.natives.insert(proc_id, Box::new(f));
    }

    pub fn call(&self, proc_id: ProcId, args: &[Literal]) -> Result<Literal, EvalError> {
        let mut fuel = self.settings.fuel;
        self.invoke(proc_id, args, 0, &mut fuel)
    }

    fn invoke(
        &self,
        proc_id: ProcId,
        args: &[Literal],
        depth: usize,
        fuel: &mut u64,
    ) -> Result<Literal, EvalError> {
        if let Some(native) = self.natives.get(&proc_id) {
            return native(args);
        }

        if depth > self.settings.max_depth {
            return Err(EvalError::DepthExceeded(self.settings.max_depth));
        }

        let procedure = self
            .procedures
            .get(proc_id)
            .ok_or(EvalError::UnknownProcedure(proc_id))?;
        if procedure.external {
            return Err(EvalError::External(proc_id));
        }

        if args.len() != procedure.parameters.len() {
            return Err(EvalError::ArityMismatch {
                expected: procedure.parameters.len(),
                got: args.len(),
            });
        }

        let mut locals = SecondaryMap::new();
        for (index, (&param, arg)) in procedure.parameters.iter().zip(args).enumerate() {
            let var = procedure
                .variables
                .get(param)
                .ok_or(EvalError::UnknownVariable(param))?;
            if !var.kind.accepts(arg) {
                return Err(EvalError::ArgumentKind {
                    index,
                    expected: var.kind,
                    found: arg.kind_name(),
                });
            }
            locals.insert(param, arg.clone());
        }

        let positions = procedure
            .body
            .iter()
            .enumerate()
            .map(|(pos, &inst_id)| (inst_id, pos))
            .collect::<HashMap<_, _>>();
        let jump = |target: InstId| {
            positions
                .get(&target)
                .copied()
                .ok_or(EvalError::MissingInstruction(target))
        };

        let mut frame = Frame {
            interpreter: self,
            locals,
            depth,
        };

        let mut pc = 0;
        while let Some(&inst_id) = procedure.body.get(pc) {
            if *fuel == 0 {
                return Err(EvalError::OutOfFuel);
            }
            *fuel -= 1;
            pc += 1;

            let inst = procedure
                .instructions
                .get(inst_id)
                .ok_or(EvalError::MissingInstruction(inst_id))?;

            match inst {
                Instruction::NoOp => {}
                &Instruction::Assign { dest, ref value } => {
                    let value = frame.operand(value, fuel)?;
                    frame.locals.insert(dest, value);
                }
                &Instruction::Call { site, ref args } => {
                    frame.call(site, args, fuel)?;
                }
                Instruction::GetField { .. }
                | Instruction::SetField { .. }
                | Instruction::GetStatic { .. }
                | Instruction::SetStatic { .. } => {
                    return Err(EvalError::SharedStorage(inst_id));
                }
                &Instruction::Jump(target) => {
                    pc = jump(target)?;
                }
                &Instruction::Branch { ref cond, target } => {
                    let cond = frame.operand(cond, fuel)?;
                    if cond.as_condition().ok_or(EvalError::NonNumericCondition)? {
                        pc = jump(target)?;
                    }
                }
                Instruction::Return(Some(value)) => return frame.operand(value, fuel),
                Instruction::Return(None) => return Err(EvalError::MissingReturn),
            }
        }

        Err(EvalError::MissingReturn)
    }
}

impl<'a> Evaluate for Interpreter<'a> {
    fn evaluate(&self, proc_id: ProcId, args: &[Literal]) -> Result<Literal, EvalError> {
        self.call(proc_id, args)
    }
}

struct Frame<'i, 'a> {
    interpreter: &'i Interpreter<'a>,
    locals: SecondaryMap<VarId, Literal>,
    depth: usize,
}

impl<'i, 'a> Frame<'i, 'a> {
    fn operand(&self, operand: &Operand, fuel: &mut u64) -> Result<Literal, EvalError> {
        match operand {
            Operand::Literal(lit) => Ok(lit.clone()),
            &Operand::Var(var) => self
                .locals
                .get(var)
                .cloned()
                .ok_or(EvalError::Uninitialized(var)),
            &Operand::Binary {
                op,
                ref left,
                ref right,
            } => {
                let l = self.operand(left, fuel)?;
                let r = self.operand(right, fuel)?;
                op.apply(&l, &r).ok_or(EvalError::Arithmetic(op))
            }
            &Operand::Call { site, ref args } => self.call(site, args, fuel),
        }
    }

    fn call(
        &self,
        site: CallSiteId,
        args: &[Operand],
        fuel: &mut u64,
    ) -> Result<Literal, EvalError> {
        let Dispatch::Monomorphic(callee) = self.interpreter.call_graph.dispatch(site) else {
            return Err(EvalError::UnresolvedCall(site));
        };

        let args = args
            .iter()
            .map(|arg| self.operand(arg, fuel))
            .collect::<Result<Vec<_>, _>>()?;

        self.interpreter
            .invoke(callee, &args, self.depth + 1, fuel)
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::Procedure;

    use super::*;

    struct Program {
        procedures: ProcedureMap,
        call_graph: CallGraph,
    }

    impl Program {
        fn new() -> Self {
            Self {
                procedures: ProcedureMap::new(),
                call_graph: CallGraph::new(),
            }
        }

        fn interpreter(&self) -> Interpreter<'_> {
            Interpreter::new(&self.procedures, &self.call_graph, EvalSettings::default())
        }
    }

    #[test]
    fn test_loop() {
        let mut prog = Program::new();

        let mut proc = Procedure::new("factorial");
        let n = proc.add_parameter("n", VarKind::Primitive);
        let acc = proc.add_variable("acc", VarKind::Primitive);
        let i = proc.add_variable("i", VarKind::Primitive);

        proc.push(Instruction::Assign {
            dest: acc,
            value: Operand::Literal(Literal::Int(1)),
        });
        proc.push(Instruction::Assign {
            dest: i,
            value: Operand::Literal(Literal::Int(1)),
        });
        let head = proc.push(Instruction::NoOp);
        proc.push(Instruction::Assign {
            dest: acc,
            value: Operand::binary(BinOp::Mul, acc, i),
        });
        proc.push(Instruction::Assign {
            dest: i,
            value: Operand::binary(BinOp::Add, i, Literal::Int(1)),
        });
        proc.push(Instruction::Jump(head));
        let done = proc.push(Instruction::Return(Some(Operand::Var(acc))));
        proc.instructions[head] = Instruction::Branch {
            cond: Operand::binary(BinOp::GreaterThan, i, n),
            target: done,
        };

        let factorial = prog.procedures.insert(proc);
        let interpreter = prog.interpreter();

        assert_eq!(
            interpreter.call(factorial, &[Literal::Int(5)]),
            Ok(Literal::Int(120))
        );
        assert_eq!(
            interpreter.call(factorial, &[Literal::Int(0)]),
            Ok(Literal::Int(1))
        );
        assert_eq!(
            interpreter.call(factorial, &[]),
            Err(EvalError::ArityMismatch {
                expected: 1,
                got: 0
            })
        );
        assert_eq!(
            interpreter.call(factorial, &[Literal::Null]),
            Err(EvalError::ArgumentKind {
                index: 0,
                expected: VarKind::Primitive,
                found: Literal::Null.kind_name(),
            })
        );
    }

    #[test]
    fn test_calls_and_natives() {
        let mut prog = Program::new();

        let mut square = Procedure::new("square");
        let n = square.add_parameter("n", VarKind::Primitive);
        square.push(Instruction::Return(Some(Operand::binary(BinOp::Mul, n, n))));
        let square = prog.procedures.insert(square);

        let abs = prog
            .procedures
            .insert(Procedure::external("Math.abs", [VarKind::Primitive]));

        let main = prog.procedures.insert(Procedure::new("main"));
        let square_site = prog.call_graph.add_site(main, [square]);
        let abs_site = prog.call_graph.add_site(main, [abs]);

        let proc = &mut prog.procedures[main];
        let x = proc.add_parameter("x", VarKind::Primitive);
        proc.push(Instruction::Return(Some(Operand::call(
            abs_site,
            [Operand::call(square_site, [Operand::Var(x)])],
        ))));

        let mut interpreter = prog.interpreter();
        assert_eq!(
            interpreter.call(main, &[Literal::Int(-3)]),
            Err(EvalError::External(abs))
        );

        interpreter.register_native(abs, |args| match args {
            [Literal::Int(i)] => Ok(Literal::Int(i.wrapping_abs())),
            _ => Err(EvalError::Native("expected an int".to_owned())),
        });
        assert_eq!(
            interpreter.call(main, &[Literal::Int(-3)]),
            Ok(Literal::Int(9))
        );
    }

    #[test]
    fn test_failures() {
        let mut prog = Program::new();

        let mut div = Procedure::new("div");
        let a = div.add_parameter("a", VarKind::Primitive);
        let b = div.add_parameter("b", VarKind::Primitive);
        div.push(Instruction::Return(Some(Operand::binary(BinOp::Div, a, b))));
        let div = prog.procedures.insert(div);

        let mut store = Procedure::new("store");
        let v = store.add_parameter("v", VarKind::Primitive);
        let write = store.push(Instruction::SetStatic {
            field: "last".to_owned(),
            value: Operand::Var(v),
        });
        store.push(Instruction::Return(Some(Operand::Var(v))));
        let store = prog.procedures.insert(store);

        let spin = prog.procedures.insert(Procedure::new("spin"));
        let head = prog.procedures[spin].push(Instruction::NoOp);
        prog.procedures[spin].push(Instruction::Jump(head));

        let recurse = prog.procedures.insert(Procedure::new("recurse"));
        let site = prog.call_graph.add_site(recurse, [recurse]);
        prog.procedures[recurse].push(Instruction::Return(Some(Operand::call(site, []))));

        let interpreter = prog.interpreter();
        assert_eq!(
            interpreter.call(div, &[Literal::Int(1), Literal::Int(0)]),
            Err(EvalError::Arithmetic(BinOp::Div))
        );
        assert_eq!(
            interpreter.call(div, &[Literal::Double(1.0), Literal::Int(0)]),
            Ok(Literal::Double(f64::INFINITY))
        );
        assert_eq!(
            interpreter.call(store, &[Literal::Int(1)]),
            Err(EvalError::SharedStorage(write))
        );
        assert_eq!(interpreter.call(spin, &[]), Err(EvalError::OutOfFuel));
        assert_eq!(
            interpreter.call(recurse, &[]),
            Err(EvalError::DepthExceeded(EvalSettings::default().max_depth))
        );
    }
}
