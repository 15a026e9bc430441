use std::fmt;

use arrayvec::ArrayVec;
use pureflow_util::typed_id_map::{IdMap, new_id_type};

use crate::{call_graph::CallGraph, literal::Literal};

new_id_type! {
    pub struct ProcId;
    pub struct InstId;
    pub struct VarId;
    pub struct CallSiteId;
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.index())
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.index())
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.index())
    }
}

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.index())
    }
}

/// Only distinguishes what folding needs to know: primitive numeric slots may have their uses
/// replaced by literals, reference slots never are.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VarKind {
    Primitive,
    Reference,
}

impl VarKind {
    /// Whether a literal may be stored in a variable of this kind.
    pub fn accepts(self, literal: &Literal) -> bool {
        match self {
            VarKind::Primitive => literal.is_numeric(),
            VarKind::Reference => literal.is_reference(),
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKind::Primitive => write!(f, "primitive"),
            VarKind::Reference => write!(f, "reference"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
    Cmp,
    Cmpl,
    Cmpg,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl BinOp {
    /// Evaluate this operation over two literals.
    ///
    /// Returns `None` if the operation is not defined for the given operands or would trap at
    /// runtime (integer division by zero).
    pub fn apply(self, l: &Literal, r: &Literal) -> Option<Literal> {
        match self {
            BinOp::Add => l.add(r),
            BinOp::Sub => l.sub(r),
            BinOp::Mul => l.mul(r),
            BinOp::Div => l.div(r),
            BinOp::Rem => l.rem(r),
            BinOp::Shl => l.shl(r),
            BinOp::Shr => l.shr(r),
            BinOp::Ushr => l.ushr(r),
            BinOp::And => l.bit_and(r),
            BinOp::Or => l.bit_or(r),
            BinOp::Xor => l.bit_xor(r),
            BinOp::Cmp => l.cmp(r),
            BinOp::Cmpl => l.cmpl(r),
            BinOp::Cmpg => l.cmpg(r),
            BinOp::Equal => l.equal(r).map(Literal::from),
            BinOp::NotEqual => l.equal(r).map(|b| Literal::from(!b)),
            BinOp::LessThan => l.less_than(r).map(Literal::from),
            BinOp::LessEqual => l.less_equal(r).map(Literal::from),
            BinOp::GreaterThan => r.less_than(l).map(Literal::from),
            BinOp::GreaterEqual => r.less_equal(l).map(Literal::from),
        }
    }

    /// Operations that may raise a runtime error depending on their operand values.
    pub fn can_trap(self) -> bool {
        matches!(self, BinOp::Div | BinOp::Rem)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Cmp => "cmp",
            BinOp::Cmpl => "cmpl",
            BinOp::Cmpg => "cmpg",
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
            BinOp::LessThan => "<",
            BinOp::LessEqual => "<=",
            BinOp::GreaterThan => ">",
            BinOp::GreaterEqual => ">=",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A value expression. Operands are plain values, they may be freely cloned and do not own any
/// instruction.
///
/// Well-formed operands are at most one level deep: the sides of a `Binary` and the arguments of
/// a `Call` are `Literal` or `Var` leaves.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Operand {
    Literal(Literal),
    Var(VarId),
    Binary {
        op: BinOp,
        left: Box<Operand>,
        right: Box<Operand>,
    },
    Call {
        site: CallSiteId,
        args: Vec<Operand>,
    },
}

impl From<Literal> for Operand {
    fn from(lit: Literal) -> Self {
        Operand::Literal(lit)
    }
}

impl From<VarId> for Operand {
    fn from(var: VarId) -> Self {
        Operand::Var(var)
    }
}

impl Operand {
    pub fn binary(op: BinOp, left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Operand::Binary {
            op,
            left: Box::new(left.into()),
            right: Box::new(right.into()),
        }
    }

    pub fn call(site: CallSiteId, args: impl IntoIterator<Item = Operand>) -> Self {
        Operand::Call {
            site,
            args: args.into_iter().collect(),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Operand::Literal(_) | Operand::Var(_))
    }

    #[inline]
    pub fn as_var(&self) -> Option<VarId> {
        match *self {
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Operand::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Every operand node in this expression tree, in pre-order, including `self`.
    pub fn subterms(&self) -> impl Iterator<Item = &Operand> + '_ {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            match next {
                Operand::Literal(_) | Operand::Var(_) => {}
                Operand::Binary { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
                Operand::Call { args, .. } => stack.extend(args.iter().rev()),
            }
            Some(next)
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.subterms().filter_map(Operand::as_var)
    }

    pub fn call_sites(&self) -> impl Iterator<Item = CallSiteId> + '_ {
        self.subterms().filter_map(|op| match *op {
            Operand::Call { site, .. } => Some(site),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Instruction {
    NoOp,
    Assign {
        dest: VarId,
        value: Operand,
    },
    /// A call whose result, if any, is discarded.
    Call {
        site: CallSiteId,
        args: Vec<Operand>,
    },
    GetField {
        dest: VarId,
        object: Operand,
        field: String,
    },
    SetField {
        object: Operand,
        field: String,
        value: Operand,
    },
    GetStatic {
        dest: VarId,
        field: String,
    },
    SetStatic {
        field: String,
        value: Operand,
    },
    Jump(InstId),
    /// Jump to `target` if `cond` is non-zero, otherwise fall through.
    Branch {
        cond: Operand,
        target: InstId,
    },
    Return(Option<Operand>),
}

impl Instruction {
    /// The variable slot this instruction defines, if any.
    #[inline]
    pub fn def(&self) -> Option<VarId> {
        match *self {
            Instruction::Assign { dest, .. }
            | Instruction::GetField { dest, .. }
            | Instruction::GetStatic { dest, .. } => Some(dest),
            _ => None,
        }
    }

    /// The top-level use operand slots of this instruction, in evaluation order.
    pub fn uses(&self) -> impl Iterator<Item = &Operand> + '_ {
        macro_rules! make_iter {
            ($small:expr, $rest:expr) => {
                ArrayVec::<_, 2>::from_iter($small.into_iter())
                    .into_iter()
                    .chain($rest.iter())
            };
            ($small:expr) => {
                make_iter!($small, &[])
            };
        }

        match self {
            Instruction::Assign { value, .. } => make_iter!([value]),
            Instruction::Call { args, .. } => make_iter!([], args),
            Instruction::GetField { object, .. } => make_iter!([object]),
            Instruction::SetField { object, value, .. } => make_iter!([object, value]),
            Instruction::SetStatic { value, .. } => make_iter!([value]),
            Instruction::Branch { cond, .. } => make_iter!([cond]),
            Instruction::Return(Some(value)) => make_iter!([value]),
            _ => make_iter!([]),
        }
    }

    pub fn uses_mut(&mut self) -> impl Iterator<Item = &mut Operand> + '_ {
        macro_rules! make_iter {
            ($small:expr, $rest:expr) => {
                ArrayVec::<_, 2>::from_iter($small.into_iter())
                    .into_iter()
                    .chain($rest.iter_mut())
            };
            ($small:expr) => {
                make_iter!($small, &mut [])
            };
        }

        match self {
            Instruction::Assign { value, .. } => make_iter!([value]),
            Instruction::Call { args, .. } => make_iter!([], args),
            Instruction::GetField { object, .. } => make_iter!([object]),
            Instruction::SetField { object, value, .. } => make_iter!([object, value]),
            Instruction::SetStatic { value, .. } => make_iter!([value]),
            Instruction::Branch { cond, .. } => make_iter!([cond]),
            Instruction::Return(Some(value)) => make_iter!([value]),
            _ => make_iter!([]),
        }
    }

    /// Every variable read by this instruction, including those nested in expressions.
    pub fn used_variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.uses().flat_map(|op| op.variables())
    }

    /// Every call site this instruction may invoke.
    pub fn call_sites(&self) -> impl Iterator<Item = CallSiteId> + '_ {
        let direct = match *self {
            Instruction::Call { site, .. } => Some(site),
            _ => None,
        };
        direct
            .into_iter()
            .chain(self.uses().flat_map(|op| op.call_sites()))
    }

    /// Field and static accesses read or write storage shared beyond the executing procedure.
    #[inline]
    pub fn accesses_shared_storage(&self) -> bool {
        matches!(
            self,
            Instruction::GetField { .. }
                | Instruction::SetField { .. }
                | Instruction::GetStatic { .. }
                | Instruction::SetStatic { .. }
        )
    }

    #[inline]
    pub fn jump_target(&self) -> Option<InstId> {
        match *self {
            Instruction::Jump(target) | Instruction::Branch { target, .. } => Some(target),
            _ => None,
        }
    }

    #[inline]
    pub fn jump_target_mut(&mut self) -> Option<&mut InstId> {
        match self {
            Instruction::Jump(target) | Instruction::Branch { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Whether execution may continue with the next instruction in the stream.
    #[inline]
    pub fn falls_through(&self) -> bool {
        !matches!(self, Instruction::Jump(_) | Instruction::Return(_))
    }
}

#[derive(Debug, Clone)]
pub struct Procedure {
    /// Fully qualified name, unique within a program.
    pub name: String,
    /// External procedures are library code with no body available for analysis.
    pub external: bool,
    pub parameters: Vec<VarId>,
    pub variables: IdMap<VarId, Variable>,
    pub instructions: IdMap<InstId, Instruction>,
    /// The instruction stream in execution order. The first instruction is the entry.
    pub body: Vec<InstId>,
}

impl Procedure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external: false,
            parameters: Vec::new(),
            variables: IdMap::new(),
            instructions: IdMap::new(),
            body: Vec::new(),
        }
    }

    pub fn external(
        name: impl Into<String>,
        parameters: impl IntoIterator<Item = VarKind>,
    ) -> Self {
        let mut procedure = Self::new(name);
        procedure.external = true;
        for (i, kind) in parameters.into_iter().enumerate() {
            procedure.add_parameter(format!("p{i}"), kind);
        }
        procedure
    }

    pub fn add_variable(&mut self, name: impl Into<String>, kind: VarKind) -> VarId {
        self.variables.insert(Variable {
            name: name.into(),
            kind,
        })
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, kind: VarKind) -> VarId {
        let var = self.add_variable(name, kind);
        self.parameters.push(var);
        var
    }

    /// Append an instruction to the end of the instruction stream.
    pub fn push(&mut self, inst: Instruction) -> InstId {
        let id = self.instructions.insert(inst);
        self.body.push(id);
        id
    }

    #[inline]
    pub fn is_primitive(&self, var: VarId) -> bool {
        self.variables
            .get(var)
            .is_some_and(|v| v.kind == VarKind::Primitive)
    }

    pub fn entry(&self) -> Option<InstId> {
        self.body.first().copied()
    }

    pub fn display<'a>(
        &'a self,
        procedures: &'a ProcedureMap,
        call_graph: &'a CallGraph,
    ) -> ProcedureDisplay<'a> {
        ProcedureDisplay {
            procedure: self,
            procedures,
            call_graph,
        }
    }
}

pub type ProcedureMap = IdMap<ProcId, Procedure>;

/// Human readable listing of a procedure, naming variables, call targets and jump labels.
pub struct ProcedureDisplay<'a> {
    procedure: &'a Procedure,
    procedures: &'a ProcedureMap,
    call_graph: &'a CallGraph,
}

impl<'a> ProcedureDisplay<'a> {
    fn var(&self, f: &mut fmt::Formatter<'_>, var: VarId) -> fmt::Result {
        match self.procedure.variables.get(var) {
            Some(v) => f.write_str(&v.name),
            None => write!(f, "{var}"),
        }
    }

    fn operand(&self, f: &mut fmt::Formatter<'_>, operand: &Operand) -> fmt::Result {
        match operand {
            Operand::Literal(lit) => write!(f, "{lit}"),
            &Operand::Var(var) => self.var(f, var),
            Operand::Binary { op, left, right } => {
                self.operand(f, left)?;
                write!(f, " {op} ")?;
                self.operand(f, right)
            }
            &Operand::Call { site, ref args } => self.call(f, site, args),
        }
    }

    fn call(&self, f: &mut fmt::Formatter<'_>, site: CallSiteId, args: &[Operand]) -> fmt::Result {
        write!(f, "call {site} [")?;
        for (i, &target) in self.call_graph.targets(site).iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            match self.procedures.get(target) {
                Some(p) => f.write_str(&p.name)?,
                None => write!(f, "{target}")?,
            }
        }
        write!(f, "](")?;
        for (i, arg) in args.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            self.operand(f, arg)?;
        }
        write!(f, ")")
    }
}

impl<'a> fmt::Display for ProcedureDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proc = self.procedure;

        if proc.external {
            write!(f, "extern ")?;
        }
        write!(f, "{}(", proc.name)?;
        for (i, &param) in proc.parameters.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            self.var(f, param)?;
        }
        write!(f, ")")?;
        if proc.external {
            return writeln!(f);
        }
        writeln!(f, " {{")?;

        for &inst_id in &proc.body {
            write!(f, "  {inst_id}: ")?;
            let Some(inst) = proc.instructions.get(inst_id) else {
                writeln!(f, "<missing>")?;
                continue;
            };

            match inst {
                Instruction::NoOp => write!(f, "nop")?,
                &Instruction::Assign { dest, ref value } => {
                    self.var(f, dest)?;
                    write!(f, " = ")?;
                    self.operand(f, value)?;
                }
                &Instruction::Call { site, ref args } => self.call(f, site, args)?,
                &Instruction::GetField {
                    dest,
                    ref object,
                    ref field,
                } => {
                    self.var(f, dest)?;
                    write!(f, " = ")?;
                    self.operand(f, object)?;
                    write!(f, ".{field}")?;
                }
                Instruction::SetField {
                    object,
                    field,
                    value,
                } => {
                    self.operand(f, object)?;
                    write!(f, ".{field} = ")?;
                    self.operand(f, value)?;
                }
                &Instruction::GetStatic { dest, ref field } => {
                    self.var(f, dest)?;
                    write!(f, " = static {field}")?;
                }
                Instruction::SetStatic { field, value } => {
                    write!(f, "static {field} = ")?;
                    self.operand(f, value)?;
                }
                Instruction::Jump(target) => write!(f, "goto {target}")?,
                Instruction::Branch { cond, target } => {
                    write!(f, "if ")?;
                    self.operand(f, cond)?;
                    write!(f, " goto {target}")?;
                }
                Instruction::Return(None) => write!(f, "return")?,
                Instruction::Return(Some(value)) => {
                    write!(f, "return ")?;
                    self.operand(f, value)?;
                }
            }
            writeln!(f)?;
        }

        writeln!(f, "}}")
    }
}
