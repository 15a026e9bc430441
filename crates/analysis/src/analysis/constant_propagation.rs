use std::collections::HashMap;

use crate::{
    analysis::purity::PureSet,
    call_graph::CallGraph,
    dataflow::{DataflowAnalysis, DataflowResults, Direction, solve},
    graph::cfg::ControlFlowGraph,
    interpreter::Evaluate,
    ir::{CallSiteId, InstId, Instruction, Operand, Procedure, VarId},
    literal::Literal,
};

/// A flat lattice over literals.
///
/// `Top` is the identity of `meet` (no information yet), `Bottom` absorbs everything (provably
/// not a single constant).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ConstantValue {
    Top,
    Constant(Literal),
    Bottom,
}

impl ConstantValue {
    #[must_use]
    pub fn meet(&self, other: &ConstantValue) -> ConstantValue {
        match (self, other) {
            (ConstantValue::Top, v) | (v, ConstantValue::Top) => v.clone(),
            (ConstantValue::Constant(a), ConstantValue::Constant(b)) if a == b => self.clone(),
            _ => ConstantValue::Bottom,
        }
    }

    #[inline]
    pub fn as_constant(&self) -> Option<&Literal> {
        match self {
            ConstantValue::Constant(lit) => Some(lit),
            _ => None,
        }
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        matches!(self, ConstantValue::Constant(_))
    }
}

static TOP: ConstantValue = ConstantValue::Top;

/// Lattice values of every variable at one program point.
///
/// Sparse: a variable with no entry is `Top`, and `Top` is never stored.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ConstantMap(HashMap<VarId, ConstantValue>);

impl ConstantMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, var: VarId) -> &ConstantValue {
        self.0.get(&var).unwrap_or(&TOP)
    }

    pub fn set(&mut self, var: VarId, value: ConstantValue) {
        if value == ConstantValue::Top {
            self.0.remove(&var);
        } else {
            self.0.insert(var, value);
        }
    }

    /// The literal held by `var`, if it is a known constant.
    #[inline]
    pub fn constant(&self, var: VarId) -> Option<&Literal> {
        self.get(var).as_constant()
    }

    pub fn meet_with(&mut self, other: &ConstantMap) {
        // Entries only present in `self` meet with `Top`, which leaves them unchanged.
        for (&var, value) in &other.0 {
            let met = self.get(var).meet(value);
            self.set(var, met);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &ConstantValue)> + '_ {
        self.0.iter().map(|(&var, value)| (var, value))
    }
}

/// Forward constant propagation with interprocedural evaluation of pure calls.
pub struct ConstantPropagation<'a> {
    call_graph: &'a CallGraph,
    pure: &'a PureSet,
    evaluator: &'a dyn Evaluate,
}

impl<'a> ConstantPropagation<'a> {
    pub fn new(call_graph: &'a CallGraph, pure: &'a PureSet, evaluator: &'a dyn Evaluate) -> Self {
        Self {
            call_graph,
            pure,
            evaluator,
        }
    }

    /// The lattice value an operand evaluates to given the facts before its instruction.
    pub fn value_of(&self, operand: &Operand, fact: &ConstantMap) -> ConstantValue {
        match operand {
            Operand::Binary { op, left, right } => {
                let (Some(l), Some(r)) = (leaf_value(left, fact), leaf_value(right, fact)) else {
                    log::warn!("nested operand in `{op}` expression, treating as non-constant");
                    return ConstantValue::Bottom;
                };

                match (l, r) {
                    (ConstantValue::Bottom, _) | (_, ConstantValue::Bottom) => {
                        ConstantValue::Bottom
                    }
                    (ConstantValue::Top, _) | (_, ConstantValue::Top) => ConstantValue::Top,
                    (ConstantValue::Constant(l), ConstantValue::Constant(r)) => {
                        match op.apply(&l, &r) {
                            Some(lit) => ConstantValue::Constant(lit),
                            // Traps or kind mismatches never produce a value.
                            None => ConstantValue::Bottom,
                        }
                    }
                }
            }
            &Operand::Call { site, ref args } => self.call_value(site, args, fact),
            leaf => leaf_value(leaf, fact).unwrap_or(ConstantValue::Bottom),
        }
    }

    fn call_value(&self, site: CallSiteId, args: &[Operand], fact: &ConstantMap) -> ConstantValue {
        let mut literals = Vec::with_capacity(args.len());
        for arg in args {
            match leaf_value(arg, fact) {
                Some(ConstantValue::Constant(lit)) => literals.push(lit),
                Some(_) => return ConstantValue::Bottom,
                None => {
                    log::warn!("nested argument at call site {site}, treating as non-constant");
                    return ConstantValue::Bottom;
                }
            }
        }

        let targets = self.call_graph.targets(site);
        if targets.is_empty() {
            return ConstantValue::Bottom;
        }

        // Every possible target must agree on the same constant.
        let mut value = ConstantValue::Top;
        for &target in targets {
            if !self.pure.contains(target) {
                return ConstantValue::Bottom;
            }

            let result = match self.evaluator.evaluate(target, &literals) {
                Ok(lit) => ConstantValue::Constant(lit),
                Err(err) => {
                    log::debug!("could not evaluate {target} at call site {site}: {err}");
                    ConstantValue::Bottom
                }
            };

            value = value.meet(&result);
            if value == ConstantValue::Bottom {
                break;
            }
        }
        value
    }
}

/// The value of a `Literal` or `Var` operand, `None` for anything else.
fn leaf_value(operand: &Operand, fact: &ConstantMap) -> Option<ConstantValue> {
    match operand {
        Operand::Literal(lit) => Some(ConstantValue::Constant(lit.clone())),
        &Operand::Var(var) => Some(fact.get(var).clone()),
        _ => None,
    }
}

impl<'a> DataflowAnalysis for ConstantPropagation<'a> {
    type Fact = ConstantMap;

    const DIRECTION: Direction = Direction::Forward;

    fn boundary_fact(&self, procedure: &Procedure) -> ConstantMap {
        // Parameters hold whatever the caller passed.
        let mut fact = ConstantMap::new();
        for &param in &procedure.parameters {
            fact.set(param, ConstantValue::Bottom);
        }
        fact
    }

    fn initial_fact(&self, _: &Procedure) -> ConstantMap {
        ConstantMap::new()
    }

    fn meet(&self, into: &mut ConstantMap, other: &ConstantMap) {
        into.meet_with(other);
    }

    fn transfer(&self, _: InstId, inst: &Instruction, fact: &ConstantMap) -> ConstantMap {
        let mut out = fact.clone();
        match inst {
            &Instruction::Assign { dest, ref value } => {
                out.set(dest, self.value_of(value, fact));
            }
            &Instruction::GetField { dest, .. } | &Instruction::GetStatic { dest, .. } => {
                out.set(dest, ConstantValue::Bottom);
            }
            _ => {}
        }
        out
    }
}

/// Compute the constant facts before and after every instruction of `procedure`.
pub fn analyze(
    procedure: &Procedure,
    cfg: &ControlFlowGraph,
    pure: &PureSet,
    call_graph: &CallGraph,
    evaluator: &dyn Evaluate,
) -> DataflowResults<ConstantMap> {
    solve(
        &ConstantPropagation::new(call_graph, pure, evaluator),
        procedure,
        cfg,
    )
}

#[cfg(test)]
mod tests {
    use crate::{
        interpreter::EvalError,
        ir::{BinOp, ProcId, VarKind},
    };

    use super::*;

    fn values() -> Vec<ConstantValue> {
        vec![
            ConstantValue::Top,
            ConstantValue::Bottom,
            ConstantValue::Constant(Literal::Int(1)),
            ConstantValue::Constant(Literal::Int(2)),
            ConstantValue::Constant(Literal::Long(1)),
            ConstantValue::Constant(Literal::Double(f64::NAN)),
        ]
    }

    #[test]
    fn test_meet_laws() {
        let values = values();
        for a in &values {
            assert_eq!(&a.meet(a), a);
            assert_eq!(&ConstantValue::Top.meet(a), a);
            assert_eq!(ConstantValue::Bottom.meet(a), ConstantValue::Bottom);
            for b in &values {
                assert_eq!(a.meet(b), b.meet(a));
                for c in &values {
                    assert_eq!(a.meet(b).meet(c), a.meet(&b.meet(c)));
                }
            }
        }

        let one = ConstantValue::Constant(Literal::Int(1));
        let two = ConstantValue::Constant(Literal::Int(2));
        let long_one = ConstantValue::Constant(Literal::Long(1));
        assert_eq!(one.meet(&two), ConstantValue::Bottom);
        assert_eq!(one.meet(&long_one), ConstantValue::Bottom);
    }

    #[test]
    fn test_constant_map_is_sparse() {
        let mut proc = Procedure::new("f");
        let x = proc.add_variable("x", VarKind::Primitive);
        let y = proc.add_variable("y", VarKind::Primitive);

        let mut a = ConstantMap::new();
        a.set(x, ConstantValue::Constant(Literal::Int(3)));
        a.set(y, ConstantValue::Top);
        assert_eq!(a, {
            let mut m = ConstantMap::new();
            m.set(x, ConstantValue::Constant(Literal::Int(3)));
            m
        });

        let mut b = ConstantMap::new();
        b.set(x, ConstantValue::Constant(Literal::Int(4)));
        b.set(y, ConstantValue::Constant(Literal::Int(1)));

        a.meet_with(&b);
        assert_eq!(a.get(x), &ConstantValue::Bottom);
        assert_eq!(a.constant(y), Some(&Literal::Int(1)));
    }

    fn no_eval(_: ProcId, _: &[Literal]) -> Result<Literal, EvalError> {
        Err(EvalError::Native("unavailable".to_owned()))
    }

    #[test]
    fn test_loop_variable_is_not_constant() {
        let mut proc = Procedure::new("loop");
        let i = proc.add_variable("i", VarKind::Primitive);
        let k = proc.add_variable("k", VarKind::Primitive);

        let init_i = proc.push(Instruction::Assign {
            dest: i,
            value: Operand::Literal(Literal::Int(0)),
        });
        proc.push(Instruction::Assign {
            dest: k,
            value: Operand::Literal(Literal::Int(7)),
        });
        let head = proc.push(Instruction::Assign {
            dest: i,
            value: Operand::binary(BinOp::Add, i, k),
        });
        let branch = proc.push(Instruction::Branch {
            cond: Operand::binary(BinOp::LessThan, i, Literal::Int(100)),
            target: head,
        });
        let ret = proc.push(Instruction::Return(Some(Operand::Var(k))));

        let cfg = ControlFlowGraph::compute(&proc).unwrap();
        let call_graph = CallGraph::new();
        let pure = PureSet::default();
        let results = analyze(&proc, &cfg, &pure, &call_graph, &no_eval);

        assert_eq!(
            results.after(init_i).unwrap().constant(i),
            Some(&Literal::Int(0))
        );
        assert_eq!(results.after(head).unwrap().get(i), &ConstantValue::Bottom);
        assert_eq!(results.before(branch).unwrap().get(i), &ConstantValue::Bottom);
        assert_eq!(
            results.before(ret).unwrap().constant(k),
            Some(&Literal::Int(7))
        );
    }

    #[test]
    fn test_parameters_and_field_reads_are_bottom() {
        let mut proc = Procedure::new("f");
        let p = proc.add_parameter("p", VarKind::Primitive);
        let o = proc.add_variable("o", VarKind::Reference);
        let v = proc.add_variable("v", VarKind::Primitive);
        let w = proc.add_variable("w", VarKind::Primitive);

        let read = proc.push(Instruction::GetField {
            dest: v,
            object: Operand::Var(o),
            field: "f".to_owned(),
        });
        let sum = proc.push(Instruction::Assign {
            dest: w,
            value: Operand::binary(BinOp::Add, p, Literal::Int(1)),
        });

        let cfg = ControlFlowGraph::compute(&proc).unwrap();
        let call_graph = CallGraph::new();
        let pure = PureSet::default();
        let results = analyze(&proc, &cfg, &pure, &call_graph, &no_eval);

        assert_eq!(results.after(read).unwrap().get(v), &ConstantValue::Bottom);
        assert_eq!(results.after(sum).unwrap().get(w), &ConstantValue::Bottom);
        // Never assigned, so still unknown.
        assert_eq!(results.after(sum).unwrap().get(o), &ConstantValue::Top);
    }
}
