use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use pureflow_analysis::{
    BinOp, CallGraph, CallSiteId, InstId, Instruction, Literal, Operand, ProcId, Procedure,
    ProcedureMap, Program, VarId, VarKind,
};
use serde::Deserialize;
use serde_json as json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed program: {0}")]
    Json(#[from] json::Error),
    #[error("procedure `{0}` is declared more than once")]
    DuplicateProcedure(String),
    #[error("no procedure named `{0}`")]
    UnknownProcedure(String),
    #[error("external procedure `{0}` has a body")]
    ExternalBody(String),
    #[error("variable `{name}` is declared more than once in `{procedure}`")]
    DuplicateVariable { procedure: String, name: String },
    #[error("no variable named `{name}` in `{procedure}`")]
    UnknownVariable { procedure: String, name: String },
    #[error("label `{label}` is declared more than once in `{procedure}`")]
    DuplicateLabel { procedure: String, label: String },
    #[error("no label named `{label}` in `{procedure}`")]
    UnknownLabel { procedure: String, label: String },
}

/// Read a program from a JSON file.
pub fn load_program(path: impl AsRef<Path>) -> Result<Program, LoadError> {
    let desc: ProgramDesc = json::from_reader(BufReader::new(File::open(path)?))?;
    build_program(desc)
}

pub fn parse_program(source: &str) -> Result<Program, LoadError> {
    build_program(json::from_str(source)?)
}

#[derive(Debug, Deserialize)]
struct ProgramDesc {
    procedures: Vec<ProcedureDesc>,
    /// Defaults to the procedure named `main`, if there is one.
    #[serde(default)]
    entries: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ProcedureDesc {
    name: String,
    #[serde(default)]
    external: bool,
    #[serde(default)]
    params: Vec<VariableDesc>,
    #[serde(default)]
    locals: Vec<VariableDesc>,
    #[serde(default)]
    body: Vec<InstructionDesc>,
}

#[derive(Debug, Deserialize)]
struct VariableDesc {
    name: String,
    #[serde(default)]
    kind: KindDesc,
}

#[derive(Debug, Copy, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindDesc {
    #[default]
    Primitive,
    Reference,
}

impl From<KindDesc> for VarKind {
    fn from(kind: KindDesc) -> Self {
        match kind {
            KindDesc::Primitive => VarKind::Primitive,
            KindDesc::Reference => VarKind::Reference,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstructionDesc {
    #[serde(default)]
    label: Option<String>,
    #[serde(flatten)]
    kind: InstructionKindDesc,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum InstructionKindDesc {
    #[serde(rename = "nop")]
    NoOp,
    Assign {
        dest: String,
        value: OperandDesc,
    },
    Call {
        targets: Vec<String>,
        #[serde(default)]
        args: Vec<OperandDesc>,
    },
    GetField {
        dest: String,
        object: OperandDesc,
        field: String,
    },
    SetField {
        object: OperandDesc,
        field: String,
        value: OperandDesc,
    },
    GetStatic {
        dest: String,
        field: String,
    },
    SetStatic {
        field: String,
        value: OperandDesc,
    },
    Jump {
        target: String,
    },
    Branch {
        cond: OperandDesc,
        target: String,
    },
    Return {
        #[serde(default)]
        value: Option<OperandDesc>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OperandDesc {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Null,
    Var(String),
    Binary {
        op: BinOpDesc,
        left: Box<OperandDesc>,
        right: Box<OperandDesc>,
    },
    Call {
        targets: Vec<String>,
        #[serde(default)]
        args: Vec<OperandDesc>,
    },
}

#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BinOpDesc {
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
    #[serde(alias = "eq")]
    Equal,
    #[serde(alias = "ne")]
    NotEqual,
    #[serde(alias = "lt")]
    LessThan,
    #[serde(alias = "le")]
    LessEqual,
    #[serde(alias = "gt")]
    GreaterThan,
    #[serde(alias = "ge")]
    GreaterEqual,
}

impl From<BinOpDesc> for BinOp {
    fn from(op: BinOpDesc) -> Self {
        match op {
            BinOpDesc::Add => BinOp::Add,
            BinOpDesc::Sub => BinOp::Sub,
            BinOpDesc::Mul => BinOp::Mul,
            BinOpDesc::Div => BinOp::Div,
            BinOpDesc::Rem => BinOp::Rem,
            BinOpDesc::Shl => BinOp::Shl,
            BinOpDesc::Shr => BinOp::Shr,
            BinOpDesc::Ushr => BinOp::Ushr,
            BinOpDesc::And => BinOp::And,
            BinOpDesc::Or => BinOp::Or,
            BinOpDesc::Xor => BinOp::Xor,
            BinOpDesc::Cmp => BinOp::Cmp,
            BinOpDesc::Cmpl => BinOp::Cmpl,
            BinOpDesc::Cmpg => BinOp::Cmpg,
            BinOpDesc::Equal => BinOp::Equal,
            BinOpDesc::NotEqual => BinOp::NotEqual,
            BinOpDesc::LessThan => BinOp::LessThan,
            BinOpDesc::LessEqual => BinOp::LessEqual,
            BinOpDesc::GreaterThan => BinOp::GreaterThan,
            BinOpDesc::GreaterEqual => BinOp::GreaterEqual,
        }
    }
}

fn build_program(desc: ProgramDesc) -> Result<Program, LoadError> {
    let mut procedures = ProcedureMap::new();
    let mut by_name = HashMap::new();
    let mut scopes = Vec::with_capacity(desc.procedures.len());

    // Every procedure is declared before any body is built, so calls may refer forward.
    for proc_desc in &desc.procedures {
        if by_name.contains_key(proc_desc.name.as_str()) {
            return Err(LoadError::DuplicateProcedure(proc_desc.name.clone()));
        }
        if proc_desc.external && !proc_desc.body.is_empty() {
            return Err(LoadError::ExternalBody(proc_desc.name.clone()));
        }

        let mut procedure = Procedure::new(proc_desc.name.as_str());
        procedure.external = proc_desc.external;

        let mut vars = HashMap::new();
        let declared = proc_desc
            .params
            .iter()
            .map(|v| (v, true))
            .chain(proc_desc.locals.iter().map(|v| (v, false)));
        for (var, is_param) in declared {
            if vars.contains_key(var.name.as_str()) {
                return Err(LoadError::DuplicateVariable {
                    procedure: proc_desc.name.clone(),
                    name: var.name.clone(),
                });
            }
            let var_id = if is_param {
                procedure.add_parameter(var.name.as_str(), var.kind.into())
            } else {
                procedure.add_variable(var.name.as_str(), var.kind.into())
            };
            vars.insert(var.name.as_str(), var_id);
        }

        let proc_id = procedures.insert(procedure);
        by_name.insert(proc_desc.name.as_str(), proc_id);
        scopes.push((proc_id, vars));
    }

    let mut call_graph = CallGraph::new();
    for (proc_desc, (proc_id, vars)) in desc.procedures.iter().zip(&scopes) {
        let procedure = &mut procedures[*proc_id];

        // Allocate every instruction up front so that jumps may target later labels.
        let mut labels = HashMap::new();
        let mut slots = Vec::with_capacity(proc_desc.body.len());
        for inst in &proc_desc.body {
            let inst_id = procedure.push(Instruction::NoOp);
            if let Some(label) = &inst.label {
                if labels.insert(label.as_str(), inst_id).is_some() {
                    return Err(LoadError::DuplicateLabel {
                        procedure: proc_desc.name.clone(),
                        label: label.clone(),
                    });
                }
            }
            slots.push(inst_id);
        }

        let mut scope = Scope {
            procedure: &proc_desc.name,
            caller: *proc_id,
            by_name: &by_name,
            vars,
            labels: &labels,
            call_graph: &mut call_graph,
        };
        for (inst, inst_id) in proc_desc.body.iter().zip(slots) {
            procedure.instructions[inst_id] = scope.instruction(&inst.kind)?;
        }
    }

    let entries = match desc.entries {
        Some(names) => names
            .iter()
            .map(|name| {
                by_name
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| LoadError::UnknownProcedure(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => by_name.get("main").copied().into_iter().collect(),
    };

    log::debug!(
        "loaded {} procedures with {} call sites",
        procedures.len(),
        call_graph.len()
    );

    Ok(Program {
        procedures,
        call_graph,
        entries,
    })
}

struct Scope<'a> {
    procedure: &'a str,
    caller: ProcId,
    by_name: &'a HashMap<&'a str, ProcId>,
    vars: &'a HashMap<&'a str, VarId>,
    labels: &'a HashMap<&'a str, InstId>,
    call_graph: &'a mut CallGraph,
}

impl<'a> Scope<'a> {
    fn instruction(&mut self, desc: &InstructionKindDesc) -> Result<Instruction, LoadError> {
        Ok(match desc {
            InstructionKindDesc::NoOp => Instruction::NoOp,
            InstructionKindDesc::Assign { dest, value } => Instruction::Assign {
                dest: self.var(dest)?,
                value: self.operand(value)?,
            },
            InstructionKindDesc::Call { targets, args } => {
                let (site, args) = self.call(targets, args)?;
                Instruction::Call { site, args }
            }
            InstructionKindDesc::GetField {
                dest,
                object,
                field,
            } => Instruction::GetField {
                dest: self.var(dest)?,
                object: self.operand(object)?,
                field: field.clone(),
            },
            InstructionKindDesc::SetField {
                object,
                field,
                value,
            } => Instruction::SetField {
                object: self.operand(object)?,
                field: field.clone(),
                value: self.operand(value)?,
            },
            InstructionKindDesc::GetStatic { dest, field } => Instruction::GetStatic {
                dest: self.var(dest)?,
                field: field.clone(),
            },
            InstructionKindDesc::SetStatic { field, value } => Instruction::SetStatic {
                field: field.clone(),
                value: self.operand(value)?,
            },
            InstructionKindDesc::Jump { target } => Instruction::Jump(self.label(target)?),
            InstructionKindDesc::Branch { cond, target } => Instruction::Branch {
                cond: self.operand(cond)?,
                target: self.label(target)?,
            },
            InstructionKindDesc::Return { value } => Instruction::Return(
                value
                    .as_ref()
                    .map(|value| self.operand(value))
                    .transpose()?,
            ),
        })
    }

    fn operand(&mut self, desc: &OperandDesc) -> Result<Operand, LoadError> {
        Ok(match desc {
            &OperandDesc::Int(i) => Operand::Literal(Literal::Int(i)),
            &OperandDesc::Long(l) => Operand::Literal(Literal::Long(l)),
            &OperandDesc::Float(f) => Operand::Literal(Literal::Float(f)),
            &OperandDesc::Double(d) => Operand::Literal(Literal::Double(d)),
            OperandDesc::String(s) => Operand::Literal(Literal::String(s.clone())),
            OperandDesc::Null => Operand::Literal(Literal::Null),
            OperandDesc::Var(name) => Operand::Var(self.var(name)?),
            OperandDesc::Binary { op, left, right } => Operand::Binary {
                op: (*op).into(),
                left: Box::new(self.operand(left)?),
                right: Box::new(self.operand(right)?),
            },
            OperandDesc::Call { targets, args } => {
                let (site, args) = self.call(targets, args)?;
                Operand::Call { site, args }
            }
        })
    }

    /// Resolve the candidate targets of a call and allocate a fresh call site for it.
    fn call(
        &mut self,
        targets: &[String],
        args: &[OperandDesc],
    ) -> Result<(CallSiteId, Vec<Operand>), LoadError> {
        let targets = targets
            .iter()
            .map(|name| {
                self.by_name
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| LoadError::UnknownProcedure(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let args = args
            .iter()
            .map(|arg| self.operand(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let site = self.call_graph.add_site(self.caller, targets);
        Ok((site, args))
    }

    fn var(&self, name: &str) -> Result<VarId, LoadError> {
        self.vars
            .get(name)
            .copied()
            .ok_or_else(|| LoadError::UnknownVariable {
                procedure: self.procedure.to_owned(),
                name: name.to_owned(),
            })
    }

    fn label(&self, label: &str) -> Result<InstId, LoadError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| LoadError::UnknownLabel {
                procedure: self.procedure.to_owned(),
                label: label.to_owned(),
            })
    }
}
