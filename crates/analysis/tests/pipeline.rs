use pureflow_analysis::{
    BinOp, CallSiteId, EvalError, ImpurityReason, Instruction, Literal, Operand,
    OptimizeSettings, ProcId, Procedure, ProcedureVerificationError, Program, VarKind,
    optimize_program, optimize_program_with,
};

struct Builder {
    program: Program,
}

impl Builder {
    fn new() -> Self {
        Self {
            program: Program::default(),
        }
    }

    fn procedure(&mut self, name: &str) -> ProcId {
        self.program.procedures.insert(Procedure::new(name))
    }

    fn entry(&mut self, name: &str) -> ProcId {
        let proc_id = self.procedure(name);
        self.program.entries.push(proc_id);
        proc_id
    }

    fn print(&mut self) -> ProcId {
        self.program
            .procedures
            .insert(Procedure::external("print", [VarKind::Primitive]))
    }

    fn site(&mut self, caller: ProcId, targets: &[ProcId]) -> CallSiteId {
        self.program
            .call_graph
            .add_site(caller, targets.iter().copied())
    }

    fn get(&mut self, proc_id: ProcId) -> &mut Procedure {
        &mut self.program.procedures[proc_id]
    }

    fn listing(&self, proc_id: ProcId) -> String {
        let program = &self.program;
        program.procedures[proc_id]
            .display(&program.procedures, &program.call_graph)
            .to_string()
    }
}

#[test]
fn test_folds_arithmetic_into_effect() {
    let mut b = Builder::new();
    let print = b.print();
    let main = b.entry("main");
    let print_site = b.site(main, &[print]);

    let proc = b.get(main);
    let x = proc.add_variable("x", VarKind::Primitive);
    let y = proc.add_variable("y", VarKind::Primitive);
    let z = proc.add_variable("z", VarKind::Primitive);
    proc.push(Instruction::Assign {
        dest: x,
        value: Operand::Literal(Literal::Int(2)),
    });
    proc.push(Instruction::Assign {
        dest: y,
        value: Operand::Literal(Literal::Int(3)),
    });
    proc.push(Instruction::Assign {
        dest: z,
        value: Operand::binary(BinOp::Add, x, y),
    });
    let call = proc.push(Instruction::Call {
        site: print_site,
        args: vec![Operand::Var(z)],
    });
    let ret = proc.push(Instruction::Return(None));

    let report = optimize_program(&mut b.program, OptimizeSettings::default());
    assert!(report.skipped.is_empty());
    assert_eq!(report.transformed.len(), 1);
    assert_eq!(report.transformed[0].stats.removed, 3);

    let proc = &b.program.procedures[main];
    assert_eq!(proc.body, vec![call, ret]);
    assert_eq!(
        proc.instructions[call],
        Instruction::Call {
            site: print_site,
            args: vec![Operand::Literal(Literal::Int(5))],
        }
    );
}

#[test]
fn test_pure_call_is_evaluated() {
    let mut b = Builder::new();
    let print = b.print();

    let square = b.procedure("square");
    let proc = b.get(square);
    let n = proc.add_parameter("n", VarKind::Primitive);
    proc.push(Instruction::Return(Some(Operand::binary(BinOp::Mul, n, n))));

    let main = b.entry("main");
    let square_site = b.site(main, &[square]);
    let print_site = b.site(main, &[print]);

    let proc = b.get(main);
    let a = proc.add_variable("a", VarKind::Primitive);
    let r = proc.add_variable("b", VarKind::Primitive);
    proc.push(Instruction::Assign {
        dest: a,
        value: Operand::Literal(Literal::Int(4)),
    });
    proc.push(Instruction::Assign {
        dest: r,
        value: Operand::call(square_site, [Operand::Var(a)]),
    });
    let call = proc.push(Instruction::Call {
        site: print_site,
        args: vec![Operand::Var(r)],
    });
    proc.push(Instruction::Return(None));

    let report = optimize_program(&mut b.program, OptimizeSettings::default());
    assert!(report.purity.is_pure(square));
    assert_eq!(
        report.purity.reason(main),
        Some(ImpurityReason::ExternalCallee(print))
    );

    let stats = report.transformed[0].stats;
    assert_eq!(stats.folded_uses, 2);
    assert_eq!(stats.removed, 2);

    assert_eq!(b.program.procedures[main].body.len(), 2);
    assert!(
        b.listing(main)
            .contains(&format!("{call}: call {print_site} [print](16)"))
    );
}

#[test]
fn test_disagreeing_targets_are_not_folded() {
    let mut b = Builder::new();
    let print = b.print();

    let mut offset = |name: &str, k: i32| {
        let proc_id = b.procedure(name);
        let proc = b.get(proc_id);
        let n = proc.add_parameter("n", VarKind::Primitive);
        proc.push(Instruction::Return(Some(Operand::binary(
            BinOp::Add,
            n,
            Literal::Int(k),
        ))));
        proc_id
    };
    let one = offset("A.f", 1);
    let two = offset("B.f", 2);

    let main = b.entry("main");
    let poly_site = b.site(main, &[one, two]);
    let print_site = b.site(main, &[print]);

    let proc = b.get(main);
    let r = proc.add_variable("r", VarKind::Primitive);
    let def = proc.push(Instruction::Assign {
        dest: r,
        value: Operand::call(poly_site, [Operand::Literal(Literal::Int(3))]),
    });
    let call = proc.push(Instruction::Call {
        site: print_site,
        args: vec![Operand::Var(r)],
    });
    let before = b.listing(main);

    let report = optimize_program(&mut b.program, OptimizeSettings::default());
    assert!(report.purity.is_pure(one));
    assert!(report.purity.is_pure(two));
    assert_eq!(
        report.purity.reason(main),
        Some(ImpurityReason::PolymorphicCall(poly_site))
    );

    assert_eq!(b.program.procedures[main].body, vec![def, call]);
    assert_eq!(b.listing(main), before);
}

#[test]
fn test_unused_impure_call_is_kept() {
    let mut b = Builder::new();

    let bump = b.procedure("bump");
    let proc = b.get(bump);
    proc.push(Instruction::SetStatic {
        field: "counter".to_owned(),
        value: Operand::Literal(Literal::Int(1)),
    });
    proc.push(Instruction::Return(Some(Operand::Literal(Literal::Int(1)))));

    let main = b.entry("main");
    let bump_site = b.site(main, &[bump]);
    let proc = b.get(main);
    let unused = proc.add_variable("unused", VarKind::Primitive);
    let call = proc.push(Instruction::Assign {
        dest: unused,
        value: Operand::call(bump_site, []),
    });
    let ret = proc.push(Instruction::Return(None));

    let report = optimize_program(&mut b.program, OptimizeSettings::default());
    assert!(!report.purity.is_pure(bump));
    assert_eq!(report.transformed[0].stats.removed, 0);
    assert_eq!(b.program.procedures[main].body, vec![call, ret]);
}

#[test]
fn test_custom_evaluator_and_skipped_procedures() {
    let mut b = Builder::new();

    let answer = b.procedure("answer");
    b.get(answer)
        .push(Instruction::Return(Some(Operand::Literal(Literal::Int(0)))));

    let main = b.entry("main");
    let answer_site = b.site(main, &[answer]);
    let proc = b.get(main);
    let v = proc.add_variable("v", VarKind::Primitive);
    proc.push(Instruction::Assign {
        dest: v,
        value: Operand::call(answer_site, []),
    });
    let ret = proc.push(Instruction::Return(Some(Operand::Var(v))));

    // Uses a call site that belongs to `main`.
    let broken = b.entry("broken");
    b.get(broken).push(Instruction::Call {
        site: answer_site,
        args: Vec::new(),
    });

    let evaluator = |_: ProcId, _: &[Literal]| -> Result<Literal, EvalError> {
        Ok(Literal::Int(42))
    };
    let report = optimize_program_with(&mut b.program, &evaluator, OptimizeSettings::default());

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, broken);
    assert!(matches!(
        report.skipped[0].1,
        ProcedureVerificationError::ForeignCallSite { site, .. } if site == answer_site
    ));

    let proc = &b.program.procedures[main];
    assert_eq!(proc.body, vec![ret]);
    assert_eq!(
        proc.instructions[ret],
        Instruction::Return(Some(Operand::Literal(Literal::Int(42))))
    );
}

#[test]
fn test_parallel_matches_sequential() {
    let mut b = Builder::new();
    let print = b.print();

    let mut names = Vec::new();
    for i in 0..8 {
        let proc_id = b.procedure(&format!("f{i}"));
        let print_site = b.site(proc_id, &[print]);
        let proc = b.get(proc_id);
        let p = proc.add_parameter("p", VarKind::Primitive);
        let k = proc.add_variable("k", VarKind::Primitive);
        let t = proc.add_variable("t", VarKind::Primitive);
        proc.push(Instruction::Assign {
            dest: k,
            value: Operand::Literal(Literal::Int(i)),
        });
        proc.push(Instruction::Assign {
            dest: t,
            value: Operand::binary(BinOp::Mul, p, Literal::Int(2)),
        });
        proc.push(Instruction::Call {
            site: print_site,
            args: vec![Operand::Var(k)],
        });
        proc.push(Instruction::Call {
            site: print_site,
            args: vec![Operand::Var(t)],
        });
        proc.push(Instruction::Return(None));
        names.push(proc_id);
    }

    let mut sequential = b.program.clone();
    let mut parallel = b.program.clone();

    let report = optimize_program(
        &mut sequential,
        OptimizeSettings {
            parallel: false,
            ..OptimizeSettings::aggressive()
        },
    );
    assert_eq!(report.transformed.len(), 8);
    optimize_program(&mut parallel, OptimizeSettings::aggressive());

    for proc_id in names {
        let listing = |program: &Program| {
            program.procedures[proc_id]
                .display(&program.procedures, &program.call_graph)
                .to_string()
        };
        assert_eq!(listing(&sequential), listing(&parallel));
        assert_eq!(sequential.procedures[proc_id].body.len(), 4);
    }
}
