use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context as _, Error};
use clap::{Parser, Subcommand};
use pureflow_analysis::{EvalSettings, OptimizeSettings, Program, classify_purity, optimize_program};
use pureflow_cli::{load_program, purity_listing};

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fold constants and delete dead code, then print every rewritten procedure.
    Optimize {
        path: PathBuf,
        /// Transform every procedure with a body, not only the entry points.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        parallel: bool,
        #[arg(long)]
        no_verify_liveness: bool,
        /// Instruction budget for evaluating one pure call.
        #[arg(long, default_value_t = EvalSettings::default().fuel)]
        fuel: u64,
    },
    /// Print the purity verdict of every procedure.
    Purity { path: PathBuf },
    Dump { path: PathBuf },
}

fn main() -> Result<ExitCode, Error> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Optimize {
            path,
            all,
            parallel,
            no_verify_liveness,
            fuel,
        } => {
            let mut program = load(&path)?;
            let settings = OptimizeSettings {
                eval: EvalSettings {
                    fuel,
                    ..EvalSettings::default()
                },
                verify_liveness: !no_verify_liveness,
                transform_all: all,
                parallel,
            };

            let report = optimize_program(&mut program, settings);

            let mut pure = report
                .purity
                .pure_set()
                .iter()
                .filter_map(|p| program.procedures.get(p))
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>();
            pure.sort();
            println!("pure: [{}]", pure.join(", "));

            for proc_report in &report.transformed {
                let procedure = &program.procedures[proc_report.procedure];
                let stats = proc_report.stats;
                println!(
                    "\n==[{}: {} uses folded, {} removed, {} retargeted]==",
                    procedure.name, stats.folded_uses, stats.removed, stats.retargeted
                );
                print!(
                    "{}",
                    procedure.display(&program.procedures, &program.call_graph)
                );
            }

            for (proc_id, err) in &report.skipped {
                eprintln!("skipped `{}`: {err}", program.procedures[*proc_id].name);
            }

            Ok(if report.skipped.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Purity { path } => {
            let program = load(&path)?;
            let purity =
                classify_purity(&program.procedures, &program.call_graph, &program.entries);
            print!("{}", purity_listing(&program, &purity));
            Ok(ExitCode::SUCCESS)
        }
        Command::Dump { path } => {
            let program = load(&path)?;
            for (i, (_, procedure)) in program.procedures.iter().enumerate() {
                if i != 0 {
                    println!();
                }
                print!(
                    "{}",
                    procedure.display(&program.procedures, &program.call_graph)
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load(path: &Path) -> Result<Program, Error> {
    load_program(path).with_context(|| format!("could not load {}", path.display()))
}
