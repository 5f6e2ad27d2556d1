use std::{fs, path::PathBuf, process::ExitCode, time::Instant};

use clap::Parser;
use pyrite::{Interpreter, LogTracer, Program, ResourceLimits, StdInput, StdPrint};
use tracing_subscriber::EnvFilter;

/// Runs a compiled pyrite program stored as JSON.
#[derive(Debug, Parser)]
#[command(name = "pyrite", version, about, long_about = None)]
struct CliArgs {
    /// Compiled program (JSON form of `pyrite::Program`)
    #[arg(value_name = "FILE")]
    program: PathBuf,

    /// Module to run; defaults to the first module of the program
    #[arg(long, value_name = "NAME")]
    module: Option<String>,

    /// Maximum number of active function frames
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Abort the run with `TimeoutError` after this many instructions
    #[arg(long, value_name = "N")]
    max_instructions: Option<u64>,

    /// Log every executed instruction through `tracing`
    #[arg(long)]
    trace: bool,
}

impl CliArgs {
    fn limits(&self) -> ResourceLimits {
        let mut limits = ResourceLimits::new();
        if let Some(depth) = self.max_depth {
            limits = limits.max_call_depth(depth);
        }
        if let Some(instructions) = self.max_instructions {
            limits = limits.max_instructions(instructions);
        }
        limits
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let program = match read_program(&args.program) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let Some(module) = args
        .module
        .clone()
        .or_else(|| program.modules.keys().next().cloned())
    else {
        eprintln!("error: {} contains no modules", args.program.display());
        return ExitCode::FAILURE;
    };

    let mut interpreter = Interpreter::with_limits(program, args.limits());
    interpreter.set_print_writer(StdPrint);
    interpreter.set_input_reader(StdInput);
    if args.trace {
        interpreter.set_tracer(LogTracer);
    }

    let start = Instant::now();
    if let Err(err) = interpreter.run_module(&module) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    let elapsed = start.elapsed();
    tracing::debug!(?elapsed, module, "run complete");

    match interpreter.unhandled_exception() {
        Some(exception) => {
            eprintln!("Traceback (unhandled exception):\n{exception}");
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}

fn read_program(path: &PathBuf) -> Result<Program, String> {
    let text = fs::read_to_string(path).map_err(|err| format!("reading {}: {err}", path.display()))?;
    Program::from_json(&text).map_err(|err| format!("parsing {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn flags_map_onto_limits() {
        let args = CliArgs::try_parse_from([
            "pyrite",
            "program.json",
            "--module",
            "main",
            "--max-depth",
            "50",
            "--max-instructions",
            "1000",
            "--trace",
        ])
        .unwrap();
        assert_eq!(args.module.as_deref(), Some("main"));
        assert!(args.trace);
        let limits = args.limits();
        assert_eq!(limits.max_call_depth, 50);
        assert_eq!(limits.max_instructions, Some(1000));
    }

    #[test]
    fn defaults_keep_the_standard_limits() {
        let args = CliArgs::try_parse_from(["pyrite", "program.json"]).unwrap();
        assert_eq!(args.limits(), ResourceLimits::default());
        assert!(args.module.is_none());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(CliArgs::try_parse_from(["pyrite", "program.json", "--max-depth", "many"]).is_err());
        assert!(CliArgs::try_parse_from(["pyrite"]).is_err());
    }
}
