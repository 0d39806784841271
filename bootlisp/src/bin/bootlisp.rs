// bootlisp batch interpreter
// Reads a program from a file, a string or stdin and evaluates it form by form

use clap::Parser;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use tracing_subscriber::EnvFilter;

use bootlisp::{
    input_handling::{
        read_input_content, validate_input_args, InputConfig, InputContent, InputSource,
    },
    runtime::{batch, ffi},
    Evaluator, InterpreterConfig,
};

#[derive(Parser)]
#[command(name = "bootlisp")]
#[command(about = "Evaluate bootlisp programs")]
#[command(version)]
struct Args {
    /// Input source type
    #[arg(short = 'i', long, value_enum, default_value_t = InputSource::File)]
    input: InputSource,

    /// Source file (when using --input file)
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Source text (when using --input string)
    #[arg(short = 's', long = "string")]
    string: Option<String>,

    /// Source file (positional argument, alternative to --file)
    #[arg(value_name = "FILE", conflicts_with = "file")]
    input_file: Option<PathBuf>,

    /// Print the result of every top-level form
    #[arg(short, long)]
    print: bool,

    /// Interpreter settings in TOML
    #[arg(short, long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Do not register the C library foreign functions
    #[arg(long)]
    no_libc: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("BOOTLISP_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let file_path = args.file.or(args.input_file);
    let input = if args.string.is_some() && args.input == InputSource::File && file_path.is_none() {
        InputSource::String
    } else {
        args.input
    };
    if let Err(e) = validate_input_args(input, &file_path, &args.string) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }
    let input_config = match input {
        InputSource::File => InputConfig::from_file(file_path.unwrap_or_default()),
        InputSource::String => InputConfig::from_string(args.string.unwrap_or_default()),
        InputSource::Pipe => InputConfig::from_pipe(),
    };
    let content = match read_input_content(&input_config) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut config = match &args.config {
        Some(path) => match InterpreterConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => InterpreterConfig::default(),
    };
    if args.print {
        config.print_results = true;
    }

    // every nested evaluation is a host stack frame; give deep programs room
    let no_libc = args.no_libc;
    let worker = thread::Builder::new()
        .name("bootlisp-eval".to_string())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || run_batch(config, content, no_libc));
    match worker.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Failed to start evaluator thread: {}", e);
            ExitCode::FAILURE
        }
    }
}

const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;

fn run_batch(config: InterpreterConfig, content: InputContent, no_libc: bool) -> ExitCode {
    let mut evaluator = Evaluator::new(config);
    if !no_libc {
        for function in ffi::libc_functions() {
            if let Err(e) = evaluator.define_foreign(function) {
                tracing::warn!("failed to register foreign function: {}", e);
            }
        }
    }

    let mut options = batch::BatchOptions::from_evaluator(&evaluator);
    options.color = io::stdout().is_terminal();
    tracing::debug!(source = %content.source_name, "evaluating");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match batch::eval_text(&mut evaluator, &content.content, &options, &mut out) {
        Ok(summary) => {
            tracing::debug!(
                evaluated = summary.evaluated,
                errors = summary.errors,
                "batch finished"
            );
            ExitCode::SUCCESS
        }
        Err(batch::BatchError::Fatal(_)) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {}", content.source_name, e);
            ExitCode::FAILURE
        }
    }
}
