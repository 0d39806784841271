// bootlisp Interactive REPL
// Line-editing read-eval-print loop over one evaluator instance

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::thread;
use tracing_subscriber::EnvFilter;
use yansi::Paint;

use bootlisp::{
    runtime::batch::{self, BatchError, BatchOptions},
    runtime::ffi,
    Evaluator, InterpreterConfig,
};

const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "bootlisp-repl")]
#[command(about = "Interactive bootlisp REPL")]
struct Args {
    /// Interpreter settings in TOML
    #[arg(short, long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Do not register the C library foreign functions
    #[arg(long)]
    no_libc: bool,

    /// History file
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let default = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("BOOTLISP_LOG").unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => match InterpreterConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        None => InterpreterConfig::default(),
    };

    // deep programs need more host stack than the main thread has
    let worker = thread::Builder::new()
        .name("bootlisp-repl".to_string())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || repl(config, args));
    match worker.map(|handle| handle.join()) {
        Ok(Ok(())) => {}
        Ok(Err(_)) => std::process::exit(1),
        Err(e) => {
            eprintln!("Failed to start REPL thread: {}", e);
            std::process::exit(1);
        }
    }
}

fn repl(config: InterpreterConfig, args: Args) {
    let mut evaluator = Evaluator::new(config);
    if !args.no_libc {
        for function in ffi::libc_functions() {
            if let Err(e) = evaluator.define_foreign(function) {
                tracing::warn!("failed to register foreign function: {}", e);
            }
        }
    }

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Failed to start line editor: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(history) = &args.history {
        // a missing history file is normal on first start
        let _ = editor.load_history(history);
    }

    let mut options = BatchOptions::from_evaluator(&evaluator);
    options.print_results = true;
    options.color = io::stdout().is_terminal();

    println!("bootlisp REPL. Ctrl-D to exit.");
    loop {
        match editor.readline("bootlisp> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                // each form on the line is evaluated on its own, like a batch file
                let stdout = io::stdout();
                let mut out = stdout.lock();
                match batch::eval_text(&mut evaluator, &line, &options, &mut out) {
                    Ok(_) => {}
                    Err(BatchError::Fatal(_)) => {
                        eprintln!("{} rest of the line skipped", "FATAL:".red().bold());
                    }
                    Err(e) => eprintln!("{} {}", "ERROR:".red().bold(), e),
                }
                let _ = out.flush();
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    if let Some(history) = &args.history {
        if let Err(e) = editor.save_history(history) {
            tracing::warn!("failed to save history: {}", e);
        }
    }
}
