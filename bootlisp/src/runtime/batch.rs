// Batch mode: evaluate every form of a source text in turn.

use crate::parser::{self, ReadError};
use crate::runtime::error::RuntimeError;
use crate::runtime::evaluator::Evaluator;
use crate::runtime::heap::Roots;
use std::io::Write;
use tracing::debug;
use yansi::Paint;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("{0}")]
    Fatal(RuntimeError),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Print each successful result followed by a newline
    pub print_results: bool,
    /// Run the collector after every top-level form
    pub collect_garbage: bool,
    /// Colour the `ERROR:` line
    pub color: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            print_results: false,
            collect_garbage: true,
            color: false,
        }
    }
}

impl BatchOptions {
    pub fn from_evaluator(evaluator: &Evaluator) -> Self {
        BatchOptions {
            print_results: evaluator.config().print_results,
            collect_garbage: evaluator.config().collect_garbage,
            color: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub evaluated: usize,
    pub errors: usize,
}

/// Reads all of `text`, then evaluates the forms one after another in the global
/// environment. A recoverable error is reported to `out` with the call trace and
/// evaluation moves on to the next form; a fatal error dumps the evaluation stack
/// and call trace and ends the batch.
pub fn eval_text<W: Write>(
    evaluator: &mut Evaluator,
    text: &str,
    options: &BatchOptions,
    out: &mut W,
) -> Result<BatchSummary, BatchError> {
    let forms = parser::read(text, evaluator.heap_mut())?;
    let global = evaluator.global_env();
    let mut summary = BatchSummary::default();

    for (index, form) in forms.iter().enumerate() {
        summary.evaluated += 1;
        match evaluator.eval(global, form) {
            Ok(value) => {
                if options.print_results {
                    writeln!(out, "{}", evaluator.render(&value))?;
                }
            }
            Err(e) if e.is_fatal() => {
                writeln!(out, "{}", e)?;
                write!(out, "{}", evaluator.dump_stack())?;
                write!(out, "{}", evaluator.dump_trace())?;
                return Err(BatchError::Fatal(e));
            }
            Err(e) => {
                summary.errors += 1;
                let label = if options.color {
                    "ERROR:".red().bold().to_string()
                } else {
                    "ERROR:".to_string()
                };
                writeln!(out, "{} {}", label, e)?;
                write!(out, "{}", evaluator.dump_trace())?;
            }
        }
        if options.collect_garbage {
            let roots = Roots::new().values(&forms[index + 1..]);
            let stats = evaluator.collect(&roots);
            debug!(
                form = index,
                frames_freed = stats.frames_freed,
                cells_freed = stats.cells_freed,
                "collected after top-level form"
            );
        }
    }
    Ok(summary)
}
