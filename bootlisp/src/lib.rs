// bootlisp - a small homoiconic language and its tree-walking evaluator

pub mod config;
pub mod input_handling;
pub mod parser;
pub mod runtime;

pub use config::InterpreterConfig;
pub use parser::{read, ReadError};
pub use runtime::{Evaluator, RuntimeError, RuntimeResult, Value};
