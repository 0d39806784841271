//! bootlisp runtime
//!
//! The tree-walking evaluator and everything it leans on: values, the heap of
//! environments, the evaluation stack and call trace, pattern matching, native
//! primitives, the foreign-call bridge and the batch driver.

pub mod apply;
pub mod batch;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod ffi;
pub mod heap;
pub mod pattern;
pub mod stack;
pub mod stdlib;
pub mod values;

pub use batch::{eval_text, BatchError, BatchOptions, BatchSummary};
pub use environment::Name;
pub use error::{FatalError, RuntimeError, RuntimeResult};
pub use evaluator::Evaluator;
pub use ffi::{CallBridge, CallInterface, DirectBridge, ForeignFunction, ForeignType};
pub use heap::{CollectStats, EnvId, Heap, Roots};
pub use values::{Primitive, Value};
