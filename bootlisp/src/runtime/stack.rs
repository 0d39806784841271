// Evaluation stack and call trace shared by every step of one top-level evaluation.

use crate::runtime::error::{FatalError, RuntimeResult};
use crate::runtime::values::Value;
use std::fmt::Write;
use tracing::trace;

/// Bounded LIFO of intermediate results. Each successful evaluation step leaves
/// exactly one value on it.
#[derive(Debug)]
pub struct EvalStack {
    values: Vec<Value>,
    capacity: usize,
    log: bool,
}

impl EvalStack {
    pub fn new(capacity: usize) -> Self {
        EvalStack {
            values: Vec::with_capacity(capacity.min(1024)),
            capacity,
            log: false,
        }
    }

    /// Emits a trace event for every push and pop.
    pub fn set_logging(&mut self, log: bool) {
        self.log = log;
    }

    pub fn push(&mut self, value: Value) -> RuntimeResult<()> {
        if self.values.len() >= self.capacity {
            return Err(FatalError::StackOverflow {
                capacity: self.capacity,
            }
            .into());
        }
        if self.log {
            trace!(depth = self.values.len() + 1, "pushing {}", value);
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> RuntimeResult<Value> {
        let value = self.values.pop().ok_or(FatalError::StackUnderflow)?;
        if self.log {
            trace!(depth = self.values.len(), "popping {}", value);
        }
        Ok(value)
    }

    /// Pops the `count` most recent values, returned in push order.
    pub fn pop_n(&mut self, count: usize) -> RuntimeResult<Vec<Value>> {
        if count > self.values.len() {
            return Err(FatalError::StackUnderflow.into());
        }
        let start = self.values.len() - count;
        Ok(self.values.split_off(start))
    }

    pub fn depth(&self) -> usize {
        self.values.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn render(&self) -> String {
        let mut out = String::from("----- STACK -----\n");
        for (i, value) in self.values.iter().enumerate() {
            let _ = writeln!(out, "{}\t{}", i, value);
        }
        out.push_str("-----  END  -----\n");
        out
    }
}

/// Bounded record of the call forms currently being applied, innermost last.
#[derive(Debug)]
pub struct CallTrace {
    entries: Vec<String>,
    capacity: usize,
    entry_len: usize,
}

impl CallTrace {
    pub fn new(capacity: usize, entry_len: usize) -> Self {
        CallTrace {
            entries: Vec::new(),
            capacity,
            entry_len,
        }
    }

    /// Records a snapshot of `form`, truncated to the configured entry length.
    pub fn push(&mut self, form: &Value) -> RuntimeResult<()> {
        if self.entries.len() >= self.capacity {
            return Err(FatalError::TraceOverflow {
                capacity: self.capacity,
            }
            .into());
        }
        let mut snapshot = form.to_string();
        truncate_at_char_boundary(&mut snapshot, self.entry_len.saturating_sub(1));
        self.entries.push(snapshot);
        Ok(())
    }

    pub fn pop(&mut self) {
        self.entries.pop();
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Innermost call first, each line prefixed with its depth.
    pub fn render(&self) -> String {
        let mut out = String::from("     -----------------\n");
        for (i, entry) in self.entries.iter().enumerate().rev() {
            let _ = writeln!(out, "{:3}  {}", i, entry);
        }
        out.push_str("     -----------------\n");
        out
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
