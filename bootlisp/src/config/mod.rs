//! Interpreter configuration.
//!
//! Every field has a default, so a TOML file only needs the keys it overrides:
//!
//! ```toml
//! stack_capacity = 4096
//! print_results = true
//! show_macro_expansion = true
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Capacity of the evaluation stack
    pub stack_capacity: usize,
    /// Maximum number of nested calls recorded in the call trace
    pub trace_capacity: usize,
    /// Maximum nesting of form evaluations before a fatal error. Each level uses
    /// host stack, so raise it only together with the thread's stack size.
    pub max_eval_depth: usize,
    /// Maximum length in bytes of one call-trace snapshot
    pub trace_entry_len: usize,
    /// Print each top-level result in batch mode
    pub print_results: bool,
    /// Run the collector between top-level forms
    pub collect_garbage: bool,
    /// Log every evaluation stack push and pop
    pub log_stack: bool,
    /// Log each macro expansion before it is evaluated
    pub show_macro_expansion: bool,
    /// Log each call form as it is applied
    pub log_function_application: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            stack_capacity: 1024,
            trace_capacity: 256,
            max_eval_depth: 256,
            trace_entry_len: 256,
            print_results: false,
            collect_garbage: true,
            log_stack: false,
            show_macro_expansion: false,
            log_function_application: false,
        }
    }
}

impl InterpreterConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: InterpreterConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_capacity == 0 {
            return Err(ConfigError::Invalid(
                "stack_capacity must be at least 1".to_string(),
            ));
        }
        if self.trace_capacity == 0 {
            return Err(ConfigError::Invalid(
                "trace_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_eval_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_eval_depth must be at least 1".to_string(),
            ));
        }
        if self.trace_entry_len < 2 {
            return Err(ConfigError::Invalid(
                "trace_entry_len must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
