// Error handling for the bootlisp runtime

use std::fmt;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Unrecoverable evaluator conditions. These abort the whole batch, not just the
/// current top-level form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    #[error("Stack overflow (capacity {capacity}).")]
    StackOverflow { capacity: usize },

    #[error("Stack underflow.")]
    StackUnderflow,

    #[error("Out of function trace stack (capacity {capacity}).")]
    TraceOverflow { capacity: usize },

    #[error("Evaluation nested too deeply (limit {limit}).")]
    DepthExceeded { limit: usize },
}

/// Errors that can occur while evaluating a top-level form.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// A special form with missing, extra or ill-typed parts
    Malformed { message: String, form: String },

    /// Symbol with no reachable binding
    UnboundSymbol(String),

    /// `reset!` on a name that has no binding cell
    UnboundReset(String),

    /// No clause of a `match` form accepted the scrutinee
    NoMatch(String),

    /// Value is not callable
    NotCallable(String),

    /// Arity mismatch (wrong number of arguments)
    ArityMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Type errors (wrong type for operation)
    TypeError {
        expected: String,
        actual: String,
        operation: String,
    },

    /// Keyword lookup on a dictionary that lacks the key
    KeyNotFound { key: String },

    /// Foreign function declared without a native entry point
    ForeignUnbound(String),

    /// Foreign function called with more arguments than its signature declares
    ForeignTooManyArgs(String),

    /// Foreign function called with fewer arguments than its signature declares
    ForeignTooFewArgs(String),

    /// Declared foreign argument or return type the bridge cannot marshal
    UnsupportedForeignType(String),

    /// Division by zero
    DivisionByZero,

    /// Checked integer arithmetic overflowed
    IntegerOverflow(String),

    /// Invalid argument errors
    InvalidArgument(String),

    /// Environment or binding id that was reclaimed by the collector
    StaleHandle(String),

    /// Raised from user code via the `error` primitive
    User(String),

    /// Source text handed to the evaluator did not read
    Read(String),

    Generic(String),

    Fatal(FatalError),
}

impl RuntimeError {
    pub fn new(message: &str) -> RuntimeError {
        RuntimeError::Generic(message.to_string())
    }

    pub fn malformed(message: impl Into<String>, form: impl fmt::Display) -> RuntimeError {
        RuntimeError::Malformed {
            message: message.into(),
            form: form.to_string(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RuntimeError::Fatal(_))
    }
}

impl From<FatalError> for RuntimeError {
    fn from(e: FatalError) -> Self {
        RuntimeError::Fatal(e)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Malformed { message, form } => write!(f, "{} {}", message, form),
            RuntimeError::UnboundSymbol(name) => {
                write!(f, "Can't find '{}' in environment.", name)
            }
            RuntimeError::UnboundReset(name) => {
                write!(f, "Can't reset! binding '{}', it is not bound.", name)
            }
            RuntimeError::NoMatch(value) => {
                write!(f, "Failed to find a suitable match for: {}", value)
            }
            RuntimeError::NotCallable(value) => write!(f, "Can't call non-function: {}", value),
            RuntimeError::ArityMismatch {
                function,
                expected,
                actual,
            } => write!(
                f,
                "Arity mismatch in {}: expected {}, got {}",
                function, expected, actual
            ),
            RuntimeError::TypeError {
                expected,
                actual,
                operation,
            } => write!(
                f,
                "Type error in {}: expected {}, got {}",
                operation, expected, actual
            ),
            RuntimeError::KeyNotFound { key } => write!(f, "Failed to lookup keyword '{}'", key),
            RuntimeError::ForeignUnbound(name) => write!(
                f,
                "Can't call foreign function '{}', it has no native entry point. May be a stub function with just a signature?",
                name
            ),
            RuntimeError::ForeignTooManyArgs(name) => write!(f, "Too many arguments to {}", name),
            RuntimeError::ForeignTooFewArgs(name) => write!(f, "Too few arguments to {}", name),
            RuntimeError::UnsupportedForeignType(ty) => {
                write!(f, "Unsupported foreign type: {}", ty)
            }
            RuntimeError::DivisionByZero => write!(f, "Division by zero"),
            RuntimeError::IntegerOverflow(op) => write!(f, "Integer overflow in {}", op),
            RuntimeError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            RuntimeError::StaleHandle(what) => write!(f, "Stale handle: {}", what),
            RuntimeError::User(msg) => write!(f, "{}", msg),
            RuntimeError::Read(msg) => write!(f, "{}", msg),
            RuntimeError::Generic(message) => write!(f, "Runtime error: {}", message),
            RuntimeError::Fatal(e) => write!(f, "Fatal: {}", e),
        }
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_flagged() {
        let err: RuntimeError = FatalError::StackUnderflow.into();
        assert!(err.is_fatal());
        assert!(!RuntimeError::DivisionByZero.is_fatal());
    }

    #[test]
    fn messages_follow_the_diagnostic_wording() {
        assert_eq!(
            RuntimeError::UnboundSymbol("foo".to_string()).to_string(),
            "Can't find 'foo' in environment."
        );
        assert_eq!(
            RuntimeError::malformed("No body in 'let' form.", "(let (a 1))").to_string(),
            "No body in 'let' form. (let (a 1))"
        );
    }
}
