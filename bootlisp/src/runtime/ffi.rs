//! Foreign-function call bridge.
//!
//! A [`ForeignFunction`] pairs a declared signature (its [`CallInterface`]) with an
//! optional native entry point. Calling one marshals each dynamic argument into the
//! native representation demanded by the declared type, performs the call through a
//! [`CallBridge`], and converts the native result back according to the declared
//! return type. Signature mismatches are reported before any native code runs.

use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::values::Value;
use std::ffi::{c_float, c_int, c_void, CString};
use std::fmt;
use std::rc::Rc;

/// Opaque native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativePtr(pub *mut c_void);

impl NativePtr {
    pub fn null() -> Self {
        NativePtr(std::ptr::null_mut())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl fmt::Display for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<ptr {:p}>", self.0)
    }
}

/// A type named in a foreign signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignType {
    Int,
    Float,
    Bool,
    String,
    Void,
    /// `(:ptr Name)`; the name only documents what the handle points at.
    Pointer(Option<Rc<str>>),
}

impl ForeignType {
    /// Parses `:int`, `:float`, `:bool`, `:string`, `:void` or `(:ptr Name)`.
    pub fn from_value(value: &Value) -> RuntimeResult<Self> {
        match value {
            Value::Keyword(k) => match &**k {
                "int" => Ok(ForeignType::Int),
                "float" => Ok(ForeignType::Float),
                "bool" => Ok(ForeignType::Bool),
                "string" => Ok(ForeignType::String),
                "void" => Ok(ForeignType::Void),
                "ptr" => Ok(ForeignType::Pointer(None)),
                _ => Err(RuntimeError::UnsupportedForeignType(value.to_string())),
            },
            Value::Pair(p) if matches!(&p.head, Value::Keyword(k) if &**k == "ptr") => {
                let pointee = match p.tail.head() {
                    Value::Symbol(s) | Value::Keyword(s) => Some(s),
                    _ => None,
                };
                Ok(ForeignType::Pointer(pointee))
            }
            _ => Err(RuntimeError::UnsupportedForeignType(value.to_string())),
        }
    }
}

impl fmt::Display for ForeignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForeignType::Int => write!(f, ":int"),
            ForeignType::Float => write!(f, ":float"),
            ForeignType::Bool => write!(f, ":bool"),
            ForeignType::String => write!(f, ":string"),
            ForeignType::Void => write!(f, ":void"),
            ForeignType::Pointer(Some(name)) => write!(f, "(:ptr {})", name),
            ForeignType::Pointer(None) => write!(f, "(:ptr)"),
        }
    }
}

/// Native representation of one marshalled argument.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeArg {
    Int(c_int),
    Float(c_float),
    Str(CString),
    Ptr(NativePtr),
}

/// Native result of one call, written by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeReturn {
    Int(c_int),
    Float(c_float),
    /// `None` stands for a null `char*`.
    Str(Option<String>),
    Ptr(NativePtr),
    Void,
}

/// Prepared call descriptor: the declared argument and return types.
#[derive(Debug, Clone, PartialEq)]
pub struct CallInterface {
    args: Vec<ForeignType>,
    ret: ForeignType,
}

impl CallInterface {
    pub fn prepare(args: Vec<ForeignType>, ret: ForeignType) -> Self {
        CallInterface { args, ret }
    }

    /// Builds a descriptor from a list of type forms and a return type form.
    pub fn from_values(args: &Value, ret: &Value) -> RuntimeResult<Self> {
        let arg_forms = args.to_vec().ok_or_else(|| {
            RuntimeError::InvalidArgument(format!("argument types must be a list: {}", args))
        })?;
        let args = arg_forms
            .iter()
            .map(ForeignType::from_value)
            .collect::<RuntimeResult<Vec<_>>>()?;
        Ok(Self::prepare(args, ForeignType::from_value(ret)?))
    }

    pub fn arg_types(&self) -> &[ForeignType] {
        &self.args
    }

    pub fn return_type(&self) -> &ForeignType {
        &self.ret
    }
}

pub type NativeFn = Rc<dyn Fn(&[NativeArg]) -> NativeReturn>;

#[derive(Clone)]
pub struct ForeignFunction {
    name: Rc<str>,
    cif: CallInterface,
    entry: Option<NativeFn>,
}

impl ForeignFunction {
    pub fn new<F>(name: &str, cif: CallInterface, entry: F) -> Self
    where
        F: Fn(&[NativeArg]) -> NativeReturn + 'static,
    {
        ForeignFunction {
            name: Rc::from(name),
            cif,
            entry: Some(Rc::new(entry)),
        }
    }

    /// A declaration without a native entry point. Calling it is an error.
    pub fn signature_only(name: &str, cif: CallInterface) -> Self {
        ForeignFunction {
            name: Rc::from(name),
            cif,
            entry: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cif(&self) -> &CallInterface {
        &self.cif
    }

    pub fn entry(&self) -> Option<&NativeFn> {
        self.entry.as_ref()
    }
}

impl fmt::Debug for ForeignFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignFunction")
            .field("name", &self.name)
            .field("cif", &self.cif)
            .field("bound", &self.entry.is_some())
            .finish()
    }
}

/// Performs one native call given a prepared descriptor, an entry point and the
/// marshalled argument buffer.
pub trait CallBridge {
    fn call(
        &self,
        cif: &CallInterface,
        entry: &NativeFn,
        args: &[NativeArg],
    ) -> RuntimeResult<NativeReturn>;
}

/// Bridge that invokes Rust-side entry points directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectBridge;

impl CallBridge for DirectBridge {
    fn call(
        &self,
        _cif: &CallInterface,
        entry: &NativeFn,
        args: &[NativeArg],
    ) -> RuntimeResult<NativeReturn> {
        Ok(entry(args))
    }
}

/// Marshals `args` against the declared signature of `function`.
pub fn marshal_args(function: &ForeignFunction, args: &[Value]) -> RuntimeResult<Vec<NativeArg>> {
    let declared = function.cif.arg_types();
    if args.len() > declared.len() {
        return Err(RuntimeError::ForeignTooManyArgs(function.name.to_string()));
    }
    if args.len() < declared.len() {
        return Err(RuntimeError::ForeignTooFewArgs(function.name.to_string()));
    }
    declared
        .iter()
        .zip(args)
        .map(|(ty, arg)| marshal_arg(function, ty, arg))
        .collect()
}

fn marshal_arg(function: &ForeignFunction, ty: &ForeignType, arg: &Value) -> RuntimeResult<NativeArg> {
    let mismatch = || RuntimeError::TypeError {
        expected: ty.to_string(),
        actual: arg.to_string(),
        operation: format!("argument to {}", function.name),
    };
    match (ty, arg) {
        (ForeignType::Int, Value::Integer(i)) => c_int::try_from(*i)
            .map(NativeArg::Int)
            .map_err(|_| RuntimeError::IntegerOverflow(format!("argument to {}", function.name))),
        (ForeignType::Float, Value::Float(f)) => Ok(NativeArg::Float(*f as c_float)),
        (ForeignType::String, Value::String(s)) => CString::new(s.as_bytes())
            .map(NativeArg::Str)
            .map_err(|_| {
                RuntimeError::InvalidArgument(format!(
                    "string with interior NUL passed to {}",
                    function.name
                ))
            }),
        (ForeignType::Pointer(_), Value::Pointer(p)) => Ok(NativeArg::Ptr(*p)),
        (ForeignType::Bool | ForeignType::Void, _) => Err(RuntimeError::UnsupportedForeignType(
            format!("Can't call foreign function with argument of type {}", ty),
        )),
        _ => Err(mismatch()),
    }
}

/// Converts a native result back into a dynamic value per the declared return type.
pub fn unmarshal_return(function: &ForeignFunction, result: NativeReturn) -> RuntimeResult<Value> {
    match (function.cif.return_type(), result) {
        (ForeignType::String, NativeReturn::Str(s)) => {
            Ok(Value::string(s.as_deref().unwrap_or("")))
        }
        (ForeignType::Int, NativeReturn::Int(i)) => Ok(Value::Integer(i64::from(i))),
        (ForeignType::Bool, NativeReturn::Int(i)) => Ok(Value::Boolean(i != 0)),
        (ForeignType::Float, NativeReturn::Float(f)) => Ok(Value::Float(f64::from(f))),
        (ForeignType::Void, _) => Ok(Value::Nil),
        (ForeignType::Pointer(_), NativeReturn::Ptr(p)) => Ok(Value::Pointer(p)),
        (declared, other) => Err(RuntimeError::UnsupportedForeignType(format!(
            "Returning what? {} declared, native call produced {:?}",
            declared, other
        ))),
    }
}

/// Full call sequence: entry check, marshalling, native call, unmarshalling.
pub fn call_foreign(
    bridge: &dyn CallBridge,
    function: &ForeignFunction,
    args: &[Value],
) -> RuntimeResult<Value> {
    let entry = function
        .entry()
        .ok_or_else(|| RuntimeError::ForeignUnbound(function.name.to_string()))?;
    let native_args = marshal_args(function, args)?;
    let result = bridge.call(&function.cif, entry, &native_args)?;
    unmarshal_return(function, result)
}

/// A handful of C library routines exposed as foreign functions.
#[cfg(unix)]
pub fn libc_functions() -> Vec<ForeignFunction> {
    use std::ffi::CStr;

    vec![
        ForeignFunction::new(
            "abs",
            CallInterface::prepare(vec![ForeignType::Int], ForeignType::Int),
            |args| match args {
                // SAFETY: abs has no preconditions beyond a valid int.
                [NativeArg::Int(i)] => NativeReturn::Int(unsafe { libc::abs(*i) }),
                _ => NativeReturn::Void,
            },
        ),
        ForeignFunction::new(
            "atoi",
            CallInterface::prepare(vec![ForeignType::String], ForeignType::Int),
            |args| match args {
                // SAFETY: the CString is NUL terminated and outlives the call.
                [NativeArg::Str(s)] => NativeReturn::Int(unsafe { libc::atoi(s.as_ptr()) }),
                _ => NativeReturn::Void,
            },
        ),
        ForeignFunction::new(
            "strlen",
            CallInterface::prepare(vec![ForeignType::String], ForeignType::Int),
            |args| match args {
                [NativeArg::Str(s)] => {
                    // SAFETY: the CString is NUL terminated and outlives the call.
                    let len = unsafe { libc::strlen(s.as_ptr()) };
                    NativeReturn::Int(c_int::try_from(len).unwrap_or(c_int::MAX))
                }
                _ => NativeReturn::Void,
            },
        ),
        ForeignFunction::new(
            "getpid",
            CallInterface::prepare(vec![], ForeignType::Int),
            // SAFETY: getpid cannot fail.
            |_| NativeReturn::Int(unsafe { libc::getpid() } as c_int),
        ),
        ForeignFunction::new(
            "getenv",
            CallInterface::prepare(vec![ForeignType::String], ForeignType::String),
            |args| match args {
                [NativeArg::Str(s)] => {
                    // SAFETY: getenv returns null or a pointer into the environment block,
                    // which is copied out immediately.
                    let ptr = unsafe { libc::getenv(s.as_ptr()) };
                    if ptr.is_null() {
                        NativeReturn::Str(None)
                    } else {
                        let value = unsafe { CStr::from_ptr(ptr) };
                        NativeReturn::Str(Some(value.to_string_lossy().into_owned()))
                    }
                }
                _ => NativeReturn::Void,
            },
        ),
    ]
}

#[cfg(not(unix))]
pub fn libc_functions() -> Vec<ForeignFunction> {
    Vec::new()
}
