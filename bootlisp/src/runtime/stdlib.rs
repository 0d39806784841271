//! Native primitives installed into the global environment.
//!
//! Control flow lives in the evaluator's special forms; everything here is an
//! ordinary function of its evaluated arguments:
//! - Arithmetic: `+ - * / inc`
//! - Comparison: `< > <= >= =`
//! - Lists: `list cons first rest count`
//! - Predicates and types: `nil? list? symbol? keyword? type`
//! - Strings and output: `str print println error`

use crate::runtime::environment::Name;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::heap::Heap;
use crate::runtime::values::{Primitive, Value};
use std::cmp::Ordering;
use std::io::Write;

pub struct StandardLibrary;

impl StandardLibrary {
    /// Binds every primitive in the global environment of `heap`.
    pub fn load(heap: &mut Heap) -> RuntimeResult<()> {
        for primitive in Self::primitives() {
            let name = Name::symbol(&primitive.name);
            heap.define_global(name, Value::Primitive(primitive))?;
        }
        Ok(())
    }

    pub fn primitives() -> Vec<Primitive> {
        vec![
            Primitive::new("+", |args| Self::arithmetic("+", args)),
            Primitive::new("-", |args| Self::arithmetic("-", args)),
            Primitive::new("*", |args| Self::arithmetic("*", args)),
            Primitive::new("/", |args| Self::arithmetic("/", args)),
            Primitive::new("inc", Self::inc),
            Primitive::new("<", |args| Self::compare("<", args, |o| o == Ordering::Less)),
            Primitive::new(">", |args| {
                Self::compare(">", args, |o| o == Ordering::Greater)
            }),
            Primitive::new("<=", |args| {
                Self::compare("<=", args, |o| o != Ordering::Greater)
            }),
            Primitive::new(">=", |args| Self::compare(">=", args, |o| o != Ordering::Less)),
            Primitive::new("=", Self::equal),
            Primitive::new("list", |args| Ok(Value::list(args.iter().cloned()))),
            Primitive::new("cons", Self::cons),
            Primitive::new("first", Self::first),
            Primitive::new("rest", Self::rest),
            Primitive::new("count", Self::count),
            Primitive::new("nil?", |args| {
                Self::predicate("nil?", args, |v| v.is_nil())
            }),
            Primitive::new("list?", |args| {
                Self::predicate("list?", args, |v| v.is_list())
            }),
            Primitive::new("symbol?", |args| {
                Self::predicate("symbol?", args, |v| matches!(v, Value::Symbol(_)))
            }),
            Primitive::new("keyword?", |args| {
                Self::predicate("keyword?", args, |v| matches!(v, Value::Keyword(_)))
            }),
            Primitive::new("type", Self::type_of),
            Primitive::new("str", |args| Ok(Value::string(&Self::concat(args)))),
            Primitive::new("print", |args| Self::print(args, false)),
            Primitive::new("println", |args| Self::print(args, true)),
            Primitive::new("error", |args| Err(RuntimeError::User(Self::concat(args)))),
        ]
    }

    fn expect_arity(function: &str, args: &[Value], expected: usize) -> RuntimeResult<()> {
        if args.len() != expected {
            return Err(RuntimeError::ArityMismatch {
                function: function.to_string(),
                expected: expected.to_string(),
                actual: args.len(),
            });
        }
        Ok(())
    }

    fn type_error(operation: &str, expected: &str, actual: &Value) -> RuntimeError {
        RuntimeError::TypeError {
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
            operation: operation.to_string(),
        }
    }

    fn arithmetic(op: &str, args: &[Value]) -> RuntimeResult<Value> {
        let (first, rest) = match args {
            [] => {
                return match op {
                    "+" => Ok(Value::Integer(0)),
                    "*" => Ok(Value::Integer(1)),
                    _ => Err(RuntimeError::ArityMismatch {
                        function: op.to_string(),
                        expected: "at least 1".to_string(),
                        actual: 0,
                    }),
                }
            }
            [only] if op == "-" => return Self::binary(op, &Value::Integer(0), only),
            [first, rest @ ..] => (first, rest),
        };
        if !matches!(first, Value::Integer(_) | Value::Float(_)) {
            return Err(Self::type_error(op, "number", first));
        }
        rest.iter()
            .try_fold(first.clone(), |acc, arg| Self::binary(op, &acc, arg))
    }

    fn binary(op: &str, a: &Value, b: &Value) -> RuntimeResult<Value> {
        match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => {
                let result = match op {
                    "+" => x.checked_add(*y),
                    "-" => x.checked_sub(*y),
                    "*" => x.checked_mul(*y),
                    "/" => {
                        if *y == 0 {
                            return Err(RuntimeError::DivisionByZero);
                        }
                        x.checked_div(*y)
                    }
                    _ => None,
                };
                result
                    .map(Value::Integer)
                    .ok_or_else(|| RuntimeError::IntegerOverflow(op.to_string()))
            }
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                let x = Self::as_float(a);
                let y = Self::as_float(b);
                match op {
                    "+" => Ok(Value::Float(x + y)),
                    "-" => Ok(Value::Float(x - y)),
                    "*" => Ok(Value::Float(x * y)),
                    "/" if y == 0.0 => Err(RuntimeError::DivisionByZero),
                    "/" => Ok(Value::Float(x / y)),
                    _ => Err(RuntimeError::InvalidArgument(format!("unknown operator {}", op))),
                }
            }
            (Value::Integer(_) | Value::Float(_), other) | (other, _) => {
                Err(Self::type_error(op, "number", other))
            }
        }
    }

    fn as_float(value: &Value) -> f64 {
        match value {
            Value::Integer(i) => *i as f64,
            Value::Float(f) => *f,
            _ => f64::NAN,
        }
    }

    fn inc(args: &[Value]) -> RuntimeResult<Value> {
        Self::expect_arity("inc", args, 1)?;
        Self::binary("+", &args[0], &Value::Integer(1))
    }

    fn compare<F>(op: &str, args: &[Value], accept: F) -> RuntimeResult<Value>
    where
        F: Fn(Ordering) -> bool,
    {
        Self::expect_arity(op, args, 2)?;
        let ordering = match (&args[0], &args[1]) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (a @ (Value::Integer(_) | Value::Float(_)), b @ (Value::Integer(_) | Value::Float(_))) => {
                Self::as_float(a).partial_cmp(&Self::as_float(b))
            }
            (a, _) => return Err(Self::type_error(op, "two numbers or two strings", a)),
        };
        Ok(Value::Boolean(ordering.map(accept).unwrap_or(false)))
    }

    fn equal(args: &[Value]) -> RuntimeResult<Value> {
        match args {
            [] => Err(RuntimeError::ArityMismatch {
                function: "=".to_string(),
                expected: "at least 1".to_string(),
                actual: 0,
            }),
            [first, rest @ ..] => Ok(Value::Boolean(rest.iter().all(|v| v == first))),
        }
    }

    fn cons(args: &[Value]) -> RuntimeResult<Value> {
        Self::expect_arity("cons", args, 2)?;
        match &args[1] {
            // the tail is not walked, consing stays constant time
            Value::Nil | Value::Pair(_) => Ok(Value::cons(args[0].clone(), args[1].clone())),
            other => Err(Self::type_error("cons", "list", other)),
        }
    }

    fn first(args: &[Value]) -> RuntimeResult<Value> {
        Self::expect_arity("first", args, 1)?;
        match &args[0] {
            Value::Pair(p) => Ok(p.head.clone()),
            Value::Nil => Ok(Value::Nil),
            other => Err(Self::type_error("first", "list", other)),
        }
    }

    fn rest(args: &[Value]) -> RuntimeResult<Value> {
        Self::expect_arity("rest", args, 1)?;
        match &args[0] {
            Value::Pair(p) => Ok(p.tail.clone()),
            Value::Nil => Ok(Value::Nil),
            other => Err(Self::type_error("rest", "list", other)),
        }
    }

    fn count(args: &[Value]) -> RuntimeResult<Value> {
        Self::expect_arity("count", args, 1)?;
        match &args[0] {
            Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
            list if list.is_list() => Ok(Value::Integer(list.iter().count() as i64)),
            other => Err(Self::type_error("count", "list or string", other)),
        }
    }

    fn predicate<F>(name: &str, args: &[Value], test: F) -> RuntimeResult<Value>
    where
        F: Fn(&Value) -> bool,
    {
        Self::expect_arity(name, args, 1)?;
        Ok(Value::Boolean(test(&args[0])))
    }

    fn type_of(args: &[Value]) -> RuntimeResult<Value> {
        Self::expect_arity("type", args, 1)?;
        Ok(Value::keyword(args[0].type_name()))
    }

    fn concat(args: &[Value]) -> String {
        args.iter().map(|v| v.to_plain_string()).collect()
    }

    fn print(args: &[Value], newline: bool) -> RuntimeResult<Value> {
        let text = args
            .iter()
            .map(|v| v.to_plain_string())
            .collect::<Vec<_>>()
            .join(" ");
        let mut stdout = std::io::stdout().lock();
        let written = if newline {
            writeln!(stdout, "{}", text)
        } else {
            write!(stdout, "{}", text).and_then(|_| stdout.flush())
        };
        written.map_err(|e| RuntimeError::Generic(format!("print failed: {}", e)))?;
        Ok(Value::Nil)
    }
}
