// Runtime value system for bootlisp
// Code and data share one representation: a form is just a Value that gets evaluated.

use crate::runtime::error::RuntimeResult;
use crate::runtime::ffi::{ForeignFunction, NativePtr};
use crate::runtime::heap::EnvId;
use std::fmt;
use std::rc::Rc;

/// Signature of a native primitive: receives the evaluated argument array.
pub type PrimitiveFn = Rc<dyn Fn(&[Value]) -> RuntimeResult<Value>>;

#[derive(Clone)]
pub enum Value {
    /// The empty list; terminates every well-formed list.
    Nil,
    Pair(Rc<Pair>),
    Symbol(Rc<str>),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Boolean(bool),
    Keyword(Rc<str>),
    /// A dictionary / first-class environment living in the heap.
    Environment(EnvId),
    Closure(Rc<Lambda>),
    Macro(Rc<Lambda>),
    Primitive(Primitive),
    Foreign(Rc<ForeignFunction>),
    Pointer(NativePtr),
}

#[derive(Debug, Clone)]
pub struct Pair {
    pub head: Value,
    pub tail: Value,
}

impl PartialEq for Pair {
    /// Walks the spine in a loop; only heads recurse.
    fn eq(&self, other: &Self) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            if a.head != b.head {
                return false;
            }
            match (&a.tail, &b.tail) {
                (Value::Pair(x), Value::Pair(y)) => {
                    if Rc::ptr_eq(x, y) {
                        return true;
                    }
                    a = x;
                    b = y;
                }
                (x, y) => return x == y,
            }
        }
    }
}

impl Drop for Pair {
    // Unlink uniquely owned tails one at a time so a long list does not drop recursively.
    fn drop(&mut self) {
        let mut tail = std::mem::replace(&mut self.tail, Value::Nil);
        while let Value::Pair(next) = tail {
            match Rc::try_unwrap(next) {
                Ok(mut pair) => tail = std::mem::replace(&mut pair.tail, Value::Nil),
                Err(_) => break,
            }
        }
    }
}

/// Shared payload of closures and macros.
#[derive(Debug)]
pub struct Lambda {
    pub params: Value,
    pub body: Value,
    pub env: EnvId,
    /// The `(fn ...)` / `(macro ...)` form this callable was built from.
    pub source: Value,
}

#[derive(Clone)]
pub struct Primitive {
    pub name: Rc<str>,
    pub func: PrimitiveFn,
}

impl Primitive {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[Value]) -> RuntimeResult<Value> + 'static,
    {
        Primitive {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    pub fn call(&self, args: &[Value]) -> RuntimeResult<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Primitive({})", self.name)
    }
}

impl Value {
    pub fn cons(head: Value, tail: Value) -> Value {
        Value::Pair(Rc::new(Pair { head, tail }))
    }

    /// Builds a proper list from `items`.
    pub fn list<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
    {
        let items: Vec<Value> = items.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(Value::Nil, |tail, head| Value::cons(head, tail))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Rc::from(name))
    }

    pub fn keyword(name: &str) -> Value {
        Value::Keyword(Rc::from(name))
    }

    pub fn string(s: &str) -> Value {
        Value::String(Rc::from(s))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `false` and nil is true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Nil)
    }

    pub fn as_pair(&self) -> Option<&Pair> {
        match self {
            Value::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_symbol_named(&self, name: &str) -> bool {
        self.as_symbol() == Some(name)
    }

    /// Head of a pair, nil for anything else.
    pub fn head(&self) -> Value {
        self.as_pair().map(|p| p.head.clone()).unwrap_or(Value::Nil)
    }

    /// Tail of a pair, nil for anything else.
    pub fn tail(&self) -> Value {
        self.as_pair().map(|p| p.tail.clone()).unwrap_or(Value::Nil)
    }

    /// Iterates over the heads of a list. Stops at the first tail that is not a pair,
    /// so an improper tail is silently dropped; use [`Value::to_vec`] to reject those.
    pub fn iter(&self) -> ListIter<'_> {
        ListIter { current: self }
    }

    /// Elements of a proper list, `None` if the chain of tails does not end in nil.
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        let mut out = Vec::new();
        let mut current = self;
        loop {
            match current {
                Value::Nil => return Some(out),
                Value::Pair(p) => {
                    out.push(p.head.clone());
                    current = &p.tail;
                }
                _ => return None,
            }
        }
    }

    pub fn is_list(&self) -> bool {
        let mut current = self;
        loop {
            match current {
                Value::Nil => return true,
                Value::Pair(p) => current = &p.tail,
                _ => return false,
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Pair(_) => "list",
            Value::Symbol(_) => "symbol",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Keyword(_) => "keyword",
            Value::Environment(_) => "environment",
            Value::Closure(_) => "function",
            Value::Macro(_) => "macro",
            Value::Primitive(_) => "primitive",
            Value::Foreign(_) => "foreign-function",
            Value::Pointer(_) => "pointer",
        }
    }

    /// Like `Display`, but strings are written without quotes or escapes.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            other => other.to_string(),
        }
    }
}

pub struct ListIter<'a> {
    current: &'a Value,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        match self.current {
            Value::Pair(p) => {
                self.current = &p.tail;
                Some(&p.head)
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Environment(a), Value::Environment(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Macro(a), Value::Macro(b)) => Rc::ptr_eq(a, b),
            (Value::Primitive(a), Value::Primitive(b)) => Rc::ptr_eq(&a.func, &b.func),
            (Value::Foreign(a), Value::Foreign(b)) => Rc::ptr_eq(a, b),
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "()"),
            Value::Pair(_) => {
                write!(f, "(")?;
                let mut current = self;
                let mut first = true;
                loop {
                    match current {
                        Value::Pair(p) => {
                            if !first {
                                write!(f, " ")?;
                            }
                            write!(f, "{}", p.head)?;
                            first = false;
                            current = &p.tail;
                        }
                        Value::Nil => break,
                        improper => {
                            write!(f, " . {}", improper)?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => {
                if fl.is_finite() && fl.fract() == 0.0 {
                    write!(f, "{:.1}", fl)
                } else {
                    write!(f, "{}", fl)
                }
            }
            Value::String(s) => write_escaped(f, s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Keyword(k) => write!(f, ":{}", k),
            Value::Environment(id) => write!(f, "#<environment {}>", id),
            Value::Closure(l) => write!(f, "{}", l.source),
            Value::Macro(l) => write!(f, "{}", l.source),
            Value::Primitive(p) => write!(f, "#<primitive {}>", p.name),
            Value::Foreign(ff) => write!(f, "#<foreign {}>", ff.name()),
            Value::Pointer(p) => write!(f, "{}", p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(xs: &[i64]) -> Value {
        Value::list(xs.iter().map(|x| Value::Integer(*x)))
    }

    #[test]
    fn list_printing() {
        assert_eq!(ints(&[1, 2, 3]).to_string(), "(1 2 3)");
        assert_eq!(Value::Nil.to_string(), "()");
        let improper = Value::cons(Value::Integer(1), Value::Integer(2));
        assert_eq!(improper.to_string(), "(1 . 2)");
        assert_eq!(Value::string("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::string("a\"b").to_plain_string(), "a\"b");
    }

    #[test]
    fn structural_equality() {
        assert_eq!(ints(&[1, 2]), ints(&[1, 2]));
        assert_ne!(ints(&[1, 2]), ints(&[1, 2, 3]));
        assert_ne!(Value::Integer(1), Value::Float(1.0));
        assert_ne!(Value::symbol("a"), Value::keyword("a"));
    }

    #[test]
    fn improper_lists_are_not_lists() {
        let improper = Value::cons(Value::Integer(1), Value::Integer(2));
        assert!(!improper.is_list());
        assert!(improper.to_vec().is_none());
        assert_eq!(improper.iter().count(), 1);
        assert_eq!(ints(&[4, 5]).to_vec(), Some(vec![Value::Integer(4), Value::Integer(5)]));
    }

    #[test]
    fn long_lists_compare_and_drop_without_recursing() {
        let long = || Value::list((0..1_000_000).map(Value::Integer));
        let (a, b) = (long(), long());
        assert_eq!(a, b);
        drop(a);
        drop(b);

        // a shared tail stays alive for the other owner
        let shared = ints(&[2, 3]);
        let first = Value::cons(Value::Integer(1), shared.clone());
        drop(first);
        assert_eq!(shared.to_string(), "(2 3)");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::string("").is_truthy());
    }
}
