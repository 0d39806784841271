// Environment chain: parent-linked frames of name -> binding cell, stored in the heap.

use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::heap::{CellId, EnvId, Heap};
use crate::runtime::values::Value;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Key of a binding. Lexical variables are symbols, dictionary entries are usually keywords.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Name {
    Symbol(Rc<str>),
    Keyword(Rc<str>),
}

impl Name {
    pub fn symbol(name: &str) -> Self {
        Name::Symbol(Rc::from(name))
    }

    pub fn keyword(name: &str) -> Self {
        Name::Keyword(Rc::from(name))
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Symbol(s) => Some(Name::Symbol(s.clone())),
            Value::Keyword(k) => Some(Name::Keyword(k.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Name::Symbol(s) => Value::Symbol(s.clone()),
            Name::Keyword(k) => Value::Keyword(k.clone()),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Symbol(s) => write!(f, "{}", s),
            Name::Keyword(k) => write!(f, ":{}", k),
        }
    }
}

/// The shared mutable storage location for one bound name.
#[derive(Debug, Clone)]
pub struct Cell {
    pub name: Name,
    pub value: Value,
}

/// One scope. Rebinding a name in the same frame installs a fresh cell that shadows
/// the old one; insertion order is kept for printing.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) parent: Option<EnvId>,
    pub(crate) bindings: IndexMap<Name, CellId>,
}

impl Frame {
    pub(crate) fn new(parent: Option<EnvId>) -> Self {
        Frame {
            parent,
            bindings: IndexMap::new(),
        }
    }
}

impl Heap {
    /// Creates a new child environment that inherits from `parent`.
    pub fn new_env(&mut self, parent: EnvId) -> EnvId {
        self.alloc_frame(Some(parent))
    }

    /// Creates a parentless environment, used for dictionary literals.
    pub fn new_dictionary(&mut self) -> EnvId {
        self.alloc_frame(None)
    }

    pub fn parent(&self, env: EnvId) -> RuntimeResult<Option<EnvId>> {
        Ok(self.frame(env)?.parent)
    }

    /// Adds a binding to `env`, shadowing any earlier binding of the same name in that frame.
    pub fn extend(&mut self, env: EnvId, name: Name, value: Value) -> RuntimeResult<CellId> {
        // validate before allocating so a stale env does not leak a cell
        self.frame(env)?;
        let cell = self.alloc_cell(Cell {
            name: name.clone(),
            value,
        });
        self.frame_mut(env)?.bindings.insert(name, cell);
        Ok(cell)
    }

    /// Binds `name` in the global environment.
    pub fn define_global(&mut self, name: Name, value: Value) -> RuntimeResult<CellId> {
        let global = self.global();
        self.extend(global, name, value)
    }

    /// Finds the binding cell for `name`, walking outward through the parents.
    pub fn lookup_binding(&self, env: EnvId, name: &Name) -> RuntimeResult<Option<CellId>> {
        let mut current = Some(env);
        while let Some(id) = current {
            let frame = self.frame(id)?;
            if let Some(cell) = frame.bindings.get(name) {
                return Ok(Some(*cell));
            }
            current = frame.parent;
        }
        Ok(None)
    }

    /// Looks up the value bound to `name` by searching `env` and then its parents.
    pub fn lookup(&self, env: EnvId, name: &Name) -> RuntimeResult<Option<Value>> {
        match self.lookup_binding(env, name)? {
            Some(cell) => Ok(Some(self.cell(cell)?.value.clone())),
            None => Ok(None),
        }
    }

    /// Overwrites the value of an existing binding cell in place.
    pub fn set(&mut self, cell: CellId, value: Value) -> RuntimeResult<()> {
        self.cell_mut(cell)?.value = value;
        Ok(())
    }

    /// The bindings of `env` itself (not its parents), in insertion order.
    pub fn bindings(&self, env: EnvId) -> RuntimeResult<Vec<(Name, Value)>> {
        let frame = self.frame(env)?;
        frame
            .bindings
            .values()
            .map(|id| {
                let cell = self.cell(*id)?;
                Ok((cell.name.clone(), cell.value.clone()))
            })
            .collect()
    }

    /// Shallow copy of one frame: same parent, fresh cells holding the same values.
    pub fn copy_env(&mut self, env: EnvId) -> RuntimeResult<EnvId> {
        let parent = self.parent(env)?;
        let bindings = self.bindings(env)?;
        let copy = self.alloc_frame(parent);
        for (name, value) in bindings {
            self.extend(copy, name, value)?;
        }
        Ok(copy)
    }

    /// Renders a value, printing dictionaries with their contents.
    pub fn render(&self, value: &Value) -> String {
        match value {
            Value::Environment(id) => match self.bindings(*id) {
                Ok(bindings) => {
                    let items: Vec<String> = bindings
                        .iter()
                        .map(|(name, value)| format!("{} {}", name, self.render(value)))
                        .collect();
                    format!("{{{}}}", items.join(" "))
                }
                Err(_) => value.to_string(),
            },
            Value::Pair(_) if value.is_list() => {
                let items: Vec<String> = value.iter().map(|item| self.render(item)).collect();
                format!("({})", items.join(" "))
            }
            other => other.to_string(),
        }
    }
}

/// Converts a binding target form into a `Name`, or reports why it cannot be one.
pub(crate) fn symbol_name(target: &Value, message: &str, form: &Value) -> RuntimeResult<Name> {
    match target {
        Value::Symbol(s) => Ok(Name::Symbol(s.clone())),
        _ => Err(RuntimeError::malformed(message, form)),
    }
}
