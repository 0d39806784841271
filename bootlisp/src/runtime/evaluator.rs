// bootlisp Evaluator - walks forms, dispatching special forms and applications

use crate::config::InterpreterConfig;
use crate::parser;
use crate::runtime::environment::{symbol_name, Name};
use crate::runtime::error::{FatalError, RuntimeError, RuntimeResult};
use crate::runtime::ffi::{CallBridge, DirectBridge, ForeignFunction};
use crate::runtime::heap::{CollectStats, EnvId, Heap, Roots};
use crate::runtime::pattern::{try_match, REST_MARKER};
use crate::runtime::stack::{CallTrace, EvalStack};
use crate::runtime::stdlib::StandardLibrary;
use crate::runtime::values::{Lambda, Primitive, Value};
use std::rc::Rc;
use tracing::warn;

/// One interpreter instance: heap, evaluation stack, call trace and the bridge used
/// for foreign calls. Confined to a single thread.
pub struct Evaluator {
    pub(super) heap: Heap,
    pub(super) stack: EvalStack,
    pub(super) trace: CallTrace,
    pub(super) bridge: Box<dyn CallBridge>,
    pub(super) config: InterpreterConfig,
    /// Nesting of `eval_form` calls in the current top-level evaluation
    depth: usize,
}

impl Evaluator {
    /// Create a new evaluator with the native primitives bound in its global environment
    pub fn new(config: InterpreterConfig) -> Self {
        let mut heap = Heap::new();
        if let Err(e) = StandardLibrary::load(&mut heap) {
            warn!("failed to load primitives: {}", e);
        }
        let mut stack = EvalStack::new(config.stack_capacity);
        stack.set_logging(config.log_stack);
        Evaluator {
            heap,
            stack,
            trace: CallTrace::new(config.trace_capacity, config.trace_entry_len),
            bridge: Box::new(DirectBridge),
            config,
            depth: 0,
        }
    }

    /// Replaces the bridge that performs foreign calls.
    pub fn with_bridge<B>(mut self, bridge: B) -> Self
    where
        B: CallBridge + 'static,
    {
        self.bridge = Box::new(bridge);
        self
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn global_env(&self) -> EnvId {
        self.heap.global()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Binds `name` in the global environment.
    pub fn define(&mut self, name: &str, value: Value) -> RuntimeResult<()> {
        self.heap.define_global(Name::symbol(name), value)?;
        Ok(())
    }

    pub fn define_primitive<F>(&mut self, name: &str, func: F) -> RuntimeResult<()>
    where
        F: Fn(&[Value]) -> RuntimeResult<Value> + 'static,
    {
        self.define(name, Value::Primitive(Primitive::new(name, func)))
    }

    pub fn define_foreign(&mut self, function: ForeignFunction) -> RuntimeResult<()> {
        let name = function.name().to_string();
        self.define(&name, Value::Foreign(Rc::new(function)))
    }

    pub fn call_trace(&self) -> &CallTrace {
        &self.trace
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn dump_stack(&self) -> String {
        self.stack.render()
    }

    pub fn dump_trace(&self) -> String {
        self.trace.render()
    }

    /// Runs the collector. Anything still on the evaluation stack is kept alive.
    pub fn collect(&mut self, roots: &Roots) -> CollectStats {
        let roots = roots.clone().values(self.stack.values());
        self.heap.collect(&roots)
    }

    pub fn render(&self, value: &Value) -> String {
        self.heap.render(value)
    }

    /// Evaluates one top-level form.
    ///
    /// Stack and call trace start out empty. After a recoverable error the stack is
    /// emptied again; the trace is kept so the caller can print it. After a fatal
    /// error both are left as they were for the diagnostic dump.
    pub fn eval(&mut self, env: EnvId, form: &Value) -> RuntimeResult<Value> {
        self.stack.reset();
        self.trace.reset();
        self.depth = 0;
        match self.eval_form(env, form).and_then(|()| self.stack.pop()) {
            Ok(value) => {
                if self.stack.depth() != 0 {
                    warn!(depth = self.stack.depth(), "stack not balanced after {}", form);
                    self.stack.reset();
                }
                Ok(value)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.stack.reset();
                Err(e)
            }
        }
    }

    /// Reads `source` and evaluates its forms in the global environment, stopping at
    /// the first error. Returns the last result, nil for empty input.
    pub fn eval_str(&mut self, source: &str) -> RuntimeResult<Value> {
        let forms =
            parser::read(source, &mut self.heap).map_err(|e| RuntimeError::Read(e.to_string()))?;
        let global = self.heap.global();
        let mut last = Value::Nil;
        for form in &forms {
            last = self.eval(global, form)?;
        }
        Ok(last)
    }

    /// Evaluates `form` and leaves exactly one value on the stack.
    pub(super) fn eval_form(&mut self, env: EnvId, form: &Value) -> RuntimeResult<()> {
        if self.depth >= self.config.max_eval_depth {
            return Err(FatalError::DepthExceeded {
                limit: self.config.max_eval_depth,
            }
            .into());
        }
        self.depth += 1;
        let result = self.eval_form_inner(env, form);
        self.depth -= 1;
        result
    }

    fn eval_form_inner(&mut self, env: EnvId, form: &Value) -> RuntimeResult<()> {
        match form {
            Value::Symbol(s) => {
                let value = self
                    .heap
                    .lookup(env, &Name::Symbol(s.clone()))?
                    .ok_or_else(|| RuntimeError::UnboundSymbol(s.to_string()))?;
                self.stack.push(value)
            }
            Value::Environment(id) => {
                let dict = self.eval_dictionary(env, *id)?;
                self.stack.push(dict)
            }
            Value::Pair(pair) => {
                let special = pair.head.as_symbol().filter(|s| is_special_form(s));
                match special {
                    Some(name) => {
                        let args = pair
                            .tail
                            .to_vec()
                            .ok_or_else(|| RuntimeError::malformed("Improper special form:", form))?;
                        self.eval_special_form(name, env, &args, form)
                    }
                    None => self.eval_application(env, form, &pair.head, &pair.tail),
                }
            }
            other => self.stack.push(other.clone()),
        }
    }

    /// Evaluates `form` and takes its result back off the stack.
    pub(super) fn eval_value(&mut self, env: EnvId, form: &Value) -> RuntimeResult<Value> {
        self.eval_form(env, form)?;
        self.stack.pop()
    }

    fn eval_special_form(
        &mut self,
        name: &str,
        env: EnvId,
        args: &[Value],
        form: &Value,
    ) -> RuntimeResult<()> {
        match name {
            "do" => self.eval_do(env, args),
            "let" => self.eval_let(env, args, form),
            "not" => self.eval_not(env, args),
            "quote" => self
                .stack
                .push(args.first().cloned().unwrap_or(Value::Nil)),
            "while" => self.eval_while(env, args, form),
            "if" => self.eval_if(env, args, form),
            "match" => self.eval_match(env, args, form),
            "reset!" => self.eval_reset(env, args, form),
            "fn" => self.eval_lambda(env, args, form, false),
            "macro" => self.eval_lambda(env, args, form, true),
            "def" => self.eval_def(env, args, form),
            "def?" => self.eval_defined(env, args, form),
            _ => Err(RuntimeError::malformed("Unknown special form:", form)),
        }
    }

    fn eval_do(&mut self, env: EnvId, args: &[Value]) -> RuntimeResult<()> {
        let Some((last, init)) = args.split_last() else {
            return self.stack.push(Value::Nil);
        };
        for form in init {
            self.eval_value(env, form)?;
        }
        self.eval_form(env, last)
    }

    fn eval_let(&mut self, env: EnvId, args: &[Value], form: &Value) -> RuntimeResult<()> {
        let (bindings, body) = match args {
            [] => return Err(RuntimeError::malformed("No bindings in 'let' form.", form)),
            [_] => return Err(RuntimeError::malformed("No body in 'let' form.", form)),
            [bindings, body] => (bindings, body),
            _ => {
                return Err(RuntimeError::malformed(
                    "Too many body forms in 'let' form.",
                    form,
                ))
            }
        };
        let bindings = bindings
            .to_vec()
            .ok_or_else(|| RuntimeError::malformed("Bindings of 'let' must be a list.", form))?;
        if bindings.len() % 2 != 0 {
            return Err(RuntimeError::malformed(
                "Odd number of forms in 'let' bindings.",
                form,
            ));
        }
        let let_env = self.heap.new_env(env);
        for binding in bindings.chunks(2) {
            let name = symbol_name(&binding[0], "Binding target in 'let' must be a symbol.", form)?;
            let value = self.eval_value(let_env, &binding[1])?;
            self.heap.extend(let_env, name, value)?;
        }
        self.eval_form(let_env, body)
    }

    /// NOR of the arguments: false as soon as one is truthy.
    fn eval_not(&mut self, env: EnvId, args: &[Value]) -> RuntimeResult<()> {
        for form in args {
            if self.eval_value(env, form)?.is_truthy() {
                return self.stack.push(Value::Boolean(false));
            }
        }
        self.stack.push(Value::Boolean(true))
    }

    fn eval_while(&mut self, env: EnvId, args: &[Value], form: &Value) -> RuntimeResult<()> {
        let Some((condition, body)) = args.split_first() else {
            return Err(RuntimeError::malformed("No condition in 'while' form.", form));
        };
        while self.eval_value(env, condition)?.is_truthy() {
            for body_form in body {
                self.eval_value(env, body_form)?;
            }
        }
        self.stack.push(Value::Nil)
    }

    fn eval_if(&mut self, env: EnvId, args: &[Value], form: &Value) -> RuntimeResult<()> {
        let [condition, then_branch, else_branch] = args else {
            return Err(RuntimeError::malformed(
                "'if' needs a condition and two branches.",
                form,
            ));
        };
        if self.eval_value(env, condition)?.is_truthy() {
            self.eval_form(env, then_branch)
        } else {
            self.eval_form(env, else_branch)
        }
    }

    fn eval_match(&mut self, env: EnvId, args: &[Value], form: &Value) -> RuntimeResult<()> {
        let Some((scrutinee, clauses)) = args.split_first() else {
            return Err(RuntimeError::malformed("No value in 'match' form.", form));
        };
        if clauses.len() % 2 != 0 {
            return Err(RuntimeError::malformed(
                "Odd number of forms in 'match' clauses.",
                form,
            ));
        }
        let value = self.eval_value(env, scrutinee)?;
        for clause in clauses.chunks(2) {
            if let Some(match_env) = try_match(&mut self.heap, env, &clause[0], &value)? {
                return self.eval_form(match_env, &clause[1]);
            }
        }
        Err(RuntimeError::NoMatch(self.heap.render(&value)))
    }

    fn eval_reset(&mut self, env: EnvId, args: &[Value], form: &Value) -> RuntimeResult<()> {
        let [target, value_form] = args else {
            return Err(RuntimeError::malformed(
                "'reset!' needs a target and a value.",
                form,
            ));
        };
        let name = symbol_name(target, "Target of 'reset!' must be a symbol.", form)?;
        let cell = self
            .heap
            .lookup_binding(env, &name)?
            .ok_or_else(|| RuntimeError::UnboundReset(name.to_string()))?;
        let value = self.eval_value(env, value_form)?;
        self.heap.set(cell, value.clone())?;
        self.stack.push(value)
    }

    fn eval_lambda(
        &mut self,
        env: EnvId,
        args: &[Value],
        form: &Value,
        is_macro: bool,
    ) -> RuntimeResult<()> {
        let kind = if is_macro { "macro" } else { "fn" };
        let (params, body) = match args {
            [] => {
                return Err(RuntimeError::malformed(
                    format!("No parameter list in '{}' form.", kind),
                    form,
                ))
            }
            [_] => {
                return Err(RuntimeError::malformed(
                    format!("No body in '{}' form.", kind),
                    form,
                ))
            }
            [params, body] => (params, body),
            _ => {
                return Err(RuntimeError::malformed(
                    format!("Too many body forms in '{}' form.", kind),
                    form,
                ))
            }
        };
        validate_params(params, form)?;
        let lambda = Rc::new(Lambda {
            params: params.clone(),
            body: body.clone(),
            env,
            source: form.clone(),
        });
        self.stack.push(if is_macro {
            Value::Macro(lambda)
        } else {
            Value::Closure(lambda)
        })
    }

    fn eval_def(&mut self, env: EnvId, args: &[Value], form: &Value) -> RuntimeResult<()> {
        let [target, value_form] = args else {
            return Err(RuntimeError::malformed("'def' needs a name and a value.", form));
        };
        let name = symbol_name(target, "Target of 'def' must be a symbol.", form)?;
        let value = self.eval_value(env, value_form)?;
        self.heap.define_global(name, value.clone())?;
        self.stack.push(value)
    }

    fn eval_defined(&mut self, env: EnvId, args: &[Value], form: &Value) -> RuntimeResult<()> {
        let [target] = args else {
            return Err(RuntimeError::malformed("'def?' needs exactly one name.", form));
        };
        let name = symbol_name(target, "Target of 'def?' must be a symbol.", form)?;
        let bound = self.heap.lookup_binding(env, &name)?.is_some();
        self.stack.push(Value::Boolean(bound))
    }

    /// A dictionary form evaluates to a fresh copy whose values are evaluated in `env`.
    fn eval_dictionary(&mut self, env: EnvId, dict: EnvId) -> RuntimeResult<Value> {
        let copy = self.heap.copy_env(dict)?;
        for (name, value_form) in self.heap.bindings(copy)? {
            let value = self.eval_value(env, &value_form)?;
            if let Some(cell) = self.heap.lookup_binding(copy, &name)? {
                self.heap.set(cell, value)?;
            }
        }
        Ok(Value::Environment(copy))
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

pub fn is_special_form(name: &str) -> bool {
    matches!(
        name,
        "do" | "let"
            | "not"
            | "quote"
            | "while"
            | "if"
            | "match"
            | "reset!"
            | "fn"
            | "macro"
            | "def"
            | "def?"
    )
}

/// Parameter lists are proper lists of symbols; a rest capture comes last and names
/// exactly one symbol.
fn validate_params(params: &Value, form: &Value) -> RuntimeResult<()> {
    let items = params
        .to_vec()
        .ok_or_else(|| RuntimeError::malformed("Parameter list must be a list.", form))?;
    for (i, item) in items.iter().enumerate() {
        let Some(name) = item.as_symbol() else {
            return Err(RuntimeError::malformed("Parameters must be symbols:", form));
        };
        if name == REST_MARKER {
            let valid = items.len() == i + 2
                && items[i + 1]
                    .as_symbol()
                    .is_some_and(|s| !s.starts_with(REST_MARKER));
            if !valid {
                return Err(RuntimeError::malformed(
                    "'&' must be followed by exactly one parameter name:",
                    form,
                ));
            }
            return Ok(());
        }
        if name.starts_with(REST_MARKER) && i + 1 != items.len() {
            return Err(RuntimeError::malformed(
                "Rest parameter must come last:",
                form,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eval(source: &str) -> RuntimeResult<Value> {
        Evaluator::default().eval_str(source)
    }

    #[test]
    fn special_forms_report_malformed_shapes() {
        for source in [
            "(let (a 1))",
            "(let (a) a)",
            "(let (1 2) 3)",
            "(let (a 1) a a)",
            "(if true 1)",
            "(match 1 a)",
            "(fn (a))",
            "(fn (a & b c) a)",
            "(fn (&rest a) a)",
            "(macro)",
            "(def 1 2)",
            "(def x)",
            "(def? 1)",
            "(reset! 1 2)",
            "(while)",
        ] {
            assert!(
                matches!(eval(source), Err(RuntimeError::Malformed { .. })),
                "{} should be malformed",
                source
            );
        }
    }

    #[test]
    fn recoverable_errors_leave_the_stack_empty() {
        let mut evaluator = Evaluator::default();
        let global = evaluator.global_env();
        let form = parser::read_one("(+ 1 (do 2 3 (undefined-thing)))", evaluator.heap_mut())
            .unwrap();
        assert_eq!(
            evaluator.eval(global, &form),
            Err(RuntimeError::UnboundSymbol("undefined-thing".to_string()))
        );
        assert_eq!(evaluator.stack_depth(), 0);
    }

    #[test]
    fn fatal_errors_keep_the_stack_for_the_dump() {
        let config = InterpreterConfig {
            stack_capacity: 3,
            ..InterpreterConfig::default()
        };
        let mut evaluator = Evaluator::new(config);
        let err = evaluator.eval_str("(+ 1 2 3)").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::Fatal(FatalError::StackOverflow { capacity: 3 })
        );
        assert_eq!(evaluator.stack_depth(), 3);
        assert!(evaluator.dump_stack().contains("0\t#<primitive +>"));
    }

    #[test]
    fn runaway_recursion_is_a_fatal_error() {
        let mut evaluator = Evaluator::default();
        evaluator
            .eval_str("(def f (fn (n) (if (< n 1) 0 (+ 1 (f (- n 1))))))")
            .unwrap();
        assert_eq!(evaluator.eval_str("(f 50)").unwrap(), Value::Integer(50));
        assert_eq!(
            evaluator.eval_str("(f 250)").unwrap_err(),
            RuntimeError::Fatal(FatalError::DepthExceeded { limit: 256 })
        );

        // macro expansion never enters the call trace
        evaluator.eval_str("(def m (macro () (quote (m))))").unwrap();
        assert_eq!(
            evaluator.eval_str("(m)").unwrap_err(),
            RuntimeError::Fatal(FatalError::DepthExceeded { limit: 256 })
        );

        // the next top-level form starts from zero again
        assert_eq!(evaluator.eval_str("(f 10)").unwrap(), Value::Integer(10));
    }

    #[test]
    fn host_bound_long_list_is_released() {
        let mut evaluator = Evaluator::default();
        evaluator
            .define("l", Value::list((0..1_000_000).map(Value::Integer)))
            .unwrap();
        assert_eq!(evaluator.eval_str("(count l)").unwrap(), Value::Integer(1_000_000));
        evaluator.eval_str("(def l nil)").unwrap();
        evaluator.collect(&Roots::new());
        evaluator
            .define("m", Value::list((0..1_000_000).map(Value::Integer)))
            .unwrap();
        drop(evaluator);
    }

    #[test]
    fn def_binds_globally_from_nested_scopes() {
        let mut evaluator = Evaluator::default();
        evaluator.eval_str("(let (a 1) (def b (+ a 1)))").unwrap();
        assert_eq!(evaluator.eval_str("b").unwrap(), Value::Integer(2));
        assert!(evaluator.eval_str("(def c (undefined-thing))").is_err());
        assert_eq!(evaluator.eval_str("(def? c)").unwrap(), Value::Boolean(false));
    }

    #[test]
    fn host_defined_primitives_are_callable() {
        let mut evaluator = Evaluator::default();
        evaluator
            .define_primitive("twice", |args| match args {
                [Value::Integer(i)] => Ok(Value::Integer(i * 2)),
                _ => Err(RuntimeError::new("twice wants one integer")),
            })
            .unwrap();
        assert_eq!(evaluator.eval_str("(twice 21)").unwrap(), Value::Integer(42));
    }
}
