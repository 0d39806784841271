// Application of callables: closures, macros, primitives, foreign functions and
// keywords used as dictionary accessors.

use crate::runtime::environment::{symbol_name, Name};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::evaluator::Evaluator;
use crate::runtime::ffi;
use crate::runtime::heap::EnvId;
use crate::runtime::pattern::rest_target;
use crate::runtime::values::{Lambda, Value};
use std::rc::Rc;
use tracing::debug;

impl Evaluator {
    /// `(head arg ...)` that is not a special form.
    ///
    /// The callee and then each argument are pushed; macros receive their argument
    /// forms as written, everything else receives evaluated arguments.
    pub(super) fn eval_application(
        &mut self,
        env: EnvId,
        form: &Value,
        head: &Value,
        arg_forms: &Value,
    ) -> RuntimeResult<()> {
        let arg_forms = arg_forms
            .to_vec()
            .ok_or_else(|| RuntimeError::malformed("Improper argument list in call:", form))?;
        self.eval_form(env, head)?;
        let is_macro = matches!(self.stack.values().last(), Some(Value::Macro(_)));
        for arg in &arg_forms {
            if is_macro {
                self.stack.push(arg.clone())?;
            } else {
                self.eval_form(env, arg)?;
            }
        }
        let args = self.stack.pop_n(arg_forms.len())?;
        let callee = self.stack.pop()?;

        if let Value::Macro(lambda) = &callee {
            let expansion = self.expand_macro(lambda, &args)?;
            if self.config.show_macro_expansion {
                debug!(expansion = %self.heap.render(&expansion), "expanded {}", form);
            }
            // the expansion runs where the macro was used, not where it was defined
            return self.eval_form(env, &expansion);
        }

        self.trace.push(form)?;
        if self.config.log_function_application {
            debug!(depth = self.trace.depth(), "applying {}", form);
        }
        let result = self.apply(&callee, &args)?;
        self.trace.pop();
        self.stack.push(result)
    }

    /// Calls `callee` with already evaluated arguments.
    pub fn apply(&mut self, callee: &Value, args: &[Value]) -> RuntimeResult<Value> {
        match callee {
            Value::Closure(lambda) => {
                let lambda = Rc::clone(lambda);
                let call_env = self.heap.new_env(lambda.env);
                self.bind_params(call_env, &lambda, args)?;
                self.eval_value(call_env, &lambda.body)
            }
            Value::Primitive(primitive) => primitive.call(args),
            Value::Foreign(function) => ffi::call_foreign(self.bridge.as_ref(), function, args),
            Value::Keyword(key) => self.lookup_keyword(key, args),
            other => Err(RuntimeError::NotCallable(self.heap.render(other))),
        }
    }

    /// First phase of macro use: bind the raw argument forms and run the body.
    /// The returned expansion has not been evaluated yet.
    pub fn expand_macro(&mut self, lambda: &Rc<Lambda>, arg_forms: &[Value]) -> RuntimeResult<Value> {
        let lambda = Rc::clone(lambda);
        let expand_env = self.heap.new_env(lambda.env);
        self.bind_params(expand_env, &lambda, arg_forms)?;
        self.eval_value(expand_env, &lambda.body)
    }

    fn bind_params(&mut self, env: EnvId, lambda: &Lambda, args: &[Value]) -> RuntimeResult<()> {
        let mut params = &lambda.params;
        let mut index = 0;
        while let Value::Pair(p) = params {
            if let Some(rest) = rest_target(&p.head, &p.tail) {
                let name = symbol_name(&rest, "Rest parameter must be a symbol:", &lambda.source)?;
                let tail = Value::list(args.iter().skip(index).cloned());
                self.heap.extend(env, name, tail)?;
                return Ok(());
            }
            let Some(arg) = args.get(index) else {
                return Err(arity_mismatch(lambda, args.len()));
            };
            let name = symbol_name(&p.head, "Parameters must be symbols:", &lambda.source)?;
            self.heap.extend(env, name, arg.clone())?;
            index += 1;
            params = &p.tail;
        }
        if index != args.len() {
            return Err(arity_mismatch(lambda, args.len()));
        }
        Ok(())
    }

    /// `(:key dict)` reads `key` out of a dictionary.
    fn lookup_keyword(&self, key: &Rc<str>, args: &[Value]) -> RuntimeResult<Value> {
        let [target] = args else {
            return Err(RuntimeError::ArityMismatch {
                function: format!(":{}", key),
                expected: "1".to_string(),
                actual: args.len(),
            });
        };
        let Value::Environment(dict) = target else {
            return Err(RuntimeError::TypeError {
                expected: "environment".to_string(),
                actual: target.type_name().to_string(),
                operation: format!("keyword lookup :{}", key),
            });
        };
        self.heap
            .lookup(*dict, &Name::Keyword(key.clone()))?
            .ok_or_else(|| RuntimeError::KeyNotFound {
                key: key.to_string(),
            })
    }
}

fn arity_mismatch(lambda: &Lambda, actual: usize) -> RuntimeError {
    let mut fixed = 0;
    let mut variadic = false;
    let mut params = &lambda.params;
    while let Value::Pair(p) = params {
        if rest_target(&p.head, &p.tail).is_some() {
            variadic = true;
            break;
        }
        fixed += 1;
        params = &p.tail;
    }
    RuntimeError::ArityMismatch {
        function: lambda.source.to_string(),
        expected: if variadic {
            format!("at least {}", fixed)
        } else {
            fixed.to_string()
        },
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn closures_bind_fixed_and_rest_parameters() {
        let mut evaluator = Evaluator::default();
        assert_eq!(
            evaluator
                .eval_str("((fn (a & more) (cons a more)) 1 2 3)")
                .unwrap()
                .to_string(),
            "(1 2 3)"
        );
        assert_eq!(
            evaluator.eval_str("((fn (&all) all))").unwrap(),
            Value::Nil
        );
    }

    #[test]
    fn closure_arity_is_checked() {
        let mut evaluator = Evaluator::default();
        let err = evaluator.eval_str("((fn (a b) a) 1)").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::ArityMismatch {
                function: "(fn (a b) a)".to_string(),
                expected: "2".to_string(),
                actual: 1,
            }
        );
        assert!(matches!(
            evaluator.eval_str("((fn (a & r) a))"),
            Err(RuntimeError::ArityMismatch { expected, .. }) if expected == "at least 1"
        ));
        assert!(matches!(
            evaluator.eval_str("((fn () 1) 2)"),
            Err(RuntimeError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn keyword_accessor() {
        let mut evaluator = Evaluator::default();
        assert_eq!(
            evaluator.eval_str("(:a {:a (+ 1 2) :b 0})").unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            evaluator.eval_str("(:missing {:a 1})").unwrap_err(),
            RuntimeError::KeyNotFound {
                key: "missing".to_string()
            }
        );
        assert!(matches!(
            evaluator.eval_str("(:a 1)"),
            Err(RuntimeError::TypeError { .. })
        ));
        assert!(matches!(
            evaluator.eval_str("(:a {:a 1} {:a 2})"),
            Err(RuntimeError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn non_callables_are_rejected() {
        let mut evaluator = Evaluator::default();
        assert_eq!(
            evaluator.eval_str("(1 2)").unwrap_err(),
            RuntimeError::NotCallable("1".to_string())
        );
    }

    #[test]
    fn call_trace_holds_the_failing_calls() {
        let mut evaluator = Evaluator::default();
        evaluator
            .eval_str("(def f (fn (x) (+ x \"a\")))")
            .unwrap();
        assert!(evaluator.eval_str("(f 1)").is_err());
        assert_eq!(
            evaluator.call_trace().entries(),
            &["(f 1)".to_string(), "(+ x \"a\")".to_string()]
        );
    }
}
