use bootlisp::runtime::{Evaluator, RuntimeError, RuntimeResult, Value};
use pretty_assertions::assert_eq;

fn eval(evaluator: &mut Evaluator, source: &str) -> RuntimeResult<Value> {
    evaluator.eval_str(source)
}

fn eval_fresh(source: &str) -> String {
    let mut evaluator = Evaluator::default();
    let value = eval(&mut evaluator, source).expect("should evaluate");
    evaluator.render(&value)
}

#[test]
fn test_quote_returns_form_unevaluated() {
    assert_eq!(eval_fresh("(quote (1 2 3))"), "(1 2 3)");
    assert_eq!(eval_fresh("(quote (undefined (things)))"), "(undefined (things))");
    assert_eq!(eval_fresh("(quote)"), "()");
    assert_eq!(eval_fresh("'sym"), "sym");
}

#[test]
fn test_if_evaluates_exactly_one_branch() {
    // the untaken branch names an unbound symbol, evaluating it would fail
    assert_eq!(eval_fresh("(if true 1 never-bound)"), "1");
    assert_eq!(eval_fresh("(if false never-bound 2)"), "2");
    assert_eq!(eval_fresh("(if nil never-bound 3)"), "3");
    assert_eq!(eval_fresh("(if 0 4 never-bound)"), "4");
}

#[test]
fn test_not_is_nor() {
    assert_eq!(eval_fresh("(not false false)"), "true");
    assert_eq!(eval_fresh("(not true false)"), "false");
    assert_eq!(eval_fresh("(not)"), "true");
    assert_eq!(eval_fresh("(not nil)"), "true");
    // stops at the first truthy argument
    assert_eq!(eval_fresh("(not 1 never-bound)"), "false");
}

#[test]
fn test_do_sequences_and_aborts_on_error() {
    assert_eq!(eval_fresh("(do)"), "()");
    assert_eq!(eval_fresh("(do 1 2 3)"), "3");

    let mut evaluator = Evaluator::default();
    let err = eval(&mut evaluator, "(do (def a 1) (missing) (def b 2))").unwrap_err();
    assert_eq!(err, RuntimeError::UnboundSymbol("missing".to_string()));
    assert_eq!(eval(&mut evaluator, "(def? a)").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&mut evaluator, "(def? b)").unwrap(), Value::Boolean(false));
}

#[test]
fn test_let_binds_sequentially_in_a_child_scope() {
    let mut evaluator = Evaluator::default();
    assert_eq!(
        eval(&mut evaluator, "(let (a 1 b (+ a 1)) (list a b))")
            .unwrap()
            .to_string(),
        "(1 2)"
    );
    assert_eq!(eval(&mut evaluator, "(def? a)").unwrap(), Value::Boolean(false));
    assert_eq!(eval_fresh("(let (a 1 a 2) a)"), "2");
    assert_eq!(eval_fresh("(let () 5)"), "5");
}

#[test]
fn test_while_loops_until_condition_fails() {
    let mut evaluator = Evaluator::default();
    eval(&mut evaluator, "(def i 0)").unwrap();
    eval(&mut evaluator, "(def total 0)").unwrap();
    let result = eval(
        &mut evaluator,
        "(while (< i 5) (reset! total (+ total i)) (reset! i (+ i 1)))",
    )
    .unwrap();
    assert_eq!(result, Value::Nil);
    assert_eq!(eval(&mut evaluator, "total").unwrap(), Value::Integer(10));
}

#[test]
fn test_match_with_rest_and_quoted_literals() {
    assert_eq!(eval_fresh("(match (list 1 2 3) (a & rest) (list a rest))"), "(1 (2 3))");
    assert_eq!(eval_fresh("(match (list 1 2 3) (a &rest) rest)"), "(2 3)");
    assert_eq!(eval_fresh("(match 5 (quote 6) 1 (quote 5) 2)"), "2");
    assert_eq!(eval_fresh("(match (list 1 2) (a b c) 0 (a b) (+ a b))"), "3");
    assert_eq!(eval_fresh("(match :k :j 1 :k 2)"), "2");

    let mut evaluator = Evaluator::default();
    assert_eq!(
        eval(&mut evaluator, "(match 1 (quote 2) 3)").unwrap_err(),
        RuntimeError::NoMatch("1".to_string())
    );
    // bindings of the successful clause do not leak
    eval(&mut evaluator, "(match 1 x x)").unwrap();
    assert_eq!(eval(&mut evaluator, "(def? x)").unwrap(), Value::Boolean(false));
}

#[test]
fn test_reset_mutates_the_binding_cell() {
    let mut evaluator = Evaluator::default();
    eval(&mut evaluator, "(def x 1)").unwrap();
    eval(&mut evaluator, "(def get-x (fn () x))").unwrap();
    assert_eq!(eval(&mut evaluator, "(reset! x 2)").unwrap(), Value::Integer(2));
    assert_eq!(eval(&mut evaluator, "(let (y 0) (let (z 0) x))").unwrap(), Value::Integer(2));
    assert_eq!(eval(&mut evaluator, "(get-x)").unwrap(), Value::Integer(2));

    assert_eq!(eval_fresh("(let (c 0) (do (reset! c 5) c))"), "5");
    assert_eq!(
        eval(&mut evaluator, "(reset! nope 1)").unwrap_err(),
        RuntimeError::UnboundReset("nope".to_string())
    );
}

#[test]
fn test_def_and_def_query() {
    let mut evaluator = Evaluator::default();
    assert_eq!(eval(&mut evaluator, "(def? +)").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&mut evaluator, "(def? nope)").unwrap(), Value::Boolean(false));
    assert_eq!(eval(&mut evaluator, "(let (l 1) (def? l))").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&mut evaluator, "(def answer 42)").unwrap(), Value::Integer(42));
    assert_eq!(eval(&mut evaluator, "answer").unwrap(), Value::Integer(42));
}

#[test]
fn test_closures_capture_their_environment() {
    let mut evaluator = Evaluator::default();
    eval(&mut evaluator, "(def make-adder (fn (n) (fn (x) (+ x n))))").unwrap();
    assert_eq!(eval(&mut evaluator, "((make-adder 3) 4)").unwrap(), Value::Integer(7));

    eval(
        &mut evaluator,
        "(def fact (fn (n) (if (<= n 1) 1 (* n (fact (- n 1))))))",
    )
    .unwrap();
    assert_eq!(eval(&mut evaluator, "(fact 10)").unwrap(), Value::Integer(3628800));
    assert_eq!(
        eval(&mut evaluator, "fact").unwrap().to_string(),
        "(fn (n) (if (<= n 1) 1 (* n (fact (- n 1)))))"
    );
}

#[test]
fn test_macro_expansion_runs_in_the_callers_scope() {
    let mut evaluator = Evaluator::default();
    eval(&mut evaluator, "(def add-y (macro (x) (list '+ x 'y)))").unwrap();
    assert_eq!(eval(&mut evaluator, "(let (y 10) (add-y 1))").unwrap(), Value::Integer(11));
    assert!(matches!(
        eval(&mut evaluator, "(add-y 1)"),
        Err(RuntimeError::UnboundSymbol(name)) if name == "y"
    ));

    // arguments arrive unevaluated
    eval(&mut evaluator, "(def quoted (macro (x) (list 'quote x)))").unwrap();
    assert_eq!(
        eval(&mut evaluator, "(quoted (undefined thing))").unwrap().to_string(),
        "(undefined thing)"
    );

    eval(
        &mut evaluator,
        "(def when (macro (c & body) (list 'if c (cons 'do body) nil)))",
    )
    .unwrap();
    assert_eq!(eval(&mut evaluator, "(when true 1 2)").unwrap(), Value::Integer(2));
    assert_eq!(eval(&mut evaluator, "(when false never-bound)").unwrap(), Value::Nil);
}

#[test]
fn test_dictionary_literals_evaluate_their_values() {
    let mut evaluator = Evaluator::default();
    let dict = eval(&mut evaluator, "{:a (+ 1 2) :b 'x}").unwrap();
    assert_eq!(evaluator.render(&dict), "{:a 3 :b x}");
    eval(&mut evaluator, "(def point {:x 1 :y 2})").unwrap();
    assert_eq!(eval(&mut evaluator, "(+ (:x point) (:y point))").unwrap(), Value::Integer(3));
}

#[test]
fn test_stack_is_balanced_after_every_top_level_form() {
    let mut evaluator = Evaluator::default();
    let global = evaluator.global_env();
    for source in [
        "(+ 1 2)",
        "(+ 1 (undefined))",
        "(list 1 2 (car 3))",
        "(let (a 1) (+ a \"x\"))",
        "(match 1 2 3)",
        "((fn (a) a))",
        "(if true)",
        "(:k 1)",
        "(error \"boom\")",
    ] {
        let form = bootlisp::read(source, evaluator.heap_mut()).unwrap().remove(0);
        let _ = evaluator.eval(global, &form);
        assert_eq!(evaluator.stack_depth(), 0, "after {}", source);
    }
}
