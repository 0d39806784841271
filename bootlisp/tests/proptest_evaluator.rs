use bootlisp::runtime::{Evaluator, Value};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

/// Literal source text paired with its truthiness.
fn arb_literal() -> impl Strategy<Value = (&'static str, bool)> {
    prop_oneof![
        Just(("true", true)),
        Just(("false", false)),
        Just(("nil", false)),
        Just(("0", true)),
        Just(("\"\"", true)),
        Just(("'()", false)),
        Just((":k", true)),
    ]
}

/// Snippets that either evaluate or fail recoverably.
fn arb_snippet() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("(+ 1 2)"),
        Just("(list 1 (list 2 3))"),
        Just("(undefined-fn 1)"),
        Just("(+ 1 \"a\")"),
        Just("(let (a 1 b) a)"),
        Just("(match 3 (quote 4) 0)"),
        Just("((fn (a b) a) 1)"),
        Just("(do (def counter 1) (reset! counter (+ counter 1)))"),
        Just("(reset! not-bound 1)"),
        Just("(/ 1 0)"),
        Just("(error \"user\" 1)"),
        Just("(:a {:b 1})"),
        Just("(if (not) 1 (missing))"),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn not_is_the_nor_of_its_arguments(args in prop::collection::vec(arb_literal(), 0..6)) {
        let source = format!(
            "(not {})",
            args.iter().map(|(s, _)| *s).collect::<Vec<_>>().join(" ")
        );
        let expected = !args.iter().any(|(_, truthy)| *truthy);
        let mut evaluator = Evaluator::default();
        prop_assert_eq!(evaluator.eval_str(&source).unwrap(), Value::Boolean(expected));
    }

    #[test]
    fn stack_is_empty_after_every_top_level_form(snippets in prop::collection::vec(arb_snippet(), 1..12)) {
        let mut evaluator = Evaluator::default();
        for snippet in snippets {
            let _ = evaluator.eval_str(snippet);
            prop_assert_eq!(evaluator.stack_depth(), 0);
        }
    }

    #[test]
    fn quote_returns_integer_lists_verbatim(items in prop::collection::vec(-1000i64..1000, 0..8)) {
        let text = format!(
            "({})",
            items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" ")
        );
        let mut evaluator = Evaluator::default();
        let value = evaluator.eval_str(&format!("(quote {})", text)).unwrap();
        prop_assert_eq!(value.to_string(), text);
    }
}
