//! Property-based tests for angle-lang expressions.
use angle_lang::{Scope, Value, WatchDelegate};
use proptest::prelude::*;

mod strategies {
    use super::*;

    /// Generates identifiers that are neither keywords nor disallowed members
    pub fn ident() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,8}".prop_filter("Avoid keywords and sandboxed names", |s| {
            !matches!(
                s.as_str(),
                "true" | "false" | "null" | "undefined" | "this" | "constructor"
            ) && !s.starts_with("__")
        })
    }

    /// Generates small integers so that products stay exact
    pub fn small_int() -> impl Strategy<Value = i64> {
        -1000i64..=1000
    }

    pub fn operator() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("+"), Just("-"), Just("*"), Just("/")]
    }

    pub fn comparison() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("<"), Just("<="), Just(">"), Just(">="), Just("=="), Just("!=")]
    }

    /// Generates string literal contents without quotes or escapes
    pub fn plain_string() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ,.!?]{0,20}"
    }

    /// Generates expressions built only from literals
    pub fn constant_expr() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            small_int().prop_map(|n| n.to_string()),
            plain_string().prop_map(|s| format!("'{s}'")),
            any::<bool>().prop_map(|b| b.to_string()),
            Just("null".to_string()),
        ];

        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                (inner.clone(), operator(), inner.clone())
                    .prop_map(|(lhs, op, rhs)| format!("({lhs} {op} {rhs})")),
                (inner.clone(), inner.clone(), inner.clone())
                    .prop_map(|(cond, a, b)| format!("({cond} ? {a} : {b})")),
                prop::collection::vec(inner.clone(), 0..3)
                    .prop_map(|items| format!("[{}]", items.join(", "))),
                inner.prop_map(|value| format!("!{value}")),
            ]
        })
    }

    pub fn apply(lhs: i64, op: &str, rhs: i64) -> f64 {
        let (lhs, rhs) = (lhs as f64, rhs as f64);
        match op {
            "+" => lhs + rhs,
            "-" => lhs - rhs,
            "*" => lhs * rhs,
            _ => lhs / rhs,
        }
    }

    pub fn compare(lhs: i64, op: &str, rhs: i64) -> bool {
        match op {
            "<" => lhs < rhs,
            "<=" => lhs <= rhs,
            ">" => lhs > rhs,
            ">=" => lhs >= rhs,
            "==" => lhs == rhs,
            _ => lhs != rhs,
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn arithmetic_matches_f64(
        lhs in strategies::small_int(),
        op in strategies::operator(),
        rhs in strategies::small_int().prop_filter("Non-zero divisor", |n| *n != 0),
    ) {
        let scope = Scope::root();
        let value = scope.eval(format!("{lhs} {op} ({rhs})")).unwrap();

        prop_assert_eq!(value, Value::from(strategies::apply(lhs, op, rhs)));
    }

    #[test]
    fn arithmetic_through_scope_matches_literals(
        lhs in strategies::small_int(),
        op in strategies::operator(),
        rhs in strategies::small_int().prop_filter("Non-zero divisor", |n| *n != 0),
    ) {
        let scope = Scope::root();
        scope.set("lhs", lhs as f64);
        scope.set("rhs", rhs as f64);

        let through_scope = scope.eval(format!("lhs {op} rhs")).unwrap();
        let literal = scope.eval(format!("{lhs} {op} ({rhs})")).unwrap();

        prop_assert_eq!(through_scope, literal);
    }

    #[test]
    fn comparisons_match_integers(
        lhs in strategies::small_int(),
        op in strategies::comparison(),
        rhs in strategies::small_int(),
    ) {
        let scope = Scope::root();
        let value = scope.eval(format!("{lhs} {op} ({rhs})")).unwrap();

        prop_assert_eq!(value, Value::from(strategies::compare(lhs, op, rhs)));
    }

    #[test]
    fn identifiers_read_scope_values(name in strategies::ident(), n in strategies::small_int()) {
        let scope = Scope::root();
        scope.set(&name, n as f64);

        prop_assert_eq!(scope.eval(name.as_str()).unwrap(), Value::from(n as f64));
    }

    #[test]
    fn assignment_then_read(name in strategies::ident(), text in strategies::plain_string()) {
        let scope = Scope::root();
        scope.eval(format!("{name} = '{text}'")).unwrap();

        prop_assert_eq!(scope.get(&name), Value::from(text.as_str()));
    }

    #[test]
    fn string_literals_evaluate_to_contents(text in strategies::plain_string()) {
        let scope = Scope::root();

        prop_assert_eq!(scope.eval(format!("'{text}'")).unwrap(), Value::from(text.as_str()));
        prop_assert_eq!(scope.eval(format!("\"{text}\"")).unwrap(), Value::from(text.as_str()));
    }

    #[test]
    fn constant_expressions_ignore_scope(code in strategies::constant_expr()) {
        let expression = angle_lang::compile(&code).unwrap();
        prop_assert!(expression.is_constant(), "{} is not constant", code);
        prop_assert_eq!(expression.watch_delegate(), Some(WatchDelegate::Constant));

        let empty = Scope::root();
        let populated = Scope::root();
        populated.set("a", 1.0);
        populated.set("b", "text");

        prop_assert_eq!(
            empty.eval(code.as_str()).unwrap().to_json(),
            populated.eval(code.as_str()).unwrap().to_json()
        );
    }

    #[test]
    fn compile_never_panics(code in "\\PC{0,40}") {
        let _ = angle_lang::compile(&code);
    }

    #[test]
    fn eval_never_panics(code in "[a-z0-9 .+*/()\\[\\]{}:,'|!?=<>&-]{0,30}") {
        let scope = Scope::root();
        scope.set("a", 1.0);
        let _ = scope.eval(code.as_str());
    }
}
