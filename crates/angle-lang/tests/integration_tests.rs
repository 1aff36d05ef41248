use std::{cell::RefCell, rc::Rc};

use angle_lang::{
    Filter, FilterRegistry, Function, Parser, RuntimeError, Scope, ScopeError, SecurityError,
    TaskQueue, Value, WatchDelegate,
};
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn scope() -> Scope {
    let filters = FilterRegistry::new();
    filters.register(
        "uppercase",
        Filter::new(|args| {
            Ok(match args.first() {
                Some(Value::String(s)) => Value::from(s.to_uppercase()),
                Some(other) => other.clone(),
                None => Value::Undefined,
            })
        }),
    );
    filters.register(
        "limit",
        Filter::new(|args| {
            let input = args.first().cloned().unwrap_or_default();
            let limit = args.get(1).map(Value::to_number).unwrap_or(0.0) as usize;

            Ok(match input.as_array() {
                Some(array) => Value::from(array.to_vec().into_iter().take(limit).collect::<Vec<_>>()),
                None => input,
            })
        }),
    );

    let scope = Scope::with_parser(Parser::new(filters), TaskQueue::new());
    scope.set(
        "user",
        Value::from(json!({"name": "ann", "tags": ["admin", "dev"], "address": {"city": "Oslo"}})),
    );
    scope.set(
        "todos",
        Value::from(json!([
            {"title": "write", "done": true},
            {"title": "review", "done": false},
            {"title": "ship", "done": false}
        ])),
    );
    scope.set(
        "greet",
        Function::new("greet", |_, args| {
            Ok(Value::from(format!(
                "hello, {}",
                args.first().map(|v| v.to_js_string().to_string()).unwrap_or_default()
            )))
        }),
    );
    scope
}

#[rstest]
#[case::member("user.name", json!("ann"))]
#[case::nested("user.address.city", json!("Oslo"))]
#[case::computed("user.tags[1]", json!("dev"))]
#[case::length("todos.length", json!(3))]
#[case::missing_chain("user.phone.number", Value::Undefined.to_json())]
#[case::call("greet(user.name)", json!("hello, ann"))]
#[case::filter("user.name | uppercase", json!("ANN"))]
#[case::filter_chain("user.tags | limit:1", json!(["admin"]))]
#[case::filter_object_criterion("todos | filter:{done: false} | limit:1", json!([{"title": "review", "done": false}]))]
#[case::filter_string_criterion("todos | filter:'sh'", json!([{"title": "ship", "done": false}]))]
#[case::filter_negation("user.tags | filter:'!adm'", json!(["dev"]))]
#[case::ternary("user.tags.length > 1 ? 'many' : 'one'", json!("many"))]
#[case::logical("user.phone || 'none'", json!("none"))]
#[case::concat("user.name + '@' + user.address.city", json!("ann@Oslo"))]
#[case::undefined_arithmetic("missing + 1", json!(1))]
#[case::object_literal("{n: user.name, t: user.tags.length}", json!({"n": "ann", "t": 2}))]
#[case::equality("user.name == 'ann' && todos[0].done === true", json!(true))]
#[case::statements("x = 1; x + 1", json!(2))]
fn test_eval(scope: Scope, #[case] code: &str, #[case] expected: serde_json::Value) {
    let value = scope.eval(code).unwrap();
    assert_eq!(value.to_json(), expected);
}

#[rstest]
fn test_assignment_creates_path(scope: Scope) {
    scope.eval("settings.theme.color = 'red'").unwrap();

    assert_eq!(
        scope.get("settings").to_json(),
        json!({"theme": {"color": "red"}})
    );
}

#[rstest]
fn test_assign_through_expression(scope: Scope) {
    let expression = scope.parser().parse("user.address.city").unwrap();

    expression
        .assign(&scope.value(), Value::from("Bergen"), &Value::Undefined)
        .unwrap();

    assert_eq!(scope.eval("user.address.city").unwrap(), Value::from("Bergen"));
}

#[rstest]
#[case::constructor("constructor")]
#[case::proto("user.__proto__")]
#[case::escape("user.constructor.constructor('return this')()")]
fn test_disallowed_member_fails_to_compile(scope: Scope, #[case] code: &str) {
    let err = scope.eval(code).unwrap_err();

    match err {
        ScopeError::Expression(err) => {
            assert!(err.to_string().contains("disallowed field"), "{err}");
            assert_eq!(err.source_code, code);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[rstest]
fn test_disallowed_member_at_runtime(scope: Scope) {
    scope.set("key", "__proto__");

    assert_eq!(
        scope.eval("user[key]"),
        Err(ScopeError::Runtime(RuntimeError::Security(
            SecurityError::DisallowedMemberName("__proto__".into())
        )))
    );
}

#[rstest]
fn test_call_apply_bind_are_rejected(scope: Scope) {
    assert_eq!(
        scope.eval("greet.call(null, 'x')"),
        Err(ScopeError::Runtime(RuntimeError::Security(
            SecurityError::CallApplyBindReference
        )))
    );
}

#[rstest]
fn test_function_constructor_is_rejected(scope: Scope) {
    scope.set("F", Function::function_constructor());

    assert_eq!(
        scope.eval("F('return 1')()"),
        Err(ScopeError::Runtime(RuntimeError::Security(
            SecurityError::FunctionConstructorReference
        )))
    );
}

#[rstest]
#[case::constant("1 + 2", Some(WatchDelegate::Constant))]
#[case::one_time("::user.name", Some(WatchDelegate::OneTime))]
#[case::one_time_literal("::[user.name]", Some(WatchDelegate::OneTimeLiteral))]
#[case::inputs("user.name | uppercase", Some(WatchDelegate::Inputs))]
#[case::plain("greet(user.name)", None)]
fn test_watch_delegates(scope: Scope, #[case] code: &str, #[case] expected: Option<WatchDelegate>) {
    let expression = scope.parser().parse(code).unwrap();
    assert_eq!(expression.watch_delegate(), expected);
}

#[rstest]
fn test_digest_propagates_through_tree(scope: Scope) {
    let child = scope.new_child(false, None);
    let isolated = child.new_child(true, None);

    child
        .watch(
            "user.name | uppercase",
            |new, _, scope| {
                scope.set("display", new.clone());
                Ok(())
            },
            false,
        )
        .unwrap();
    isolated
        .watch(
            "display",
            |new, _, scope| {
                scope.set("seen", new.is_defined());
                Ok(())
            },
            false,
        )
        .unwrap();

    scope.apply("user.name = 'bob'").unwrap();

    assert_eq!(child.get("display"), Value::from("BOB"));
    assert_eq!(scope.get("display"), Value::Undefined);
    assert_eq!(isolated.get("seen"), Value::from(false));
}

#[rstest]
fn test_watch_collection_on_todos(scope: Scope) {
    let counts = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&counts);

    scope
        .watch_collection(
            "todos | filter:{done: false}",
            move |new, _, _| {
                log.borrow_mut().push(new.as_array().map(|a| a.len()).unwrap_or(0));
                Ok(())
            },
            false,
        )
        .unwrap();
    scope.digest().unwrap();

    scope.apply("todos[1].done = true").unwrap();
    scope.apply("todos[2].title = 'launch'").unwrap();

    assert_eq!(*counts.borrow(), vec![2, 1]);
}

#[rstest]
fn test_watch_group_and_events(scope: Scope) {
    let summary = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&summary);

    scope
        .watch_group(["user.name", "todos.length"], move |new, _, scope| {
            let text = format!("{} has {}", new[0], new[1]);
            scope.emit("summary", &[Value::from(text)]);
            Ok(())
        })
        .unwrap();
    scope.on("summary", move |_, args| {
        log.borrow_mut().push(args[0].to_js_string().to_string());
        Ok(())
    });

    scope.digest().unwrap();
    scope.apply("user.name = 'cy'").unwrap();

    assert_eq!(*summary.borrow(), vec!["ann has 3", "cy has 3"]);
}

#[rstest]
fn test_scheduled_work_runs_on_task_queue() {
    let queue = TaskQueue::new();
    let scope = Scope::with_parser(Parser::default(), queue.clone());
    let fired = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&fired);

    scope
        .watch(
            "count",
            move |new, _, _| {
                log.borrow_mut().push(new.clone());
                Ok(())
            },
            false,
        )
        .unwrap();

    scope.apply_async("count = 1").unwrap();
    scope.apply_async("count = count + 1").unwrap();
    scope.eval_async("count = count * 10").unwrap();

    assert!(fired.borrow().is_empty());
    queue.run_pending();

    assert_eq!(scope.get("count"), Value::from(20.0));
    assert_eq!(*fired.borrow(), vec![Value::from(20.0)]);
}
