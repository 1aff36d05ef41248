#![no_main]

use arbitrary::Arbitrary;
use itertools::Itertools;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Expr {
    Member(String, String),
    Index(String, i32),
    Call(String, Vec<String>),
    Filter(String, String, Vec<String>),
    Assign(String, String),
    Ternary(String, String, String),
    Binary(String, Operator, String),
    Object(Vec<(String, String)>),
    Raw(String),
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    StrictNe,
    And,
    Or,
}

impl Operator {
    fn as_str(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Eq => "==",
            Operator::StrictNe => "!==",
            Operator::And => "&&",
            Operator::Or => "||",
        }
    }
}

impl Expr {
    fn to_code(&self) -> String {
        match self {
            Expr::Member(object, name) => format!("{}.{}", object, name),
            Expr::Index(object, index) => format!("{}[{}]", object, index),
            Expr::Call(name, args) => format!("{}({})", name, args.join(", ")),
            Expr::Filter(input, name, args) => {
                let args = args.iter().map(|arg| format!(":{}", arg)).join("");
                format!("{} | {}{}", input, name, args)
            }
            Expr::Assign(target, value) => format!("{} = {}", target, value),
            Expr::Ternary(test, consequent, alternate) => {
                format!("{} ? {} : {}", test, consequent, alternate)
            }
            Expr::Binary(left, op, right) => format!("{} {} {}", left, op.as_str(), right),
            Expr::Object(entries) => format!(
                "{{{}}}",
                entries.iter().map(|(key, value)| format!("{}: {}", key, value)).join(", ")
            ),
            Expr::Raw(code) => code.clone(),
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct Context {
    raw_expression: Option<String>,
    generated: Vec<Expr>,
    watch: bool,
}

fuzz_target!(|context: Context| {
    let code = match &context.raw_expression {
        Some(raw) => raw.clone(),
        None => context.generated.iter().map(Expr::to_code).join("; "),
    };

    let scope = angle_lang::Scope::root();
    scope.set("a", 1.0);
    scope.set("s", "text");

    if context.watch {
        let _ = scope.watch(code.as_str(), |_, _, _| Ok(()), false);
        let _ = scope.digest();
    } else {
        let _ = scope.eval(code.as_str());
    }
});
