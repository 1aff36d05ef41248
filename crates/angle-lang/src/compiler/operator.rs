use std::cmp::Ordering;

use smol_str::SmolStr;

use crate::{
    Value,
    ast::node::{BinaryOp, UnaryOp},
};

/// `undefined` operands of `+`, `-` and the unary operators count as `0`.
#[inline(always)]
pub(crate) fn if_defined(value: Value) -> Value {
    match value {
        Value::Undefined => Value::Number(0.0),
        value => value,
    }
}

pub(crate) fn unary(op: UnaryOp, argument: Value) -> Value {
    let argument = if_defined(argument);

    match op {
        UnaryOp::Plus => Value::Number(argument.to_number()),
        UnaryOp::Minus => Value::Number(-argument.to_number()),
        UnaryOp::Not => Value::Bool(!argument.truthy()),
    }
}

pub(crate) fn binary(op: BinaryOp, left: Value, right: Value) -> Value {
    match op {
        BinaryOp::Add => add(if_defined(left), if_defined(right)),
        BinaryOp::Sub => {
            Value::Number(if_defined(left).to_number() - if_defined(right).to_number())
        }
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt => Value::Bool(left.compare(&right) == Some(Ordering::Less)),
        BinaryOp::Gt => Value::Bool(left.compare(&right) == Some(Ordering::Greater)),
        BinaryOp::Lte => Value::Bool(matches!(
            left.compare(&right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gte => Value::Bool(matches!(
            left.compare(&right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Eq => Value::Bool(left.loose_equals(&right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(&right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(&right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(&right)),
    }
}

fn add(left: Value, right: Value) -> Value {
    match (left.to_primitive(), right.to_primitive()) {
        (left @ Value::String(_), right) | (left, right @ Value::String(_)) => {
            let mut s = left.to_js_string().into_owned();
            s.push_str(&right.to_js_string());
            Value::String(SmolStr::new(s))
        }
        (left, right) => Value::Number(left.to_number() + right.to_number()),
    }
}
