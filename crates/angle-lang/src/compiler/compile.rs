//! Turns an analyzed AST into a tree of closures.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::compiled::{CompiledExpr, Frame};
use super::error::CompileError;
use super::{operator, security};
use crate::ast::node::{Expr, Literal, LogicalOp, MemberProperty, Node, Program};
use crate::error::runtime::RuntimeError;
use crate::filter::{Filter, FilterRegistry};
use crate::{Array, Object, Shared, Value};

/// An assignable location: `context[name]`, plus what it currently holds.
struct Reference {
    context: Value,
    name: SmolStr,
    value: Value,
}

/// Resolves to `None` when the object part of a member chain is nullish.
type CompiledReference = Box<dyn Fn(&Frame<'_>) -> Result<Option<Reference>, RuntimeError>>;

/// Compiles programs against one filter registry.
///
/// Filters are resolved once per compiler and shared by every closure it
/// produces, so a single compiler should be used per expression.
pub struct Compiler<'a> {
    filters: &'a FilterRegistry,
    resolved: FxHashMap<SmolStr, Filter>,
}

impl<'a> Compiler<'a> {
    pub fn new(filters: &'a FilterRegistry) -> Self {
        Self {
            filters,
            resolved: FxHashMap::default(),
        }
    }

    /// Statements run in order; the program yields the last one's value, or
    /// `undefined` when empty.
    pub fn compile_program(&mut self, program: &Program) -> Result<CompiledExpr, CompileError> {
        let mut statements = program
            .body
            .iter()
            .map(|node| self.compile_node(node))
            .collect::<Result<Vec<_>, _>>()?;

        match statements.len() {
            0 => Ok(Box::new(|_| Ok(Value::Undefined))),
            1 => Ok(statements.remove(0)),
            _ => Ok(Box::new(move |frame| {
                let mut result = Value::Undefined;
                for statement in &statements {
                    result = statement(frame)?;
                }
                Ok(result)
            })),
        }
    }

    pub fn compile_node(&mut self, node: &Shared<Node>) -> Result<CompiledExpr, CompileError> {
        match &node.expr {
            Expr::Literal(literal) => {
                let value = match literal {
                    Literal::Undefined => Value::Undefined,
                    Literal::Null => Value::Null,
                    Literal::Bool(b) => Value::Bool(*b),
                    Literal::Number(n) => Value::Number(*n),
                    Literal::String(s) => Value::String(s.clone()),
                };
                Ok(Box::new(move |_| Ok(value.clone())))
            }
            Expr::Array(elements) => {
                let elements = self.compile_all(elements)?;
                Ok(Box::new(move |frame| {
                    elements
                        .iter()
                        .map(|element| element(frame))
                        .collect::<Result<Array, _>>()
                        .map(Value::Array)
                }))
            }
            Expr::Object(properties) => {
                let properties = properties
                    .iter()
                    .map(|property| Ok((property.key.clone(), self.compile_node(&property.value)?)))
                    .collect::<Result<Vec<_>, CompileError>>()?;

                Ok(Box::new(move |frame| {
                    let object = Object::new();
                    for (key, value) in &properties {
                        object.set(key.clone(), value(frame)?);
                    }
                    Ok(Value::Object(object))
                }))
            }
            Expr::Identifier(_) | Expr::Member { .. } => self.compile_value(node, false),
            Expr::This => Ok(Box::new(|frame| Ok(frame.scope.clone()))),
            Expr::Locals => Ok(Box::new(|frame| Ok(frame.locals.clone()))),
            Expr::ValueParameter => Ok(Box::new(|frame| Ok(frame.value.clone()))),
            Expr::Call {
                callee,
                args,
                filter: true,
            } => self.compile_filter_call(callee, args),
            Expr::Call { callee, args, .. } => self.compile_call(callee, args),
            Expr::Assignment { left, right } => {
                let target = self.compile_reference(left, true)?;
                let right = self.compile_node(right)?;

                Ok(Box::new(move |frame| {
                    let target = target(frame)?;
                    let value = right(frame)?;
                    security::ensure_safe_object(&value)?;

                    match target {
                        Some(Reference { context, name, .. }) => {
                            context.set_member(&name, value.clone())?;
                            Ok(value)
                        }
                        None => Ok(Value::Undefined),
                    }
                }))
            }
            Expr::Unary { op, argument } => {
                let op = *op;
                let argument = self.compile_node(argument)?;
                Ok(Box::new(move |frame| {
                    Ok(operator::unary(op, argument(frame)?))
                }))
            }
            Expr::Binary { op, left, right } => {
                let op = *op;
                let left = self.compile_node(left)?;
                let right = self.compile_node(right)?;
                Ok(Box::new(move |frame| {
                    Ok(operator::binary(op, left(frame)?, right(frame)?))
                }))
            }
            Expr::Logical { op, left, right } => {
                let op = *op;
                let left = self.compile_node(left)?;
                let right = self.compile_node(right)?;
                Ok(Box::new(move |frame| {
                    let value = left(frame)?;
                    match (op, value.truthy()) {
                        (LogicalOp::And, true) | (LogicalOp::Or, false) => right(frame),
                        _ => Ok(value),
                    }
                }))
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.compile_node(test)?;
                let consequent = self.compile_node(consequent)?;
                let alternate = self.compile_node(alternate)?;
                Ok(Box::new(move |frame| {
                    if test(frame)?.truthy() {
                        consequent(frame)
                    } else {
                        alternate(frame)
                    }
                }))
            }
        }
    }

    fn compile_all(&mut self, nodes: &[Shared<Node>]) -> Result<Vec<CompiledExpr>, CompileError> {
        nodes.iter().map(|node| self.compile_node(node)).collect()
    }

    /// Reads an identifier or member. With `create`, falsy locations along
    /// the way are replaced by empty objects so a later write can land.
    fn compile_value(
        &mut self,
        node: &Shared<Node>,
        create: bool,
    ) -> Result<CompiledExpr, CompileError> {
        if !matches!(node.expr, Expr::Identifier(_) | Expr::Member { .. }) {
            return self.compile_node(node);
        }

        let reference = self.compile_reference(node, create)?;
        Ok(Box::new(move |frame| match reference(frame)? {
            Some(Reference {
                context,
                name,
                value,
            }) if create && !value.truthy() => {
                if !matches!(context, Value::Object(_) | Value::Array(_)) {
                    return Ok(value);
                }
                let created = Value::new_object();
                context.set_member(&name, created.clone())?;
                Ok(created)
            }
            Some(reference) => Ok(reference.value),
            None => Ok(Value::Undefined),
        }))
    }

    fn compile_reference(
        &mut self,
        node: &Shared<Node>,
        create: bool,
    ) -> Result<CompiledReference, CompileError> {
        match &node.expr {
            Expr::Identifier(name) => {
                security::ensure_safe_member_name(name)
                    .map_err(|e| CompileError::Security(e, node.range))?;
                let name = name.clone();

                Ok(Box::new(move |frame| {
                    let context = if frame.locals.has_property(&name) {
                        frame.locals.clone()
                    } else {
                        frame.scope.clone()
                    };
                    let value = context.get_member(&name);
                    security::ensure_safe_object(&value)?;

                    Ok(Some(Reference {
                        context,
                        name: name.clone(),
                        value,
                    }))
                }))
            }
            Expr::Member {
                object,
                property: MemberProperty::Static(name),
            } => {
                security::ensure_safe_member_name(name)
                    .map_err(|e| CompileError::Security(e, node.range))?;
                let object = self.compile_value(object, create)?;
                let name = name.clone();

                Ok(Box::new(move |frame| {
                    let context = object(frame)?;
                    member_reference(context, name.clone())
                }))
            }
            Expr::Member {
                object,
                property: MemberProperty::Computed(property),
            } => {
                let object = self.compile_value(object, create)?;
                let property = self.compile_node(property)?;

                Ok(Box::new(move |frame| {
                    let context = object(frame)?;
                    let name = property(frame)?.to_property_key();
                    security::ensure_safe_member_name(&name)?;
                    member_reference(context, name)
                }))
            }
            _ => Err(CompileError::NotAssignable(node.to_string(), node.range)),
        }
    }

    fn compile_call(
        &mut self,
        callee: &Shared<Node>,
        args: &[Shared<Node>],
    ) -> Result<CompiledExpr, CompileError> {
        let name = callee.to_string();

        if matches!(callee.expr, Expr::Identifier(_) | Expr::Member { .. }) {
            let reference = self.compile_reference(callee, false)?;
            let args = self.compile_all(args)?;

            return Ok(Box::new(move |frame| {
                let Some(Reference { context, value, .. }) = reference(frame)? else {
                    return Ok(Value::Undefined);
                };
                let args = evaluate_args(&args, frame)?;
                security::ensure_safe_object(&context)?;
                invoke(&name, &context, value, &args)
            }));
        }

        let callee = self.compile_node(callee)?;
        let args = self.compile_all(args)?;

        Ok(Box::new(move |frame| {
            let value = callee(frame)?;
            let args = evaluate_args(&args, frame)?;
            invoke(&name, &Value::Undefined, value, &args)
        }))
    }

    fn compile_filter_call(
        &mut self,
        callee: &Shared<Node>,
        args: &[Shared<Node>],
    ) -> Result<CompiledExpr, CompileError> {
        let Expr::Identifier(name) = &callee.expr else {
            return Err(CompileError::UnknownFilter(
                SmolStr::new(callee.to_string()),
                callee.range,
            ));
        };

        let filter = match self.resolved.get(name) {
            Some(filter) => filter.clone(),
            None => {
                let filter = self.filters.resolve(name, callee.range)?;
                self.resolved.insert(name.clone(), filter.clone());
                filter
            }
        };
        let args = self.compile_all(args)?;

        Ok(Box::new(move |frame| {
            let args = args
                .iter()
                .map(|arg| arg(frame))
                .collect::<Result<Vec<_>, _>>()?;
            filter.call(&args)
        }))
    }
}

fn member_reference(context: Value, name: SmolStr) -> Result<Option<Reference>, RuntimeError> {
    if context.is_nullish() {
        return Ok(None);
    }

    let value = context.get_member(&name);
    security::ensure_safe_object(&value)?;

    Ok(Some(Reference {
        context,
        name,
        value,
    }))
}

fn evaluate_args(args: &[CompiledExpr], frame: &Frame<'_>) -> Result<Vec<Value>, RuntimeError> {
    args.iter()
        .map(|arg| {
            let value = arg(frame)?;
            security::ensure_safe_object(&value)?;
            Ok(value)
        })
        .collect()
}

fn invoke(name: &str, this: &Value, callee: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    security::ensure_safe_function(&callee)?;

    match callee {
        Value::Function(function) => {
            let result = function.call(this, args)?;
            security::ensure_safe_object(&result)?;
            Ok(result)
        }
        callee if !callee.truthy() => Ok(callee),
        callee => Err(RuntimeError::NotAFunction(name.to_string(), callee.name())),
    }
}
