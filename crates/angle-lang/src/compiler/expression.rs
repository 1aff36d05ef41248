use std::fmt;

use super::compile::Compiler;
use super::compiled::{CompiledExpr, Frame};
use super::error::CompileError;
use crate::analyzer::Analyzer;
use crate::ast::node::Program;
use crate::error::runtime::RuntimeError;
use crate::filter::FilterRegistry;
use crate::Value;

/// How a scope should watch an expression.
///
/// `None` from [`Expression::watch_delegate`] means a plain watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDelegate {
    /// Evaluate once, notify, stop watching.
    Constant,
    /// Stop watching once the value is defined.
    OneTime,
    /// Stop watching once every element of the literal is defined.
    OneTimeLiteral,
    /// Re-evaluate only when one of [`Expression::inputs`] changed.
    Inputs,
}

/// A sub-expression the whole expression's value depends on.
pub struct Input {
    source: String,
    eval: CompiledExpr,
}

impl Input {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, scope: &Value, locals: &Value) -> Result<Value, RuntimeError> {
        let undefined = Value::Undefined;
        (self.eval)(&Frame::new(scope, locals, &undefined))
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Input({})", self.source)
    }
}

/// A compiled expression with the metadata scopes use to watch it.
pub struct Expression {
    source: String,
    program: Program,
    eval: CompiledExpr,
    assign: Option<CompiledExpr>,
    inputs: Vec<Input>,
    literal: bool,
    constant: bool,
    one_time: bool,
}

impl Expression {
    pub fn compile(
        source: impl Into<String>,
        program: Program,
        one_time: bool,
        filters: &FilterRegistry,
    ) -> Result<Self, CompileError> {
        let analysis = Analyzer::new(filters).analyze(&program);
        let mut compiler = Compiler::new(filters);

        let eval = compiler.compile_program(&program)?;
        let assign = program
            .assign_program()
            .map(|assign| compiler.compile_program(&assign))
            .transpose()?;
        let inputs = analysis
            .inputs(&program)
            .unwrap_or_default()
            .iter()
            .map(|node| {
                Ok(Input {
                    source: node.to_string(),
                    eval: compiler.compile_node(node)?,
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;

        Ok(Self {
            source: source.into(),
            literal: program.is_literal(),
            constant: analysis.program_constant(),
            program,
            eval,
            assign,
            inputs,
            one_time,
        })
    }

    pub fn eval(&self, scope: &Value, locals: &Value) -> Result<Value, RuntimeError> {
        let undefined = Value::Undefined;
        (self.eval)(&Frame::new(scope, locals, &undefined))
    }

    /// Writes `value` to the location the expression names, e.g. `a.b`.
    pub fn assign(&self, scope: &Value, value: Value, locals: &Value) -> Result<Value, RuntimeError> {
        match &self.assign {
            Some(assign) => assign(&Frame::new(scope, locals, &value)),
            None => Err(RuntimeError::NotAssignable(self.source.clone())),
        }
    }

    #[inline(always)]
    pub fn is_assignable(&self) -> bool {
        self.assign.is_some()
    }

    #[inline(always)]
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    #[inline(always)]
    pub fn is_constant(&self) -> bool {
        self.constant
    }

    #[inline(always)]
    pub fn is_one_time(&self) -> bool {
        self.one_time
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn watch_delegate(&self) -> Option<WatchDelegate> {
        if self.constant {
            Some(WatchDelegate::Constant)
        } else if self.one_time && self.literal {
            Some(WatchDelegate::OneTimeLiteral)
        } else if self.one_time {
            Some(WatchDelegate::OneTime)
        } else if !self.inputs.is_empty() {
            Some(WatchDelegate::Inputs)
        } else {
            None
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .field("literal", &self.literal)
            .field("constant", &self.constant)
            .field("one_time", &self.one_time)
            .field("inputs", &self.inputs)
            .finish()
    }
}
