//! `angle-lang` is an expression language and a dirty-checking scope engine.
//!
//! Expressions are JavaScript-like (`user.name | uppercase`, `a ? b : c`,
//! `items[0].price * qty`) and are compiled into closures that run inside a
//! sandbox. Scopes hold the data expressions read from and re-evaluate
//! watched expressions during a digest.
//!
//! ## Examples
//!
//! ```rust
//! use angle_lang::{Scope, Value};
//!
//! let scope = Scope::root();
//! scope.set("a", 1.0);
//!
//! assert_eq!(scope.eval("a + 2").unwrap(), Value::from(3.0));
//!
//! // Watch an expression and react to changes
//! use std::{cell::Cell, rc::Rc};
//!
//! let seen = Rc::new(Cell::new(0.0));
//! let last = Rc::clone(&seen);
//! scope
//!     .watch("a * 10", move |new, _, _| Ok(last.set(new.to_number())), false)
//!     .unwrap();
//!
//! scope.apply("a = 5").unwrap();
//! assert_eq!(seen.get(), 50.0);
//!
//! // Parse code into AST nodes
//! let program = angle_lang::parse_ast("a.b | filter:c").unwrap();
//! assert_eq!(program.body.len(), 1);
//! ```
mod analyzer;
mod ast;
mod compiler;
mod error;
mod filter;
mod lexer;
mod parse;
mod range;
mod scheduler;
mod scope;
mod value;

use error::InnerError;
use lexer::Lexer;

pub use analyzer::{Analysis, Analyzer};
pub use ast::node::Node as AstNode;
pub use ast::parser::Parser as AstParser;
pub use ast::{NodeId, Program};
pub use compiler::error::CompileError;
pub use compiler::{Expression, Input, WatchDelegate};
pub use error::Error;
pub use error::runtime::RuntimeError;
pub use error::security::SecurityError;
pub use filter::{Filter, FilterRegistry};
pub use lexer::token::{Token, TokenKind};
pub use parse::{Options as ParserOptions, Parser};
pub use range::{Position, Range};
pub use scheduler::{Scheduler, Task, TaskId, TaskQueue};
pub use scope::{
    Deregistration, Evaluable, Event, EventListenerFn, GroupListenerFn, ListenerFn, Phase, Scope,
    ScopeError, ScopeId, ScopeOptions,
};
pub use value::{Array, Function, FunctionKind, NativeFunction, Object, Value};

pub type Shared<T> = std::rc::Rc<T>;
pub type SharedCell<T> = std::cell::RefCell<T>;

#[allow(clippy::result_large_err)]
pub fn tokenize(code: &str) -> Result<Vec<Token>, Error> {
    Lexer::new()
        .tokenize(code)
        .map_err(|e| Error::from_error(code, InnerError::Lexer(e)))
}

#[allow(clippy::result_large_err)]
pub fn parse_ast(code: &str) -> Result<Program, Error> {
    AstParser::new(
        tokenize(code)?
            .into_iter()
            .map(Shared::new)
            .collect::<Vec<_>>()
            .iter(),
    )
    .parse()
    .map_err(|e| Error::from_error(code, InnerError::Parse(e)))
}

/// Compiles `code` with the default filters and no caching. A leading `::`
/// marks the expression as one-time.
#[allow(clippy::result_large_err)]
pub fn compile(code: &str) -> Result<Expression, Error> {
    let code = code.trim();
    let (source, one_time) = match code.strip_prefix("::") {
        Some(rest) => (rest, true),
        None => (code, false),
    };

    Expression::compile(source, parse_ast(source)?, one_time, &FilterRegistry::default())
        .map_err(|e| Error::from_error(source, InnerError::Compile(e)))
}
