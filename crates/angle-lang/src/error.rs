pub mod runtime;
pub mod security;

use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::{
    ast::error::ParseError, compiler::error::CompileError, lexer::error::LexerError, range::Range,
};

use self::{runtime::RuntimeError, security::SecurityError};

#[allow(clippy::useless_conversion)]
#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InnerError {
    fn range(&self) -> Option<Range> {
        match self {
            InnerError::Lexer(err) => Some(err.range()),
            InnerError::Parse(err) => Some(err.range()),
            InnerError::Compile(err) => Some(err.range()),
            InnerError::Runtime(_) => None,
        }
    }
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(PartialEq, Debug, Clone, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The expression text the error refers to.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: InnerError) -> Self {
        let source_code = source_code.into();

        let location = match cause.range() {
            Some(range) => {
                let start = offset(&source_code, range.start.line, range.start.column);
                let end = offset(&source_code, range.end.line, range.end.column);
                SourceSpan::new(start.into(), std::cmp::max(end.saturating_sub(start), 1))
            }
            None => SourceSpan::new(SourceOffset::from(0), source_code.len().max(1)),
        };

        Self {
            cause,
            source_code,
            location,
        }
    }
}

fn offset(source_code: &str, line: u32, column: usize) -> usize {
    SourceOffset::from_location(source_code, line as usize, column)
        .offset()
        .min(source_code.len())
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let code = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedCharacter(..)) => {
                "LexerError::UnexpectedCharacter"
            }
            InnerError::Lexer(LexerError::UnterminatedString(_)) => "LexerError::UnterminatedString",
            InnerError::Lexer(LexerError::InvalidExponent(_)) => "LexerError::InvalidExponent",
            InnerError::Lexer(LexerError::InvalidUnicodeEscape(..)) => {
                "LexerError::InvalidUnicodeEscape"
            }
            InnerError::Lexer(LexerError::InvalidNumber(..)) => "LexerError::InvalidNumber",
            InnerError::Parse(ParseError::UnexpectedToken(_)) => "ParseError::UnexpectedToken",
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => {
                "ParseError::UnexpectedEOFDetected"
            }
            InnerError::Parse(ParseError::ExpectedToken(..)) => "ParseError::ExpectedToken",
            InnerError::Parse(ParseError::ExpectedIdentifier(_)) => "ParseError::ExpectedIdentifier",
            InnerError::Parse(ParseError::ExpectedClosingParen(_)) => {
                "ParseError::ExpectedClosingParen"
            }
            InnerError::Parse(ParseError::ExpectedClosingBrace(_)) => {
                "ParseError::ExpectedClosingBrace"
            }
            InnerError::Parse(ParseError::ExpectedClosingBracket(_)) => {
                "ParseError::ExpectedClosingBracket"
            }
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => {
                "ParseError::InvalidAssignmentTarget"
            }
            InnerError::Compile(CompileError::UnknownFilter(..)) => "CompileError::UnknownFilter",
            InnerError::Compile(CompileError::Security(..)) => "CompileError::Security",
            InnerError::Compile(CompileError::NotAssignable(..)) => "CompileError::NotAssignable",
            InnerError::Runtime(RuntimeError::Security(_)) => "RuntimeError::Security",
            InnerError::Runtime(RuntimeError::NotAFunction(..)) => "RuntimeError::NotAFunction",
            InnerError::Runtime(RuntimeError::InvalidArguments(..)) => {
                "RuntimeError::InvalidArguments"
            }
            InnerError::Runtime(RuntimeError::FunctionConstructor) => {
                "RuntimeError::FunctionConstructor"
            }
            InnerError::Runtime(RuntimeError::NotAssignable(_)) => "RuntimeError::NotAssignable",
            InnerError::Runtime(RuntimeError::InvalidArrayLength(_)) => {
                "RuntimeError::InvalidArrayLength"
            }
            InnerError::Runtime(RuntimeError::UserDefined(_)) => "RuntimeError::UserDefined",
        };

        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(LexerError::UnterminatedString(_)) => {
                Some("Close the string with the same quote it was opened with.".to_string())
            }
            InnerError::Lexer(LexerError::InvalidExponent(_)) => {
                Some("An exponent needs digits after `e`, optionally signed: `1e-3`.".to_string())
            }
            InnerError::Lexer(LexerError::InvalidUnicodeEscape(..)) => {
                Some("Unicode escapes take exactly four hex digits: `\\u00e9`.".to_string())
            }
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => Some(
                "Input ended unexpectedly. Check for missing closing brackets or incomplete expressions."
                    .to_string(),
            ),
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => {
                Some("Only identifiers and member expressions can be assigned to.".to_string())
            }
            InnerError::Compile(CompileError::UnknownFilter(name, _)) => {
                Some(format!("Register a filter named '{name}' before using it."))
            }
            InnerError::Compile(CompileError::Security(SecurityError::DisallowedMemberName(name), _)) => {
                Some(format!("'{name}' cannot be accessed from expressions."))
            }
            InnerError::Runtime(RuntimeError::Security(_)) => {
                Some("The expression reached for a value outside its sandbox.".to_string())
            }
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Position;
    use rstest::rstest;

    #[rstest]
    #[case::first_column("abc", Range::new(Position::new(1, 1), Position::new(1, 2)), 0, 1)]
    #[case::middle("a + #", Range::new(Position::new(1, 5), Position::new(1, 6)), 4, 1)]
    #[case::wide("a | nope", Range::new(Position::new(1, 5), Position::new(1, 9)), 4, 4)]
    #[case::second_line("a;\nb$", Range::new(Position::new(2, 2), Position::new(2, 3)), 4, 1)]
    fn test_location(
        #[case] source: &str,
        #[case] range: Range,
        #[case] offset: usize,
        #[case] len: usize,
    ) {
        let err = Error::from_error(source, InnerError::Lexer(LexerError::InvalidExponent(range)));

        assert_eq!(err.location.offset(), offset);
        assert_eq!(err.location.len(), len);
    }

    #[test]
    fn test_runtime_error_spans_the_source() {
        let err = Error::from_error(
            "f()",
            InnerError::Runtime(RuntimeError::user_defined("boom")),
        );

        assert_eq!(err.location.offset(), 0);
        assert_eq!(err.location.len(), 3);
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_diagnostic_code() {
        let err = Error::from_error(
            "a | x",
            InnerError::Compile(CompileError::UnknownFilter("x".into(), Range::default())),
        );

        assert_eq!(err.code().unwrap().to_string(), "CompileError::UnknownFilter");
        assert!(err.help().is_some());
    }
}
