use thiserror::Error;

use crate::{Token, lexer::token::TokenKind, range::Range};

fn describe(token: &Token) -> String {
    if token.is_eof() {
        "EOF".to_string()
    } else {
        token.to_string()
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ParseError {
    #[error("Unexpected token `{}`", describe(.0))]
    UnexpectedToken(Token),
    #[error("Unexpected end of expression")]
    UnexpectedEOFDetected(Token),
    #[error("Expected `{0}` but got `{got}`", got = describe(.1))]
    ExpectedToken(TokenKind, Token),
    #[error("Expected an identifier but got `{}`", describe(.0))]
    ExpectedIdentifier(Token),
    #[error("Expected a closing parenthesis `)` but got `{}` delimiter", describe(.0))]
    ExpectedClosingParen(Token),
    #[error("Expected a closing brace `}}` but got `{}` delimiter", describe(.0))]
    ExpectedClosingBrace(Token),
    #[error("Expected a closing bracket `]` but got `{}` delimiter", describe(.0))]
    ExpectedClosingBracket(Token),
    #[error("Trying to assign a value to a non l-value at `{}`", describe(.0))]
    InvalidAssignmentTarget(Token),
}

impl ParseError {
    pub fn token(&self) -> &Token {
        match self {
            ParseError::UnexpectedToken(token)
            | ParseError::UnexpectedEOFDetected(token)
            | ParseError::ExpectedToken(_, token)
            | ParseError::ExpectedIdentifier(token)
            | ParseError::ExpectedClosingParen(token)
            | ParseError::ExpectedClosingBrace(token)
            | ParseError::ExpectedClosingBracket(token)
            | ParseError::InvalidAssignmentTarget(token) => token,
        }
    }

    pub fn range(&self) -> Range {
        self.token().range
    }
}
