use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::range::Range;

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

impl Token {
    pub fn new(kind: TokenKind, range: Range) -> Self {
        Self { range, kind }
    }

    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Identifier tokens are the only ones that can name scope properties.
    #[inline(always)]
    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Ident(_))
    }

    /// The literal value carried by number and string tokens.
    pub fn literal(&self) -> Option<crate::Value> {
        match &self.kind {
            TokenKind::NumberLiteral(n) => Some(crate::Value::Number(*n)),
            TokenKind::StringLiteral(s) => Some(crate::Value::String(SmolStr::new(s))),
            _ => None,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    And,
    Asterisk,
    Colon,
    Comma,
    Dot,
    Eof,
    EqEq,
    EqEqEq,
    Equal,
    Gt,
    Gte,
    Ident(SmolStr),
    LBrace,
    LBracket,
    LParen,
    Lt,
    Lte,
    Minus,
    NeEq,
    NeEqEq,
    Not,
    NumberLiteral(f64),
    Or,
    Percent,
    Pipe,
    Plus,
    Question,
    RBrace,
    RBracket,
    RParen,
    SemiColon,
    Slash,
    StringLiteral(String),
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::And => write!(f, "&&"),
            TokenKind::Asterisk => write!(f, "*"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Eof => write!(f, ""),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::EqEqEq => write!(f, "==="),
            TokenKind::Equal => write!(f, "="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::NeEq => write!(f, "!="),
            TokenKind::NeEqEq => write!(f, "!=="),
            TokenKind::Not => write!(f, "!"),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::Or => write!(f, "||"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::StringLiteral(s) => write!(f, "{:?}", s),
        }
    }
}
