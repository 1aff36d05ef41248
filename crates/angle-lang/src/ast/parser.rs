use std::iter::Peekable;

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::Shared;
use crate::lexer::token::{Token, TokenKind};
use crate::range::Range;
use crate::value::format_number;

use super::error::ParseError;
use super::node::{
    Args, BinaryOp, Expr, Literal, LogicalOp, MemberProperty, Node, NodeId, Program, Property,
    UnaryOp,
};

/// Recursive-descent parser over a lexed token stream.
///
/// The stream is expected to end with an `Eof` token, as produced by the lexer.
pub struct Parser<'a> {
    tokens: Peekable<core::slice::Iter<'a, Shared<Token>>>,
    next_id: NodeId,
    last_range: Range,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: core::slice::Iter<'a, Shared<Token>>) -> Self {
        Self {
            tokens: tokens.peekable(),
            next_id: 0,
            last_range: Range::default(),
        }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();

        loop {
            if !self.peek_is(|kind| {
                matches!(
                    kind,
                    TokenKind::Eof
                        | TokenKind::SemiColon
                        | TokenKind::RParen
                        | TokenKind::RBrace
                        | TokenKind::RBracket
                )
            }) {
                body.push(self.parse_filter_chain()?);
            }

            if self.expect(|kind| matches!(kind, TokenKind::SemiColon)).is_none() {
                break;
            }
        }

        match self.tokens.next() {
            Some(token) if token.is_eof() => Ok(Program::new(body, self.next_id)),
            Some(token) => Err(ParseError::UnexpectedToken((**token).clone())),
            None => Ok(Program::new(body, self.next_id)),
        }
    }

    fn node(&mut self, range: Range, expr: Expr) -> Shared<Node> {
        let id = self.next_id;
        self.next_id += 1;
        Shared::new(Node { id, range, expr })
    }

    fn parse_filter_chain(&mut self) -> Result<Shared<Node>, ParseError> {
        let mut left = self.parse_assignment()?;

        while self.expect(|kind| matches!(kind, TokenKind::Pipe)).is_some() {
            left = self.parse_filter(left)?;
        }

        Ok(left)
    }

    // `input | name:arg1:arg2` becomes `name(input, arg1, arg2)`.
    fn parse_filter(&mut self, input: Shared<Node>) -> Result<Shared<Node>, ParseError> {
        let callee = self.parse_identifier()?;
        let mut args: Args = SmallVec::new();
        args.push(Shared::clone(&input));

        while self.expect(|kind| matches!(kind, TokenKind::Colon)).is_some() {
            args.push(self.parse_assignment()?);
        }

        let range = input.range.merge(&self.last_range);
        Ok(self.node(
            range,
            Expr::Call {
                callee,
                args,
                filter: true,
            },
        ))
    }

    fn parse_assignment(&mut self) -> Result<Shared<Node>, ParseError> {
        let left = self.parse_ternary()?;

        if let Some(token) = self.expect(|kind| matches!(kind, TokenKind::Equal)) {
            if !left.expr.is_assignable() {
                return Err(ParseError::InvalidAssignmentTarget((*token).clone()));
            }

            let right = self.parse_ternary()?;
            let range = left.range.merge(&right.range);
            return Ok(self.node(range, Expr::Assignment { left, right }));
        }

        Ok(left)
    }

    fn parse_ternary(&mut self) -> Result<Shared<Node>, ParseError> {
        let test = self.parse_logical_or()?;

        if self
            .expect(|kind| matches!(kind, TokenKind::Question))
            .is_some()
        {
            let consequent = self.parse_assignment()?;
            self.consume(
                |kind| matches!(kind, TokenKind::Colon),
                |token| ParseError::ExpectedToken(TokenKind::Colon, token),
            )?;
            let alternate = self.parse_assignment()?;
            let range = test.range.merge(&alternate.range);

            return Ok(self.node(
                range,
                Expr::Conditional {
                    test,
                    consequent,
                    alternate,
                },
            ));
        }

        Ok(test)
    }

    fn parse_logical_or(&mut self) -> Result<Shared<Node>, ParseError> {
        let mut left = self.parse_logical_and()?;

        while self.expect(|kind| matches!(kind, TokenKind::Or)).is_some() {
            let right = self.parse_logical_and()?;
            left = self.logical(LogicalOp::Or, left, right);
        }

        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Shared<Node>, ParseError> {
        let mut left = self.parse_equality()?;

        while self.expect(|kind| matches!(kind, TokenKind::And)).is_some() {
            let right = self.parse_equality()?;
            left = self.logical(LogicalOp::And, left, right);
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Shared<Node>, ParseError> {
        let mut left = self.parse_relational()?;

        while let Some(token) = self.expect(|kind| {
            matches!(
                kind,
                TokenKind::EqEq | TokenKind::NeEq | TokenKind::EqEqEq | TokenKind::NeEqEq
            )
        }) {
            let right = self.parse_relational()?;
            left = self.binary(Self::binary_op(&token.kind), left, right);
        }

        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Shared<Node>, ParseError> {
        let mut left = self.parse_additive()?;

        while let Some(token) = self.expect(|kind| {
            matches!(
                kind,
                TokenKind::Lt | TokenKind::Gt | TokenKind::Lte | TokenKind::Gte
            )
        }) {
            let right = self.parse_additive()?;
            left = self.binary(Self::binary_op(&token.kind), left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Shared<Node>, ParseError> {
        let mut left = self.parse_multiplicative()?;

        while let Some(token) =
            self.expect(|kind| matches!(kind, TokenKind::Plus | TokenKind::Minus))
        {
            let right = self.parse_multiplicative()?;
            left = self.binary(Self::binary_op(&token.kind), left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Shared<Node>, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.expect(|kind| {
            matches!(
                kind,
                TokenKind::Asterisk | TokenKind::Slash | TokenKind::Percent
            )
        }) {
            let right = self.parse_unary()?;
            left = self.binary(Self::binary_op(&token.kind), left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Shared<Node>, ParseError> {
        match self.expect(|kind| matches!(kind, TokenKind::Plus | TokenKind::Minus | TokenKind::Not))
        {
            Some(token) => {
                let op = match token.kind {
                    TokenKind::Plus => UnaryOp::Plus,
                    TokenKind::Minus => UnaryOp::Minus,
                    _ => UnaryOp::Not,
                };
                let argument = self.parse_unary()?;
                let range = token.range.merge(&argument.range);
                Ok(self.node(range, Expr::Unary { op, argument }))
            }
            None => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Shared<Node>, ParseError> {
        let token = self.next_token()?;

        let mut primary = match &token.kind {
            TokenKind::LParen => {
                let node = self.parse_filter_chain()?;
                self.consume(
                    |kind| matches!(kind, TokenKind::RParen),
                    ParseError::ExpectedClosingParen,
                )?;
                node
            }
            TokenKind::LBracket => self.parse_array(&token)?,
            TokenKind::LBrace => self.parse_object(&token)?,
            TokenKind::Ident(name) => match name.as_str() {
                "null" => self.node(token.range, Expr::Literal(Literal::Null)),
                "true" => self.node(token.range, Expr::Literal(Literal::Bool(true))),
                "false" => self.node(token.range, Expr::Literal(Literal::Bool(false))),
                "this" => self.node(token.range, Expr::This),
                "$locals" => self.node(token.range, Expr::Locals),
                _ => self.node(token.range, Expr::Identifier(name.clone())),
            },
            TokenKind::NumberLiteral(n) => {
                self.node(token.range, Expr::Literal(Literal::Number(*n)))
            }
            TokenKind::StringLiteral(s) => self.node(
                token.range,
                Expr::Literal(Literal::String(SmolStr::new(s))),
            ),
            TokenKind::Eof => return Err(ParseError::UnexpectedEOFDetected((*token).clone())),
            _ => return Err(ParseError::UnexpectedToken((*token).clone())),
        };

        while let Some(token) = self.expect(|kind| {
            matches!(
                kind,
                TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen
            )
        }) {
            primary = match token.kind {
                TokenKind::LBracket => {
                    let property = self.parse_assignment()?;
                    self.consume(
                        |kind| matches!(kind, TokenKind::RBracket),
                        ParseError::ExpectedClosingBracket,
                    )?;
                    let range = primary.range.merge(&self.last_range);
                    self.node(
                        range,
                        Expr::Member {
                            object: primary,
                            property: MemberProperty::Computed(property),
                        },
                    )
                }
                TokenKind::Dot => {
                    let (name, name_range) = self.parse_name()?;
                    let range = primary.range.merge(&name_range);
                    self.node(
                        range,
                        Expr::Member {
                            object: primary,
                            property: MemberProperty::Static(name),
                        },
                    )
                }
                _ => {
                    let args = self.parse_arguments()?;
                    self.consume(
                        |kind| matches!(kind, TokenKind::RParen),
                        ParseError::ExpectedClosingParen,
                    )?;
                    let range = primary.range.merge(&self.last_range);
                    self.node(
                        range,
                        Expr::Call {
                            callee: primary,
                            args,
                            filter: false,
                        },
                    )
                }
            };
        }

        Ok(primary)
    }

    fn parse_identifier(&mut self) -> Result<Shared<Node>, ParseError> {
        let (name, range) = self.parse_name()?;
        Ok(self.node(range, Expr::Identifier(name)))
    }

    fn parse_name(&mut self) -> Result<(SmolStr, Range), ParseError> {
        let token = self.next_token()?;

        match &token.kind {
            TokenKind::Ident(name) => Ok((name.clone(), token.range)),
            _ => Err(ParseError::ExpectedIdentifier((*token).clone())),
        }
    }

    fn parse_arguments(&mut self) -> Result<Args, ParseError> {
        let mut args: Args = SmallVec::new();

        if self.peek_is(|kind| matches!(kind, TokenKind::RParen)) {
            return Ok(args);
        }

        loop {
            args.push(self.parse_assignment()?);
            if self.expect(|kind| matches!(kind, TokenKind::Comma)).is_none() {
                break;
            }
        }

        Ok(args)
    }

    fn parse_array(&mut self, lbracket_token: &Token) -> Result<Shared<Node>, ParseError> {
        let mut elements = Vec::new();

        if !self.peek_is(|kind| matches!(kind, TokenKind::RBracket)) {
            loop {
                // Trailing comma: `[1, 2,]`
                if self.peek_is(|kind| matches!(kind, TokenKind::RBracket)) {
                    break;
                }
                elements.push(self.parse_assignment()?);
                if self.expect(|kind| matches!(kind, TokenKind::Comma)).is_none() {
                    break;
                }
            }
        }

        self.consume(
            |kind| matches!(kind, TokenKind::RBracket),
            ParseError::ExpectedClosingBracket,
        )?;

        let range = lbracket_token.range.merge(&self.last_range);
        Ok(self.node(range, Expr::Array(elements)))
    }

    fn parse_object(&mut self, lbrace_token: &Token) -> Result<Shared<Node>, ParseError> {
        let mut properties = Vec::new();

        if !self.peek_is(|kind| matches!(kind, TokenKind::RBrace)) {
            loop {
                let key_token = self.next_token()?;
                let key = match &key_token.kind {
                    TokenKind::Ident(name) => name.clone(),
                    TokenKind::StringLiteral(s) => SmolStr::new(s),
                    TokenKind::NumberLiteral(n) => SmolStr::new(format_number(*n)),
                    TokenKind::Eof => {
                        return Err(ParseError::UnexpectedEOFDetected((*key_token).clone()));
                    }
                    _ => return Err(ParseError::UnexpectedToken((*key_token).clone())),
                };

                self.consume(
                    |kind| matches!(kind, TokenKind::Colon),
                    |token| ParseError::ExpectedToken(TokenKind::Colon, token),
                )?;
                let value = self.parse_assignment()?;
                properties.push(Property { key, value });

                if self.expect(|kind| matches!(kind, TokenKind::Comma)).is_none() {
                    break;
                }
            }
        }

        self.consume(
            |kind| matches!(kind, TokenKind::RBrace),
            ParseError::ExpectedClosingBrace,
        )?;

        let range = lbrace_token.range.merge(&self.last_range);
        Ok(self.node(range, Expr::Object(properties)))
    }

    fn binary(&mut self, op: BinaryOp, left: Shared<Node>, right: Shared<Node>) -> Shared<Node> {
        let range = left.range.merge(&right.range);
        self.node(range, Expr::Binary { op, left, right })
    }

    fn logical(&mut self, op: LogicalOp, left: Shared<Node>, right: Shared<Node>) -> Shared<Node> {
        let range = left.range.merge(&right.range);
        self.node(range, Expr::Logical { op, left, right })
    }

    #[inline(always)]
    fn binary_op(kind: &TokenKind) -> BinaryOp {
        match kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Asterisk => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Lte => BinaryOp::Lte,
            TokenKind::Gte => BinaryOp::Gte,
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NeEq => BinaryOp::NotEq,
            TokenKind::EqEqEq => BinaryOp::StrictEq,
            _ => BinaryOp::StrictNotEq,
        }
    }

    #[inline(always)]
    fn peek_is(&mut self, expected: fn(&TokenKind) -> bool) -> bool {
        self.tokens.peek().is_some_and(|token| expected(&token.kind))
    }

    /// Consumes the next token if it matches.
    fn expect(&mut self, expected: fn(&TokenKind) -> bool) -> Option<Shared<Token>> {
        if self.peek_is(expected) {
            self.tokens.next().map(|token| {
                self.last_range = token.range;
                Shared::clone(token)
            })
        } else {
            None
        }
    }

    /// Consumes the next token, failing with `error` if it does not match.
    fn consume(
        &mut self,
        expected: fn(&TokenKind) -> bool,
        error: fn(Token) -> ParseError,
    ) -> Result<Shared<Token>, ParseError> {
        match self.expect(expected) {
            Some(token) => Ok(token),
            None => {
                let token = self.next_token()?;
                Err(error((*token).clone()))
            }
        }
    }

    fn next_token(&mut self) -> Result<Shared<Token>, ParseError> {
        match self.tokens.next() {
            Some(token) => {
                self.last_range = token.range;
                Ok(Shared::clone(token))
            }
            None => Err(ParseError::UnexpectedEOFDetected(Token::new(
                TokenKind::Eof,
                self.last_range,
            ))),
        }
    }
}
