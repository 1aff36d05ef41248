pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{tag, take, take_while};
use nom::character::complete::{char, digit1, one_of, satisfy};
use nom::combinator::{map, recognize};
use nom::error::{ErrorKind, ParseError};
use nom::sequence::pair;
use nom::{IResult, Input};
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::range::{Position, Range, Span};

type LexResult<'a, T> = IResult<Span<'a>, T, LexFailure<'a>>;

/// Error type threaded through the nom parsers.
///
/// `error` is only set when a parser has recognized the start of a token and
/// can say precisely what is wrong with it; otherwise the caller reports the
/// offending character.
#[derive(Debug)]
struct LexFailure<'a> {
    input: Span<'a>,
    error: Option<LexerError>,
}

impl<'a> LexFailure<'a> {
    fn fatal(input: Span<'a>, error: LexerError) -> nom::Err<Self> {
        nom::Err::Failure(Self {
            input,
            error: Some(error),
        })
    }
}

impl<'a> ParseError<Span<'a>> for LexFailure<'a> {
    fn from_error_kind(input: Span<'a>, _kind: ErrorKind) -> Self {
        Self { input, error: None }
    }

    fn append(_input: Span<'a>, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> LexResult<Token> {
            map(tag($tag), |span: Span| Token {
                range: span.into(),
                kind: $kind,
            })
            .parse(input)
        }
    };
}

#[derive(Debug, Clone, Default)]
pub struct Lexer;

impl Lexer {
    pub fn new() -> Self {
        Self
    }

    /// Splits `input` into tokens, terminated by a single `Eof` token.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, LexerError> {
        let mut span = Span::new(input);
        let mut tokens = Vec::new();

        loop {
            span = skip_whitespace(span);

            let Some(current) = span.fragment().chars().next() else {
                break;
            };

            match token(span) {
                Ok((rest, token)) => {
                    tokens.push(token);
                    span = rest;
                }
                Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                    return Err(e
                        .error
                        .unwrap_or_else(|| unexpected_character(current, e.input)));
                }
                Err(nom::Err::Incomplete(_)) => {
                    return Err(unexpected_character(current, span));
                }
            }
        }

        tokens.push(Token {
            range: span.into(),
            kind: TokenKind::Eof,
        });

        Ok(tokens)
    }
}

fn unexpected_character(ch: char, span: Span) -> LexerError {
    let start: Position = span.into();
    LexerError::UnexpectedCharacter(
        ch,
        Range::new(start, Position::new(start.line, start.column + 1)),
    )
}

#[inline(always)]
fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\r' | '\t' | '\n' | '\u{000B}' | '\u{00A0}')
}

#[inline(always)]
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

#[inline(always)]
fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn skip_whitespace(input: Span) -> Span {
    let (rest, _) = take_while::<_, _, LexFailure>(is_whitespace)
        .parse(input)
        .unwrap_or((input, input.take(0)));
    rest
}

fn token(input: Span) -> LexResult<Token> {
    alt((
        number_literal,
        string_literal,
        punctuations,
        identifier,
        operators,
    ))
    .parse(input)
}

define_token_parser!(l_bracket, "[", TokenKind::LBracket);
define_token_parser!(r_bracket, "]", TokenKind::RBracket);
define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(r_brace, "}", TokenKind::RBrace);
define_token_parser!(colon, ":", TokenKind::Colon);
define_token_parser!(dot, ".", TokenKind::Dot);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(question, "?", TokenKind::Question);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);

define_token_parser!(eq_eq_eq, "===", TokenKind::EqEqEq);
define_token_parser!(ne_eq_eq, "!==", TokenKind::NeEqEq);
define_token_parser!(eq_eq, "==", TokenKind::EqEq);
define_token_parser!(ne_eq, "!=", TokenKind::NeEq);
define_token_parser!(lte, "<=", TokenKind::Lte);
define_token_parser!(gte, ">=", TokenKind::Gte);
define_token_parser!(and, "&&", TokenKind::And);
define_token_parser!(or, "||", TokenKind::Or);
define_token_parser!(equal, "=", TokenKind::Equal);
define_token_parser!(not, "!", TokenKind::Not);
define_token_parser!(lt, "<", TokenKind::Lt);
define_token_parser!(gt, ">", TokenKind::Gt);
define_token_parser!(pipe, "|", TokenKind::Pipe);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(asterisk, "*", TokenKind::Asterisk);
define_token_parser!(slash, "/", TokenKind::Slash);
define_token_parser!(percent, "%", TokenKind::Percent);

fn punctuations(input: Span) -> LexResult<Token> {
    alt((
        l_bracket, r_bracket, comma, l_brace, r_brace, colon, dot, l_paren, r_paren, question,
        semi_colon,
    ))
    .parse(input)
}

// Longest match first: three-character operators shadow their prefixes.
fn operators(input: Span) -> LexResult<Token> {
    alt((
        eq_eq_eq, ne_eq_eq, eq_eq, ne_eq, lte, gte, and, or, equal, not, lt, gt, pipe, plus, minus,
        asterisk, slash, percent,
    ))
    .parse(input)
}

fn identifier(input: Span) -> LexResult<Token> {
    map(
        recognize(pair(satisfy(is_ident_start), take_while(is_ident_part))),
        |span: Span| Token {
            range: span.into(),
            kind: TokenKind::Ident(SmolStr::new(span.fragment())),
        },
    )
    .parse(input)
}

fn mantissa(input: Span) -> LexResult<Span> {
    recognize(pair(
        alt((digit1, recognize(pair(char('.'), digit1)))),
        take_while(|c: char| c.is_ascii_digit() || c == '.'),
    ))
    .parse(input)
}

fn exponent(input: Span) -> LexResult<Option<Span>> {
    let mut chars = input.fragment().chars();

    if !matches!(chars.next(), Some('e' | 'E')) {
        return Ok((input, None));
    }

    match (chars.next(), chars.next()) {
        (Some(c), _) if c.is_ascii_digit() => {
            let parsed: LexResult<Span> = recognize(pair(one_of("eE"), digit1)).parse(input);
            parsed.map(|(rest, span)| (rest, Some(span)))
        }
        (Some('+' | '-'), Some(c)) if c.is_ascii_digit() => {
            let parsed: LexResult<Span> =
                recognize((one_of("eE"), one_of("+-"), digit1)).parse(input);
            parsed.map(|(rest, span)| (rest, Some(span)))
        }
        _ => Err(LexFailure::fatal(
            input,
            LexerError::InvalidExponent(input.take(1).into()),
        )),
    }
}

fn number_literal(input: Span) -> LexResult<Token> {
    let (rest, span) = recognize(pair(mantissa, exponent)).parse(input)?;
    let text = span.fragment().to_ascii_lowercase();

    match text.parse::<f64>() {
        Ok(n) => Ok((
            rest,
            Token {
                range: span.into(),
                kind: TokenKind::NumberLiteral(n),
            },
        )),
        Err(_) => Err(LexFailure::fatal(
            input,
            LexerError::InvalidNumber(text, span.into()),
        )),
    }
}

#[inline(always)]
fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        'f' => '\u{000C}',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{000B}',
        other => other,
    }
}

fn string_literal(input: Span) -> LexResult<Token> {
    let opening: LexResult<char> = one_of("'\"").parse(input);
    let (body, quote) = opening?;
    let chars = body.fragment().chars().collect::<Vec<_>>();
    let mut value = String::new();
    let mut escape = false;
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];

        if escape {
            if ch == 'u' {
                let hex = chars
                    .iter()
                    .skip(index + 1)
                    .take(4)
                    .collect::<String>();
                let decoded = (hex.len() == 4 && hex.chars().all(|c| c.is_ascii_hexdigit()))
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);

                match decoded {
                    Some(c) => value.push(c),
                    None => {
                        let escape_start = body.take_from(
                            chars[..index].iter().map(|c| c.len_utf8()).sum::<usize>(),
                        );
                        return Err(LexFailure::fatal(
                            input,
                            LexerError::InvalidUnicodeEscape(hex, escape_start.take(1).into()),
                        ));
                    }
                }
                index += 4;
            } else {
                value.push(unescape(ch));
            }
            escape = false;
        } else if ch == quote {
            let closing: LexResult<Span> = take(index + 1).parse(body);
            let (rest, _) = closing?;
            return Ok((
                rest,
                Token {
                    range: Range::new(input.into(), rest.into()),
                    kind: TokenKind::StringLiteral(value),
                },
            ));
        } else if ch == '\\' {
            escape = true;
        } else {
            value.push(ch);
        }

        index += 1;
    }

    Err(LexFailure::fatal(
        input,
        LexerError::UnterminatedString(input.into()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new()
            .tokenize(input)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[rstest]
    #[case::integer("42", vec![TokenKind::NumberLiteral(42.0), TokenKind::Eof])]
    #[case::float("4.2", vec![TokenKind::NumberLiteral(4.2), TokenKind::Eof])]
    #[case::leading_dot(".42", vec![TokenKind::NumberLiteral(0.42), TokenKind::Eof])]
    #[case::exponent("42e3", vec![TokenKind::NumberLiteral(42000.0), TokenKind::Eof])]
    #[case::upper_exponent("42E3", vec![TokenKind::NumberLiteral(42000.0), TokenKind::Eof])]
    #[case::negative_exponent("4200e-2", vec![TokenKind::NumberLiteral(42.0), TokenKind::Eof])]
    #[case::positive_exponent(".42e+2", vec![TokenKind::NumberLiteral(42.0), TokenKind::Eof])]
    #[case::single_quoted("'abc'", vec![TokenKind::StringLiteral("abc".to_string()), TokenKind::Eof])]
    #[case::double_quoted("\"abc\"", vec![TokenKind::StringLiteral("abc".to_string()), TokenKind::Eof])]
    #[case::empty_string("''", vec![TokenKind::StringLiteral(String::new()), TokenKind::Eof])]
    #[case::escapes(r#"'\n\r\\'"#, vec![TokenKind::StringLiteral("\n\r\\".to_string()), TokenKind::Eof])]
    #[case::escaped_quote(r#"'a\'b'"#, vec![TokenKind::StringLiteral("a'b".to_string()), TokenKind::Eof])]
    #[case::unknown_escape(r#"'\x'"#, vec![TokenKind::StringLiteral("x".to_string()), TokenKind::Eof])]
    #[case::unicode(r#"'\u00A0'"#, vec![TokenKind::StringLiteral("\u{00A0}".to_string()), TokenKind::Eof])]
    #[case::identifier("$scope_1", vec![TokenKind::Ident(SmolStr::new("$scope_1")), TokenKind::Eof])]
    #[case::member(
        "a.b",
        vec![
            TokenKind::Ident(SmolStr::new("a")),
            TokenKind::Dot,
            TokenKind::Ident(SmolStr::new("b")),
            TokenKind::Eof
        ]
    )]
    #[case::longest_operator(
        "a!==b",
        vec![
            TokenKind::Ident(SmolStr::new("a")),
            TokenKind::NeEqEq,
            TokenKind::Ident(SmolStr::new("b")),
            TokenKind::Eof
        ]
    )]
    #[case::two_char_operator(
        "1<=2",
        vec![
            TokenKind::NumberLiteral(1.0),
            TokenKind::Lte,
            TokenKind::NumberLiteral(2.0),
            TokenKind::Eof
        ]
    )]
    #[case::whitespace(
        " \t\n\u{000B}\u{00A0}a ",
        vec![TokenKind::Ident(SmolStr::new("a")), TokenKind::Eof]
    )]
    #[case::punctuation(
        "[],{}:()?;",
        vec![
            TokenKind::LBracket,
            TokenKind::RBracket,
            TokenKind::Comma,
            TokenKind::LBrace,
            TokenKind::RBrace,
            TokenKind::Colon,
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Question,
            TokenKind::SemiColon,
            TokenKind::Eof
        ]
    )]
    #[case::filter(
        "a | f:1",
        vec![
            TokenKind::Ident(SmolStr::new("a")),
            TokenKind::Pipe,
            TokenKind::Ident(SmolStr::new("f")),
            TokenKind::Colon,
            TokenKind::NumberLiteral(1.0),
            TokenKind::Eof
        ]
    )]
    #[case::empty("", vec![TokenKind::Eof])]
    fn test_tokenize(#[case] input: &str, #[case] expected: Vec<TokenKind>) {
        assert_eq!(kinds(input), expected);
    }

    #[rstest]
    #[case::dangling_exponent_sign("42e-")]
    #[case::exponent_without_digit("42e-a")]
    #[case::dangling_exponent("42e")]
    fn test_invalid_exponent(#[case] input: &str) {
        assert!(matches!(
            Lexer::new().tokenize(input),
            Err(LexerError::InvalidExponent(_))
        ));
    }

    #[rstest]
    #[case::single("'abc")]
    #[case::mismatched("\"abc'")]
    #[case::trailing_escape(r#"'abc\'"#)]
    fn test_unterminated_string(#[case] input: &str) {
        assert!(matches!(
            Lexer::new().tokenize(input),
            Err(LexerError::UnterminatedString(_))
        ));
    }

    #[test]
    fn test_invalid_unicode_escape() {
        assert_eq!(
            Lexer::new().tokenize(r#"'\u00T0'"#).map_err(|e| e.to_string()),
            Err("Invalid unicode escape `\\u00T0`".to_string())
        );
    }

    #[rstest]
    #[case::hash("a # b", '#')]
    #[case::single_ampersand("a & b", '&')]
    #[case::backtick("`", '`')]
    fn test_unexpected_character(#[case] input: &str, #[case] expected: char) {
        match Lexer::new().tokenize(input) {
            Err(LexerError::UnexpectedCharacter(ch, _)) => assert_eq!(ch, expected),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_number() {
        assert!(matches!(
            Lexer::new().tokenize("1.2.3"),
            Err(LexerError::InvalidNumber(_, _))
        ));
    }

    #[test]
    fn test_token_ranges() {
        let tokens = Lexer::new().tokenize("ab + 'c'").unwrap();
        assert_eq!(tokens[0].range, Range::new(Position::new(1, 1), Position::new(1, 3)));
        assert_eq!(tokens[1].range, Range::new(Position::new(1, 4), Position::new(1, 5)));
        assert_eq!(tokens[2].range, Range::new(Position::new(1, 6), Position::new(1, 9)));
    }
}
