//! Leaf expression language
//!
//! ```text
//! expr := term ('+' term)*
//! term := 'text ${key} text' | identifier | ${key} | integer
//!       | function '(' expr (',' expr)* ')'
//! ```
//!
//! `+` concatenates. Identifiers and `${key}` placeholders read the row;
//! unknown keys evaluate to the empty string. The only callable functions
//! are the [`Builtin`]s.

use super::context::{Builtin, ExprValue, ExpressionContext};
use crate::error::{ExpressionError, ExpressionResult};

/// Piece of a string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Placeholder(String),
}

/// A compiled expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(Vec<Segment>),
    Field(String),
    Integer(i64),
    Call { function: Builtin, args: Vec<Expr> },
    Concat(Vec<Expr>),
}

impl Expr {
    /// Compile expression text.
    pub fn parse(source: &str) -> ExpressionResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some((offset, token)) => Err(syntax(*offset, format!("unexpected {}", token.describe()))),
        }
    }

    /// Evaluate against one row.
    pub fn evaluate(&self, ctx: &ExpressionContext<'_>) -> ExpressionResult<ExprValue> {
        match self {
            Expr::Literal(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(s) => text.push_str(s),
                        Segment::Placeholder(key) => text.push_str(ctx.value(key)),
                    }
                }
                Ok(ExprValue::Text(text))
            }
            Expr::Field(name) => Ok(ExprValue::Text(ctx.value(name).to_string())),
            Expr::Integer(n) => Ok(ExprValue::Integer(*n)),
            Expr::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(ctx))
                    .collect::<ExpressionResult<Vec<_>>>()?;
                ctx.call(*function, &values)
            }
            Expr::Concat(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&part.evaluate(ctx)?.as_text());
                }
                Ok(ExprValue::Text(text))
            }
        }
    }
}

fn syntax(offset: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        offset,
        message: message.into(),
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(Vec<Segment>),
    Ident(String),
    Placeholder(String),
    Integer(i64),
    Plus,
    Comma,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Str(_) => "string literal".to_string(),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Placeholder(key) => format!("placeholder '${{{}}}'", key),
            Token::Integer(n) => format!("number {}", n),
            Token::Plus => "'+'".to_string(),
            Token::Comma => "','".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c == '-' || c.is_ascii_alphanumeric()
}

fn tokenize(source: &str) -> ExpressionResult<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push((offset, Token::Plus));
            }
            ',' => {
                chars.next();
                tokens.push((offset, Token::Comma));
            }
            '(' => {
                chars.next();
                tokens.push((offset, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((offset, Token::RParen));
            }
            '\'' => {
                chars.next();
                let mut segments = Vec::new();
                let mut text = String::new();
                let mut closed = false;
                while let Some((pos, c)) = chars.next() {
                    match c {
                        '\'' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => return Err(syntax(pos, "dangling escape")),
                        },
                        '$' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                            chars.next();
                            let key = read_placeholder(&mut chars, pos)?;
                            if !text.is_empty() {
                                segments.push(Segment::Text(std::mem::take(&mut text)));
                            }
                            segments.push(Segment::Placeholder(key));
                        }
                        c => text.push(c),
                    }
                }
                if !closed {
                    return Err(syntax(offset, "unterminated string literal"));
                }
                if !text.is_empty() || segments.is_empty() {
                    segments.push(Segment::Text(text));
                }
                tokens.push((offset, Token::Str(segments)));
            }
            '$' => {
                chars.next();
                match chars.next() {
                    Some((_, '{')) => {
                        let key = read_placeholder(&mut chars, offset)?;
                        tokens.push((offset, Token::Placeholder(key)));
                    }
                    _ => return Err(syntax(offset, "expected '{' after '$'")),
                }
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let n = digits
                    .parse::<i64>()
                    .map_err(|_| syntax(offset, "integer out of range"))?;
                tokens.push((offset, Token::Integer(n)));
            }
            c if is_ident_start(c) => {
                let mut name = String::new();
                while let Some(&(_, n)) = chars.peek() {
                    if !is_ident_char(n) {
                        break;
                    }
                    name.push(n);
                    chars.next();
                }
                tokens.push((offset, Token::Ident(name)));
            }
            other => return Err(syntax(offset, format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

fn read_placeholder(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    start: usize,
) -> ExpressionResult<String> {
    let mut key = String::new();
    for (_, c) in chars.by_ref() {
        if c == '}' {
            return Ok(key);
        }
        key.push(c);
    }
    Err(syntax(start, "unterminated placeholder"))
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> ExpressionResult<()> {
        match self.next() {
            Some((_, token)) if token == expected => Ok(()),
            Some((offset, token)) => Err(syntax(
                offset,
                format!("expected {}, found {}", expected.describe(), token.describe()),
            )),
            None => Err(syntax(self.end, format!("expected {}", expected.describe()))),
        }
    }

    fn expr(&mut self) -> ExpressionResult<Expr> {
        let mut parts = vec![self.term()?];
        while matches!(self.peek(), Some((_, Token::Plus))) {
            self.next();
            parts.push(self.term()?);
        }
        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            Ok(Expr::Concat(parts))
        }
    }

    fn term(&mut self) -> ExpressionResult<Expr> {
        match self.next() {
            Some((_, Token::Str(segments))) => Ok(Expr::Literal(segments)),
            Some((_, Token::Placeholder(key))) => Ok(Expr::Field(key)),
            Some((_, Token::Integer(n))) => Ok(Expr::Integer(n)),
            Some((_, Token::Ident(name))) => {
                if matches!(self.peek(), Some((_, Token::LParen))) {
                    self.next();
                    self.call(name)
                } else {
                    Ok(Expr::Field(name))
                }
            }
            Some((offset, token)) => Err(syntax(offset, format!("unexpected {}", token.describe()))),
            None => Err(syntax(self.end, "unexpected end of expression")),
        }
    }

    fn call(&mut self, name: String) -> ExpressionResult<Expr> {
        let function =
            Builtin::lookup(&name).ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;

        let mut args = Vec::new();
        if !matches!(self.peek(), Some((_, Token::RParen))) {
            args.push(self.expr()?);
            while matches!(self.peek(), Some((_, Token::Comma))) {
                self.next();
                args.push(self.expr()?);
            }
        }
        self.expect(Token::RParen)?;

        if args.len() != function.arity() {
            return Err(ExpressionError::Arity {
                name,
                expected: function.arity(),
                got: args.len(),
            });
        }

        Ok(Expr::Call { function, args })
    }
}
