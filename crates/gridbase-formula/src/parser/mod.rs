//! Formula parser
//!
//! A hand-written tokenizer and recursive descent parser for the gridbase
//! formula language. Binary operators are desugared to function calls at
//! parse time (`a + b` becomes `add(a,b)`), so everything downstream only
//! deals with literals, field references and calls.
//!
//! The lexer keeps byte spans for every token; the [`rename`] module uses
//! them to rewrite `field('...')` arguments while leaving every other byte
//! of the source untouched.

pub mod rename;

use std::str::FromStr;

use bigdecimal::BigDecimal;
use gridbase_core::{FieldId, NUMBER_MAX_DIGITS};

use crate::ast::FormulaExpr;
use crate::error::{FormulaError, FormulaResult, ParseError};

/// Maximum nesting depth before parsing (and typing) gives up with a
/// "formula too large" error instead of overflowing the stack.
pub const MAX_FORMULA_DEPTH: usize = 100;

/// Parse a formula string into an untyped AST
///
/// # Example
/// ```rust
/// use gridbase_formula::parser::parse;
///
/// let ast = parse("1 + 2").unwrap();
/// let ast = parse("field('Cost') * 1.5").unwrap();
/// let ast = parse("sum(lookup('Orders','Total'))").unwrap();
/// ```
pub fn parse(source: &str) -> FormulaResult<FormulaExpr> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expression(0)?;
    if parser.current.kind != TokenKind::Eof {
        return Err(parser.error("unexpected characters after expression").into());
    }
    Ok(expr)
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    // Literals
    String(String),
    Number(String),

    // Function names, field/lookup keywords, booleans
    Identifier(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Comma,

    // Delimiters
    LeftParen,
    RightParen,

    // End of input
    Eof,
}

/// A token together with the byte span it occupies in the source
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Tokenizer over formula source text
pub(crate) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Tokenize the whole input, including the trailing Eof token.
    pub(crate) fn tokenize(input: &'a str) -> Result<Vec<Token>, ParseError> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            position: self.pos,
            message: message.into(),
        }
    }

    /// Skip whitespace plus `// ...` line comments and `/* ... */` block
    /// comments.
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            while self.peek_char().map_or(false, |c| c.is_whitespace()) {
                self.advance();
            }
            match (self.peek_char(), self.peek_char_at(1)) {
                (Some('/'), Some('/')) => {
                    while self.peek_char().map_or(false, |c| c != '\n') {
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos;
                    self.advance();
                    self.advance();
                    loop {
                        match (self.peek_char(), self.peek_char_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (None, _) => {
                                return Err(ParseError {
                                    position: start,
                                    message: "unterminated block comment".to_string(),
                                })
                            }
                            _ => self.advance(),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub(crate) fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia()?;
        let start = self.pos;

        let c = match self.peek_char() {
            Some(c) => c,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    start,
                    end: start,
                })
            }
        };

        let kind = match c {
            '+' => {
                self.advance();
                TokenKind::Plus
            }
            '-' => {
                self.advance();
                TokenKind::Minus
            }
            '*' => {
                self.advance();
                TokenKind::Star
            }
            '/' => {
                self.advance();
                TokenKind::Slash
            }
            ',' => {
                self.advance();
                TokenKind::Comma
            }
            '(' => {
                self.advance();
                TokenKind::LeftParen
            }
            ')' => {
                self.advance();
                TokenKind::RightParen
            }
            '=' => {
                self.advance();
                TokenKind::Equal
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::NotEqual
                } else {
                    return Err(self.error("expected '=' after '!'"));
                }
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::GreaterThan
                }
            }
            '<' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::LessEqual
                } else {
                    TokenKind::LessThan
                }
            }
            '\'' | '"' => self.scan_string(c)?,
            c if c.is_ascii_digit() => self.scan_number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.scan_identifier(),
            other => return Err(self.error(format!("unexpected character '{}'", other))),
        };

        Ok(Token {
            kind,
            start,
            end: self.pos,
        })
    }

    fn scan_string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.advance(); // opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some(c @ ('\'' | '"' | '\\')) => {
                            s.push(c);
                            self.advance();
                        }
                        Some('n') => {
                            s.push('\n');
                            self.advance();
                        }
                        Some('t') => {
                            s.push('\t');
                            self.advance();
                        }
                        _ => return Err(self.error("invalid escape sequence")),
                    }
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(TokenKind::String(s));
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
                None => {
                    return Err(ParseError {
                        position: start,
                        message: "unterminated string literal".to_string(),
                    })
                }
            }
        }
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_char() == Some('.')
            && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit())
        {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        TokenKind::Number(self.input[start..self.pos].to_string())
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        TokenKind::Identifier(self.input[start..self.pos].to_string())
    }
}

/// Formula parser
struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            position: self.current.start,
            message: message.into(),
        }
    }

    fn consume(&mut self) -> FormulaResult<Token> {
        let token = std::mem::replace(&mut self.current, self.lexer.next_token()?);
        Ok(token)
    }

    fn expect(&mut self, expected: TokenKind, what: &str) -> FormulaResult<()> {
        if self.current.kind == expected {
            self.consume()?;
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)).into())
        }
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, !=, <, <=, >, >=
    // 2. Addition/Subtraction: +, -
    // 3. Multiplication/Division: *, /
    // 4. Unary minus (folded into numeric literals, otherwise minus(0, x))
    // 5. Primary: literals, field references, function calls, parentheses

    fn parse_expression(&mut self, depth: usize) -> FormulaResult<FormulaExpr> {
        if depth > MAX_FORMULA_DEPTH {
            return Err(FormulaError::MaximumFormulaSize);
        }
        self.parse_comparison(depth)
    }

    fn parse_comparison(&mut self, depth: usize) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_additive(depth)?;
        loop {
            let name = match self.current.kind {
                TokenKind::Equal => "equal",
                TokenKind::NotEqual => "not_equal",
                TokenKind::GreaterThan => "greater_than",
                TokenKind::GreaterEqual => "greater_than_or_equal",
                TokenKind::LessThan => "less_than",
                TokenKind::LessEqual => "less_than_or_equal",
                _ => break,
            };
            self.consume()?;
            let right = self.parse_additive(depth)?;
            left = FormulaExpr::call(name, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_additive(&mut self, depth: usize) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_multiplicative(depth)?;
        loop {
            let name = match self.current.kind {
                TokenKind::Plus => "add",
                TokenKind::Minus => "minus",
                _ => break,
            };
            self.consume()?;
            let right = self.parse_multiplicative(depth)?;
            left = FormulaExpr::call(name, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self, depth: usize) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_unary(depth)?;
        loop {
            let name = match self.current.kind {
                TokenKind::Star => "multiply",
                TokenKind::Slash => "divide",
                _ => break,
            };
            self.consume()?;
            let right = self.parse_unary(depth)?;
            left = FormulaExpr::call(name, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_unary(&mut self, depth: usize) -> FormulaResult<FormulaExpr> {
        if depth > MAX_FORMULA_DEPTH {
            return Err(FormulaError::MaximumFormulaSize);
        }
        if self.current.kind == TokenKind::Minus {
            self.consume()?;
            // A minus directly before a numeric literal folds into it; any
            // other operand desugars to a subtraction from zero.
            if let TokenKind::Number(text) = self.current.kind.clone() {
                self.consume()?;
                return self.number_literal(&format!("-{}", text));
            }
            let operand = self.parse_unary(depth + 1)?;
            return Ok(FormulaExpr::call(
                "minus",
                vec![FormulaExpr::IntLiteral(BigDecimal::from(0)), operand],
            ));
        }
        self.parse_primary(depth)
    }

    fn parse_primary(&mut self, depth: usize) -> FormulaResult<FormulaExpr> {
        match self.current.kind.clone() {
            TokenKind::Number(text) => {
                self.consume()?;
                self.number_literal(&text)
            }
            TokenKind::String(s) => {
                self.consume()?;
                Ok(FormulaExpr::StringLiteral(s))
            }
            TokenKind::LeftParen => {
                self.consume()?;
                let expr = self.parse_expression(depth + 1)?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(expr)
            }
            TokenKind::Identifier(name) => {
                self.consume()?;
                match name.to_lowercase().as_str() {
                    "true" => Ok(FormulaExpr::BooleanLiteral(true)),
                    "false" => Ok(FormulaExpr::BooleanLiteral(false)),
                    "field" => self.parse_field_reference(),
                    "lookup" => self.parse_lookup_reference(),
                    "field_by_id" => self.parse_field_by_id_reference(),
                    lower => self.parse_function_call(lower.to_string(), depth),
                }
            }
            _ => Err(self.error("unexpected token").into()),
        }
    }

    fn number_literal(&self, text: &str) -> FormulaResult<FormulaExpr> {
        let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
        if digits > NUMBER_MAX_DIGITS as usize {
            return Err(self
                .error(format!("number has more than {} digits", NUMBER_MAX_DIGITS))
                .into());
        }
        let value = BigDecimal::from_str(text)
            .map_err(|_| self.error(format!("invalid number '{}'", text)))?;
        if text.contains('.') {
            Ok(FormulaExpr::DecimalLiteral(value))
        } else {
            Ok(FormulaExpr::IntLiteral(value))
        }
    }

    fn parse_string_argument(&mut self) -> FormulaResult<String> {
        match self.consume()?.kind {
            TokenKind::String(s) => Ok(s),
            _ => Err(self.error("expected a string literal").into()),
        }
    }

    fn parse_field_reference(&mut self) -> FormulaResult<FormulaExpr> {
        self.expect(TokenKind::LeftParen, "'(' after field")?;
        let name = self.parse_string_argument()?;
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(FormulaExpr::field(name))
    }

    fn parse_lookup_reference(&mut self) -> FormulaResult<FormulaExpr> {
        self.expect(TokenKind::LeftParen, "'(' after lookup")?;
        let link = self.parse_string_argument()?;
        self.expect(TokenKind::Comma, "','")?;
        let target = self.parse_string_argument()?;
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(FormulaExpr::lookup(link, target))
    }

    fn parse_field_by_id_reference(&mut self) -> FormulaResult<FormulaExpr> {
        self.expect(TokenKind::LeftParen, "'(' after field_by_id")?;
        let id = match self.consume()?.kind {
            TokenKind::Number(text) => text
                .parse::<u64>()
                .map_err(|_| self.error("expected a field id"))?,
            _ => return Err(self.error("expected a field id").into()),
        };
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(FormulaExpr::FieldByIdReference(FieldId(id)))
    }

    fn parse_function_call(&mut self, name: String, depth: usize) -> FormulaResult<FormulaExpr> {
        self.expect(TokenKind::LeftParen, "'(' after function name")?;
        let mut args = Vec::new();
        if self.current.kind != TokenKind::RightParen {
            args.push(self.parse_expression(depth + 1)?);
            while self.current.kind == TokenKind::Comma {
                self.consume()?;
                args.push(self.parse_expression(depth + 1)?);
            }
        }
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(FormulaExpr::FunctionCall { name, args })
    }
}
