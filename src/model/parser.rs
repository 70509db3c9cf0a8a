//! Lexer and recursive-descent parser for model text.
//!
//! # Grammar
//!
//! ```text
//! model     := ["model"] "{" statement* "}"  |  statement*
//! statement := "for" "(" IDENT "in" expr ":" expr ")" "{" statement* "}"
//!            | LINK "(" noderef ")" "<-" expr
//!            | noderef "~" IDENT "(" [expr ("," expr)*] ")"
//!            | noderef "<-" expr
//! noderef   := IDENT ["[" index ("," index)* "]"]
//! index     := <empty> | expr [":" expr]
//! expr      := term (("+" | "-") term)*
//! term      := unary (("*" | "/") unary)*
//! unary     := "-" unary | power
//! power     := atom ["^" unary]
//! atom      := NUMBER | IDENT "(" args ")" | noderef | "(" expr ")"
//! ```
//!
//! Whitespace and newlines are insignificant, `;` is an optional separator
//! and `#` starts a comment running to the end of the line.

use super::{BinOp, DistributionCall, Expr, Index, Link, Model, NodeRef, Statement};
use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Tilde,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Number(n) => format!("number {n}"),
            Self::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    const fn symbol(&self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Semicolon => ";",
            Self::Tilde => "~",
            Self::Arrow => "<-",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Caret => "^",
            Self::Ident(_) | Self::Number(_) | Self::Eof => "",
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    line: usize,
    column: usize,
}

fn error(line: usize, column: usize, message: impl Into<String>) -> SimError {
    SimError::Parse {
        line,
        column,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> SimResult<Vec<Spanned>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut line = 1;
    let mut column = 1;

    while pos < chars.len() {
        let c = chars[pos];
        let (start_line, start_column) = (line, column);

        if c == '\n' {
            pos += 1;
            line += 1;
            column = 1;
            continue;
        }
        if c.is_whitespace() {
            pos += 1;
            column += 1;
            continue;
        }
        if c == '#' {
            while pos < chars.len() && chars[pos] != '\n' {
                pos += 1;
            }
            continue;
        }

        let (token, len) = if c.is_ascii_alphabetic() {
            let len = chars[pos..]
                .iter()
                .take_while(|ch| ch.is_ascii_alphanumeric() || **ch == '.' || **ch == '_')
                .count();
            (Token::Ident(chars[pos..pos + len].iter().collect()), len)
        } else if c.is_ascii_digit() || (c == '.' && chars.get(pos + 1).is_some_and(char::is_ascii_digit)) {
            let len = number_length(&chars[pos..]);
            let literal: String = chars[pos..pos + len].iter().collect();
            let value = literal
                .parse::<f64>()
                .map_err(|_| error(start_line, start_column, format!("invalid number '{literal}'")))?;
            (Token::Number(value), len)
        } else {
            match c {
                '(' => (Token::LParen, 1),
                ')' => (Token::RParen, 1),
                '{' => (Token::LBrace, 1),
                '}' => (Token::RBrace, 1),
                '[' => (Token::LBracket, 1),
                ']' => (Token::RBracket, 1),
                ',' => (Token::Comma, 1),
                ':' => (Token::Colon, 1),
                ';' => (Token::Semicolon, 1),
                '~' => (Token::Tilde, 1),
                '+' => (Token::Plus, 1),
                '*' => (Token::Star, 1),
                '/' => (Token::Slash, 1),
                '^' => (Token::Caret, 1),
                '-' => (Token::Minus, 1),
                '<' if chars.get(pos + 1) == Some(&'-') => (Token::Arrow, 2),
                other => {
                    return Err(error(
                        start_line,
                        start_column,
                        format!("unexpected character '{other}'"),
                    ))
                }
            }
        };

        tokens.push(Spanned {
            token,
            line: start_line,
            column: start_column,
        });
        pos += len;
        column += len;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
        column,
    });
    Ok(tokens)
}

/// Length of the numeric literal at the start of `chars`:
/// digits, optional fraction, optional exponent.
fn number_length(chars: &[char]) -> usize {
    let digits = |from: usize| chars[from..].iter().take_while(|c| c.is_ascii_digit()).count();

    let mut len = digits(0);
    if chars.get(len) == Some(&'.') {
        len += 1;
        len += digits(len);
    }
    if matches!(chars.get(len), Some('e' | 'E')) {
        let mut exp = len + 1;
        if matches!(chars.get(exp), Some('+' | '-')) {
            exp += 1;
        }
        let exp_digits = digits(exp);
        if exp_digits > 0 {
            len = exp + exp_digits;
        }
    }
    len
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, message: impl Into<String>) -> SimError {
        let spanned = &self.tokens[self.pos];
        error(spanned.line, spanned.column, message)
    }

    fn expect(&mut self, expected: &Token) -> SimResult<()> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected {}, found {}",
                expected.describe(),
                self.peek().describe()
            )))
        }
    }

    fn expect_ident(&mut self) -> SimResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!("expected identifier, found {}", other.describe()))),
        }
    }

    fn skip_separators(&mut self) {
        while self.peek() == &Token::Semicolon {
            self.advance();
        }
    }

    fn parse_model(&mut self) -> SimResult<Model> {
        let wrapped = matches!(self.peek(), Token::Ident(name) if name == "model")
            && self.peek_at(1) == &Token::LBrace;

        let statements = if wrapped {
            self.advance();
            self.expect(&Token::LBrace)?;
            let body = self.parse_block()?;
            self.expect(&Token::RBrace)?;
            self.skip_separators();
            body
        } else {
            self.parse_block()?
        };

        if self.peek() != &Token::Eof {
            return Err(self.error_here(format!(
                "unexpected {} after model",
                self.peek().describe()
            )));
        }
        Ok(Model::new(statements))
    }

    /// Statements up to (not including) `}` or end of input.
    fn parse_block(&mut self) -> SimResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                Token::RBrace | Token::Eof => return Ok(statements),
                _ => statements.push(self.parse_statement()?),
            }
        }
    }

    fn parse_statement(&mut self) -> SimResult<Statement> {
        let name = match self.peek() {
            Token::Ident(name) => name.clone(),
            other => {
                return Err(self.error_here(format!(
                    "expected a statement, found {}",
                    other.describe()
                )))
            }
        };

        if name == "for" && self.peek_at(1) == &Token::LParen {
            return self.parse_for();
        }

        if self.peek_at(1) == &Token::LParen {
            let link = Link::from_keyword(&name)
                .ok_or_else(|| self.error_here(format!("unknown link function '{name}'")))?;
            self.advance();
            self.expect(&Token::LParen)?;
            let target = self.parse_node_ref()?;
            self.expect(&Token::RParen)?;
            self.expect(&Token::Arrow)?;
            let expr = self.parse_expr()?;
            return Ok(Statement::linked(link, target, expr));
        }

        let target = self.parse_node_ref()?;
        match self.peek() {
            Token::Tilde => {
                self.advance();
                let dist = self.expect_ident()?;
                self.expect(&Token::LParen)?;
                let args = self.parse_args()?;
                Ok(Statement::Stochastic {
                    target,
                    distribution: DistributionCall { name: dist, args },
                })
            }
            Token::Arrow => {
                self.advance();
                Ok(Statement::deterministic(target, self.parse_expr()?))
            }
            other => Err(self.error_here(format!(
                "expected '~' or '<-', found {}",
                other.describe()
            ))),
        }
    }

    fn parse_for(&mut self) -> SimResult<Statement> {
        self.advance();
        self.expect(&Token::LParen)?;
        let var = self.expect_ident()?;
        match self.peek() {
            Token::Ident(kw) if kw == "in" => {
                self.advance();
            }
            other => {
                return Err(self.error_here(format!("expected 'in', found {}", other.describe())))
            }
        }
        let from = self.parse_expr()?;
        self.expect(&Token::Colon)?;
        let to = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        self.expect(&Token::LBrace)?;
        let body = self.parse_block()?;
        self.expect(&Token::RBrace)?;
        Ok(Statement::For {
            var,
            from,
            to,
            body,
        })
    }

    /// Comma-separated expressions after an opening `(`, consuming `)`.
    fn parse_args(&mut self) -> SimResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == &Token::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                Token::RParen => {
                    self.advance();
                    return Ok(args);
                }
                other => {
                    return Err(self.error_here(format!(
                        "expected ',' or ')', found {}",
                        other.describe()
                    )))
                }
            }
        }
    }

    fn parse_node_ref(&mut self) -> SimResult<NodeRef> {
        let name = self.expect_ident()?;
        let mut indices = Vec::new();
        if self.peek() == &Token::LBracket {
            self.advance();
            loop {
                let index = match self.peek() {
                    Token::Comma | Token::RBracket => Index::All,
                    _ => {
                        let first = self.parse_expr()?;
                        if self.peek() == &Token::Colon {
                            self.advance();
                            Index::Range(first, self.parse_expr()?)
                        } else {
                            Index::Expr(first)
                        }
                    }
                };
                indices.push(index);
                match self.peek() {
                    Token::Comma => {
                        self.advance();
                    }
                    Token::RBracket => {
                        self.advance();
                        break;
                    }
                    other => {
                        return Err(self.error_here(format!(
                            "expected ',' or ']', found {}",
                            other.describe()
                        )))
                    }
                }
            }
        }
        Ok(NodeRef { name, indices })
    }

    fn parse_expr(&mut self) -> SimResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_term(&mut self) -> SimResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> SimResult<Expr> {
        if self.peek() == &Token::Minus {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::neg(inner));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> SimResult<Expr> {
        let base = self.parse_atom()?;
        if self.peek() == &Token::Caret {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::pow(base, exponent));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> SimResult<Expr> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.peek_at(1) == &Token::LParen {
                    self.advance();
                    self.advance();
                    let args = self.parse_args()?;
                    Ok(Expr::Call { func: name, args })
                } else {
                    Ok(Expr::Node(self.parse_node_ref()?))
                }
            }
            other => Err(self.error_here(format!(
                "expected an expression, found {}",
                other.describe()
            ))),
        }
    }
}

/// Parse model text into an AST.
///
/// # Errors
///
/// Returns `Parse` with line and column of the first syntax error.
///
/// # Example
///
/// ```rust
/// use occusim::model::parse_model;
///
/// let model = parse_model("model {\n  psi ~ dunif(0, 1)\n}\n")?;
/// assert_eq!(model.stochastic_names(), vec!["psi"]);
/// # Ok::<(), occusim::SimError>(())
/// ```
pub fn parse_model(text: &str) -> SimResult<Model> {
    let tokens = tokenize(text)?;
    Parser { tokens, pos: 0 }.parse_model()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn leaf() -> impl Strategy<Value = Expr> {
        prop_oneof![
            (0u32..400).prop_map(|n| Expr::num(f64::from(n) / 8.0)),
            prop::sample::select(vec!["psi", "p", "alpha.occ", "beta_1"]).prop_map(Expr::var),
            prop::sample::select(vec!["z", "veg"]).prop_map(|name| Expr::indexed(name, &["i"])),
        ]
    }

    fn expr() -> impl Strategy<Value = Expr> {
        leaf().prop_recursive(5, 48, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(Expr::neg),
                (
                    prop::sample::select(vec![
                        BinOp::Add,
                        BinOp::Sub,
                        BinOp::Mul,
                        BinOp::Div,
                        BinOp::Pow
                    ]),
                    inner.clone(),
                    inner.clone()
                )
                    .prop_map(|(op, l, r)| Expr::binary(op, l, r)),
                prop::collection::vec(inner, 1..3).prop_map(|args| Expr::call("max", args)),
            ]
        })
    }

    proptest! {
        /// Rendering then parsing an expression gives back the same tree.
        #[test]
        fn prop_expression_round_trip(e in expr()) {
            let model = Model::new(vec![Statement::deterministic(NodeRef::scalar("x"), e)]);
            let parsed = parse_model(&model.to_string()).unwrap();
            prop_assert_eq!(parsed, model);
        }

        /// Parsing never panics on arbitrary input.
        #[test]
        fn prop_parse_total(text in "[a-z0-9 ()\\[\\]{}<~+*/^,:;#.\\n-]{0,60}") {
            let _ = parse_model(&text);
        }
    }
}
