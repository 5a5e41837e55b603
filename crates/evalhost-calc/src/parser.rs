//! Recursive-descent parser.
//!
//! Running out of input where more is required (after a binary operator,
//! inside an argument list) is reported as [`ParseError::Incomplete`], so a
//! client can keep reading lines until the program is complete.

use crate::ast::{BinOp, Expr, Program, Statement, UnOp};
use crate::error::ParseError;
use crate::lexer::{tokenize, Spanned, Token};

/// Deepest expression tree the parser will build. Parentheses, lists, call
/// arguments, unary operators and each link of a binary chain count one level.
pub const MAX_NESTING: usize = 256;

/// Parse a whole program.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semi) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn unexpected(&self) -> ParseError {
        match self.peek() {
            Token::Eof => ParseError::incomplete("unexpected end of input"),
            token => ParseError::invalid(format!("unexpected {}", describe(token)), self.line()),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ParseError::invalid("expression nested too deeply", self.line()));
        }
        Ok(())
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn program(mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        self.skip_separators();
        while *self.peek() != Token::Eof {
            statements.push(self.statement()?);
            match self.peek() {
                Token::Newline | Token::Semi => self.skip_separators(),
                Token::Eof => {}
                _ => return Err(self.unexpected()),
            }
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        if let (Token::Ident(name), Token::Assign) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.pos += 2;
            self.skip_newlines();
            let value = self.expr()?;
            return Ok(Statement::Assign { name, value });
        }
        Ok(Statement::Expr(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.or()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn binary(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, ParseError>,
        operator: fn(&Token) -> Option<BinOp>,
    ) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = operand(self)?;
        while let Some(op) = operator(self.peek()) {
            self.enter()?;
            self.advance();
            self.skip_newlines();
            let right = operand(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        self.binary(Self::and, |token| (*token == Token::OrOr).then_some(BinOp::Or))
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        self.binary(Self::comparison, |token| (*token == Token::AndAnd).then_some(BinOp::And))
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary(Self::additive, |token| match token {
            Token::EqEq => Some(BinOp::Eq),
            Token::NotEq => Some(BinOp::NotEq),
            Token::Lt => Some(BinOp::Lt),
            Token::LtEq => Some(BinOp::LtEq),
            Token::Gt => Some(BinOp::Gt),
            Token::GtEq => Some(BinOp::GtEq),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary(Self::multiplicative, |token| match token {
            Token::Plus => Some(BinOp::Add),
            Token::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binary(Self::unary, |token| match token {
            Token::Star => Some(BinOp::Mul),
            Token::Slash => Some(BinOp::Div),
            Token::Percent => Some(BinOp::Rem),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Minus => UnOp::Neg,
            Token::Bang => UnOp::Not,
            _ => return self.primary(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let expr = match self.peek().clone() {
            Token::Number(n) => Expr::Number(n),
            Token::String(s) => Expr::String(s),
            Token::True => Expr::Boolean(true),
            Token::False => Expr::Boolean(false),
            Token::Null => Expr::Null,
            Token::Ident(name) => {
                self.advance();
                if self.eat(&Token::LParen) {
                    let args = self.list(Token::RParen)?;
                    return Ok(Expr::Call { name, args });
                }
                return Ok(Expr::Identifier(name));
            }
            Token::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                return Ok(inner);
            }
            Token::LBracket => {
                self.advance();
                return Ok(Expr::List(self.list(Token::RBracket)?));
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(expr)
    }

    /// Comma-separated expressions up to `close`, which is consumed. A
    /// trailing comma is allowed.
    fn list(&mut self, close: Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.eat(&close) {
            items.push(self.expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {}", n),
        Token::String(s) => format!("string {:?}", s),
        Token::Ident(name) => format!("identifier '{}'", name),
        Token::Newline => "end of line".to_string(),
        other => format!("{:?}", other),
    }
}
