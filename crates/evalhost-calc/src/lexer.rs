//! Tokenizer.
//!
//! Newlines separate statements, except inside parentheses and brackets
//! where they are dropped. `#` starts a comment that runs to the end of the
//! line.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    String(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Newline,
    Eof,
}

/// A token and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    depth: usize,
    tokens: Vec<Spanned>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Spanned>, ParseError> {
        while let Some(c) = self.chars.next() {
            let token = match c {
                '\n' => {
                    let line = self.line;
                    self.line += 1;
                    if self.depth == 0 {
                        self.tokens.push(Spanned {
                            token: Token::Newline,
                            line,
                        });
                    }
                    continue;
                }
                c if c.is_whitespace() => continue,
                '#' => {
                    while self.chars.next_if(|&c| c != '\n').is_some() {}
                    continue;
                }
                '"' | '\'' => self.string(c)?,
                c if c.is_ascii_digit() || (c == '.' && self.chars.peek().is_some_and(char::is_ascii_digit)) => {
                    self.number(c)?
                }
                c if c.is_alphabetic() || c == '_' => self.word(c),
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '=' => self.pick('=', Token::EqEq, Token::Assign),
                '!' => self.pick('=', Token::NotEq, Token::Bang),
                '<' => self.pick('=', Token::LtEq, Token::Lt),
                '>' => self.pick('=', Token::GtEq, Token::Gt),
                '&' => self.double('&', Token::AndAnd)?,
                '|' => self.double('|', Token::OrOr)?,
                '(' | '[' => {
                    self.depth += 1;
                    if c == '(' {
                        Token::LParen
                    } else {
                        Token::LBracket
                    }
                }
                ')' | ']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if c == ')' {
                        Token::RParen
                    } else {
                        Token::RBracket
                    }
                }
                ',' => Token::Comma,
                ';' => Token::Semi,
                other => {
                    return Err(ParseError::invalid(format!("unexpected character '{}'", other), self.line));
                }
            };
            self.tokens.push(Spanned {
                token,
                line: self.line,
            });
        }

        if self.depth > 0 {
            return Err(ParseError::incomplete("unclosed bracket"));
        }
        self.tokens.push(Spanned {
            token: Token::Eof,
            line: self.line,
        });
        Ok(self.tokens)
    }

    fn pick(&mut self, next: char, matched: Token, otherwise: Token) -> Token {
        if self.chars.next_if_eq(&next).is_some() {
            matched
        } else {
            otherwise
        }
    }

    fn double(&mut self, c: char, token: Token) -> Result<Token, ParseError> {
        if self.chars.next_if_eq(&c).is_some() {
            Ok(token)
        } else {
            Err(ParseError::invalid(format!("unexpected character '{}'", c), self.line))
        }
    }

    fn string(&mut self, quote: char) -> Result<Token, ParseError> {
        let mut text = String::new();
        loop {
            match self.chars.next() {
                None => return Err(ParseError::incomplete("unterminated string")),
                Some(c) if c == quote => return Ok(Token::String(text)),
                Some('\\') => match self.chars.next() {
                    None => return Err(ParseError::incomplete("unterminated string")),
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some(c @ ('\\' | '"' | '\'')) => text.push(c),
                    Some(c) => {
                        return Err(ParseError::invalid(format!("unknown escape '\\{}'", c), self.line));
                    }
                },
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    text.push(c);
                }
            }
        }
    }

    fn number(&mut self, first: char) -> Result<Token, ParseError> {
        let mut text = String::from(first);
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
            text.push(c);
        }
        if let Some(e) = self.chars.next_if(|c| *c == 'e' || *c == 'E') {
            text.push(e);
            if let Some(sign) = self.chars.next_if(|c| *c == '+' || *c == '-') {
                text.push(sign);
            }
            while let Some(c) = self.chars.next_if(char::is_ascii_digit) {
                text.push(c);
            }
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError::invalid(format!("malformed number '{}'", text), self.line))
    }

    fn word(&mut self, first: char) -> Token {
        let mut text = String::from(first);
        while let Some(c) = self.chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
            text.push(c);
        }
        match text.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Ident(text),
        }
    }
}
