//! Tokenizer and recursive-descent parser for filter expressions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := eq ( "&&" eq )*
//! eq      := cmp ( ( "==" | "!=" ) cmp )*
//! cmp     := sum ( ( "<" | "<=" | ">" | ">=" ) sum )*
//! sum     := product ( ( "+" | "-" ) product )*
//! product := unary ( ( "*" | "/" | "%" ) unary )*
//! unary   := ( "!" | "-" ) unary | primary
//! primary := number | string | true | false | ident | "[" name "]" | "(" or ")"
//! ```

use crate::error::EvalError;
use crate::types::TagValue;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Bool(bool),
    Op(&'static str),
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn from_symbol(op: &str) -> Option<Self> {
        Some(match op {
            "||" => BinaryOp::Or,
            "&&" => BinaryOp::And,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Literal(TagValue),
    Var(String),
    Unary(UnaryOp, Box<Ast>),
    Binary(BinaryOp, Box<Ast>, Box<Ast>),
}

/// Two-character operators must be tried before their one-character prefixes.
const OPERATORS: &[&str] = &[
    "||", "&&", "==", "!=", "<=", ">=", "<", ">", "!", "+", "-", "*", "/", "%",
];

fn syntax(pos: usize, message: impl Into<String>) -> EvalError {
    EvalError::Syntax {
        pos,
        message: message.into(),
    }
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, EvalError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push((pos, Token::LParen));
            i += 1;
        } else if c == ')' {
            tokens.push((pos, Token::RParen));
            i += 1;
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit()))
        {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| syntax(pos, format!("invalid number {text:?}")))?;
            tokens.push((pos, Token::Number(value)));
        } else if c == '"' || c == '\'' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(syntax(pos, "unterminated string")),
                    Some((_, '\\')) => {
                        let escaped = chars.get(i + 1).map(|(_, c)| *c);
                        match escaped {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some(other) => value.push(other),
                            None => return Err(syntax(pos, "unterminated string")),
                        }
                        i += 2;
                    }
                    Some((_, ch)) if *ch == quote => {
                        i += 1;
                        break;
                    }
                    Some((_, ch)) => {
                        value.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push((pos, Token::Str(value)));
        } else if c == '[' {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|(_, c)| *c == ']')
                .map(|offset| start + offset)
                .ok_or_else(|| syntax(pos, "unterminated [name]"))?;
            let name: String = chars[start..end].iter().map(|(_, c)| c).collect();
            tokens.push((pos, Token::Ident(name)));
            i = end + 1;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].1.is_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '.')
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let token = match word.as_str() {
                "true" => Token::Bool(true),
                "false" => Token::Bool(false),
                _ => Token::Ident(word),
            };
            tokens.push((pos, token));
        } else {
            let rest = &src[pos..];
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| syntax(pos, format!("unexpected character {c:?}")))?;
            tokens.push((pos, Token::Op(op)));
            i += op.chars().count();
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    next: usize,
    end: usize,
}

/// Binary operator levels, lowest precedence first.
const LEVELS: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["==", "!="],
    &["<", "<=", ">", ">="],
    &["+", "-"],
    &["*", "/", "%"],
];

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.next).map(|(_, t)| t)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.next).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.next).map(|(_, t)| t.clone());
        self.next += 1;
        token
    }

    fn binary(&mut self, level: usize) -> Result<Ast, EvalError> {
        if level == LEVELS.len() {
            return self.unary();
        }
        let mut left = self.binary(level + 1)?;
        while let Some(Token::Op(op)) = self.peek() {
            if !LEVELS[level].contains(op) {
                break;
            }
            let op = BinaryOp::from_symbol(op).ok_or_else(|| syntax(self.pos(), "bad operator"))?;
            self.bump();
            let right = self.binary(level + 1)?;
            left = Ast::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Ast, EvalError> {
        match self.peek() {
            Some(Token::Op("!")) => {
                self.bump();
                Ok(Ast::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            Some(Token::Op("-")) => {
                self.bump();
                Ok(Ast::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Ast, EvalError> {
        let pos = self.pos();
        match self.bump() {
            Some(Token::Number(n)) => Ok(Ast::Literal(TagValue::from_f64(n))),
            Some(Token::Str(s)) => Ok(Ast::Literal(TagValue::String(s))),
            Some(Token::Bool(b)) => Ok(Ast::Literal(TagValue::Bool(b))),
            Some(Token::Ident(name)) => Ok(Ast::Var(name)),
            Some(Token::LParen) => {
                let inner = self.binary(0)?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(syntax(pos, "missing closing parenthesis")),
                }
            }
            Some(token) => Err(syntax(pos, format!("unexpected token {token:?}"))),
            None => Err(syntax(pos, "unexpected end of expression")),
        }
    }
}

/// Parse an expression into a tree.
pub fn parse(src: &str) -> Result<Ast, EvalError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(syntax(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        next: 0,
        end: src.len(),
    };
    let ast = parser.binary(0)?;
    if parser.peek().is_some() {
        return Err(syntax(parser.pos(), "trailing input"));
    }
    Ok(ast)
}
