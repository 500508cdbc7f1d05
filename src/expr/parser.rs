//! Parser for the embedded expression language.
//!
//! Source text is tokenised on demand while descending, which lets template
//! text (`` `a ${b} c` ``) and expressions nest inside each other without a
//! separate lexing pass.
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::pointer::Pointer;

use super::eval::number;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at offset {offset})")]
pub struct ExprError {
    pub message: String,
    pub offset: usize,
}

// ————————————————————————————————————————————————————————————————————————————
// AST
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Undefined,
    /// `value`: the value at the evaluated position.
    Value,
    /// `$`: the bound pointer of the evaluated position.
    This,
    /// `` _`pointer` `` reads, `` _`pointer${expr}` `` writes.
    Tag {
        pointer: String,
        assign: Option<Box<Expr>>,
    },
    Template(Template),
    Array(Vec<Expr>),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub parts: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Hole(Expr),
}

/// A parse result together with every backreference pointer it contains.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub tree: T,
    pub references: Vec<String>,
}

// ————————————————————————————————————————————————————————————————————————————
// ENTRY POINTS
// ————————————————————————————————————————————————————————————————————————————

/// Parse template *body* text: literal text with `${expr}` holes, no
/// surrounding backticks.
pub fn parse_template(src: &str) -> Result<Parsed<Template>, ExprError> {
    let mut parser = Parser::new(src);
    let tree = parser.template_body(None)?;
    Ok(Parsed { tree, references: parser.references })
}

/// Parse a single expression spanning the whole input.
pub fn parse_expression(src: &str) -> Result<Parsed<Expr>, ExprError> {
    let mut parser = Parser::new(src);
    let tree = parser.expression()?;
    match parser.next_token()? {
        Token::Eof => Ok(Parsed { tree, references: parser.references }),
        token => Err(parser.error(format!("unexpected {token} after expression"))),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LEXER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Backtick,
    Punct(&'static str),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Str(s) => write!(f, "string {s:?}"),
            Token::Ident(name) => write!(f, "identifier '{name}'"),
            Token::Backtick => f.write_str("'`'"),
            Token::Punct(p) => write!(f, "'{p}'"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

// longest first
const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "(", ")", "[", "]", "{", "}", ".",
    ",", "?", ":", "!", "+", "-", "*", "/", "%", "<", ">",
];

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    references: Vec<String>,
}

impl Parser {
    fn new(src: &str) -> Self {
        Parser { chars: src.chars().collect(), pos: 0, references: Vec::new() }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError { message: message.into(), offset: self.pos }
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += 1;
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.char_at(i) == Some(c))
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> Result<Token, ExprError> {
        self.skip_whitespace();
        let Some(c) = self.peek_char() else {
            return Ok(Token::Eof);
        };
        if c.is_ascii_digit() || (c == '.' && self.char_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.number();
        }
        if c == '\'' || c == '"' {
            self.pos += 1;
            return self.string(c);
        }
        if c == '`' {
            self.pos += 1;
            return Ok(Token::Backtick);
        }
        if is_ident_start(c) {
            let start = self.pos;
            while self.peek_char().is_some_and(is_ident_continue) {
                self.pos += 1;
            }
            return Ok(Token::Ident(self.chars[start..self.pos].iter().collect()));
        }
        for &punct in PUNCTUATION {
            if self.starts_with(punct) {
                self.pos += punct.len();
                return Ok(Token::Punct(punct));
            }
        }
        Err(self.error(format!("unexpected character '{c}'")))
    }

    fn peek_token(&mut self) -> Result<Token, ExprError> {
        let save = self.pos;
        let token = self.next_token();
        self.pos = save;
        token
    }

    fn eat(&mut self, punct: &str) -> Result<bool, ExprError> {
        let save = self.pos;
        match self.next_token()? {
            Token::Punct(p) if p == punct => Ok(true),
            _ => {
                self.pos = save;
                Ok(false)
            }
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), ExprError> {
        if self.eat(punct)? {
            Ok(())
        } else {
            Err(self.error(format!("expected '{punct}'")))
        }
    }

    fn number(&mut self) -> Result<Token, ExprError> {
        let start = self.pos;
        let digits = |p: &mut Parser| {
            while p.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                p.pos += 1;
            }
        };
        digits(self);
        if self.peek_char() == Some('.') && self.char_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            digits(self);
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.pos += 1;
            }
            if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                digits(self);
            } else {
                self.pos = save;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("invalid number literal {text}")))
    }

    fn string(&mut self, quote: char) -> Result<Token, ExprError> {
        let mut out = String::new();
        loop {
            match self.next_char() {
                None => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => return Ok(Token::Str(out)),
                Some('\\') => {
                    let escaped = self.next_char().ok_or_else(|| self.error("unterminated string literal"))?;
                    out.push(unescape(escaped));
                }
                Some(c) => out.push(c),
            }
        }
    }

    // ————————————————————————————————————————————————————————————————————————
    // TEMPLATES
    // ————————————————————————————————————————————————————————————————————————

    fn template_body(&mut self, closing: Option<char>) -> Result<Template, ExprError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.next_char() {
                None if closing.is_some() => return Err(self.error("unterminated template literal")),
                None => break,
                Some(c) if Some(c) == closing => break,
                Some('\\') => {
                    let escaped = self.next_char().ok_or_else(|| self.error("dangling escape in template"))?;
                    text.push(unescape(escaped));
                }
                Some('$') if self.peek_char() == Some('{') => {
                    self.pos += 1;
                    if !text.is_empty() {
                        parts.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    let hole = self.expression()?;
                    self.expect("}")?;
                    parts.push(Segment::Hole(hole));
                }
                Some(c) => text.push(c),
            }
        }
        if !text.is_empty() {
            parts.push(Segment::Text(text));
        }
        Ok(Template { parts })
    }

    /// Body of a `` _`...` `` tag; the opening backtick is already consumed.
    fn tag(&mut self) -> Result<Expr, ExprError> {
        let start = self.pos;
        let mut raw = String::new();
        let mut assign = None;
        loop {
            match self.next_char() {
                None => return Err(self.error("unterminated pointer tag")),
                Some('`') => break,
                Some('$') if self.peek_char() == Some('{') => {
                    self.pos += 1;
                    let value = self.expression()?;
                    self.expect("}")?;
                    if self.next_char() != Some('`') {
                        return Err(self.error("pointer tag assignment must close the tag"));
                    }
                    assign = Some(Box::new(value));
                    break;
                }
                Some(c) => raw.push(c),
            }
        }
        let pointer = raw.trim().to_string();
        Pointer::parse(&pointer).map_err(|e| ExprError { message: e.to_string(), offset: start })?;
        self.references.push(pointer.clone());
        Ok(Expr::Tag { pointer, assign })
    }

    // ————————————————————————————————————————————————————————————————————————
    // EXPRESSIONS (lowest precedence first)
    // ————————————————————————————————————————————————————————————————————————

    fn expression(&mut self) -> Result<Expr, ExprError> {
        self.conditional()
    }

    fn conditional(&mut self) -> Result<Expr, ExprError> {
        let test = self.coalesce()?;
        if self.eat("?")? {
            let consequent = self.conditional()?;
            self.expect(":")?;
            let alternate = self.conditional()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            });
        }
        Ok(test)
    }

    fn logical(
        &mut self,
        punct: &str,
        op: LogicalOp,
        next: fn(&mut Parser) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut left = next(self)?;
        while self.eat(punct)? {
            let right = next(self)?;
            left = Expr::Logical { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn coalesce(&mut self) -> Result<Expr, ExprError> {
        self.logical("??", LogicalOp::Coalesce, Parser::or)
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        self.logical("||", LogicalOp::Or, Parser::and)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        self.logical("&&", LogicalOp::And, Parser::equality)
    }

    fn binary(
        &mut self,
        table: &[(&str, BinaryOp)],
        next: fn(&mut Parser) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut left = next(self)?;
        'outer: loop {
            for (punct, op) in table {
                if self.eat(punct)? {
                    let right = next(self)?;
                    left = Expr::Binary { op: *op, left: Box::new(left), right: Box::new(right) };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        self.binary(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
            ],
            Parser::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        self.binary(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Parser::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        self.binary(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Parser::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.binary(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Parser::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let op = if self.eat("!")? {
            UnaryOp::Not
        } else if self.eat("-")? {
            UnaryOp::Neg
        } else if self.eat("+")? {
            UnaryOp::Plus
        } else {
            return self.postfix();
        };
        let operand = self.unary()?;
        Ok(Expr::Unary { op, operand: Box::new(operand) })
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".")? {
                let property = match self.next_token()? {
                    Token::Ident(name) => name,
                    token => return Err(self.error(format!("expected property name, found {token}"))),
                };
                if self.eat("(")? {
                    let args = self.arguments()?;
                    expr = Expr::Call { object: Box::new(expr), method: property, args };
                } else {
                    expr = Expr::Member { object: Box::new(expr), property };
                }
            } else if self.eat("[")? {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index { object: Box::new(expr), index: Box::new(index) };
            } else if matches!(self.peek_token()?, Token::Punct("(")) {
                return Err(self.error("only methods can be called"));
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma separated list; the opening delimiter is already consumed.
    fn list(&mut self, closing: &str) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if self.eat(closing)? {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(",")? {
                continue;
            }
            self.expect(closing)?;
            return Ok(items);
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
        self.list(")")
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next_token()? {
            Token::Number(n) => Ok(Expr::Literal(number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Backtick => Ok(Expr::Template(self.template_body(Some('`'))?)),
            Token::Punct("(") => {
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct("[") => Ok(Expr::Array(self.list("]")?)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "undefined" => Ok(Expr::Undefined),
                "value" => Ok(Expr::Value),
                "$" => Ok(Expr::This),
                "_" if self.peek_char() == Some('`') => {
                    self.pos += 1;
                    self.tag()
                }
                "_" => Err(self.error("the `_` tag must be followed by a backquoted pointer")),
                other => Err(self.error(format!("unknown identifier '{other}'"))),
            },
            token => Err(self.error(format!("unexpected {token}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_splits_text_and_holes() {
        let parsed = parse_template("${value.first}/${$.key}!").unwrap();
        assert_eq!(parsed.tree.parts.len(), 4);
        assert!(matches!(&parsed.tree.parts[1], Segment::Text(t) if t == "/"));
        assert!(matches!(&parsed.tree.parts[3], Segment::Text(t) if t == "!"));
        assert!(parsed.references.is_empty());
    }

    #[test]
    fn collects_tag_references() {
        let parsed = parse_expression(" _`1/first`  == 'the value' ").unwrap();
        assert_eq!(parsed.references, vec!["1/first".to_string()]);
        assert!(matches!(parsed.tree, Expr::Binary { op: BinaryOp::Eq, .. }));

        let parsed = parse_template("${ _`0/a` + _`/b` }").unwrap();
        assert_eq!(parsed.references, vec!["0/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn tag_assignment_form() {
        let parsed = parse_expression("_`/x/y${2}`").unwrap();
        match parsed.tree {
            Expr::Tag { pointer, assign: Some(value) } => {
                assert_eq!(pointer, "/x/y");
                assert_eq!(*value, Expr::Literal(Value::from(2)));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn precedence_follows_usual_rules() {
        let parsed = parse_expression("1 + 2 * 3 == 7 && !false").unwrap();
        let Expr::Logical { op: LogicalOp::And, left, .. } = parsed.tree else {
            panic!("expected && at the top");
        };
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn nested_template_literal_inside_hole() {
        let parsed = parse_template("a${ `b${1}c` }d").unwrap();
        assert_eq!(parsed.tree.parts.len(), 3);
        assert!(matches!(&parsed.tree.parts[1], Segment::Hole(Expr::Template(_))));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_expression("value +").is_err());
        assert!(parse_expression("foo").is_err());
        assert!(parse_expression("_`not a pointer`").is_err());
        assert!(parse_expression("'open").is_err());
        assert!(parse_template("${ 1 ").is_err());
        assert!(parse_expression("1 2").is_err());
    }
}
