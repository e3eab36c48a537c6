//! Sandboxed expression evaluator
//!
//! Condition nodes and recursive convergence checks evaluate a small,
//! side-effect-free expression language against a JSON scope. The language
//! supports:
//!
//! - literals: numbers, single/double-quoted strings, `true`, `false`, `null`
//! - identifiers resolved against the scope object, with member access
//!   (`a.b`, `a.b.0`) and computed indexing (`a[0]`, `a["key"]`)
//! - arithmetic `+ - * / %` (with `+` doubling as string concatenation)
//! - comparisons `< <= > >=` and equality `== !=`
//! - boolean `&& || !` with truthiness rules (null, false, 0, "", empty
//!   array/object are falsy)
//!
//! Anything else (assignment, function calls, lambdas) is rejected at
//! parse time. There is no I/O and no reflection; evaluation is a pure
//! function of the expression and the scope.
//!
//! The parser is a conventional Pratt parser: a token stream and a binding
//! power table.
//!
//! # Example
//!
//! ```rust
//! use chain_core::expr::{evaluate, evaluate_bool};
//! use serde_json::json;
//!
//! let scope = json!({"sum": 6, "user": {"name": "ada"}});
//! assert_eq!(evaluate("sum * 2", &scope).unwrap(), json!(12));
//! assert!(evaluate_bool("sum > 5 && user.name == 'ada'", &scope).unwrap());
//! assert!(evaluate("sum = 7", &scope).is_err());
//! ```

use serde_json::{json, Value};
use std::fmt;

/// Expression parse or evaluation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprError(pub String);

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expression error: {}", self.0)
    }
}

impl std::error::Error for ExprError {}

fn err<T>(msg: impl Into<String>) -> Result<T, ExprError> {
    Err(ExprError(msg.into()))
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Int(i64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Bang,
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
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return err("assignment is not supported");
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::LtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::GtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return err("unexpected '&' (did you mean '&&'?)");
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return err("unexpected '|' (did you mean '||'?)");
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&'\\') => {
                            match chars.get(i + 1) {
                                Some(&'n') => s.push('\n'),
                                Some(&'t') => s.push('\t'),
                                Some(&ch) => s.push(ch),
                                None => return err("unterminated string literal"),
                            }
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return err("unterminated string literal"),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                // A '.' is part of the number only when followed by a digit;
                // otherwise it is member access (e.g. items.0)
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    match text.parse::<f64>() {
                        Ok(n) => tokens.push(Token::Number(n)),
                        Err(_) => return err(format!("invalid number '{text}'")),
                    }
                } else {
                    match text.parse::<i64>() {
                        Ok(n) => tokens.push(Token::Int(n)),
                        Err(_) => return err(format!("invalid number '{text}'")),
                    }
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    // Python-style spellings appear in hand-written specs
                    "and" => Token::AndAnd,
                    "or" => Token::OrOr,
                    "not" => Token::Bang,
                    "True" => Token::True,
                    "False" => Token::False,
                    "None" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => return err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser (Pratt)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Literal(Value),
    Ident(String),
    Member(Box<Ast>, String),
    Index(Box<Ast>, Box<Ast>),
    Unary(UnaryOp, Box<Ast>),
    Binary(BinaryOp, Box<Ast>, Box<Ast>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Left binding power of an infix operator; `None` for non-operators
fn binding_power(token: &Token) -> Option<(BinaryOp, u8)> {
    Some(match token {
        Token::OrOr => (BinaryOp::Or, 1),
        Token::AndAnd => (BinaryOp::And, 2),
        Token::EqEq => (BinaryOp::Eq, 3),
        Token::NotEq => (BinaryOp::NotEq, 3),
        Token::Lt => (BinaryOp::Lt, 4),
        Token::LtEq => (BinaryOp::LtEq, 4),
        Token::Gt => (BinaryOp::Gt, 4),
        Token::GtEq => (BinaryOp::GtEq, 4),
        Token::Plus => (BinaryOp::Add, 5),
        Token::Minus => (BinaryOp::Sub, 5),
        Token::Star => (BinaryOp::Mul, 6),
        Token::Slash => (BinaryOp::Div, 6),
        Token::Percent => (BinaryOp::Rem, 6),
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => err(format!("expected {expected:?}, found {token:?}")),
            None => err(format!("expected {expected:?}, found end of input")),
        }
    }

    fn parse_expression(&mut self, min_bp: u8) -> Result<Ast, ExprError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let Some((op, bp)) = self.peek().and_then(binding_power) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.next();
            // Left-associative: the right side binds one level tighter
            let rhs = self.parse_expression(bp + 1)?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Ast, ExprError> {
        let token = match self.next() {
            Some(token) => token,
            None => return err("unexpected end of expression"),
        };

        let node = match token {
            Token::Int(n) => Ast::Literal(json!(n)),
            Token::Number(n) => Ast::Literal(json!(n)),
            Token::Str(s) => Ast::Literal(Value::String(s)),
            Token::True => Ast::Literal(Value::Bool(true)),
            Token::False => Ast::Literal(Value::Bool(false)),
            Token::Null => Ast::Literal(Value::Null),
            Token::Ident(name) => Ast::Ident(name),
            Token::Bang => {
                let operand = self.parse_expression(7)?;
                Ast::Unary(UnaryOp::Not, Box::new(operand))
            }
            Token::Minus => {
                let operand = self.parse_expression(7)?;
                Ast::Unary(UnaryOp::Neg, Box::new(operand))
            }
            Token::LParen => {
                let inner = self.parse_expression(0)?;
                self.expect(Token::RParen)?;
                inner
            }
            other => return err(format!("unexpected token {other:?}")),
        };

        self.parse_postfix(node)
    }

    fn parse_postfix(&mut self, mut node: Ast) -> Result<Ast, ExprError> {
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.next();
                    match self.next() {
                        Some(Token::Ident(name)) => {
                            node = Ast::Member(Box::new(node), name);
                        }
                        Some(Token::Int(idx)) => {
                            node = Ast::Member(Box::new(node), idx.to_string());
                        }
                        other => {
                            return err(format!(
                                "expected member name after '.', found {other:?}"
                            ))
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.next();
                    let index = self.parse_expression(0)?;
                    self.expect(Token::RBracket)?;
                    node = Ast::Index(Box::new(node), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(node)
    }
}

fn parse(input: &str) -> Result<Ast, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return err("empty expression");
    }
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_expression(0)?;
    if parser.pos != parser.tokens.len() {
        return err(format!(
            "unexpected trailing tokens at position {}",
            parser.pos
        ));
    }
    Ok(ast)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Truthiness: null, false, 0, "", [] and {} are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_number(value: &Value, context: &str) -> Result<f64, ExprError> {
    value
        .as_f64()
        .ok_or_else(|| ExprError(format!("{context}: expected a number, found {value}")))
}

/// Numbers compare loosely (1 == 1.0); everything else compares structurally
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn eval_ast(ast: &Ast, scope: &Value) -> Result<Value, ExprError> {
    match ast {
        Ast::Literal(v) => Ok(v.clone()),
        Ast::Ident(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError(format!("unknown identifier '{name}'"))),
        Ast::Member(target, key) => {
            let value = eval_ast(target, scope)?;
            match &value {
                Value::Object(map) => map
                    .get(key)
                    .cloned()
                    .ok_or_else(|| ExprError(format!("no member '{key}'"))),
                Value::Array(arr) => {
                    let idx: usize = key
                        .parse()
                        .map_err(|_| ExprError(format!("array member '{key}' is not an index")))?;
                    arr.get(idx)
                        .cloned()
                        .ok_or_else(|| ExprError(format!("index {idx} out of bounds")))
                }
                other => err(format!("cannot access member '{key}' of {other}")),
            }
        }
        Ast::Index(target, index) => {
            let value = eval_ast(target, scope)?;
            let index = eval_ast(index, scope)?;
            match (&value, &index) {
                (Value::Array(arr), Value::Number(n)) => {
                    let idx = n
                        .as_u64()
                        .ok_or_else(|| ExprError(format!("invalid array index {n}")))?
                        as usize;
                    arr.get(idx)
                        .cloned()
                        .ok_or_else(|| ExprError(format!("index {idx} out of bounds")))
                }
                (Value::Object(map), Value::String(key)) => map
                    .get(key)
                    .cloned()
                    .ok_or_else(|| ExprError(format!("no member '{key}'"))),
                (v, i) => err(format!("cannot index {v} with {i}")),
            }
        }
        Ast::Unary(op, operand) => {
            let value = eval_ast(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                UnaryOp::Neg => {
                    let n = as_number(&value, "unary '-'")?;
                    Ok(json!(-n))
                }
            }
        }
        Ast::Binary(op, lhs, rhs) => {
            // Short-circuit boolean operators before evaluating the rhs
            match op {
                BinaryOp::And => {
                    let left = eval_ast(lhs, scope)?;
                    if !is_truthy(&left) {
                        return Ok(Value::Bool(false));
                    }
                    let right = eval_ast(rhs, scope)?;
                    return Ok(Value::Bool(is_truthy(&right)));
                }
                BinaryOp::Or => {
                    let left = eval_ast(lhs, scope)?;
                    if is_truthy(&left) {
                        return Ok(Value::Bool(true));
                    }
                    let right = eval_ast(rhs, scope)?;
                    return Ok(Value::Bool(is_truthy(&right)));
                }
                _ => {}
            }

            let left = eval_ast(lhs, scope)?;
            let right = eval_ast(rhs, scope)?;
            match op {
                BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
                BinaryOp::NotEq => Ok(Value::Bool(!values_equal(&left, &right))),
                BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                    let ordering = match (&left, &right) {
                        (Value::String(a), Value::String(b)) => a.cmp(b),
                        _ => {
                            let a = as_number(&left, "comparison")?;
                            let b = as_number(&right, "comparison")?;
                            a.partial_cmp(&b)
                                .ok_or_else(|| ExprError("incomparable numbers".into()))?
                        }
                    };
                    let result = match op {
                        BinaryOp::Lt => ordering.is_lt(),
                        BinaryOp::LtEq => ordering.is_le(),
                        BinaryOp::Gt => ordering.is_gt(),
                        _ => ordering.is_ge(),
                    };
                    Ok(Value::Bool(result))
                }
                BinaryOp::Add => match (&left, &right) {
                    (Value::String(a), Value::String(b)) => {
                        Ok(Value::String(format!("{a}{b}")))
                    }
                    _ => numeric_op(&left, &right, *op),
                },
                BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                    numeric_op(&left, &right, *op)
                }
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            }
        }
    }
}

fn numeric_op(left: &Value, right: &Value, op: BinaryOp) -> Result<Value, ExprError> {
    // Integer pairs stay integral except for division
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        match op {
            BinaryOp::Add => return Ok(json!(a + b)),
            BinaryOp::Sub => return Ok(json!(a - b)),
            BinaryOp::Mul => return Ok(json!(a * b)),
            BinaryOp::Rem => {
                if b == 0 {
                    return err("modulo by zero");
                }
                return Ok(json!(a % b));
            }
            _ => {}
        }
    }

    let a = as_number(left, "arithmetic")?;
    let b = as_number(right, "arithmetic")?;
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return err("division by zero");
            }
            a / b
        }
        BinaryOp::Rem => {
            if b == 0.0 {
                return err("modulo by zero");
            }
            a % b
        }
        _ => unreachable!("non-arithmetic op in numeric_op"),
    };
    Ok(json!(result))
}

/// Evaluate an expression against a scope object
pub fn evaluate(expression: &str, scope: &Value) -> Result<Value, ExprError> {
    let ast = parse(expression)?;
    eval_ast(&ast, scope)
}

/// Evaluate an expression and reduce the result to truthiness
pub fn evaluate_bool(expression: &str, scope: &Value) -> Result<bool, ExprError> {
    evaluate(expression, scope).map(|v| is_truthy(&v))
}
