//! Arithmetic formula compiler and evaluator.
//!
//! Jutsu data describes damage, heals, buffs and damage-over-time as small
//! expressions such as `"max(5, user.power * 0.5 - target.defense * 0.2)"`.
//! A [`Formula`] is parsed once into an AST and then evaluated many times
//! against a [`FormulaContext`].
//!
//! Precedence, lowest to highest:
//!
//! ```text
//! c ? a : b
//! or  ||
//! and &&
//! ==  !=
//! <  <=  >  >=
//! +  -
//! *  /  %
//! -  +  not  !      (unary)
//! ^                 (right-associative)
//! number | true | false | name.path | func(args) | ( expr )
//! ```

use crate::context::FormulaContext;
use crate::error::FormulaError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    text: String,
    pos: usize,
}

const OPERATORS: [&str; 17] = [
    "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "%", "^", "<", ">", "!", "?", ":",
];

fn tokenize(src: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| FormulaError::UnexpectedToken {
                    token: text.clone(),
                    pos: start,
                })?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                text,
                pos: start,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let kind = match text.as_str() {
                "and" => TokenKind::Op("&&"),
                "or" => TokenKind::Op("||"),
                "not" => TokenKind::Op("!"),
                _ => TokenKind::Ident(text.clone()),
            };
            tokens.push(Token { kind, text, pos: start });
            continue;
        }

        let simple = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = simple {
            tokens.push(Token {
                kind,
                text: c.to_string(),
                pos: start,
            });
            i += 1;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match OPERATORS.iter().copied().find(|op| rest.starts_with(op)) {
            Some(op) => {
                tokens.push(Token {
                    kind: TokenKind::Op(op),
                    text: op.to_string(),
                    pos: start,
                });
                i += op.len();
            }
            None => return Err(FormulaError::UnexpectedCharacter { ch: c, pos: start }),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Max,
    Min,
    Floor,
    Ceil,
    Round,
    Abs,
    Sqrt,
    Pow,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "max" => Func::Max,
            "min" => Func::Min,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            "abs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "pow" => Func::Pow,
            _ => return None,
        })
    }

    fn check_arity(self, name: &str, got: usize) -> Result<(), FormulaError> {
        let (ok, expected) = match self {
            Func::Max | Func::Min => (got >= 1, "at least 1"),
            Func::Pow => (got == 2, "2"),
            _ => (got == 1, "1"),
        };
        if ok {
            Ok(())
        } else {
            Err(FormulaError::Arity {
                name: name.to_string(),
                expected: expected.to_string(),
                got,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

fn truthy(v: f64) -> bool {
    v != 0.0
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Expr {
    fn eval(&self, ctx: &FormulaContext) -> Result<f64, FormulaError> {
        match self {
            Expr::Num(n) => Ok(*n),
            Expr::Var(name) => ctx
                .get(name)
                .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
            Expr::Neg(inner) => Ok(-inner.eval(ctx)?),
            Expr::Not(inner) => Ok(bool_num(!truthy(inner.eval(ctx)?))),
            Expr::Ternary(cond, then, otherwise) => {
                if truthy(cond.eval(ctx)?) {
                    then.eval(ctx)
                } else {
                    otherwise.eval(ctx)
                }
            }
            Expr::Binary(BinOp::And, lhs, rhs) => {
                Ok(bool_num(truthy(lhs.eval(ctx)?) && truthy(rhs.eval(ctx)?)))
            }
            Expr::Binary(BinOp::Or, lhs, rhs) => {
                Ok(bool_num(truthy(lhs.eval(ctx)?) || truthy(rhs.eval(ctx)?)))
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(ctx)?;
                let b = rhs.eval(ctx)?;
                Ok(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Rem => a % b,
                    BinOp::Pow => a.powf(b),
                    BinOp::Lt => bool_num(a < b),
                    BinOp::Le => bool_num(a <= b),
                    BinOp::Gt => bool_num(a > b),
                    BinOp::Ge => bool_num(a >= b),
                    BinOp::Eq => bool_num(a == b),
                    BinOp::Ne => bool_num(a != b),
                    BinOp::And => bool_num(truthy(a) && truthy(b)),
                    BinOp::Or => bool_num(truthy(a) || truthy(b)),
                })
            }
            Expr::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|a| a.eval(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(match func {
                    Func::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    Func::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                    Func::Floor => values[0].floor(),
                    Func::Ceil => values[0].ceil(),
                    Func::Round => values[0].round(),
                    Func::Abs => values[0].abs(),
                    Func::Sqrt => values[0].sqrt(),
                    Func::Pow => values[0].powf(values[1]),
                })
            }
        }
    }

    fn collect_vars<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(name) => {
                out.insert(name.as_str());
            }
            Expr::Neg(e) | Expr::Not(e) => e.collect_vars(out),
            Expr::Binary(_, a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
            Expr::Ternary(a, b, c) => {
                a.collect_vars(out);
                b.collect_vars(out);
                c.collect_vars(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_vars(out)),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, FormulaError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(FormulaError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), FormulaError> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(())
        } else {
            Err(unexpected(&token))
        }
    }

    fn ternary(&mut self) -> Result<Expr, FormulaError> {
        let cond = self.or()?;
        if self.eat_op(&["?"]).is_none() {
            return Ok(cond);
        }
        let then = self.ternary()?;
        self.expect(TokenKind::Op(":"))?;
        let otherwise = self.ternary()?;
        Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    fn binary_level(
        &mut self,
        ops: &[(&'static str, BinOp)],
        next: fn(&mut Self) -> Result<Expr, FormulaError>,
    ) -> Result<Expr, FormulaError> {
        let symbols: Vec<&'static str> = ops.iter().map(|(s, _)| *s).collect();
        let mut lhs = next(self)?;
        while let Some(sym) = self.eat_op(&symbols) {
            let op = ops
                .iter()
                .find(|(s, _)| *s == sym)
                .map(|(_, op)| *op)
                .unwrap_or(BinOp::Add);
            let rhs = next(self)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr, FormulaError> {
        self.binary_level(&[("||", BinOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr, FormulaError> {
        self.binary_level(&[("&&", BinOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, FormulaError> {
        self.binary_level(&[("==", BinOp::Eq), ("!=", BinOp::Ne)], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, FormulaError> {
        self.binary_level(
            &[
                ("<", BinOp::Lt),
                ("<=", BinOp::Le),
                (">", BinOp::Gt),
                (">=", BinOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, FormulaError> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, FormulaError> {
        self.binary_level(
            &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Rem)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.eat_op(&["-", "+", "!"]) {
            Some("-") => Ok(Expr::Neg(Box::new(self.unary()?))),
            Some("!") => Ok(Expr::Not(Box::new(self.unary()?))),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if self.eat_op(&["^"]).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Num(n)),
            TokenKind::LParen => {
                let inner = self.ternary()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
                    self.pos += 1;
                    return self.call(name);
                }
                Ok(match name.as_str() {
                    "true" => Expr::Num(1.0),
                    "false" => Expr::Num(0.0),
                    _ => Expr::Var(name),
                })
            }
            _ => Err(unexpected(&token)),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, FormulaError> {
        let func = Func::lookup(&name).ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;
        let mut args = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.ternary()?);
                let token = self.next()?;
                match token.kind {
                    TokenKind::Comma => continue,
                    TokenKind::RParen => break,
                    _ => return Err(unexpected(&token)),
                }
            }
        }
        func.check_arity(&name, args.len())?;
        Ok(Expr::Call(func, args))
    }
}

fn unexpected(token: &Token) -> FormulaError {
    FormulaError::UnexpectedToken {
        token: token.text.clone(),
        pos: token.pos,
    }
}

/// A compiled arithmetic formula.
///
/// # Examples
///
/// ```rust
/// use shinobi_battle::{Formula, FormulaContext};
///
/// let formula = Formula::compile("max(5, user.power * 0.5 - target.defense * 0.2)").unwrap();
///
/// let mut context = FormulaContext::new();
/// context.set("user.power", 100.0);
/// context.set("target.defense", 50.0);
/// assert_eq!(formula.evaluate(&context).unwrap(), 40.0);
///
/// context.set("user.power", 0.0);
/// assert_eq!(formula.evaluate(&context).unwrap(), 5.0);
/// ```
#[derive(Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parse a formula.
    pub fn compile(src: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.ternary()?;
        if let Some(extra) = parser.peek() {
            return Err(unexpected(extra));
        }
        Ok(Self {
            source: src.to_string(),
            expr,
        })
    }

    /// A formula that always yields `value`.
    pub fn constant(value: f64) -> Self {
        Self {
            source: value.to_string(),
            expr: Expr::Num(value),
        }
    }

    /// Evaluate against a context.
    ///
    /// Booleans evaluate to `1.0`/`0.0`. A NaN or infinite result is an error.
    pub fn evaluate(&self, context: &FormulaContext) -> Result<f64, FormulaError> {
        let value = self.expr.eval(context)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(FormulaError::NonFinite)
        }
    }

    /// Every variable the formula references, sorted and deduplicated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shinobi_battle::Formula;
    ///
    /// let formula = Formula::compile("user.power * 2 + target.defense - user.power").unwrap();
    /// assert_eq!(formula.variables(), vec!["target.defense", "user.power"]);
    /// ```
    pub fn variables(&self) -> Vec<&str> {
        let mut out = BTreeSet::new();
        self.expr.collect_vars(&mut out);
        out.into_iter().collect()
    }

    /// The source text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Formula").field(&self.source).finish()
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl std::str::FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl Serialize for Formula {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Formula {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Formula::compile(&s).map_err(serde::de::Error::custom)
    }
}
