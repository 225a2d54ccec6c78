//! Environment markers: a closed expression tree evaluated against a
//! fixed-schema target environment.
//!
//! Markers gate whether a requirement applies, e.g.
//! `python_version >= "3.9" and sys_platform != "win32"`. The grammar is
//! comparisons over a known set of variables joined by `and`/`or`/`not`
//! with parentheses; there is no open-ended expression evaluation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use pyrite_util::errors::PyriteError;

use crate::version::Version;

/// A variable in a marker comparison.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MarkerVar {
    PythonVersion,
    PythonFullVersion,
    OsName,
    SysPlatform,
    PlatformSystem,
    PlatformMachine,
    ImplementationName,
    /// The pseudo-variable bound to the extras being resolved.
    Extra,
}

impl MarkerVar {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "python_version" => MarkerVar::PythonVersion,
            "python_full_version" => MarkerVar::PythonFullVersion,
            "os_name" => MarkerVar::OsName,
            "sys_platform" => MarkerVar::SysPlatform,
            "platform_system" => MarkerVar::PlatformSystem,
            "platform_machine" => MarkerVar::PlatformMachine,
            "implementation_name" => MarkerVar::ImplementationName,
            "extra" => MarkerVar::Extra,
            _ => return None,
        })
    }

    fn as_str(&self) -> &'static str {
        match self {
            MarkerVar::PythonVersion => "python_version",
            MarkerVar::PythonFullVersion => "python_full_version",
            MarkerVar::OsName => "os_name",
            MarkerVar::SysPlatform => "sys_platform",
            MarkerVar::PlatformSystem => "platform_system",
            MarkerVar::PlatformMachine => "platform_machine",
            MarkerVar::ImplementationName => "implementation_name",
            MarkerVar::Extra => "extra",
        }
    }

    /// Version-valued variables compare with version precedence, not
    /// lexically.
    fn is_version(&self) -> bool {
        matches!(self, MarkerVar::PythonVersion | MarkerVar::PythonFullVersion)
    }
}

/// Comparison operator inside a marker.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MarkerOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
}

impl MarkerOp {
    fn as_str(&self) -> &'static str {
        match self {
            MarkerOp::Eq => "==",
            MarkerOp::NotEq => "!=",
            MarkerOp::Lt => "<",
            MarkerOp::LtEq => "<=",
            MarkerOp::Gt => ">",
            MarkerOp::GtEq => ">=",
            MarkerOp::In => "in",
            MarkerOp::NotIn => "not in",
        }
    }

    /// The operator with its operands swapped, for `"linux" == sys_platform`.
    fn flipped(&self) -> Option<Self> {
        Some(match self {
            MarkerOp::Eq => MarkerOp::Eq,
            MarkerOp::NotEq => MarkerOp::NotEq,
            MarkerOp::Lt => MarkerOp::Gt,
            MarkerOp::LtEq => MarkerOp::GtEq,
            MarkerOp::Gt => MarkerOp::Lt,
            MarkerOp::GtEq => MarkerOp::LtEq,
            // `"x" in extra` cannot be flipped into a variable comparison.
            MarkerOp::In | MarkerOp::NotIn => return None,
        })
    }
}

/// A parsed marker expression.
#[derive(Debug, Clone)]
pub enum Marker {
    And(Box<Marker>, Box<Marker>),
    Or(Box<Marker>, Box<Marker>),
    Not(Box<Marker>),
    Comparison {
        lhs: MarkerVar,
        op: MarkerOp,
        rhs: String,
    },
}

/// The fixed-schema description of the environment a resolution targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Environment {
    pub python_version: String,
    pub python_full_version: String,
    pub os_name: String,
    pub sys_platform: String,
    pub platform_system: String,
    pub platform_machine: String,
    pub implementation_name: String,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            python_version: "3.12".to_string(),
            python_full_version: "3.12.0".to_string(),
            os_name: "posix".to_string(),
            sys_platform: "linux".to_string(),
            platform_system: "Linux".to_string(),
            platform_machine: "x86_64".to_string(),
            implementation_name: "cpython".to_string(),
        }
    }
}

impl Environment {
    fn get(&self, var: MarkerVar) -> &str {
        match var {
            MarkerVar::PythonVersion => &self.python_version,
            MarkerVar::PythonFullVersion => &self.python_full_version,
            MarkerVar::OsName => &self.os_name,
            MarkerVar::SysPlatform => &self.sys_platform,
            MarkerVar::PlatformSystem => &self.platform_system,
            MarkerVar::PlatformMachine => &self.platform_machine,
            MarkerVar::ImplementationName => &self.implementation_name,
            MarkerVar::Extra => "",
        }
    }
}

impl Marker {
    /// Parse a marker expression, or fail with
    /// [`PyriteError::MalformedSpecifier`].
    pub fn parse(input: &str) -> Result<Self, PyriteError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
        };
        let marker = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing tokens"));
        }
        Ok(marker)
    }

    /// Evaluate against an environment and the set of active extras.
    pub fn evaluate(&self, env: &Environment, extras: &BTreeSet<String>) -> bool {
        match self {
            Marker::And(a, b) => a.evaluate(env, extras) && b.evaluate(env, extras),
            Marker::Or(a, b) => a.evaluate(env, extras) || b.evaluate(env, extras),
            Marker::Not(inner) => !inner.evaluate(env, extras),
            Marker::Comparison { lhs, op, rhs } => compare(*lhs, *op, rhs, env, extras),
        }
    }
}

fn compare(
    lhs: MarkerVar,
    op: MarkerOp,
    rhs: &str,
    env: &Environment,
    extras: &BTreeSet<String>,
) -> bool {
    if lhs == MarkerVar::Extra {
        let wanted = crate::requirement::normalize_name(rhs);
        return match op {
            MarkerOp::Eq | MarkerOp::In => extras.contains(&wanted),
            MarkerOp::NotEq | MarkerOp::NotIn => !extras.contains(&wanted),
            _ => false,
        };
    }

    let value = env.get(lhs);

    if lhs.is_version() {
        if let (Ok(left), Ok(right)) = (Version::parse(value), Version::parse(rhs)) {
            return match op {
                MarkerOp::Eq => left == right,
                MarkerOp::NotEq => left != right,
                MarkerOp::Lt => left < right,
                MarkerOp::LtEq => left <= right,
                MarkerOp::Gt => left > right,
                MarkerOp::GtEq => left >= right,
                MarkerOp::In => rhs.contains(value),
                MarkerOp::NotIn => !rhs.contains(value),
            };
        }
        // Fall back to string comparison for non-version text.
    }

    match op {
        MarkerOp::Eq => value == rhs,
        MarkerOp::NotEq => value != rhs,
        MarkerOp::Lt => value < rhs,
        MarkerOp::LtEq => value <= rhs,
        MarkerOp::Gt => value > rhs,
        MarkerOp::GtEq => value >= rhs,
        MarkerOp::In => rhs.contains(value),
        MarkerOp::NotIn => !rhs.contains(value),
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::And(a, b) => write!(f, "{a} and {b}"),
            Marker::Or(a, b) => write!(f, "({a} or {b})"),
            Marker::Not(inner) => write!(f, "not ({inner})"),
            Marker::Comparison { lhs, op, rhs } => {
                write!(f, "{} {} \"{}\"", lhs.as_str(), op.as_str(), rhs)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Op(MarkerOp),
    LParen,
    RParen,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>, PyriteError> {
    let malformed = |reason: &str| PyriteError::MalformedSpecifier {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err(malformed("unterminated string")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '=' | '!' | '<' | '>' | '~' => {
                let mut op = String::new();
                op.push(chars.next().unwrap());
                if chars.peek() == Some(&'=') {
                    op.push(chars.next().unwrap());
                }
                let op = match op.as_str() {
                    "==" => MarkerOp::Eq,
                    "!=" => MarkerOp::NotEq,
                    "<" => MarkerOp::Lt,
                    "<=" => MarkerOp::LtEq,
                    ">" => MarkerOp::Gt,
                    ">=" => MarkerOp::GtEq,
                    _ => return Err(malformed("unknown operator")),
                };
                tokens.push(Token::Op(op));
            }
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let mut word = String::new();
                while chars
                    .peek()
                    .is_some_and(|&ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
                {
                    word.push(chars.next().unwrap());
                }
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "in" => tokens.push(Token::Op(MarkerOp::In)),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            _ => return Err(malformed("unexpected character")),
        }
    }

    // Fuse `not in` into a single operator token.
    let mut fused = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(tok) = iter.next() {
        if tok == Token::Not && iter.peek() == Some(&Token::Op(MarkerOp::In)) {
            iter.next();
            fused.push(Token::Op(MarkerOp::NotIn));
        } else {
            fused.push(tok);
        }
    }
    Ok(fused)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> PyriteError {
        PyriteError::MalformedSpecifier {
            input: self.input.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn or_expr(&mut self) -> Result<Marker, PyriteError> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.and_expr()?;
            left = Marker::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Marker, PyriteError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.unary()?;
            left = Marker::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Marker, PyriteError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            return Ok(Marker::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.or_expr()?;
            if self.next() != Some(Token::RParen) {
                return Err(self.error("expected closing parenthesis"));
            }
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Marker, PyriteError> {
        let left = self.next().ok_or_else(|| self.error("expected operand"))?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error("expected comparison operator")),
        };
        let right = self.next().ok_or_else(|| self.error("expected operand"))?;

        match (left, right) {
            (Token::Ident(name), Token::Str(rhs)) => {
                let lhs = MarkerVar::parse(&name)
                    .ok_or_else(|| self.error("unknown marker variable"))?;
                Ok(Marker::Comparison { lhs, op, rhs })
            }
            (Token::Str(rhs), Token::Ident(name)) => {
                let lhs = MarkerVar::parse(&name)
                    .ok_or_else(|| self.error("unknown marker variable"))?;
                let op = op
                    .flipped()
                    .ok_or_else(|| self.error("operator cannot take a literal left operand"))?;
                Ok(Marker::Comparison { lhs, op, rhs })
            }
            _ => Err(self.error("comparison needs one variable and one string")),
        }
    }
}
