//! Link selector expressions.
//!
//! Selectors are a small boolean expression language over a `link` object,
//! for example:
//!
//! ```text
//! glob("00:1a:2b:*", mac(link.permanent_addr)) && link.driver == "e1000"
//! ```
//!
//! Only type checking is implemented here; evaluation happens where links
//! are observed.

use thiserror::Error;

/// Fields of the `link` object and their types.
const LINK_FIELDS: &[(&str, Type)] = &[
    ("driver", Type::String),
    ("hardware_addr", Type::String),
    ("permanent_addr", Type::String),
    ("pci_id", Type::String),
    ("bus_path", Type::String),
    ("type", Type::Int),
];

/// Errors produced while checking a selector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Unexpected character or end of input
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset into the expression
        offset: usize,
        /// Description
        message: String,
    },

    /// Operand types do not match the operator
    #[error("type error: {0}")]
    Type(String),
}

/// Static type of a sub-expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    /// Boolean
    Bool,
    /// String
    String,
    /// Integer
    Int,
    /// The `link` object
    Link,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str,
    Int,
    Op(&'static str),
    End,
}

const OPERATORS: &[&str] = &[
    "&&", "||", "==", "!=", "<=", ">=", "<", ">", "!", "-", "(", ")", ".", ",",
];

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, SelectorError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c == b'"' || c == b'\'' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != c {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            if i >= bytes.len() {
                return Err(SelectorError::Syntax {
                    offset: start,
                    message: "unterminated string".to_string(),
                });
            }
            i += 1;
            tokens.push((start, Token::Str));
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            tokens.push((start, Token::Int));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((start, Token::Ident(input[start..i].to_string())));
            continue;
        }

        let rest = &input[i..];
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(op) => {
                tokens.push((i, Token::Op(*op)));
                i += op.len();
            }
            None => {
                return Err(SelectorError::Syntax {
                    offset: i,
                    message: format!("unexpected character {:?}", c as char),
                });
            }
        }
    }

    tokens.push((input.len(), Token::End));
    Ok(tokens)
}

struct Checker {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Checker {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Token::Op(o) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: &str) -> Result<(), SelectorError> {
        if self.eat(op) {
            Ok(())
        } else {
            Err(self.syntax(format!("expected {:?}", op)))
        }
    }

    fn syntax(&self, message: String) -> SelectorError {
        SelectorError::Syntax {
            offset: self.offset(),
            message,
        }
    }

    fn or(&mut self) -> Result<Type, SelectorError> {
        let mut left = self.and()?;
        while self.eat("||") {
            let right = self.and()?;
            left = require_both(Type::Bool, left, right, "||")?;
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Type, SelectorError> {
        let mut left = self.equality()?;
        while self.eat("&&") {
            let right = self.equality()?;
            left = require_both(Type::Bool, left, right, "&&")?;
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Type, SelectorError> {
        let left = self.relation()?;
        for op in ["==", "!="] {
            if self.eat(op) {
                let right = self.relation()?;
                if left != right || left == Type::Link {
                    return Err(SelectorError::Type(format!(
                        "cannot compare {:?} {} {:?}",
                        left, op, right
                    )));
                }
                return Ok(Type::Bool);
            }
        }
        Ok(left)
    }

    fn relation(&mut self) -> Result<Type, SelectorError> {
        let left = self.unary()?;
        for op in ["<=", ">=", "<", ">"] {
            if self.eat(op) {
                let right = self.unary()?;
                if left != right || !matches!(left, Type::Int | Type::String) {
                    return Err(SelectorError::Type(format!(
                        "cannot order {:?} {} {:?}",
                        left, op, right
                    )));
                }
                return Ok(Type::Bool);
            }
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Type, SelectorError> {
        if self.eat("!") {
            let operand = self.unary()?;
            return require_both(Type::Bool, operand, Type::Bool, "!");
        }
        if self.eat("-") {
            let operand = self.unary()?;
            return require_both(Type::Int, operand, Type::Int, "-");
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Type, SelectorError> {
        let mut ty = self.primary()?;
        while self.eat(".") {
            let member = match self.next() {
                Token::Ident(name) => name,
                _ => return Err(self.syntax("expected member name".to_string())),
            };
            ty = if self.eat("(") {
                let args = self.arguments()?;
                method_type(ty, &member, &args)?
            } else {
                field_type(ty, &member)?
            };
        }
        Ok(ty)
    }

    fn primary(&mut self) -> Result<Type, SelectorError> {
        match self.next() {
            Token::Str => Ok(Type::String),
            Token::Int => Ok(Type::Int),
            Token::Op("(") => {
                let ty = self.or()?;
                self.expect(")")?;
                Ok(ty)
            }
            Token::Ident(name) => match name.as_str() {
                "true" | "false" => Ok(Type::Bool),
                "link" => Ok(Type::Link),
                _ if self.eat("(") => {
                    let args = self.arguments()?;
                    function_type(&name, &args)
                }
                _ => Err(SelectorError::Type(format!("undeclared reference to {:?}", name))),
            },
            Token::End => Err(self.syntax("unexpected end of expression".to_string())),
            other => Err(self.syntax(format!("unexpected token {:?}", other))),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Type>, SelectorError> {
        let mut args = Vec::new();
        if self.eat(")") {
            return Ok(args);
        }
        loop {
            args.push(self.or()?);
            if self.eat(")") {
                return Ok(args);
            }
            self.expect(",")?;
        }
    }
}

fn require_both(expected: Type, left: Type, right: Type, op: &str) -> Result<Type, SelectorError> {
    if left == expected && right == expected {
        Ok(expected)
    } else {
        Err(SelectorError::Type(format!(
            "operator {} expects {:?} operands, got {:?} and {:?}",
            op, expected, left, right
        )))
    }
}

fn field_type(ty: Type, field: &str) -> Result<Type, SelectorError> {
    if ty != Type::Link {
        return Err(SelectorError::Type(format!("{:?} has no field {:?}", ty, field)));
    }
    LINK_FIELDS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, ty)| *ty)
        .ok_or_else(|| SelectorError::Type(format!("link has no field {:?}", field)))
}

fn method_type(ty: Type, method: &str, args: &[Type]) -> Result<Type, SelectorError> {
    match (ty, method, args) {
        (Type::String, "startsWith" | "endsWith" | "contains" | "matches", [Type::String]) => Ok(Type::Bool),
        _ => Err(SelectorError::Type(format!(
            "no method {}({:?}) on {:?}",
            method, args, ty
        ))),
    }
}

fn function_type(name: &str, args: &[Type]) -> Result<Type, SelectorError> {
    match (name, args) {
        ("glob", [Type::String, Type::String]) => Ok(Type::Bool),
        ("mac", [Type::String]) => Ok(Type::String),
        ("size", [Type::String]) => Ok(Type::Int),
        _ => Err(SelectorError::Type(format!("no function {}({:?})", name, args))),
    }
}

/// Type-checks a selector and returns its result type.
pub fn check(expression: &str) -> Result<Type, SelectorError> {
    let mut checker = Checker {
        tokens: tokenize(expression)?,
        pos: 0,
    };
    let ty = checker.or()?;
    match checker.peek() {
        Token::End => Ok(ty),
        other => Err(checker.syntax(format!("unexpected trailing token {:?}", other))),
    }
}

/// Type-checks a selector that must evaluate to a boolean.
pub fn check_bool(expression: &str) -> Result<(), SelectorError> {
    match check(expression)? {
        Type::Bool => Ok(()),
        other => Err(SelectorError::Type(format!(
            "expression must be boolean, got {:?}",
            other
        ))),
    }
}
