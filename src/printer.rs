use crate::strings::string_repr;
use crate::types::{Kind, Node, Number};
use itertools::Itertools;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrintMode {
    Directly,
    ReadableRepresentation,
}

pub fn pr_str(node: &Node, mode: PrintMode) -> String {
    match &node.kind {
        Kind::Nil => String::from("nil"),
        Kind::Numeric(number) => number.to_string(),
        Kind::StringLit(text) => match mode {
            PrintMode::Directly => text.clone(),
            PrintMode::ReadableRepresentation => string_repr(text),
        },
        Kind::Symbol(name) => name.to_string(),
        Kind::AtomTag(tag) => tag.to_string(),
        Kind::Uneval(inner) => format!("'{}", pr_str(&inner.borrow(), mode)),
        Kind::Call(call) => format!("({})", call.iter().map(|n| pr_str(n, mode)).join(" ")),
        Kind::Yield(inner) => format!("(yield {})", pr_str(inner, mode)),
        Kind::Definition(definition) => definition.to_string(),
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(x) => write!(f, "{}", x),
            // Debug keeps the decimal point on whole floats, so they read back as floats.
            Number::Float(x) => write!(f, "{:?}", x),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", pr_str(self, PrintMode::ReadableRepresentation))
    }
}
