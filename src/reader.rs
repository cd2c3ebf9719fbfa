use crate::atoms::AtomTable;
use crate::location::{Location, SourceFile};
use crate::tokens::{self, tokenize, Token, TokenKind};
use crate::types::{Call, Kind, Node, Number};
use std::fmt;
use std::iter::Peekable;
use std::rc::Rc;
use std::slice;

type Reader<'a> = Peekable<slice::Iter<'a, Token>>;

#[derive(Debug)]
pub enum ReadError {
    Tokenizer(tokens::Error),
    UnexpectedEof(Location),
    UnexpectedCloseParen(Location),
    BadNumeral(String, Location),
    MalformedYield(Location),
}

pub type Error = ReadError;
pub type Result<T> = std::result::Result<T, ReadError>;

impl ReadError {
    pub fn location(&self) -> &Location {
        match self {
            ReadError::Tokenizer(e) => &e.location,
            ReadError::UnexpectedEof(loc)
            | ReadError::UnexpectedCloseParen(loc)
            | ReadError::BadNumeral(_, loc)
            | ReadError::MalformedYield(loc) => loc,
        }
    }

    pub fn is_lexical(&self) -> bool {
        matches!(self, ReadError::Tokenizer(_))
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Tokenizer(e) => write!(f, "{}", e),
            ReadError::UnexpectedEof(_) => {
                write!(f, "unexpected EOF, missing closing parenthesis")
            }
            ReadError::UnexpectedCloseParen(_) => write!(f, "unexpected `)'"),
            ReadError::BadNumeral(text, _) => write!(f, "`{}' is not a valid numeral", text),
            ReadError::MalformedYield(_) => write!(f, "`yield' takes exactly one operand"),
        }
    }
}

impl From<tokens::Error> for ReadError {
    fn from(e: tokens::Error) -> Self {
        ReadError::Tokenizer(e)
    }
}

/// Reads every top-level form of `source`. Atom literals are interned into `atoms` as they're
/// read, so that atoms from different files compare equal.
pub fn read_source(source: &Rc<SourceFile>, atoms: &mut AtomTable) -> Result<Vec<Node>> {
    // Line breaks only matter to the REPL's continuation logic, not to the tree.
    let tokens: Vec<Token> = tokenize(source)?
        .into_iter()
        .filter(|token| token.kind != TokenKind::Terminator)
        .collect();
    let mut reader = tokens.iter().peekable();

    let mut forest = Vec::new();
    while let Some(form) = read_form(&mut reader, atoms)? {
        forest.push(form);
    }
    Ok(forest)
}

pub fn read_str(text: &str, path: &str, atoms: &mut AtomTable) -> Result<Vec<Node>> {
    read_source(&SourceFile::new(path, text), atoms)
}

fn read_form(reader: &mut Reader, atoms: &mut AtomTable) -> Result<Option<Node>> {
    let token = match reader.next() {
        Some(token) => token,
        None => return Ok(None),
    };
    let location = token.location.clone();
    let node = match &token.kind {
        TokenKind::EndOfInput => return Ok(None),
        TokenKind::OpenParen => read_list(reader, atoms, location)?,
        TokenKind::CloseParen => return Err(ReadError::UnexpectedCloseParen(location)),
        TokenKind::Quote => {
            let inner = read_form(reader, atoms)?.ok_or(ReadError::UnexpectedEof(location.clone()))?;
            Node::quote(inner, location)
        }
        TokenKind::Symbol(name) if name == "nil" => Node::nil(location),
        TokenKind::Symbol(name) => Node::symbol(name, location),
        TokenKind::Atom(name) => Node::atom(atoms.intern(name), location),
        TokenKind::Numeral(text) => match parse_numeral(text) {
            Some(number) => Node::new(Kind::Numeric(number), location),
            None => return Err(ReadError::BadNumeral(text.clone(), location)),
        },
        TokenKind::StringLiteral(text) => Node::string(text.as_str(), location),
        TokenKind::Terminator => return read_form(reader, atoms),
    };
    Ok(Some(node))
}

fn read_list(reader: &mut Reader, atoms: &mut AtomTable, location: Location) -> Result<Node> {
    let mut elements = Vec::new();
    loop {
        match reader.peek().map(|token| &token.kind) {
            Some(TokenKind::CloseParen) => {
                reader.next();
                break;
            }
            None | Some(TokenKind::EndOfInput) => return Err(ReadError::UnexpectedEof(location)),
            Some(_) => match read_form(reader, atoms)? {
                Some(form) => elements.push(form),
                None => return Err(ReadError::UnexpectedEof(location)),
            },
        }
    }

    let call = Call::from_elements(elements);
    if call.head_symbol().map(|s| s.as_str()) == Some("yield") {
        let mut operands = call.operands;
        return match operands.len() {
            1 => Ok(Node::new(
                Kind::Yield(Box::new(operands.remove(0))),
                location,
            )),
            _ => Err(ReadError::MalformedYield(location)),
        };
    }
    Ok(Node::new(Kind::Call(call), location))
}

fn parse_numeral(text: &str) -> Option<Number> {
    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let radix = match unsigned.get(..2) {
        Some("0x") => Some(16),
        Some("0o") => Some(8),
        Some("0b") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let value = i64::from_str_radix(&unsigned[2..], radix).ok()?;
        return Some(Number::Integer(if negative { -value } else { value }));
    }
    if let Ok(value) = text.parse::<i64>() {
        return Some(Number::Integer(value));
    }
    text.parse::<f64>().ok().map(Number::Float)
}
