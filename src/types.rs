extern crate derive_more;
use crate::atoms::AtomTag;
use crate::environment::{Capture, SymbolTable};
use crate::location::Location;
use derive_more::{Deref, Display};
use itertools::Itertools;
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::fmt::Formatter;
use std::ops::{RangeFrom, RangeInclusive};
use std::rc::Rc;

#[derive(Deref, Display, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Symbol(pub String);

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol(name.into())
    }
}

#[derive(Debug, Clone)]
pub enum Arity {
    Between(RangeInclusive<usize>),
    AtLeast(RangeFrom<usize>),
}

#[derive(Debug)]
pub struct BadArgCount {
    name: &'static str,
    expected: Arity,
    got: usize,
}

impl fmt::Display for BadArgCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}' expected {} arguments, but received {}",
            self.name, self.expected, self.got
        )
    }
}

impl Arity {
    pub(crate) const fn exactly(n: usize) -> Self {
        Self::Between(n..=n)
    }

    pub(crate) const fn at_least(n: usize) -> Self {
        Self::AtLeast(n..)
    }

    pub(crate) fn contains(&self, n: usize) -> bool {
        match self {
            Self::Between(range) => range.contains(&n),
            Self::AtLeast(range) => range.contains(&n),
        }
    }

    pub(crate) fn validate_for(&self, n: usize, name: &'static str) -> Result<(), BadArgCount> {
        match self.contains(n) {
            true => Ok(()),
            false => Err(BadArgCount {
                name,
                expected: self.clone(),
                got: n,
            }),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Between(r) => {
                if r.start() == r.end() {
                    write!(f, "exactly {}", r.start())
                } else {
                    write!(f, "from {} to {}", r.start(), r.end())
                }
            }
            Arity::AtLeast(r) => write!(f, "at least {}", r.start),
        }
    }
}

/// Integer results that don't fit in an `i64` become floats instead of wrapping.
fn promote_on_overflow(exact: Option<i64>, approximate: impl FnOnce() -> f64) -> Number {
    match exact {
        Some(x) => Number::Integer(x),
        None => {
            log::debug!("integer overflow, continuing with a float");
            Number::Float(approximate())
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(x) => x as f64,
            Number::Float(x) => x,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Integer(x) => x == 0,
            Number::Float(x) => x == 0.0,
        }
    }

    pub(crate) fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Integer(x), Number::Integer(y)) => {
                promote_on_overflow(x.checked_add(y), || x as f64 + y as f64)
            }
            (x, y) => Number::Float(x.as_f64() + y.as_f64()),
        }
    }

    pub(crate) fn sub(self, other: Number) -> Number {
        match (self, other) {
            (Number::Integer(x), Number::Integer(y)) => {
                promote_on_overflow(x.checked_sub(y), || x as f64 - y as f64)
            }
            (x, y) => Number::Float(x.as_f64() - y.as_f64()),
        }
    }

    pub(crate) fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Integer(x), Number::Integer(y)) => {
                promote_on_overflow(x.checked_mul(y), || x as f64 * y as f64)
            }
            (x, y) => Number::Float(x.as_f64() * y.as_f64()),
        }
    }

    /// True division: the quotient is always a float. Caller checks for a zero divisor.
    pub(crate) fn div(self, other: Number) -> Number {
        Number::Float(self.as_f64() / other.as_f64())
    }

    /// Remainder taking the sign of the divisor. Caller checks for a zero divisor.
    pub(crate) fn rem(self, other: Number) -> Number {
        match (self, other) {
            (Number::Integer(x), Number::Integer(y)) => {
                let r = x.wrapping_rem(y);
                if r != 0 && (r < 0) != (y < 0) {
                    Number::Integer(r + y)
                } else {
                    Number::Integer(r)
                }
            }
            (x, y) => {
                let (x, y) = (x.as_f64(), y.as_f64());
                let r = x % y;
                if r != 0.0 && (r < 0.0) != (y < 0.0) {
                    Number::Float(r + y)
                } else {
                    Number::Float(r)
                }
            }
        }
    }

    pub(crate) fn neg(self) -> Number {
        match self {
            Number::Integer(x) => promote_on_overflow(x.checked_neg(), || -(x as f64)),
            Number::Float(x) => Number::Float(-x),
        }
    }

    pub(crate) fn compare(self, other: Number) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Integer(x), Number::Integer(y)) => Some(x.cmp(&y)),
            (x, y) => x.as_f64().partial_cmp(&y.as_f64()),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(x), Number::Integer(y)) => x == y,
            (x, y) => x.as_f64() == y.as_f64(),
        }
    }
}

/// `(head op1 op2 ...)`. Lists are calls too: the head is the first element, and the empty list
/// has no head at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub head: Option<Box<Node>>,
    pub operands: Vec<Node>,
}

impl Call {
    pub fn new(head: Node, operands: Vec<Node>) -> Self {
        Self {
            head: Some(Box::new(head)),
            operands,
        }
    }

    pub fn empty() -> Self {
        Self {
            head: None,
            operands: Vec::new(),
        }
    }

    pub fn from_elements(mut elements: Vec<Node>) -> Self {
        if elements.is_empty() {
            return Self::empty();
        }
        let operands = elements.split_off(1);
        let head = elements.pop().map(Box::new);
        Self { head, operands }
    }

    pub fn len(&self) -> usize {
        match self.head {
            None => 0,
            Some(_) => 1 + self.operands.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn elements(&self) -> Vec<Node> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.head.iter().map(|head| &**head).chain(self.operands.iter())
    }

    pub fn head_symbol(&self) -> Option<&Symbol> {
        self.head.as_ref().and_then(|head| head.as_symbol().ok())
    }
}

/// A closure: what `lambda` and `define` evaluate to.
pub struct Definition {
    pub name: String,
    pub parameters: Vec<Symbol>,
    pub body: Node,
    pub table: SymbolTable,
    /// Set exactly once, after the definition has (possibly) been bound under its own name.
    pub captured: OnceCell<Rc<Capture>>,
}

impl fmt::Debug for Definition {
    // Not derived because we want to skip the captured tables: they may well contain this Definition!
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Definition{{name: {:?}, parameters: {:?}, body: {:?}}}",
            self.name, self.parameters, self.body
        )
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<definition `{}' taking [{}]>",
            self.name,
            self.parameters.iter().join(", ")
        )
    }
}

#[derive(Debug, Clone)]
pub enum Kind {
    Nil,
    Numeric(Number),
    StringLit(String),
    Symbol(Symbol),
    AtomTag(AtomTag),
    Uneval(Rc<RefCell<Node>>),
    Call(Call),
    Yield(Box<Node>),
    Definition(Rc<Definition>),
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        use Kind::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Numeric(x), Numeric(y)) => x == y,
            (StringLit(x), StringLit(y)) => x == y,
            (Symbol(x), Symbol(y)) => x == y,
            (AtomTag(x), AtomTag(y)) => x == y,
            (Uneval(x), Uneval(y)) => Rc::ptr_eq(x, y) || *x.borrow() == *y.borrow(),
            (Call(x), Call(y)) => x == y,
            (Yield(x), Yield(y)) => x == y,
            (Definition(x), Definition(y)) => Rc::ptr_eq(x, y),
            (_, _) => false,
        }
    }
}

/// Every value, parsed or computed. Equality is structural and ignores the location.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: Kind,
    pub location: Location,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug)]
pub enum TypeMismatch {
    NotANumber(&'static str),
    NotAnInteger(&'static str),
    NotAList(&'static str),
    NotAString(&'static str),
    NotASymbol(&'static str),
    NotCallable(&'static str),
    NotAName(&'static str),
    NotComparable(&'static str, &'static str),
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeMismatch::NotANumber(got) => write!(f, "expected a numeric, got {}", got),
            TypeMismatch::NotAnInteger(got) => write!(f, "expected an integer, got {}", got),
            TypeMismatch::NotAList(got) => write!(
                f,
                "expected an unevaluated list, got {}; lists need quoting or `list'",
                got
            ),
            TypeMismatch::NotAString(got) => write!(f, "expected a string, got {}", got),
            TypeMismatch::NotASymbol(got) => write!(f, "expected a symbol, got {}", got),
            TypeMismatch::NotCallable(got) => write!(f, "cannot make a call to {}", got),
            TypeMismatch::NotAName(got) => {
                write!(f, "can't interpret {} as a name for anything", got)
            }
            TypeMismatch::NotComparable(x, y) => write!(f, "cannot compare {} with {}", x, y),
        }
    }
}

impl Node {
    pub fn new(kind: Kind, location: Location) -> Self {
        Self { kind, location }
    }

    pub fn nil(location: Location) -> Self {
        Self::new(Kind::Nil, location)
    }

    pub fn integer(value: i64, location: Location) -> Self {
        Self::new(Kind::Numeric(Number::Integer(value)), location)
    }

    pub fn string(text: impl Into<String>, location: Location) -> Self {
        Self::new(Kind::StringLit(text.into()), location)
    }

    pub fn symbol(name: &str, location: Location) -> Self {
        Self::new(Kind::Symbol(Symbol::from(name)), location)
    }

    pub fn atom(tag: AtomTag, location: Location) -> Self {
        Self::new(Kind::AtomTag(tag), location)
    }

    pub fn quote(inner: Node, location: Location) -> Self {
        Self::new(Kind::Uneval(Rc::new(RefCell::new(inner))), location)
    }

    pub fn definition(definition: Rc<Definition>, location: Location) -> Self {
        Self::new(Kind::Definition(definition), location)
    }

    /// A list value: the quoted call whose elements are `elements`.
    pub fn list(elements: Vec<Node>, location: Location) -> Self {
        let call = Node::new(Kind::Call(Call::from_elements(elements)), location.clone());
        Self::quote(call, location)
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            Kind::Nil => "Nil",
            Kind::Numeric(_) => "Numeric",
            Kind::StringLit(_) => "String",
            Kind::Symbol(_) => "Symbol",
            Kind::AtomTag(_) => "Atom",
            Kind::Uneval(inner) => match inner.borrow().kind {
                Kind::Call(_) => "List",
                Kind::Symbol(_) => "Unevaluation of Symbol",
                _ => "Uneval",
            },
            Kind::Call(_) => "Call",
            Kind::Yield(_) => "Yield",
            Kind::Definition(_) => "Definition",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.kind, Kind::Nil)
    }

    pub(crate) fn as_number(&self) -> Result<Number, TypeMismatch> {
        match &self.kind {
            Kind::Numeric(x) => Ok(*x),
            _ => Err(TypeMismatch::NotANumber(self.type_name())),
        }
    }

    pub(crate) fn as_integer(&self) -> Result<i64, TypeMismatch> {
        match &self.kind {
            Kind::Numeric(Number::Integer(x)) => Ok(*x),
            _ => Err(TypeMismatch::NotAnInteger(self.type_name())),
        }
    }

    pub(crate) fn as_string(&self) -> Result<&str, TypeMismatch> {
        match &self.kind {
            Kind::StringLit(s) => Ok(s),
            _ => Err(TypeMismatch::NotAString(self.type_name())),
        }
    }

    pub(crate) fn as_symbol(&self) -> Result<&Symbol, TypeMismatch> {
        match &self.kind {
            Kind::Symbol(s) => Ok(s),
            _ => Err(TypeMismatch::NotASymbol(self.type_name())),
        }
    }

    pub(crate) fn as_definition(&self) -> Result<&Rc<Definition>, TypeMismatch> {
        match &self.kind {
            Kind::Definition(d) => Ok(d),
            _ => Err(TypeMismatch::NotCallable(self.type_name())),
        }
    }

    /// The shared cell behind a list value. Mutating through it is visible to every alias.
    pub(crate) fn as_list(&self) -> Result<&Rc<RefCell<Node>>, TypeMismatch> {
        match &self.kind {
            Kind::Uneval(inner) if matches!(inner.borrow().kind, Kind::Call(_)) => Ok(inner),
            _ => Err(TypeMismatch::NotAList(self.type_name())),
        }
    }

    pub(crate) fn list_elements(&self) -> Result<Vec<Node>, TypeMismatch> {
        let cell = self.as_list()?;
        let inner = cell.borrow();
        match &inner.kind {
            Kind::Call(call) => Ok(call.elements()),
            _ => unreachable!(), // checked by as_list
        }
    }

    /// Whether the list in `cell` is this node or sits anywhere inside it.
    pub(crate) fn reaches(&self, cell: &Rc<RefCell<Node>>) -> bool {
        match &self.kind {
            Kind::Uneval(inner) => Rc::ptr_eq(inner, cell) || inner.borrow().reaches(cell),
            Kind::Call(call) => call.iter().any(|node| node.reaches(cell)),
            Kind::Yield(inner) => inner.reaches(cell),
            _ => false,
        }
    }

    /// A structural copy sharing nothing mutable with `self`.
    pub fn deep_copy(&self) -> Node {
        let kind = match &self.kind {
            Kind::Uneval(inner) => Kind::Uneval(Rc::new(RefCell::new(inner.borrow().deep_copy()))),
            Kind::Call(call) => Kind::Call(Call {
                head: call.head.as_ref().map(|head| Box::new(head.deep_copy())),
                operands: call.operands.iter().map(Node::deep_copy).collect(),
            }),
            Kind::Yield(inner) => Kind::Yield(Box::new(inner.deep_copy())),
            other => other.clone(),
        };
        Node::new(kind, self.location.clone())
    }
}

pub(crate) fn replace_list_elements(cell: &Rc<RefCell<Node>>, elements: Vec<Node>) {
    let mut inner = cell.borrow_mut();
    inner.kind = Kind::Call(Call::from_elements(elements));
}

/// `if` only accepts `:true`. Everything else that asks about truth uses this.
pub(crate) fn falsy(node: &Node) -> bool {
    match &node.kind {
        Kind::AtomTag(tag) => tag.is_false(),
        Kind::Nil => true,
        Kind::Numeric(x) => x.is_zero(),
        Kind::StringLit(s) => s.is_empty(),
        _ => false,
    }
}

pub(crate) fn truthy(node: &Node) -> bool {
    !falsy(node)
}

pub(crate) fn is_true(node: &Node) -> bool {
    match &node.kind {
        Kind::AtomTag(tag) => tag.is_true(),
        _ => false,
    }
}
