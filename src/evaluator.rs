use crate::interpreter::{self, Interpreter};
use crate::location::Location;
use crate::special_forms;
use crate::types::{BadArgCount, Definition, Kind, Node, TypeMismatch};
use crate::environment;
use itertools::Itertools;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

pub type Result<T = Node> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum ErrorKind {
    UnboundSymbol(String),
    ImmutableRebind(String),
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    BadArgCount(BadArgCount),
    TypeMismatch(TypeMismatch),
    IndexOutOfRange {
        index: i64,
        len: usize,
    },
    UnknownOperation(String),
    CyclicList,
    EmptyCall,
    MalformedForm(String),
    DivideByZero,
    FileNotFound {
        tried: PathBuf,
        also: PathBuf,
    },
    Io(std::io::Error),
    StackOverflow(usize),
    Nested(Box<interpreter::Error>),
    InternalInvariantViolation(String),
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub location: Location,
}

impl ErrorKind {
    pub fn at(self, location: &Location) -> Error {
        Error {
            kind: self,
            location: location.clone(),
        }
    }
}

/// Attaches the offending node's location to whatever went wrong.
pub(crate) trait Locate<T> {
    fn at(self, node: &Node) -> Result<T>;
}

impl<T, E: Into<ErrorKind>> Locate<T> for std::result::Result<T, E> {
    fn at(self, node: &Node) -> Result<T> {
        self.map_err(|e| e.into().at(&node.location))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::UnboundSymbol(name) => {
                write!(f, "symbol `{}' is not bound to anything", name)
            }
            ErrorKind::ImmutableRebind(name) => write!(
                f,
                "`{}' is immutable and already bound; declare it with `mutate' to rebind it",
                name
            ),
            ErrorKind::ArityMismatch {
                name,
                expected,
                got,
            } => write!(
                f,
                "`{}' takes {} argument{}, but was called with {}",
                name,
                expected,
                if *expected == 1 { "" } else { "s" },
                got
            ),
            ErrorKind::BadArgCount(e) => write!(f, "{}", e),
            ErrorKind::TypeMismatch(e) => write!(f, "type mismatch: {}", e),
            ErrorKind::IndexOutOfRange { index, len } => {
                write!(f, "index {} is out of range for a list of size {}", index, len)
            }
            ErrorKind::UnknownOperation(name) => {
                write!(f, "unknown operation `{}': it isn't a special form or a bound definition", name)
            }
            ErrorKind::CyclicList => write!(f, "a list cannot contain itself"),
            ErrorKind::EmptyCall => write!(f, "cannot evaluate an empty call; quote it to make an empty list"),
            ErrorKind::MalformedForm(problem) => write!(f, "{}", problem),
            ErrorKind::DivideByZero => write!(f, "cannot divide by zero!"),
            ErrorKind::FileNotFound { tried, also } => write!(
                f,
                "could not find `{}' or `{}'",
                tried.display(),
                also.display()
            ),
            ErrorKind::Io(e) => write!(f, "io error: {}", e),
            ErrorKind::StackOverflow(limit) => {
                write!(f, "stack overflow: calls nested deeper than {}", limit)
            }
            ErrorKind::Nested(e) => write!(f, "{}", e),
            ErrorKind::InternalInvariantViolation(what) => {
                write!(f, "internal error, please report this: {}", what)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl From<TypeMismatch> for ErrorKind {
    fn from(t: TypeMismatch) -> Self {
        Self::TypeMismatch(t)
    }
}

impl From<BadArgCount> for ErrorKind {
    fn from(e: BadArgCount) -> Self {
        Self::BadArgCount(e)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<environment::Error> for ErrorKind {
    fn from(e: environment::Error) -> Self {
        use environment::Error as E;
        match e {
            E::UnboundSymbol(name) => Self::UnboundSymbol(name),
            E::ImmutableRebind(name) => Self::ImmutableRebind(name),
            E::ArityMismatch {
                name,
                expected,
                got,
            } => Self::ArityMismatch {
                name,
                expected,
                got,
            },
            e @ E::NotCaptured(_) | e @ E::AlreadyCaptured(_) => {
                Self::InternalInvariantViolation(e.to_string())
            }
        }
    }
}

impl From<interpreter::Error> for ErrorKind {
    fn from(e: interpreter::Error) -> Self {
        Self::Nested(Box::new(e))
    }
}

pub fn eval(session: &mut Interpreter, node: &Node) -> Result {
    log::trace!("eval {}", node);
    match &node.kind {
        Kind::Nil
        | Kind::Numeric(_)
        | Kind::StringLit(_)
        | Kind::Yield(_)
        | Kind::Definition(_) => Ok(node.clone()),
        // Literals are copied so that in-place list algebra never reaches back into the tree.
        Kind::Uneval(_) => Ok(node.deep_copy()),
        Kind::AtomTag(tag) => Ok(Node::atom(
            session.atoms.intern(tag.name()),
            node.location.clone(),
        )),
        Kind::Symbol(name) => match name.as_str() {
            "_" => Ok(session.last_value.clone()),
            "break" | "next" => Ok(node.clone()),
            _ => session.scopes.resolve(name).at(node),
        },
        Kind::Call(_) => {
            if session.depth >= session.config.max_depth {
                return Err(ErrorKind::StackOverflow(session.config.max_depth).at(&node.location));
            }
            session.depth += 1;
            let result = eval_call(session, node);
            session.depth -= 1;
            if let Ok(value) = &result {
                session.last_value = value.clone();
            }
            result
        }
    }
}

fn eval_call(session: &mut Interpreter, node: &Node) -> Result {
    let call = match &node.kind {
        Kind::Call(call) => call,
        _ => unreachable!(),
    };
    let head = match &call.head {
        Some(head) => head,
        None => return Err(ErrorKind::EmptyCall.at(&node.location)),
    };

    if let Kind::Symbol(name) = &head.kind {
        if let Some(form) = special_forms::lookup(name, &session.config) {
            form.arity
                .validate_for(call.operands.len(), form.names[0])
                .at(node)?;
            log::trace!("special form {} at {:?}", name, node.location);
            return if form.evaluate_operands {
                let args = evaluate_operands(session, &call.operands)?;
                (form.form_ptr)(session, node, &args)
            } else {
                (form.form_ptr)(session, node, &call.operands)
            };
        }
    }

    let callee = match (&head.kind, eval(session, head)) {
        (Kind::Symbol(name), Err(Error { kind: ErrorKind::UnboundSymbol(_), .. })) => {
            return Err(ErrorKind::UnknownOperation(name.to_string()).at(&head.location))
        }
        (_, result) => result?,
    };
    let definition = callee.as_definition().at(head)?.clone();
    let args = evaluate_operands(session, &call.operands)?;
    apply(session, &definition, args, node)
}

pub(crate) fn evaluate_operands(session: &mut Interpreter, operands: &[Node]) -> Result<Vec<Node>> {
    operands.iter().map(|operand| eval(session, operand)).collect()
}

pub(crate) fn pretty_print_args(args: &[Node]) -> String {
    match args.len() {
        0 => "no args".into(),
        1 => args[0].to_string(),
        _ => format!("\n\t{}", args.iter().join("\n\t")),
    }
}

/// Runs `definition`'s body in a fresh call frame. The frame is torn down whether or not the body
/// succeeded. A `yield` reaching the top of the body is the call's result.
pub(crate) fn apply(
    session: &mut Interpreter,
    definition: &Rc<Definition>,
    args: Vec<Node>,
    node: &Node,
) -> Result {
    log::trace!("Call {} with {}", definition, pretty_print_args(&args));
    session.scopes.enter(definition, args).at(node)?;
    let result = eval(session, &definition.body).and_then(|value| match &value.kind {
        Kind::Yield(inner) => eval(session, inner),
        _ => Ok(value),
    });
    session.scopes.leave();
    match &result {
        Ok(value) => log::trace!("Call to {} resulted in {}", definition.name, value),
        Err(e) => log::trace!("Call to {} failed: {}", definition.name, e),
    }
    result
}
