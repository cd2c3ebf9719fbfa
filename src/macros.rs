//! Compile-time macros. `(define macro (name params...) template)` is recorded and erased, and
//! every later `(name args...)` in the same forest is replaced by the template with each parameter
//! swapped for the corresponding argument, before anything is evaluated.

use crate::location::Location;
use crate::types::{Call, Kind, Node, Symbol};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::cell::RefCell;

#[derive(Debug, Clone)]
pub struct Macro {
    pub name: Symbol,
    pub parameters: Vec<Symbol>,
    pub template: Node,
    pub location: Location,
}

#[derive(Debug)]
pub enum ErrorKind {
    MacroArityMismatch {
        name: Symbol,
        expected: usize,
        got: usize,
    },
    MalformedMacro(&'static str),
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub location: Location,
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::MacroArityMismatch {
                name,
                expected,
                got,
            } => write!(
                f,
                "macro `{}' expects {} argument{}, but was given {}",
                name,
                expected,
                if *expected == 1 { "" } else { "s" },
                got
            ),
            ErrorKind::MalformedMacro(problem) => write!(f, "malformed macro definition: {}", problem),
        }
    }
}

fn malformed(problem: &'static str, location: &Location) -> Error {
    Error {
        kind: ErrorKind::MalformedMacro(problem),
        location: location.clone(),
    }
}

#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<Symbol, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Expands `forest` in place. The table starts empty on every call, so macros never leak from
    /// one file (or REPL line) into another.
    pub fn preprocess(&mut self, forest: &mut Vec<Node>) -> Result<()> {
        self.macros.clear();
        for node in forest.iter_mut() {
            self.expand(node)?;
        }
        Ok(())
    }

    fn expand(&mut self, node: &mut Node) -> Result<()> {
        if let Some(declaration) = as_declaration(node)? {
            log::debug!(
                "macro {} taking [{}] recorded at {:?}",
                declaration.name,
                declaration.parameters.len(),
                declaration.location
            );
            self.macros.insert(declaration.name.clone(), declaration);
            node.kind = Kind::Nil;
            return Ok(());
        }

        match &mut node.kind {
            Kind::Call(call) => {
                if let Some(head) = call.head.as_mut() {
                    self.expand(head)?;
                }
                for operand in call.operands.iter_mut() {
                    self.expand(operand)?;
                }
            }
            Kind::Uneval(inner) => self.expand(&mut inner.borrow_mut())?,
            Kind::Yield(inner) => self.expand(inner)?,
            _ => return Ok(()),
        }

        let invoked = match &node.kind {
            Kind::Call(call) => call
                .head_symbol()
                .and_then(|name| self.macros.get(name))
                .map(|m| (m, call)),
            _ => None,
        };
        if let Some((m, call)) = invoked {
            let expansion = substitute(m, &call.operands, &node.location)?;
            log::trace!("expanded {} into {}", node, expansion);
            *node = expansion;
        }
        Ok(())
    }
}

/// Recognises `(define macro (name params...) template)`.
fn as_declaration(node: &Node) -> Result<Option<Macro>> {
    let call = match &node.kind {
        Kind::Call(call) => call,
        _ => return Ok(None),
    };
    let is_declaration = call.head_symbol().map(|s| s.as_str()) == Some("define")
        && call.operands.first().and_then(|n| n.as_symbol().ok()).map(|s| s.as_str())
            == Some("macro");
    if !is_declaration {
        return Ok(None);
    }
    if call.operands.len() != 3 {
        return Err(malformed(
            "expected (define macro (name params...) template)",
            &node.location,
        ));
    }

    let signature = match &call.operands[1].kind {
        Kind::Call(signature) if !signature.is_empty() => signature,
        _ => return Err(malformed("the signature must be a list (name params...)", &node.location)),
    };
    let symbols = signature
        .iter()
        .map(|n| n.as_symbol().map(Symbol::clone))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| malformed("macro names and parameters must be symbols", &call.operands[1].location))?;
    let (name, parameters) = match symbols.split_first() {
        Some((name, parameters)) => (name.clone(), parameters.to_vec()),
        None => return Err(malformed("missing macro name", &call.operands[1].location)),
    };

    Ok(Some(Macro {
        name,
        parameters,
        template: call.operands[2].deep_copy(),
        location: node.location.clone(),
    }))
}

fn substitute(m: &Macro, arguments: &[Node], location: &Location) -> Result<Node> {
    if arguments.len() != m.parameters.len() {
        return Err(Error {
            kind: ErrorKind::MacroArityMismatch {
                name: m.name.clone(),
                expected: m.parameters.len(),
                got: arguments.len(),
            },
            location: location.clone(),
        });
    }
    let bindings: HashMap<&Symbol, &Node> = m.parameters.iter().zip(arguments).collect();
    let mut expansion = replace_parameters(&m.template, &bindings);
    expansion.location = location.clone();
    Ok(expansion)
}

/// A fresh tree: nothing in the result is shared with the template or with the arguments.
fn replace_parameters(template: &Node, bindings: &HashMap<&Symbol, &Node>) -> Node {
    let kind = match &template.kind {
        Kind::Symbol(name) => match bindings.get(name) {
            Some(argument) => return argument.deep_copy(),
            None => Kind::Symbol(name.clone()),
        },
        Kind::Call(call) => Kind::Call(Call {
            head: call
                .head
                .as_ref()
                .map(|head| Box::new(replace_parameters(head, bindings))),
            operands: call
                .operands
                .iter()
                .map(|operand| replace_parameters(operand, bindings))
                .collect(),
        }),
        Kind::Uneval(inner) => Kind::Uneval(Rc::new(RefCell::new(replace_parameters(
            &inner.borrow(),
            bindings,
        )))),
        Kind::Yield(inner) => Kind::Yield(Box::new(replace_parameters(inner, bindings))),
        other => other.clone(),
    };
    Node::new(kind, template.location.clone())
}
