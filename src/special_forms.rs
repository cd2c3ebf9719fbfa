use crate::config::Config;
use crate::builtins;
use crate::evaluator::{self, eval, ErrorKind, Locate, Result};
use crate::interpreter::Interpreter;
use crate::types::{falsy, is_true, Arity, Call, Kind, Node, Symbol, TypeMismatch};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

pub(crate) type FormFn = fn(&mut Interpreter, &Node, &[Node]) -> Result;

/// A built-in operator. Forms with `evaluate_operands` see their operands already evaluated, left
/// to right; the rest get them exactly as written and decide for themselves.
pub(crate) struct SpecialForm {
    pub names: &'static [&'static str],
    pub arity: Arity,
    pub evaluate_operands: bool,
    pub form_ptr: FormFn,
}

type FormTable = HashMap<&'static str, &'static SpecialForm>;

lazy_static! {
    static ref FORMS: FormTable = {
        let mut map = FormTable::new();
        for form in CONTROL.iter().chain(builtins::BUILTINS.iter()) {
            for &name in form.names {
                map.insert(name, form);
            }
        }
        map
    };
}

/// The lambda spellings are configurable, so they're checked before the fixed table.
pub(crate) fn lookup(name: &Symbol, config: &Config) -> Option<&'static SpecialForm> {
    if config.lambda_spellings.iter().any(|spelling| spelling == name.as_str()) {
        return Some(&LAMBDA);
    }
    FORMS.get(name.as_str()).copied()
}

pub(crate) fn malformed(node: &Node, problem: impl Into<String>) -> evaluator::Error {
    ErrorKind::MalformedForm(problem.into()).at(&node.location)
}

static CONTROL: &[SpecialForm] = &[
    DO, IF, UNLESS, LET, MUTATE, DEFINE, EVAL, REQUIRE, DELETE, COMPOSE,
];

const DO: SpecialForm = SpecialForm {
    names: &["do", "prog"],
    arity: Arity::at_least(0),
    evaluate_operands: false,
    form_ptr: do_,
};

fn do_(session: &mut Interpreter, node: &Node, operands: &[Node]) -> Result {
    let mut last = Node::nil(node.location.clone());
    for operand in operands {
        let value = eval(session, operand)?;
        if let Kind::Yield(inner) = &value.kind {
            log::trace!("yield {} from block at {:?}", inner, node.location);
            return eval(session, inner);
        }
        last = value;
    }
    Ok(last)
}

const IF: SpecialForm = SpecialForm {
    names: &["if"],
    arity: Arity::Between(2..=3),
    evaluate_operands: false,
    form_ptr: if_,
};

fn if_(session: &mut Interpreter, node: &Node, operands: &[Node]) -> Result {
    let condition = eval(session, &operands[0])?;
    branch(session, node, operands, is_true(&condition))
}

const UNLESS: SpecialForm = SpecialForm {
    names: &["unless"],
    arity: Arity::Between(2..=3),
    evaluate_operands: false,
    form_ptr: unless_,
};

fn unless_(session: &mut Interpreter, node: &Node, operands: &[Node]) -> Result {
    let condition = eval(session, &operands[0])?;
    branch(session, node, operands, falsy(&condition))
}

fn branch(session: &mut Interpreter, node: &Node, operands: &[Node], first: bool) -> Result {
    match (first, operands.get(2)) {
        (true, _) => eval(session, &operands[1]),
        (false, Some(otherwise)) => eval(session, otherwise),
        (false, None) => Ok(Node::nil(node.location.clone())),
    }
}

const LET: SpecialForm = SpecialForm {
    names: &["let"],
    arity: Arity::at_least(1),
    evaluate_operands: false,
    form_ptr: |session, node, operands| bind_pairs(session, node, operands, false),
};

const MUTATE: SpecialForm = SpecialForm {
    names: &["mutate"],
    arity: Arity::at_least(1),
    evaluate_operands: false,
    form_ptr: |session, node, operands| bind_pairs(session, node, operands, true),
};

/// `(let (name expr) (name expr)...)`. Each pair is bound before the next is evaluated, so later
/// pairs can refer to earlier ones.
fn bind_pairs(session: &mut Interpreter, node: &Node, operands: &[Node], mutable: bool) -> Result {
    let mut last = Node::nil(node.location.clone());
    for pair in operands {
        let (name, expr) = match &pair.kind {
            Kind::Call(call) if call.operands.len() == 1 => {
                let name = call.head_symbol().ok_or_else(|| {
                    malformed(pair, "the name in a binding pair must be a symbol")
                })?;
                (name, &call.operands[0])
            }
            _ => return Err(malformed(pair, "expected a binding pair (name value)")),
        };
        let value = eval(session, expr)?;
        log::debug!("define {} as {}", name, value);
        session.scopes.bind(name, value.clone(), mutable).at(pair)?;
        last = value;
    }
    Ok(last)
}

/// The parameter list of `lambda`: `(a b c)` or `()`.
fn parameter_list(node: &Node) -> Result<Vec<Symbol>> {
    match &node.kind {
        Kind::Call(call) => call
            .iter()
            .map(|parameter| parameter.as_symbol().map(Symbol::clone).at(parameter))
            .collect(),
        Kind::Nil => Ok(Vec::new()),
        _ => Err(malformed(node, "expected a parameter list")),
    }
}

pub(crate) static LAMBDA: SpecialForm = SpecialForm {
    names: &["lambda"],
    arity: Arity::exactly(2),
    evaluate_operands: false,
    form_ptr: lambda_,
};

fn lambda_(session: &mut Interpreter, node: &Node, operands: &[Node]) -> Result {
    let parameters = parameter_list(&operands[0])?;
    let definition = session
        .scopes
        .new_definition("<lambda>", parameters, operands[1].clone());
    session.scopes.capture(&definition).at(node)?;
    Ok(Node::definition(definition, node.location.clone()))
}

const DEFINE: SpecialForm = SpecialForm {
    names: &["define"],
    arity: Arity::exactly(2),
    evaluate_operands: false,
    form_ptr: define_,
};

/// `(define (name params...) body)`. The definition is bound before its environment is captured,
/// which is what lets it call itself.
fn define_(session: &mut Interpreter, node: &Node, operands: &[Node]) -> Result {
    let signature = parameter_list(&operands[0])?;
    let (name, parameters) = match signature.split_first() {
        Some((name, parameters)) => (name.clone(), parameters.to_vec()),
        None => return Err(malformed(&operands[0], "`define' needs a name to define")),
    };
    let definition = session
        .scopes
        .new_definition(&name, parameters, operands[1].clone());
    let value = Node::definition(Rc::clone(&definition), node.location.clone());
    session.scopes.bind(&name, value.clone(), false).at(node)?;
    session.scopes.capture(&definition).at(node)?;
    log::debug!("define {}", definition);
    Ok(value)
}

const EVAL: SpecialForm = SpecialForm {
    names: &["eval"],
    arity: Arity::exactly(1),
    evaluate_operands: true,
    form_ptr: eval_,
};

fn eval_(session: &mut Interpreter, _node: &Node, args: &[Node]) -> Result {
    let inner = match &args[0].kind {
        Kind::Uneval(inner) => inner.borrow().clone(),
        _ => return Ok(args[0].clone()),
    };
    eval(session, &inner)
}

const REQUIRE: SpecialForm = SpecialForm {
    names: &["require"],
    arity: Arity::at_least(1),
    evaluate_operands: false,
    form_ptr: require_,
};

fn require_(session: &mut Interpreter, node: &Node, operands: &[Node]) -> Result {
    for operand in operands {
        let name = match &operand.kind {
            Kind::Symbol(name) => name.to_string(),
            _ => {
                let value = eval(session, operand)?;
                required_name(&value).at(operand)?
            }
        };
        let directory = operand.location.path().parent().unwrap_or_else(|| Path::new(""));
        let tried = directory.join(&name);
        let also = directory.join(format!("{}.{}", name, session.config.extension));
        let path = [&tried, &also]
            .iter()
            .find(|path| path.is_file())
            .map(|path| path.to_path_buf())
            .ok_or_else(|| ErrorKind::FileNotFound {
                tried: tried.clone(),
                also: also.clone(),
            })
            .at(operand)?;
        session.load_file(&path, &operand.location)?;
    }
    Ok(Node::atom(session.atoms.truth(true), node.location.clone()))
}

fn required_name(value: &Node) -> std::result::Result<String, TypeMismatch> {
    match &value.kind {
        Kind::StringLit(name) => Ok(name.clone()),
        Kind::AtomTag(tag) => Ok(tag.name().trim_start_matches(':').to_string()),
        Kind::Uneval(inner) => match &inner.borrow().kind {
            Kind::Symbol(name) => Ok(name.to_string()),
            _ => Err(TypeMismatch::NotAName(value.type_name())),
        },
        _ => Err(TypeMismatch::NotAName(value.type_name())),
    }
}

const DELETE: SpecialForm = SpecialForm {
    names: &["delete"],
    arity: Arity::at_least(1),
    evaluate_operands: false,
    form_ptr: delete_,
};

fn delete_(session: &mut Interpreter, node: &Node, operands: &[Node]) -> Result {
    for operand in operands {
        let name = operand.as_symbol().at(operand)?;
        session.scopes.delete(name).at(operand)?;
        log::debug!("deleted {}", name);
    }
    Ok(Node::atom(session.atoms.truth(true), node.location.clone()))
}

const COMPOSE: SpecialForm = SpecialForm {
    names: &["<>"],
    arity: Arity::at_least(1),
    evaluate_operands: true,
    form_ptr: compose_,
};

/// `(<> f g h)` is the one-parameter definition computing `(f (g (h x)))`.
fn compose_(session: &mut Interpreter, node: &Node, args: &[Node]) -> Result {
    for arg in args {
        arg.as_definition().at(arg)?;
    }
    let parameter = Symbol::from("$composed");
    let body = args.iter().rev().fold(
        Node::new(Kind::Symbol(parameter.clone()), node.location.clone()),
        |inner, function| {
            Node::new(
                Kind::Call(Call::new(function.clone(), vec![inner])),
                node.location.clone(),
            )
        },
    );
    let definition = session
        .scopes
        .new_definition("<composition>", vec![parameter], body);
    session.scopes.capture(&definition).at(node)?;
    Ok(Node::definition(definition, node.location.clone()))
}
